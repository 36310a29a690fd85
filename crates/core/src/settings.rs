//! Persistent user settings (`~/.ngiab/preprocessor.toml`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const SETTINGS_FILE: &str = "preprocessor.toml";
const HYDROFABRIC_DIR: &str = "hydrofabric/v2.2";

/// User configuration shared by the CLI and the map application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root folder that output packages are written under
    pub working_dir: Option<PathBuf>,
    /// CONUS hydrofabric GeoPackage
    pub hydrofabric: PathBuf,
    /// Cached network edge list
    pub network_cache: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let base = ngiab_home().join(HYDROFABRIC_DIR);
        Self {
            working_dir: None,
            hydrofabric: base.join("conus_nextgen.gpkg"),
            network_cache: base.join("conus_network.bin"),
        }
    }
}

/// `~/.ngiab`, or `./.ngiab` when no home directory is known
pub fn ngiab_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ngiab")
}

impl Settings {
    /// Default location of the settings file
    pub fn default_path() -> PathBuf {
        ngiab_home().join(SETTINGS_FILE)
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&text)?;
        Ok(settings)
    }

    /// Write to `path`, creating parent folders
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Persist a new working directory to the default settings file
    pub fn set_working_dir(&mut self, dir: &Path) -> Result<()> {
        let dir = expand_home(dir);
        if dir.exists() && !dir.is_dir() {
            return Err(Error::Settings(format!(
                "{} exists and is not a directory",
                dir.display()
            )));
        }
        self.working_dir = Some(dir);
        self.save_to(&Self::default_path())
    }

    /// Folder output packages are written under
    pub fn root_output_dir(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) => expand_home(dir),
            None => PathBuf::from("output"),
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.root_output_dir(), PathBuf::from("output"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg/preprocessor.toml");
        let s = Settings {
            working_dir: Some(PathBuf::from("/data/ngen")),
            ..Settings::default()
        };
        s.save_to(&path).unwrap();
        let back = Settings::load_from(&path).unwrap();
        assert_eq!(back.working_dir, Some(PathBuf::from("/data/ngen")));
        assert_eq!(back.root_output_dir(), PathBuf::from("/data/ngen"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.toml");
        std::fs::write(&path, "hydrofabric = \"/hf/conus.gpkg\"\n").unwrap();
        let s = Settings::load_from(&path).unwrap();
        assert_eq!(s.hydrofabric, PathBuf::from("/hf/conus.gpkg"));
        assert!(s.working_dir.is_none());
        assert_eq!(s.network_cache, Settings::default().network_cache);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.toml");
        std::fs::write(&path, "hydrofabric = [").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(Error::Settings(_))));
    }
}
