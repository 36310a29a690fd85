//! On-disk layout of a generated input package
//!
//! ```text
//! <root>/<folder>/
//!     config/<folder>_subset.gpkg
//!     config/cat_config/{CFE,NOAH-OWP-M}/
//!     config/realization.json, troute.yaml
//!     forcings/by_catchment/<cat>.csv
//!     metadata/num_partitions
//!     calibration/
//!     outputs/{ngen,troute}/, restart/, lakeout/
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Paths of one output package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePaths {
    folder_name: String,
    output_dir: PathBuf,
}

impl FilePaths {
    /// Resolve paths for either a folder name under `root` or an explicit
    /// output directory. Exactly one of the two must be given.
    pub fn new(folder_name: Option<&str>, output_dir: Option<&Path>, root: &Path) -> Result<Self> {
        match (folder_name, output_dir) {
            (Some(name), None) if !name.is_empty() => Ok(Self {
                folder_name: name.to_string(),
                output_dir: root.join(name),
            }),
            (None, Some(dir)) => {
                let folder_name = dir
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .ok_or_else(|| Error::InvalidParameter {
                        name: "output_dir",
                        value: dir.display().to_string(),
                        reason: "output directory has no final component".into(),
                    })?;
                Ok(Self {
                    folder_name,
                    output_dir: dir.to_path_buf(),
                })
            }
            _ => Err(Error::InvalidParameter {
                name: "output",
                value: format!("{:?} / {:?}", folder_name, output_dir),
                reason: "please pass either folder_name or output_dir".into(),
            }),
        }
    }

    /// Paths for a folder name under `root`
    pub fn for_folder(folder_name: &str, root: &Path) -> Result<Self> {
        Self::new(Some(folder_name), None, root)
    }

    /// Paths for an explicit output directory
    pub fn for_dir(output_dir: &Path) -> Result<Self> {
        Self::new(None, Some(output_dir), Path::new(""))
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    pub fn subset_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn config_dir(&self) -> PathBuf {
        self.output_dir.join("config")
    }

    pub fn cat_config_dir(&self) -> PathBuf {
        self.config_dir().join("cat_config")
    }

    pub fn forcings_dir(&self) -> PathBuf {
        self.output_dir.join("forcings")
    }

    pub fn forcings_by_catchment_dir(&self) -> PathBuf {
        self.forcings_dir().join("by_catchment")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.output_dir.join("metadata")
    }

    pub fn calibration_dir(&self) -> PathBuf {
        self.output_dir.join("calibration")
    }

    pub fn geopackage_path(&self) -> PathBuf {
        self.config_dir()
            .join(format!("{}_subset.gpkg", self.folder_name))
    }

    pub fn realization_path(&self) -> PathBuf {
        self.config_dir().join("realization.json")
    }

    pub fn troute_path(&self) -> PathBuf {
        self.config_dir().join("troute.yaml")
    }

    pub fn num_partitions_path(&self) -> PathBuf {
        self.metadata_dir().join("num_partitions")
    }

    /// Create the folders the model run writes into
    pub fn setup_run_folders(&self) -> Result<()> {
        for folder in [
            "restart",
            "lakeout",
            "outputs",
            "outputs/ngen",
            "outputs/troute",
            "metadata",
        ] {
            std::fs::create_dir_all(self.output_dir.join(folder))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_layout() {
        let paths = FilePaths::for_folder("cat-1643991", Path::new("/data/out")).unwrap();
        assert_eq!(paths.subset_dir(), Path::new("/data/out/cat-1643991"));
        assert_eq!(
            paths.geopackage_path(),
            PathBuf::from("/data/out/cat-1643991/config/cat-1643991_subset.gpkg")
        );
        assert_eq!(
            paths.forcings_by_catchment_dir(),
            PathBuf::from("/data/out/cat-1643991/forcings/by_catchment")
        );
    }

    #[test]
    fn test_explicit_dir_uses_stem() {
        let paths = FilePaths::for_dir(Path::new("/tmp/run-a")).unwrap();
        assert_eq!(paths.folder_name(), "run-a");
        assert_eq!(paths.config_dir(), PathBuf::from("/tmp/run-a/config"));
    }

    #[test]
    fn test_both_or_neither_rejected() {
        let root = Path::new("/r");
        assert!(FilePaths::new(None, None, root).is_err());
        assert!(FilePaths::new(Some("a"), Some(Path::new("/b")), root).is_err());
    }

    #[test]
    fn test_setup_run_folders() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_dir(&dir.path().join("pkg")).unwrap();
        paths.setup_run_folders().unwrap();
        assert!(dir.path().join("pkg/outputs/troute").is_dir());
        assert!(dir.path().join("pkg/metadata").is_dir());
    }
}
