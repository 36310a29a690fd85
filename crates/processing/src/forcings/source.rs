//! Gridded forcing inputs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ngprep_core::io::read_geotiff;
use ngprep_core::{Error, GeoTransform, Raster, Result, CRS};
use tracing::{debug, warn};

/// Timestamp embedded in GeoTIFF forcing file names
pub const FILE_TIME_FORMAT: &str = "%Y%m%d%H";

/// Shape and georeferencing shared by every timestep of a source
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub crs: CRS,
}

/// A gridded forcing dataset: named variables over a common time axis
pub trait ForcingSource: Sync {
    fn name(&self) -> &str;

    /// Variables available in the source, by source name
    fn variables(&self) -> Vec<String>;

    /// Sorted time axis
    fn times(&self) -> &[NaiveDateTime];

    fn grid(&self) -> &GridSpec;

    /// One timestep of one variable, `None` when the source has no data
    /// for that variable at `time`
    fn read(&self, variable: &str, time: NaiveDateTime) -> Result<Option<Raster<f32>>>;
}

/// A directory of single-band GeoTIFFs named `<VARIABLE>_<YYYYMMDDHH>.tif`
pub struct GeoTiffSource {
    name: String,
    files: BTreeMap<String, BTreeMap<NaiveDateTime, PathBuf>>,
    times: Vec<NaiveDateTime>,
    grid: GridSpec,
}

impl GeoTiffSource {
    /// Index a forcing directory. `crs` overrides the CRS stored in the
    /// files, and is required when they carry none.
    pub fn open(dir: &Path, crs: Option<CRS>) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::FeatureNotFound(format!(
                "forcing directory {} does not exist",
                dir.display()
            )));
        }

        let mut files: BTreeMap<String, BTreeMap<NaiveDateTime, PathBuf>> = BTreeMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Some((variable, time)) = parse_file_name(&path) else {
                debug!("Ignoring {}", path.display());
                continue;
            };
            files.entry(variable).or_default().insert(time, path);
        }

        let times: Vec<NaiveDateTime> = files
            .values()
            .flat_map(|by_time| by_time.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let first = files
            .values()
            .flat_map(|by_time| by_time.values())
            .next()
            .ok_or_else(|| {
                Error::FeatureNotFound(format!("no forcing GeoTIFFs found in {}", dir.display()))
            })?;

        let sample: Raster<f32> = read_geotiff(first)?;
        let crs = crs
            .or_else(|| sample.crs().cloned())
            .ok_or_else(|| {
                Error::UnsupportedCrs(format!("{} has no CRS, pass one explicitly", first.display()))
            })?;
        let grid = GridSpec {
            transform: *sample.transform(),
            rows: sample.rows(),
            cols: sample.cols(),
            crs,
        };

        for (variable, by_time) in &files {
            if by_time.len() != times.len() {
                warn!(
                    "{} has {} of {} timesteps",
                    variable,
                    by_time.len(),
                    times.len()
                );
            }
        }

        Ok(Self {
            name: dir.display().to_string(),
            files,
            times,
            grid,
        })
    }
}

impl ForcingSource for GeoTiffSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn variables(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    fn grid(&self) -> &GridSpec {
        &self.grid
    }

    fn read(&self, variable: &str, time: NaiveDateTime) -> Result<Option<Raster<f32>>> {
        let Some(path) = self.files.get(variable).and_then(|by_time| by_time.get(&time)) else {
            return Ok(None);
        };
        let raster: Raster<f32> = read_geotiff(path)?;
        if raster.shape() != (self.grid.rows, self.grid.cols) {
            return Err(Error::InvalidDimensions {
                width: raster.cols(),
                height: raster.rows(),
            });
        }
        Ok(Some(raster))
    }
}

/// `(variable, time)` from `<VARIABLE>_<YYYYMMDDHH>.tif`
fn parse_file_name(path: &Path) -> Option<(String, NaiveDateTime)> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext != "tif" && ext != "tiff" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (variable, stamp) = stem.rsplit_once('_')?;
    if variable.is_empty() || stamp.len() != 10 {
        return None;
    }
    let time = NaiveDateTime::parse_from_str(&format!("{}00", stamp), "%Y%m%d%H%M").ok()?;
    Some((variable.to_string(), time))
}

/// File name of one timestep of a variable
pub fn file_name(variable: &str, time: NaiveDateTime) -> String {
    format!("{}_{}.tif", variable, time.format(FILE_TIME_FORMAT))
}

/// Clamp a requested range to the dataset and return the matching
/// timesteps. A start before, or an end after, the dataset is clamped with
/// a warning; no overlap at all is an error.
pub fn select_times(
    times: &[NaiveDateTime],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<NaiveDateTime>> {
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return Err(Error::FeatureNotFound("forcing dataset has no timesteps".into()));
    };
    if start > end {
        return Err(Error::InvalidParameter {
            name: "start",
            value: start.to_string(),
            reason: format!("start is after end {}", end),
        });
    }

    let mut start = start;
    let mut end = end;
    if start < first {
        warn!(
            "provided start {} is before the start of the dataset {}, selecting from {}",
            start, first, first
        );
        start = first;
    }
    if end > last {
        warn!(
            "provided end {} is after the end of the dataset {}, selecting until {}",
            end, last, last
        );
        end = last;
    }

    let selected: Vec<NaiveDateTime> = times
        .iter()
        .copied()
        .filter(|t| *t >= start && *t <= end)
        .collect();
    if selected.is_empty() {
        return Err(Error::FeatureNotFound(format!(
            "no forcing data between {} and {}",
            start, end
        )));
    }
    Ok(selected)
}
