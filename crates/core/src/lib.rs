//! # ngprep core
//!
//! Core types shared by the ngprep CLI and map application.
//!
//! This crate provides:
//! - `FeatureId`: hydrofabric feature identifiers (`cat-`, `wb-`, `nex-`, `gage-`)
//! - `FilePaths`: layout of a generated input package on disk
//! - `Settings`: persistent user configuration
//! - `CRS` and the CONUS Albers projection used by the hydrofabric
//! - `Raster<T>`: georeferenced grids used for gridded forcings
//! - `CommandLine`: assembly of `ngprep` and container command lines

pub mod command;
pub mod crs;
pub mod error;
pub mod ids;
pub mod io;
pub mod paths;
pub mod raster;
pub mod settings;

pub use command::{CommandLine, Feature};
pub use crs::CRS;
pub use error::{Error, Result};
pub use ids::{FeatureId, FeatureKind};
pub use paths::FilePaths;
pub use raster::{GeoTransform, Raster, RasterElement};
pub use settings::Settings;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::ids::{FeatureId, FeatureKind};
    pub use crate::paths::FilePaths;
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
}

/// Date format accepted on the command line (`YYYY-MM-DD`).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Date-time format written into model configuration files.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
