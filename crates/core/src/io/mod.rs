//! Reading and writing gridded data

mod geotiff;

pub use geotiff::{read_geotiff, write_geotiff};
