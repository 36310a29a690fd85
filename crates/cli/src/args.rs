//! Command-line arguments

use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{ArgGroup, Parser};
use ngprep_core::command::parse_time_arg;
use ngprep_processing::forcings::ForcingSourceKind;

/// Vector processing units of the CONUS hydrofabric
pub const VPU_CHOICES: [&str; 23] = [
    "01", "02", "03", "03N", "03S", "03W", "04", "05", "06", "07", "08", "09", "10", "10L", "10U",
    "11", "12", "13", "14", "15", "16", "17", "18",
];

#[derive(Parser, Debug, Clone)]
#[command(name = "ngprep")]
#[command(
    author,
    version,
    about = "Subsetting hydrofabrics, forcing generation, and realization creation",
    long_about = None
)]
#[command(group(ArgGroup::new("feature").required(true).args(["input_feature", "vpu"])))]
pub struct Args {
    /// ID of the feature(s) to subset, a prefix is converted to a catchment
    /// id, e.g. cat-5173, gage-01646500 or wb-1234
    #[arg(short = 'i', long = "input-feature", visible_alias = "input_feature", num_args = 1..)]
    pub input_feature: Vec<String>,

    /// The VPU to subset, e.g. 01
    #[arg(long, value_parser = VPU_CHOICES)]
    pub vpu: Option<String>,

    /// Inputs are comma separated lat,lon pairs, e.g. -i 54.33,-69.4 -l
    #[arg(short = 'l', long)]
    pub latlon: bool,

    /// Inputs are USGS gage ids, e.g. -i 01646500 -g
    #[arg(short = 'g', long)]
    pub gage: bool,

    /// Subset the hydrofabric to the given feature
    #[arg(short = 's', long)]
    pub subset: bool,

    /// Generate forcings for the given feature
    #[arg(short = 'f', long)]
    pub forcings: bool,

    /// Create a realization for the given feature
    #[arg(short = 'r', long)]
    pub realization: bool,

    /// Start for forcings/realization (YYYY-MM-DD or YYYY-MM-DDTHH:MM)
    #[arg(long = "start-date", visible_alias = "start", value_parser = time_arg)]
    pub start_date: Option<NaiveDateTime>,

    /// End for forcings/realization (YYYY-MM-DD or YYYY-MM-DDTHH:MM)
    #[arg(long = "end-date", visible_alias = "end", value_parser = time_arg)]
    pub end_date: Option<NaiveDateTime>,

    /// Name of the output folder
    #[arg(short = 'o', long = "output-name")]
    pub output_name: Option<String>,

    /// Enable debug logging
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Run NextGen against the output folder
    #[arg(long)]
    pub run: bool,

    /// Run every missing step required to run NextGen
    #[arg(long)]
    pub validate: bool,

    /// Visualise the model output
    #[arg(long, visible_alias = "visualise")]
    pub vis: bool,

    /// Generate default ngen-cal config files for a gage
    #[arg(long, visible_alias = "calibration")]
    pub cal: bool,

    /// Subset, forcings, realization and run
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Gridded forcing dataset family: nwm or aorc
    #[arg(long, default_value_t = ForcingSourceKind::Nwm)]
    pub source: ForcingSourceKind,

    /// Directory of <VARIABLE>_<YYYYMMDDHH>.tif forcing grids
    #[arg(long)]
    pub forcing_dir: Option<PathBuf>,

    /// EPSG code of the forcing grids when the files carry none
    #[arg(long)]
    pub forcing_epsg: Option<u32>,

    /// Hydrofabric GeoPackage, overrides the settings file
    #[arg(long)]
    pub hydrofabric: Option<PathBuf>,

    /// Set and remember the folder output packages are written under
    #[arg(long)]
    pub working_dir: Option<PathBuf>,
}

fn time_arg(s: &str) -> Result<NaiveDateTime, String> {
    parse_time_arg(s).map_err(|e| e.to_string())
}
