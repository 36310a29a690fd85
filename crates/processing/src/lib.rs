//! # ngprep processing
//!
//! The pipeline behind the ngprep CLI and map application.
//!
//! - **gpkg**: GeoPackage geometry codec, hydrofabric queries and the subset writer
//! - **network**: flow network graph and upstream tracing
//! - **subset**: hydrofabric subsets for a set of features or a VPU
//! - **forcings**: zonal-weighted aggregation of gridded forcings per catchment
//! - **realization**: model configuration and realization synthesis
//! - **calibration**: ngen-cal configuration for a gaged catchment

pub mod calibration;
pub mod forcings;
pub mod gpkg;
pub(crate) mod maybe_rayon;
pub mod network;
pub mod realization;
pub mod subset;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::calibration::create_calibration_config;
    pub use crate::forcings::{create_forcings, ForcingSource, ForcingSourceKind, GeoTiffSource};
    pub use crate::gpkg::Hydrofabric;
    pub use crate::network::NetworkGraph;
    pub use crate::realization::create_realization;
    pub use crate::subset::{subset, subset_vpu};
    pub use ngprep_core::prelude::*;
}
