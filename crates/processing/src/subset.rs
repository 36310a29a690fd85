//! Hydrofabric subsetting
//!
//! A subset holds every feature upstream of the requested ids and is
//! written to `config/<folder>_subset.gpkg` of the output package.

use std::collections::BTreeSet;
use std::path::Path;

use ngprep_core::ids::waterbody_to_catchment;
use ngprep_core::{Error, FilePaths, Result};
use tracing::{debug, info};

use crate::gpkg::{write_subset, Hydrofabric, SubsetSummary};
use crate::network::NetworkGraph;

/// Subset the hydrofabric to everything upstream of `ids`.
///
/// Existing `config/` and `forcings/` folders of the package are removed
/// first, so stale forcings never outlive the geometry they were made for.
pub fn subset<S: AsRef<str>>(
    ids: &[S],
    hydrofabric: &Hydrofabric,
    network: &NetworkGraph,
    paths: &FilePaths,
    include_outlet: bool,
) -> Result<SubsetSummary> {
    let upstream = network.upstream_ids(ids, include_outlet)?;
    if upstream.is_empty() {
        return Err(Error::FeatureNotFound("no upstream features found".into()));
    }
    write_ids(&upstream, hydrofabric, paths)
}

/// Subset every feature of one vector processing unit
pub fn subset_vpu(vpu: &str, hydrofabric: &Hydrofabric, paths: &FilePaths) -> Result<SubsetSummary> {
    info!("Subsetting VPU {}", vpu);
    let ids: BTreeSet<String> = hydrofabric.vpu_ids(vpu)?.into_iter().collect();
    write_ids(&ids, hydrofabric, paths)
}

/// Folder name used when none is given: the first upstream id in sort order
pub fn default_folder_name<S: AsRef<str>>(
    ids: &[S],
    network: &NetworkGraph,
    include_outlet: bool,
) -> Result<String> {
    network
        .upstream_ids(ids, include_outlet)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::FeatureNotFound("no upstream features found".into()))
}

/// Network ids plus the `cat-` twin of every `wb-` id, the keys the
/// divide layers are filtered by
pub fn with_catchment_ids(ids: &BTreeSet<String>) -> BTreeSet<String> {
    let mut all = ids.clone();
    all.extend(
        ids.iter()
            .filter(|id| id.starts_with("wb-"))
            .map(|id| waterbody_to_catchment(id)),
    );
    all
}

fn write_ids(ids: &BTreeSet<String>, hydrofabric: &Hydrofabric, paths: &FilePaths) -> Result<SubsetSummary> {
    remove_existing_output(paths)?;

    let keys = with_catchment_ids(ids);
    let summary = write_subset(hydrofabric.path(), &paths.geopackage_path(), &keys)?;

    let catchments = ids.iter().filter(|id| id.starts_with("wb")).count();
    info!("Subset complete for {} catchments", catchments);
    debug!("Subset ids: {:?}", ids);
    Ok(summary)
}

fn remove_existing_output(paths: &FilePaths) -> Result<()> {
    let dir = paths.subset_dir();
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        return Ok(());
    }
    for sub in [paths.config_dir(), paths.forcings_dir()] {
        remove_dir_if_exists(&sub)?;
    }
    Ok(())
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        debug!("Removing {}", dir.display());
        std::fs::remove_dir_all(dir)?;
    }
    Ok(())
}
