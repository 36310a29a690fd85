//! Hydrofabric jobs in background threads.
//!
//! Each job runs in its own `std::thread` and reports back via
//! `crossbeam_channel`. The GeoPackage is opened per job since SQLite
//! connections are not shared between threads.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use crossbeam_channel::Sender;
use geo_types::MultiPolygon;
use ngprep_core::{FilePaths, Result, CRS};
use ngprep_processing::forcings::{create_forcings, ForcingSourceKind, GeoTiffSource};
use ngprep_processing::gpkg::Hydrofabric;
use ngprep_processing::network::NetworkGraph;
use ngprep_processing::realization::create_realization;
use ngprep_processing::subset::subset;

use crate::state::{AppMessage, Job, LogEntry, Outline};

/// Where the hydrofabric and its network cache live
#[derive(Debug, Clone)]
pub struct HydrofabricSource {
    pub gpkg: PathBuf,
    pub network_cache: PathBuf,
}

pub fn load_network(source: HydrofabricSource, tx: Sender<AppMessage>) {
    std::thread::spawn(move || {
        let _ = tx.send(AppMessage::Log(LogEntry::info(format!(
            "Loading network from {}...",
            source.gpkg.display()
        ))));
        let result = Hydrofabric::open(&source.gpkg)
            .and_then(|hf| NetworkGraph::load_or_build(&hf, &source.network_cache));
        match result {
            Ok(network) => {
                let _ = tx.send(AppMessage::Log(LogEntry::success(format!(
                    "Network ready: {} features",
                    network.node_count()
                ))));
                let _ = tx.send(AppMessage::NetworkLoaded(Arc::new(network)));
            }
            Err(e) => send_error(&tx, "Network", None, e),
        }
    });
}

/// Catchment under a clicked point
pub fn lookup_point(source: HydrofabricSource, lon: f64, lat: f64, tx: Sender<AppMessage>) {
    std::thread::spawn(move || {
        let result = Hydrofabric::open(&source.gpkg).and_then(|hf| hf.cat_from_point(lat, lon));
        match result {
            Ok(cat_id) => {
                let _ = tx.send(AppMessage::CatchmentFound { cat_id });
            }
            Err(e) => {
                let _ = tx.send(AppMessage::Log(LogEntry::warning(format!(
                    "{:.4}, {:.4}: {}",
                    lat, lon, e
                ))));
            }
        }
    });
}

/// Trace everything upstream of `selected` and fetch the outlines of the
/// selected and upstream catchments.
pub fn trace_upstream(
    source: HydrofabricSource,
    network: Arc<NetworkGraph>,
    selected: Vec<String>,
    tx: Sender<AppMessage>,
) {
    std::thread::spawn(move || {
        let upstream = network.upstream_cats(&selected);
        let mut wanted: Vec<String> = upstream.iter().cloned().collect();
        wanted.extend(selected.iter().filter(|c| !upstream.contains(*c)).cloned());

        match outlines(&source, &wanted) {
            Ok(outlines) => {
                let _ = tx.send(AppMessage::UpstreamTraced {
                    selected,
                    upstream,
                    outlines,
                });
            }
            Err(e) => send_error(&tx, "Upstream", None, e),
        }
    });
}

fn outlines(source: &HydrofabricSource, ids: &[String]) -> Result<Vec<(String, Outline)>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let hf = Hydrofabric::open(&source.gpkg)?;
    let crs = hf.table_crs("divides")?;
    hf.divide_polygons(Some(ids))?
        .into_iter()
        .map(|(id, shape)| -> Result<(String, Outline)> { Ok((id, to_lon_lat(&shape, &crs)?)) })
        .collect()
}

/// Polygon rings of `shape` as WGS-84 `(lon, lat)`
pub fn to_lon_lat(shape: &MultiPolygon<f64>, crs: &CRS) -> Result<Outline> {
    let mut rings = Vec::new();
    for polygon in shape {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            let coords = ring
                .coords()
                .map(|c| crs.to_lon_lat(c.x, c.y))
                .collect::<Result<Vec<_>>>()?;
            rings.push(coords);
        }
    }
    Ok(rings)
}

/// Parameters shared by the pipeline jobs
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub paths: FilePaths,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub forcing_dir: PathBuf,
    /// CRS of the forcing grids when the files carry none
    pub forcing_epsg: Option<u32>,
    pub source_kind: ForcingSourceKind,
}

pub fn run_subset(
    source: HydrofabricSource,
    network: Arc<NetworkGraph>,
    selected: Vec<String>,
    paths: FilePaths,
    tx: Sender<AppMessage>,
) {
    std::thread::spawn(move || {
        let _ = tx.send(AppMessage::Log(LogEntry::info(format!(
            "Subsetting {} into {}...",
            selected.join(", "),
            paths.subset_dir().display()
        ))));
        let start = Instant::now();
        let result = Hydrofabric::open(&source.gpkg)
            .and_then(|hf| subset(&selected, &hf, &network, &paths, true));
        match result {
            Ok(summary) => {
                let _ = tx.send(AppMessage::Log(LogEntry::info(format!(
                    "{} divides written",
                    summary.rows("divides")
                ))));
                send_complete(&tx, Job::Subset, paths, start);
            }
            Err(e) => send_error(&tx, "Subset", Some(Job::Subset), e),
        }
    });
}

pub fn run_forcings(request: JobRequest, tx: Sender<AppMessage>) {
    std::thread::spawn(move || {
        let _ = tx.send(AppMessage::Log(LogEntry::info(format!(
            "Generating forcings from {} to {}...",
            request.start, request.end
        ))));
        let start = Instant::now();
        let result = GeoTiffSource::open(&request.forcing_dir, request.forcing_epsg.map(CRS::from_epsg)).and_then(|grid| {
            create_forcings(&grid, request.source_kind, &request.paths, request.start, request.end)
        });
        match result {
            Ok(summary) => {
                let _ = tx.send(AppMessage::Log(LogEntry::info(format!(
                    "{} catchments, {} timesteps",
                    summary.catchments, summary.timesteps
                ))));
                send_complete(&tx, Job::Forcings, request.paths, start);
            }
            Err(e) => send_error(&tx, "Forcings", Some(Job::Forcings), e),
        }
    });
}

pub fn run_realization(request: JobRequest, tx: Sender<AppMessage>) {
    std::thread::spawn(move || {
        let _ = tx.send(AppMessage::Log(LogEntry::info(format!(
            "Creating realization from {} to {}...",
            request.start, request.end
        ))));
        let start = Instant::now();
        match create_realization(&request.paths, request.start, request.end) {
            Ok(summary) => {
                let _ = tx.send(AppMessage::Log(LogEntry::info(format!(
                    "{} catchments, {} partitions",
                    summary.catchments, summary.partitions
                ))));
                send_complete(&tx, Job::Realization, request.paths, start);
            }
            Err(e) => send_error(&tx, "Realization", Some(Job::Realization), e),
        }
    });
}

fn send_complete(tx: &Sender<AppMessage>, job: Job, paths: FilePaths, start: Instant) {
    let elapsed = start.elapsed();
    let _ = tx.send(AppMessage::Log(LogEntry::success(format!(
        "{} completed in {:.2}s",
        job.name(),
        elapsed.as_secs_f64()
    ))));
    let _ = tx.send(AppMessage::JobComplete { job, paths, elapsed });
}

fn send_error(tx: &Sender<AppMessage>, name: &str, job: Option<Job>, err: impl std::fmt::Display) {
    let msg = format!("{}: {}", name, err);
    let _ = tx.send(AppMessage::Error {
        context: name.to_string(),
        job,
        message: err.to_string(),
    });
    let _ = tx.send(AppMessage::Log(LogEntry::error(msg)));
}
