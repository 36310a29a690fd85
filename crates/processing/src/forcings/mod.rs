//! Catchment forcings from gridded meteorological data
//!
//! Every divide of a subset is overlaid on the forcing grid once to get the
//! coverage of each cell it touches. Each timestep of each variable is then
//! reduced to one coverage-weighted mean per divide, gaps along time are
//! filled, and one CSV per catchment is written to `forcings/by_catchment/`.

mod aggregate;
mod source;
mod variables;
mod weights;
mod writer;

pub use aggregate::{fill_nan_nearest, weighted_mean};
pub use source::{file_name, select_times, ForcingSource, GeoTiffSource, GridSpec, FILE_TIME_FORMAT};
pub use variables::{ForcingSourceKind, AORC_VARIABLES, NWM_VARIABLES, OUTPUT_VARIABLES};
pub use weights::{cell_weights, divide_weights, CellWeights};
pub use writer::write_catchment_csv;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::NaiveDateTime;
use geo::MapCoords;
use geo_types::{Coord, MultiPolygon};
use indicatif::{ProgressBar, ProgressStyle};
use ngprep_core::{Error, FilePaths, Result, CRS};
use tracing::{debug, info, warn};

use crate::gpkg::Hydrofabric;
use crate::maybe_rayon::*;

/// What a forcing run produced
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingSummary {
    pub catchments: usize,
    pub timesteps: usize,
    pub variables: Vec<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Aggregate `source` over the divides of the package subset between
/// `start` and `end` (inclusive, clamped to the dataset).
pub fn create_forcings(
    source: &dyn ForcingSource,
    kind: ForcingSourceKind,
    paths: &FilePaths,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<ForcingSummary> {
    let timer = Instant::now();
    let times = select_times(source.times(), start, end)?;
    let grid = source.grid();
    info!(
        "Generating forcings from {} for {} timesteps ({} to {})",
        source.name(),
        times.len(),
        times[0],
        times[times.len() - 1]
    );

    let hydrofabric = Hydrofabric::open(&paths.geopackage_path())?;
    let divide_crs = hydrofabric.table_crs("divides")?;
    let mut divides = hydrofabric.divide_polygons(None)?;
    if divides.is_empty() {
        return Err(Error::FeatureNotFound(format!(
            "no divides in {}",
            paths.geopackage_path().display()
        )));
    }
    if !divide_crs.is_equivalent(&grid.crs) {
        debug!("Reprojecting divides from {} to {}", divide_crs, grid.crs);
        for (_, shape) in divides.iter_mut() {
            *shape = reproject(shape, &divide_crs, &grid.crs)?;
        }
    }

    let weights = cell_weights(&divides, &grid.transform, grid.rows, grid.cols);
    for w in weights.iter().filter(|w| w.is_empty()) {
        warn!("{} does not overlap the forcing grid, its forcings will be NaN", w.divide_id);
    }
    debug!("Computed cell weights for {} divides", weights.len());

    let available: BTreeSet<String> = source.variables().into_iter().collect();
    let variables = kind.variables();
    let mut columns: Vec<BTreeMap<String, Vec<f64>>> = vec![BTreeMap::new(); weights.len()];

    let pb = ProgressBar::new(variables.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for (input, output) in variables {
        pb.set_message(format!("Processing {}", input));
        if !available.contains(input) {
            warn!("Variable {} not in forcings, skipping", input);
            pb.inc(1);
            continue;
        }

        let per_time: Vec<Option<Vec<f64>>> = times
            .par_iter()
            .map(|time| -> Result<Option<Vec<f64>>> {
                Ok(source
                    .read(input, *time)?
                    .map(|raster| weights.iter().map(|w| weighted_mean(&raster, w)).collect()))
            })
            .collect::<Result<Vec<_>>>()?;
        let missing: Vec<&NaiveDateTime> = times
            .iter()
            .zip(&per_time)
            .filter(|(_, step)| step.is_none())
            .map(|(time, _)| time)
            .collect();
        if !missing.is_empty() {
            warn!(
                "{} is missing {} of {} timesteps (first {}), filling from neighbours",
                input,
                missing.len(),
                times.len(),
                missing[0]
            );
        }

        for (i, catchment) in columns.iter_mut().enumerate() {
            let mut series: Vec<f64> = per_time
                .iter()
                .map(|step| step.as_ref().map_or(f64::NAN, |values| values[i]))
                .collect();
            fill_nan_nearest(&mut series);
            catchment.insert(output.to_string(), series);
        }
        debug!("Processed variable {}", input);
        pb.inc(1);
    }
    pb.finish_and_clear();

    if columns.first().map_or(true, |c| c.is_empty()) {
        return Err(Error::FeatureNotFound(format!(
            "none of the {} variables are present in {}",
            kind,
            source.name()
        )));
    }
    for catchment in columns.iter_mut() {
        kind.derive_precipitation(catchment);
    }

    let out_dir = paths.forcings_by_catchment_dir();
    if out_dir.exists() {
        std::fs::remove_dir_all(&out_dir)?;
    }
    std::fs::create_dir_all(&out_dir)?;
    for (w, catchment) in weights.iter().zip(&columns) {
        write_catchment_csv(&out_dir, &w.divide_id, &times, catchment)?;
    }

    let written: Vec<String> = OUTPUT_VARIABLES
        .iter()
        .filter(|v| columns[0].contains_key(**v))
        .map(|v| v.to_string())
        .collect();
    info!(
        "Forcing generation complete! {} catchments in {:.2} seconds",
        weights.len(),
        timer.elapsed().as_secs_f64()
    );

    Ok(ForcingSummary {
        catchments: weights.len(),
        timesteps: times.len(),
        variables: written,
        start: times[0],
        end: times[times.len() - 1],
    })
}

/// Transform a shape between two CRS via longitude/latitude
fn reproject(shape: &MultiPolygon<f64>, from: &CRS, to: &CRS) -> Result<MultiPolygon<f64>> {
    shape.try_map_coords(|c: Coord<f64>| -> Result<Coord<f64>> {
        let (lon, lat) = from.to_lon_lat(c.x, c.y)?;
        let (x, y) = to.from_lon_lat(lon, lat)?;
        Ok(Coord { x, y })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo_types::polygon;

    #[test]
    fn test_reproject_albers_to_wgs84() {
        let albers = CRS::conus_albers();
        let (x, y) = albers.from_lon_lat(-96.0, 40.0).unwrap();
        let shape = MultiPolygon::new(vec![polygon![
            (x: x, y: y), (x: x + 1000.0, y: y), (x: x, y: y + 1000.0), (x: x, y: y)
        ]]);
        let out = reproject(&shape, &albers, &CRS::wgs84()).unwrap();
        let first = out.0[0].exterior().0[0];
        assert_relative_eq!(first.x, -96.0, epsilon = 1e-9);
        assert_relative_eq!(first.y, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reproject_unsupported_crs() {
        let shape = MultiPolygon::new(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0)]]);
        assert!(reproject(&shape, &CRS::from_epsg(32633), &CRS::wgs84()).is_err());
    }
}
