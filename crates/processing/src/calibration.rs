//! ngen-cal configuration for a single gaged catchment
//!
//! Lumped calibration against one USGS gage: a crosswalk from the gaged
//! catchment to the gage, container-absolute copies of the run configs,
//! and an `ngen_cal_conf.yaml` with warm-up, evaluation and validation
//! periods carved out of the realization period.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use ngprep_core::{Error, FilePaths, Result, DATETIME_FORMAT};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::gpkg::Hydrofabric;
use crate::realization::template::{render, TemplateValues, CALIBRATION_TEMPLATE};

/// Shortest range that leaves a year of warm-up and a year to evaluate
const RECOMMENDED_DAYS: i64 = 730;
const MIN_WARM_UP_DAYS: i64 = 365;

/// Periods written into the ngen-cal config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationPeriods {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub warm_up: Duration,
    pub evaluation_start: NaiveDateTime,
    pub evaluation_end: NaiveDateTime,
    pub validation_start: NaiveDateTime,
    pub validation_end: NaiveDateTime,
}

impl CalibrationPeriods {
    /// Warm up for half the range but at least a year, then split what is
    /// left evenly between evaluation and validation.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let total = end - start;
        if total.num_days() < RECOMMENDED_DAYS {
            warn!("Calibration period is less than 2 years, this may not be enough data for calibration");
        }

        let half_days = total.num_days() as f64 / 2.0;
        let mut warm_up = Duration::milliseconds((half_days * 86_400_000.0) as i64);
        if warm_up.num_days() < MIN_WARM_UP_DAYS {
            warm_up = Duration::days(MIN_WARM_UP_DAYS);
        }

        let evaluation_start = start + warm_up;
        let evaluation_end = end - (total - warm_up) / 2;
        let periods = Self {
            start,
            end,
            warm_up,
            evaluation_start,
            evaluation_end,
            validation_start: evaluation_end,
            validation_end: end,
        };
        if periods.evaluation_past_end() {
            warn!(
                "Warm-up of {} days exceeds the {}-day run, evaluation {} to {} ends after {}",
                MIN_WARM_UP_DAYS,
                total.num_days(),
                evaluation_start.format(DATETIME_FORMAT),
                evaluation_end.format(DATETIME_FORMAT),
                end.format(DATETIME_FORMAT)
            );
        }
        periods
    }

    /// The minimum warm-up pushes evaluation beyond the simulation end
    pub fn evaluation_past_end(&self) -> bool {
        self.evaluation_end > self.end
    }
}

/// Write every ngen-cal input for the package at `paths`
pub fn create_calibration_config(paths: &FilePaths, gage_id: &str) -> Result<()> {
    let gage = gage_id.rsplit('-').next().unwrap_or(gage_id);
    fs::create_dir_all(paths.calibration_dir())?;

    create_crosswalk_json(&paths.geopackage_path(), gage, &paths.calibration_dir().join("crosswalk.json"))?;
    setup_ngen_troute_config(paths)?;
    let (start, end) = start_end_times(&paths.realization_path())?;
    create_ngen_cal_config(paths, gage, &CalibrationPeriods::new(start, end))?;

    info!("Calibration config written to {}", paths.calibration_dir().display());
    Ok(())
}

/// `{cat: {"Gage_no": gage}}` for the one waterbody carrying the gage
pub fn create_crosswalk_json(hydrofabric: &Path, gage: &str, output: &Path) -> Result<String> {
    if !hydrofabric.exists() {
        return Err(Error::FeatureNotFound(format!(
            "Hydrofabric path {} does not exist, have you run the subset command?",
            hydrofabric.display()
        )));
    }
    let waterbodies = Hydrofabric::open(hydrofabric)?.waterbodies_for_gage(gage)?;
    let wb = match waterbodies.as_slice() {
        [wb] => wb,
        [] => {
            return Err(Error::FeatureNotFound(format!(
                "Gage ID {} is not associated with any waterbodies",
                gage
            )))
        }
        _ => {
            return Err(Error::InvalidParameter {
                name: "gage",
                value: gage.to_string(),
                reason: format!("associated with {} waterbodies", waterbodies.len()),
            })
        }
    };
    let cat = wb.replace("wb", "cat");

    let crosswalk = json!({ cat.as_str(): { "Gage_no": gage } });
    fs::write(output, serde_json::to_string(&crosswalk)?)?;
    Ok(cat)
}

/// Rewrite one config line for the calibration container; `None` drops it
pub fn absolute_line(line: &str) -> Option<String> {
    if line.contains("lakeout_output") || line.contains("lite_restart") {
        return None;
    }
    let line = line
        .replace("./", "/ngen/ngen/data/")
        .replace("/ngen/ngen/data/outputs/ngen/", ".")
        .replace("outputs/troute/", ".")
        .replace(
            "/ngen/ngen/data/config/troute.yaml",
            "/ngen/ngen/data/calibration/troute.yaml",
        );
    Some(line)
}

/// Copy a config file, rewriting relative paths with [`absolute_line`]
pub fn convert_paths_to_absolute(source: &Path, dest: &Path) -> Result<()> {
    let reader = BufReader::new(fs::File::open(source)?);
    let mut out = BufWriter::new(fs::File::create(dest)?);
    for line in reader.lines() {
        if let Some(line) = absolute_line(&line?) {
            writeln!(out, "{}", line)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Container-absolute copies of `realization.json` and `troute.yaml`
pub fn setup_ngen_troute_config(paths: &FilePaths) -> Result<()> {
    let realization = paths.realization_path();
    let troute = paths.troute_path();
    if !realization.exists() {
        return Err(Error::FeatureNotFound(format!(
            "Realization file {} does not exist, have you run realization generation?",
            realization.display()
        )));
    }
    if !troute.exists() {
        return Err(Error::FeatureNotFound(format!(
            "Troute config file {} does not exist, have you run realization generation?",
            troute.display()
        )));
    }
    convert_paths_to_absolute(&troute, &paths.calibration_dir().join("troute.yaml"))?;
    convert_paths_to_absolute(&realization, &paths.calibration_dir().join("realization.json"))
}

/// Run period recorded in a realization
pub fn start_end_times(realization: &Path) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let value: Value = serde_json::from_str(&fs::read_to_string(realization)?)?;
    let read = |key: &'static str| -> Result<NaiveDateTime> {
        let text = value["time"][key].as_str().ok_or_else(|| Error::InvalidParameter {
            name: key,
            value: realization.display().to_string(),
            reason: "missing from the realization time section".into(),
        })?;
        NaiveDateTime::parse_from_str(text, DATETIME_FORMAT).map_err(|e| Error::InvalidParameter {
            name: key,
            value: text.to_string(),
            reason: e.to_string(),
        })
    };
    Ok((read("start_time")?, read("end_time")?))
}

/// `calibration/ngen_cal_conf.yaml`
pub fn create_ngen_cal_config(paths: &FilePaths, gage: &str, periods: &CalibrationPeriods) -> Result<()> {
    let fmt = |t: NaiveDateTime| t.format(DATETIME_FORMAT).to_string();
    let gpkg_name = paths
        .geopackage_path()
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut values = TemplateValues::new();
    values
        .set("subset_hydrofabric", gpkg_name)
        .set("evaluation_start", fmt(periods.evaluation_start))
        .set("evaluation_stop", fmt(periods.evaluation_end))
        .set("valid_start_time", fmt(periods.start))
        .set("valid_end_time", fmt(periods.end))
        .set("valid_eval_start_time", fmt(periods.validation_start))
        .set("valid_eval_end_time", fmt(periods.validation_end))
        .set("full_eval_start_time", fmt(periods.start))
        .set("full_eval_end_time", fmt(periods.end))
        .set("gage_id", gage);

    fs::write(
        paths.calibration_dir().join("ngen_cal_conf.yaml"),
        render(CALIBRATION_TEMPLATE, &values)?,
    )?;
    Ok(())
}
