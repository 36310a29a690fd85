//! Model configuration for a subset
//!
//! Writes per-catchment CFE and Noah-OWP-Modular configs from the
//! `divide-attributes` layer, the t-route config, the ngen realization and
//! the partition count the container runs with.

pub mod template;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use ngprep_core::{Error, FilePaths, Result, CRS, DATETIME_FORMAT};
use serde_json::Value;
use tracing::{debug, info};

use crate::gpkg::{DivideAttributes, Hydrofabric};
use template::{render, TemplateValues, CFE_TEMPLATE, NOAHOWP_TEMPLATE, REALIZATION_TEMPLATE, TROUTE_TEMPLATE};

/// Routing timestep in seconds
pub const TROUTE_TIME_STEP: i64 = 300;

/// ngen output interval in seconds
pub const OUTPUT_INTERVAL: i64 = 3600;

const NOAHOWP_TIME_FORMAT: &str = "%Y%m%d%H%M";
const DEFAULT_MAX_GW_STORAGE: &str = "0.011[m]";
const DEFAULT_CGW: &str = "0.0018[m h-1]";
const DEFAULT_GW_STORAGE: &str = "0.05";

/// What a realization run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealizationSummary {
    pub catchments: usize,
    /// t-route timesteps
    pub nts: i64,
    pub partitions: usize,
}

/// Write every config a model run over `start..end` needs
pub fn create_realization(paths: &FilePaths, start: NaiveDateTime, end: NaiveDateTime) -> Result<RealizationSummary> {
    if end <= start {
        return Err(Error::InvalidParameter {
            name: "end",
            value: end.to_string(),
            reason: format!("end must be after start {}", start),
        });
    }

    let hydrofabric = Hydrofabric::open(&paths.geopackage_path())?;
    let attributes = hydrofabric.divide_attributes()?;
    if attributes.is_empty() {
        return Err(Error::FeatureNotFound(format!(
            "no divide attributes in {}",
            paths.geopackage_path().display()
        )));
    }
    let crs = hydrofabric.table_crs("divides").unwrap_or_else(|e| {
        debug!("Assuming CONUS Albers centroids: {}", e);
        CRS::conus_albers()
    });

    make_cfe_config(&attributes, paths)?;
    make_noahowp_config(&attributes, &crs, paths, start, end)?;
    let nts = configure_troute(paths, start, end)?;
    make_ngen_realization_json(paths, start, end)?;

    paths.setup_run_folders()?;
    let pairs = hydrofabric.cat_to_nex_pairs()?;
    let partitions = write_num_partitions(paths, &pairs, available_threads())?;

    info!("Realization written for {} catchments", attributes.len());
    Ok(RealizationSummary {
        catchments: attributes.len(),
        nts,
        partitions,
    })
}

fn required(value: Option<f64>, divide: &str, column: &'static str) -> Result<f64> {
    value.ok_or_else(|| Error::InvalidParameter {
        name: column,
        value: divide.to_string(),
        reason: "attribute is null".into(),
    })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// `config/cat_config/CFE/<cat>.ini` for every divide
pub fn make_cfe_config(attributes: &[DivideAttributes], paths: &FilePaths) -> Result<()> {
    let dir = paths.cat_config_dir().join("CFE");
    fs::create_dir_all(&dir)?;

    for row in attributes {
        let id = row.divide_id.as_str();
        let mut values = TemplateValues::new();
        values
            .set("bexp", required(row.bexp, id, "bexp")?)
            .set("dksat", required(row.dksat, id, "dksat")?)
            .set("psisat", required(row.psisat, id, "psisat")?)
            .set("slope", required(row.slope, id, "slope")?)
            .set("smcmax", required(row.smcmax, id, "smcmax")?)
            .set("smcwlt", required(row.smcwlt, id, "smcwlt")?)
            .set("refkdt", required(row.refkdt, id, "refkdt")?)
            .set("gw_Expon", required(row.gw_expon, id, "gw_expon")?)
            .set("gw_storage", DEFAULT_GW_STORAGE);
        // Zmax is stored in mm
        match row.gw_zmax {
            Some(zmax) => values.set("max_gw_storage", format!("{}[m]", zmax / 1000.0)),
            None => values.set("max_gw_storage", DEFAULT_MAX_GW_STORAGE),
        };
        match row.gw_coeff {
            Some(coeff) => values.set("gw_Coeff", format!("{}[m h-1]", coeff)),
            None => values.set("gw_Coeff", DEFAULT_CGW),
        };

        write_file(&dir.join(format!("{}.ini", id)), &render(CFE_TEMPLATE, &values)?)?;
    }
    debug!("Wrote {} CFE configs to {}", attributes.len(), dir.display());
    Ok(())
}

/// `config/cat_config/NOAH-OWP-M/<cat>.input` for every divide
pub fn make_noahowp_config(
    attributes: &[DivideAttributes],
    crs: &CRS,
    paths: &FilePaths,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<()> {
    let dir = paths.cat_config_dir().join("NOAH-OWP-M");
    fs::create_dir_all(&dir)?;
    let start = start.format(NOAHOWP_TIME_FORMAT).to_string();
    let end = end.format(NOAHOWP_TIME_FORMAT).to_string();

    for row in attributes {
        let id = row.divide_id.as_str();
        let (lon, lat) = crs.to_lon_lat(row.centroid.0, row.centroid.1)?;
        let mut values = TemplateValues::new();
        values
            .set("start_datetime", &start)
            .set("end_datetime", &end)
            .set("lat", lat)
            .set("lon", lon)
            .set("terrain_slope", required(row.slope, id, "slope")?)
            .set("azimuth", required(row.aspect, id, "aspect")?)
            .set("ISLTYP", required(row.isltyp, id, "isltyp")?.round() as i64)
            .set("IVGTYP", required(row.ivgtyp, id, "ivgtyp")?.round() as i64);

        write_file(&dir.join(format!("{}.input", id)), &render(NOAHOWP_TEMPLATE, &values)?)?;
    }
    debug!("Wrote {} Noah-OWP configs to {}", attributes.len(), dir.display());
    Ok(())
}

/// `config/troute.yaml`; returns the number of routing timesteps
pub fn configure_troute(paths: &FilePaths, start: NaiveDateTime, end: NaiveDateTime) -> Result<i64> {
    let seconds = (end - start).num_seconds();
    let nts = seconds / TROUTE_TIME_STEP;
    let hourly_steps = (nts * TROUTE_TIME_STEP) as f64 / OUTPUT_INTERVAL as f64;

    let mut values = TemplateValues::new();
    values
        .set("time_step_size", TROUTE_TIME_STEP)
        .set("cpu_pool", available_threads())
        .set(
            "geo_file_path",
            format!("/ngen/ngen/data/config/{}_subset.gpkg", paths.folder_name()),
        )
        .set("start_datetime", start.format(DATETIME_FORMAT))
        .set("nts", nts)
        .set("max_loop_size", nts)
        .set("stream_output_time", hourly_steps);

    write_file(&paths.troute_path(), &render(TROUTE_TEMPLATE, &values)?)?;
    Ok(nts)
}

/// `config/realization.json` with the run period filled in
pub fn make_ngen_realization_json(paths: &FilePaths, start: NaiveDateTime, end: NaiveDateTime) -> Result<()> {
    let mut realization: Value = serde_json::from_str(REALIZATION_TEMPLATE)?;
    let nts = (end - start).num_seconds() / OUTPUT_INTERVAL;

    let time = realization
        .get_mut("time")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::Template("realization template has no time section".into()))?;
    time.insert("start_time".into(), start.format(DATETIME_FORMAT).to_string().into());
    time.insert("end_time".into(), end.format(DATETIME_FORMAT).to_string().into());
    time.insert("output_interval".into(), OUTPUT_INTERVAL.into());
    time.insert("nts".into(), nts.into());

    write_file(&paths.realization_path(), &serde_json::to_string_pretty(&realization)?)
}

/// Number of MPI ranks for the run: one per nexus, at most `threads`
pub fn num_partitions(pairs: &[(String, String)], threads: usize) -> usize {
    let nexus: BTreeSet<&str> = pairs.iter().map(|(_, nex)| nex.as_str()).collect();
    threads.min(nexus.len()).max(1)
}

fn write_num_partitions(paths: &FilePaths, pairs: &[(String, String)], threads: usize) -> Result<usize> {
    let partitions = num_partitions(pairs, threads);
    write_file(&paths.num_partitions_path(), &partitions.to_string())?;
    Ok(partitions)
}

/// Partition count stored by a previous realization run
pub fn read_num_partitions(paths: &FilePaths) -> Result<usize> {
    let path = paths.num_partitions_path();
    let text = fs::read_to_string(&path)?;
    text.trim().parse().map_err(|_| Error::InvalidParameter {
        name: "num_partitions",
        value: text.trim().to_string(),
        reason: format!("{} does not hold a count", path.display()),
    })
}

fn available_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2010, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn attrs(id: &str) -> DivideAttributes {
        let (x, y) = CRS::conus_albers().from_lon_lat(-77.0, 38.9).unwrap();
        DivideAttributes {
            divide_id: id.to_string(),
            bexp: Some(4.05),
            dksat: Some(3.38e-6),
            psisat: Some(0.355),
            slope: Some(0.1),
            smcmax: Some(0.439),
            smcwlt: Some(0.066),
            gw_zmax: Some(25.0),
            gw_coeff: None,
            gw_expon: Some(3.0),
            refkdt: Some(1.5),
            aspect: Some(180.0),
            isltyp: Some(3.0),
            ivgtyp: Some(10.0),
            centroid: (x, y),
        }
    }

    #[test]
    fn test_cfe_defaults_and_units() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_folder("cat-1", dir.path()).unwrap();
        make_cfe_config(&[attrs("cat-1")], &paths).unwrap();

        let ini = fs::read_to_string(paths.cat_config_dir().join("CFE/cat-1.ini")).unwrap();
        assert!(ini.contains("soil_params.b=4.05[]"));
        assert!(ini.contains("max_gw_storage=0.025[m]"));
        assert!(ini.contains("Cgw=0.0018[m h-1]"));
        assert!(ini.contains("gw_storage=0.05[m/m]"));
        assert!(ini.contains("refkdt=1.5"));
    }

    #[test]
    fn test_cfe_missing_attribute_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_folder("cat-1", dir.path()).unwrap();
        let mut row = attrs("cat-1");
        row.bexp = None;
        assert!(make_cfe_config(&[row], &paths).is_err());
    }

    #[test]
    fn test_noahowp_location_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_folder("cat-1", dir.path()).unwrap();
        make_noahowp_config(&[attrs("cat-1")], &CRS::conus_albers(), &paths, at(1, 0), at(2, 0)).unwrap();

        let text = fs::read_to_string(paths.cat_config_dir().join("NOAH-OWP-M/cat-1.input")).unwrap();
        assert!(text.contains("startdate          = \"201001010000\""));
        assert!(text.contains("enddate            = \"201001020000\""));
        assert!(text.contains("isltyp           = 3\n"));
        assert!(text.contains("vegtyp           = 10\n"));
        let lat_line = text.lines().find(|l| l.trim_start().starts_with("lat ")).unwrap();
        let lat: f64 = lat_line.split('=').nth(1).unwrap().trim().parse().unwrap();
        assert!((lat - 38.9).abs() < 1e-6);
    }

    #[test]
    fn test_troute_timesteps() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_folder("cat-9", dir.path()).unwrap();
        let nts = configure_troute(&paths, at(1, 0), at(2, 0)).unwrap();
        assert_eq!(nts, 288);

        let yaml = fs::read_to_string(paths.troute_path()).unwrap();
        assert!(yaml.contains("geo_file_path: /ngen/ngen/data/config/cat-9_subset.gpkg"));
        assert!(yaml.contains("nts: 288"));
        assert!(yaml.contains("max_loop_size: 288"));
        assert!(yaml.contains("stream_output_time: 24\n"));
        assert!(yaml.contains("dt: 300"));
        assert!(yaml.contains("start_datetime: \"2010-01-01 00:00:00\""));
    }

    #[test]
    fn test_realization_time_section() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_folder("cat-9", dir.path()).unwrap();
        make_ngen_realization_json(&paths, at(1, 0), at(3, 0)).unwrap();

        let json: Value = serde_json::from_str(&fs::read_to_string(paths.realization_path()).unwrap()).unwrap();
        assert_eq!(json["time"]["start_time"], "2010-01-01 00:00:00");
        assert_eq!(json["time"]["end_time"], "2010-01-03 00:00:00");
        assert_eq!(json["time"]["output_interval"], 3600);
        assert_eq!(json["time"]["nts"], 48);
        assert_eq!(json["global"]["forcing"]["provider"], "CsvPerFeature");
    }

    #[test]
    fn test_partitions() {
        let pairs = vec![
            ("cat-1".to_string(), "nex-1".to_string()),
            ("cat-2".to_string(), "nex-1".to_string()),
            ("cat-3".to_string(), "nex-2".to_string()),
        ];
        assert_eq!(num_partitions(&pairs, 8), 2);
        assert_eq!(num_partitions(&pairs, 1), 1);
        assert_eq!(num_partitions(&[], 8), 1);

        let dir = tempfile::tempdir().unwrap();
        let paths = FilePaths::for_folder("cat-1", dir.path()).unwrap();
        write_num_partitions(&paths, &pairs, 8).unwrap();
        assert_eq!(read_num_partitions(&paths).unwrap(), 2);
    }
}
