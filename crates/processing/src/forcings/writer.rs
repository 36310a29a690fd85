//! Per-catchment forcing files

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ngprep_core::{Error, Result, DATETIME_FORMAT};

use super::variables::OUTPUT_VARIABLES;

/// Write `<dir>/<divide_id>.csv` with a `time` column followed by the
/// output variables present in `columns`, in [`OUTPUT_VARIABLES`] order.
pub fn write_catchment_csv(
    dir: &Path,
    divide_id: &str,
    times: &[NaiveDateTime],
    columns: &BTreeMap<String, Vec<f64>>,
) -> Result<PathBuf> {
    let names: Vec<&str> = OUTPUT_VARIABLES
        .iter()
        .copied()
        .filter(|name| columns.contains_key(*name))
        .collect();
    for name in &names {
        if columns[*name].len() != times.len() {
            return Err(Error::InvalidParameter {
                name: "columns",
                value: name.to_string(),
                reason: format!("{} values for {} timesteps", columns[*name].len(), times.len()),
            });
        }
    }

    let path = dir.join(format!("{}.csv", divide_id));
    let mut out = BufWriter::new(File::create(&path)?);
    write!(out, "time")?;
    for name in &names {
        write!(out, ",{}", name)?;
    }
    writeln!(out)?;

    for (i, time) in times.iter().enumerate() {
        write!(out, "{}", time.format(DATETIME_FORMAT))?;
        for name in &names {
            write!(out, ",{}", columns[*name][i] as f32)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let times = vec![t0, t0 + chrono::Duration::hours(1)];
        let mut columns = BTreeMap::new();
        columns.insert("precip_rate".to_string(), vec![0.001, 0.0]);
        columns.insert("TMP_2maboveground".to_string(), vec![280.5, 281.0]);
        columns.insert("APCP_surface".to_string(), vec![3.6, 0.0]);

        let path = write_catchment_csv(dir.path(), "cat-7", &times, &columns).unwrap();
        assert_eq!(path.file_name().unwrap(), "cat-7.csv");
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,APCP_surface,TMP_2maboveground,precip_rate");
        assert_eq!(lines[1], "2010-01-01 00:00:00,3.6,280.5,0.001");
        assert_eq!(lines[2], "2010-01-01 01:00:00,0,281,0");
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let mut columns = BTreeMap::new();
        columns.insert("precip_rate".to_string(), vec![0.0, 1.0]);
        assert!(write_catchment_csv(dir.path(), "cat-1", &[t0], &columns).is_err());
    }
}
