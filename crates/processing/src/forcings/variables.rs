//! Forcing variable naming

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ngprep_core::{Error, Result};

/// NWM retrospective variable names and the ngen names they are written as
pub const NWM_VARIABLES: [(&str, &str); 8] = [
    ("LWDOWN", "DLWRF_surface"),
    ("PSFC", "PRES_surface"),
    ("Q2D", "SPFH_2maboveground"),
    ("RAINRATE", "precip_rate"),
    ("SWDOWN", "DSWRF_surface"),
    ("T2D", "TMP_2maboveground"),
    ("U2D", "UGRD_10maboveground"),
    ("V2D", "VGRD_10maboveground"),
];

/// AORC variables, already named the way ngen expects
pub const AORC_VARIABLES: [&str; 8] = [
    "APCP_surface",
    "DLWRF_surface",
    "DSWRF_surface",
    "PRES_surface",
    "SPFH_2maboveground",
    "TMP_2maboveground",
    "UGRD_10maboveground",
    "VGRD_10maboveground",
];

/// Column order of the per-catchment forcing files
pub const OUTPUT_VARIABLES: [&str; 9] = [
    "APCP_surface",
    "DLWRF_surface",
    "DSWRF_surface",
    "PRES_surface",
    "SPFH_2maboveground",
    "TMP_2maboveground",
    "UGRD_10maboveground",
    "VGRD_10maboveground",
    "precip_rate",
];

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Gridded forcing dataset family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForcingSourceKind {
    /// NWM v3 retrospective forcings (precip_rate in mm s⁻¹)
    #[default]
    Nwm,
    /// AORC 1 km forcings (APCP_surface in mm h⁻¹)
    Aorc,
}

impl ForcingSourceKind {
    /// `(input name, output name)` of every variable read from the grid
    pub fn variables(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            Self::Nwm => NWM_VARIABLES.to_vec(),
            Self::Aorc => AORC_VARIABLES.iter().map(|v| (*v, *v)).collect(),
        }
    }

    /// Add the precipitation column the source does not provide: NWM
    /// precip_rate is mm/s and APCP_surface mm/h, AORC the other way round.
    pub fn derive_precipitation(&self, columns: &mut BTreeMap<String, Vec<f64>>) {
        let (from, to, factor) = match self {
            Self::Nwm => ("precip_rate", "APCP_surface", SECONDS_PER_HOUR),
            Self::Aorc => ("APCP_surface", "precip_rate", 1.0 / SECONDS_PER_HOUR),
        };
        if columns.contains_key(to) {
            return;
        }
        if let Some(values) = columns.get(from) {
            let derived = values.iter().map(|v| v * factor).collect();
            columns.insert(to.to_string(), derived);
        }
    }
}

impl FromStr for ForcingSourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nwm" => Ok(Self::Nwm),
            "aorc" => Ok(Self::Aorc),
            other => Err(Error::InvalidParameter {
                name: "source",
                value: other.to_string(),
                reason: "expected nwm or aorc".into(),
            }),
        }
    }
}

impl fmt::Display for ForcingSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nwm => write!(f, "nwm"),
            Self::Aorc => write!(f, "aorc"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nwm_apcp_from_precip_rate() {
        let mut columns = BTreeMap::new();
        columns.insert("precip_rate".to_string(), vec![0.001, 0.0]);
        ForcingSourceKind::Nwm.derive_precipitation(&mut columns);
        assert_relative_eq!(columns["APCP_surface"][0], 3.6, epsilon = 1e-12);
        assert_eq!(columns["APCP_surface"][1], 0.0);
    }

    #[test]
    fn test_aorc_precip_rate_from_apcp() {
        let mut columns = BTreeMap::new();
        columns.insert("APCP_surface".to_string(), vec![7.2]);
        ForcingSourceKind::Aorc.derive_precipitation(&mut columns);
        assert_relative_eq!(columns["precip_rate"][0], 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_source_column_adds_nothing() {
        let mut columns = BTreeMap::new();
        columns.insert("T2D".to_string(), vec![280.0]);
        ForcingSourceKind::Nwm.derive_precipitation(&mut columns);
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("NWM".parse::<ForcingSourceKind>().unwrap(), ForcingSourceKind::Nwm);
        assert_eq!("aorc".parse::<ForcingSourceKind>().unwrap(), ForcingSourceKind::Aorc);
        assert!("era5".parse::<ForcingSourceKind>().is_err());
        assert_eq!(ForcingSourceKind::Aorc.to_string(), "aorc");
    }

    #[test]
    fn test_nwm_renames() {
        let vars = ForcingSourceKind::Nwm.variables();
        assert!(vars.contains(&("RAINRATE", "precip_rate")));
        assert_eq!(vars.len(), 8);
    }
}
