//! Coordinate Reference System handling

pub mod albers;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub use albers::{from_albers, to_albers};

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation (as stored in `gpkg_spatial_ref_sys`)
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string, picking up the EPSG code of the
    /// outermost `AUTHORITY`/`ID` clause when present
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        let wkt = wkt.into();
        let epsg = epsg_from_wkt(&wkt);
        Self {
            wkt: Some(wkt),
            epsg,
        }
    }

    /// Parse `EPSG:<code>` (case-insensitive) or a bare code
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let code = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .unwrap_or(trimmed);
        code.parse::<u32>()
            .map(Self::from_epsg)
            .map_err(|_| Error::UnsupportedCrs(s.to_string()))
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// NAD83 / CONUS Albers (EPSG:5070), the hydrofabric CRS
    pub fn conus_albers() -> Self {
        Self::from_epsg(albers::EPSG)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    pub fn is_geographic(&self) -> bool {
        self.epsg == Some(4326)
    }

    pub fn is_conus_albers(&self) -> bool {
        self.epsg == Some(albers::EPSG)
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// Convert a point in this CRS to (longitude, latitude)
    pub fn to_lon_lat(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match self.epsg {
            Some(4326) => Ok((x, y)),
            Some(albers::EPSG) => Ok(from_albers(x, y)),
            _ => Err(Error::UnsupportedCrs(self.identifier())),
        }
    }

    /// Convert (longitude, latitude) into this CRS
    pub fn from_lon_lat(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        match self.epsg {
            Some(4326) => Ok((lon, lat)),
            Some(albers::EPSG) => Ok(to_albers(lon, lat)),
            _ => Err(Error::UnsupportedCrs(self.identifier())),
        }
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", wkt.chars().take(50).collect::<String>());
        }
        "Unknown".to_string()
    }
}

/// The EPSG code of the last top-level authority clause in a WKT string.
///
/// WKT1 nests `AUTHORITY["EPSG","4269"]` for the datum inside the
/// projected CRS, whose own authority comes last.
fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    let mut found = None;
    for marker in ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","] {
        let mut rest = wkt;
        while let Some(pos) = rest.find(marker) {
            rest = &rest[pos + marker.len()..];
            let digits: String = rest
                .trim_start_matches('"')
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(code) = digits.parse() {
                found = Some(code);
            }
        }
    }
    found
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::conus_albers()
    }
}
