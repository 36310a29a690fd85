//! Hydrofabric feature identifiers
//!
//! Every hydrofabric feature is named `<prefix>-<number>`. Catchments and
//! waterbodies share the same number (`cat-12` drains into `wb-12`), which
//! is what lets the CLI accept either and convert between them.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Kind of hydrofabric feature, determined by the id prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    /// `cat-`: catchment (divide polygon)
    Catchment,
    /// `wb-`: waterbody (flowpath)
    Waterbody,
    /// `nex-`: nexus between waterbodies
    Nexus,
    /// `tnx-`: terminal nexus
    TerminalNexus,
    /// `cnx-`: coastal nexus
    CoastalNexus,
    /// `gage-`: USGS gage
    Gage,
}

impl FeatureKind {
    /// Id prefix without the trailing dash
    pub fn prefix(&self) -> &'static str {
        match self {
            FeatureKind::Catchment => "cat",
            FeatureKind::Waterbody => "wb",
            FeatureKind::Nexus => "nex",
            FeatureKind::TerminalNexus => "tnx",
            FeatureKind::CoastalNexus => "cnx",
            FeatureKind::Gage => "gage",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "cat" => Some(FeatureKind::Catchment),
            "wb" => Some(FeatureKind::Waterbody),
            "nex" => Some(FeatureKind::Nexus),
            "tnx" => Some(FeatureKind::TerminalNexus),
            "cnx" => Some(FeatureKind::CoastalNexus),
            "gage" => Some(FeatureKind::Gage),
            _ => None,
        }
    }
}

/// A parsed feature identifier such as `cat-1643991`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId {
    kind: FeatureKind,
    number: String,
}

impl FeatureId {
    /// Build an id from a kind and a numeric stem
    pub fn new(kind: FeatureKind, number: impl Into<String>) -> Result<Self> {
        let number = number.into();
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidFeatureId(format!("{}-{}", kind.prefix(), number)));
        }
        Ok(Self { kind, number })
    }

    /// Parse an id. Accepts `_` as separator and bare digits (catchment).
    pub fn parse(s: &str) -> Result<Self> {
        let normalized = s.trim().replace('_', "-");
        match normalized.split_once('-') {
            Some((prefix, _)) => {
                let kind = FeatureKind::from_prefix(prefix)
                    .ok_or_else(|| Error::InvalidFeatureId(s.to_string()))?;
                let number = normalized.rsplit('-').next().unwrap_or_default();
                Self::new(kind, number)
                    .map_err(|_| Error::InvalidFeatureId(s.to_string()))
            }
            None => Self::new(FeatureKind::Catchment, normalized)
                .map_err(|_| Error::InvalidFeatureId(s.to_string())),
        }
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    /// Numeric part of the id (leading zeros preserved)
    pub fn number(&self) -> &str {
        &self.number
    }

    /// The catchment sharing this id's number
    pub fn to_catchment(&self) -> FeatureId {
        FeatureId {
            kind: FeatureKind::Catchment,
            number: self.number.clone(),
        }
    }

    /// The waterbody sharing this id's number
    pub fn to_waterbody(&self) -> FeatureId {
        FeatureId {
            kind: FeatureKind::Waterbody,
            number: self.number.clone(),
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.prefix(), self.number)
    }
}

impl FromStr for FeatureId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FeatureId::parse(s)
    }
}

/// Keep only the ASCII digits of an id (`wb-0012` -> `0012`)
pub fn numeric_stem(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Swap a `wb-` id for its `cat-` twin; other ids are returned unchanged
pub fn waterbody_to_catchment(id: &str) -> String {
    match id.strip_prefix("wb-") {
        Some(number) => format!("cat-{}", number),
        None => id.to_string(),
    }
}

/// Parse a `lat,lon` pair
pub fn parse_lat_lon(s: &str) -> Result<(f64, f64)> {
    let Some((lat, lon)) = s.split_once(',') else {
        return Err(Error::InvalidParameter {
            name: "latlon",
            value: s.to_string(),
            reason: "Lat Lon input must be comma separated e.g. -l 54.33,-69.4".into(),
        });
    };
    let parse = |v: &str| {
        v.trim().parse::<f64>().map_err(|e| Error::InvalidParameter {
            name: "latlon",
            value: s.to_string(),
            reason: e.to_string(),
        })
    };
    let (lat, lon) = (parse(lat)?, parse(lon)?);
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(Error::InvalidParameter {
            name: "latlon",
            value: s.to_string(),
            reason: "coordinates out of range".into(),
        });
    }
    Ok((lat, lon))
}

/// How a CLI input feature should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Catchment,
    LatLon,
    Gage,
}

/// Result of interpreting a raw `-i` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub mode: InputMode,
    /// `cat-<n>` for catchments, the raw value for lat/lon and gages
    pub value: String,
    /// Set when a `wb-` id was rewritten to `cat-`
    pub converted_from_waterbody: bool,
}

/// Interpret a raw input feature.
///
/// A `gage-` prefix switches to gage mode; a `wb-` prefix is rewritten to
/// `cat-`. Anything that is neither a lat/lon nor a gage is re-prefixed with
/// `cat-`.
pub fn resolve_input(raw: &str, latlon: bool, gage: bool) -> Result<ResolvedInput> {
    let input = raw.trim().replace('_', "-");
    let mut gage = gage;
    let mut converted_from_waterbody = false;

    if input.split('-').count() > 1 {
        let prefix = input.split('-').next().unwrap_or_default().to_ascii_lowercase();
        if prefix == "gage" {
            gage = true;
        } else if prefix == "wb" {
            converted_from_waterbody = true;
        }
    }

    if latlon && gage {
        return Err(Error::InvalidParameter {
            name: "input_feature",
            value: raw.to_string(),
            reason: "Cannot use both --latlon and --gage options at the same time.".into(),
        });
    }

    let (mode, value) = if latlon {
        (InputMode::LatLon, input)
    } else if gage {
        (InputMode::Gage, input)
    } else {
        let number = input.rsplit('-').next().unwrap_or_default();
        let id = FeatureId::new(FeatureKind::Catchment, number)
            .map_err(|_| Error::InvalidFeatureId(raw.to_string()))?;
        (InputMode::Catchment, id.to_string())
    };

    Ok(ResolvedInput {
        mode,
        value,
        converted_from_waterbody,
    })
}
