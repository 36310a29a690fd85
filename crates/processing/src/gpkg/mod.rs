//! Hydrofabric GeoPackage access
//!
//! The hydrofabric is a GeoPackage (SQLite) with one table per layer. Layer
//! geometry is stored in EPSG:5070 as GeoPackage blobs, see [`blob`].

pub mod blob;
mod writer;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use geo::Contains;
use geo_types::{Geometry, MultiPolygon, Point};
use ngprep_core::ids::numeric_stem;
use ngprep_core::{Error, Result, CRS};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

pub use blob::{blob_envelope_centre, blob_to_geometry, geometry_to_blob};
pub use writer::{write_subset, SubsetSummary, SUBSET_TABLES};

/// One row of the `network` table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkEdge {
    pub id: String,
    pub toid: Option<String>,
    pub divide_id: Option<String>,
}

/// Model parameters of one divide, from `divide-attributes`
#[derive(Debug, Clone, PartialEq)]
pub struct DivideAttributes {
    pub divide_id: String,
    pub bexp: Option<f64>,
    pub dksat: Option<f64>,
    pub psisat: Option<f64>,
    pub slope: Option<f64>,
    pub smcmax: Option<f64>,
    pub smcwlt: Option<f64>,
    /// Groundwater reservoir depth in mm
    pub gw_zmax: Option<f64>,
    pub gw_coeff: Option<f64>,
    pub gw_expon: Option<f64>,
    pub refkdt: Option<f64>,
    pub aspect: Option<f64>,
    pub isltyp: Option<f64>,
    pub ivgtyp: Option<f64>,
    /// Centroid in the divides CRS
    pub centroid: (f64, f64),
}

/// `divide-attributes` columns read into [`DivideAttributes`], in field order
const ATTRIBUTE_COLUMNS: [&str; 15] = [
    "divide_id",
    "mode.bexp_soil_layers_stag=1",
    "geom_mean.dksat_soil_layers_stag=1",
    "geom_mean.psisat_soil_layers_stag=1",
    "mean.slope_1km",
    "mean.smcmax_soil_layers_stag=1",
    "mean.smcwlt_soil_layers_stag=1",
    "mean.Zmax",
    "mean.Coeff",
    "mode.Expon",
    "mean.refkdt",
    "circ_mean.aspect",
    "mode.ISLTYP",
    "mode.IVGTYP",
    "centroid_x",
];

const INDICES: [(&str, &str, &str); 7] = [
    ("diid", "divides", "id"),
    ("flaid", "flowpath-attributes", "id"),
    ("flid", "flowpaths", "id"),
    ("hyid", "hydrolocations", "id"),
    ("gageid", "hydrolocations", "hl_uri"),
    ("neid", "nexus", "id"),
    ("nid", "network", "id"),
];

/// Read-only handle on a hydrofabric GeoPackage
pub struct Hydrofabric {
    path: PathBuf,
    conn: Connection,
}

impl Hydrofabric {
    /// Open an existing GeoPackage read-only
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::FeatureNotFound(format!(
                "hydrofabric {} does not exist",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the id indices lookups rely on, when missing
    pub fn verify_indices(path: &Path) -> Result<usize> {
        let conn = Connection::open(path)?;
        let existing: BTreeSet<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index'")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut created = 0;
        for (name, table, column) in INDICES {
            if existing.contains(name) || !table_exists(&conn, table)? {
                continue;
            }
            info!("Creating index {} on {}({})", name, table, column);
            conn.execute_batch(&format!(
                "CREATE INDEX \"{}\" ON \"{}\" (\"{}\" ASC);",
                name, table, column
            ))?;
            created += 1;
        }
        Ok(created)
    }

    pub fn has_table(&self, table: &str) -> Result<bool> {
        table_exists(&self.conn, table)
    }

    /// Unique `(id, toid, divide_id)` rows of the network table
    pub fn network_edges(&self) -> Result<Vec<NetworkEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT id, toid, divide_id FROM network WHERE id IS NOT NULL",
        )?;
        let edges = stmt
            .query_map([], |row| {
                Ok(NetworkEdge {
                    id: row.get(0)?,
                    toid: row.get(1)?,
                    divide_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("Read {} network edges from {}", edges.len(), self.path.display());
        Ok(edges)
    }

    /// Network ids belonging to one vector processing unit
    pub fn vpu_ids(&self, vpu: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT id FROM network WHERE vpuid = ?1 AND id IS NOT NULL")?;
        let ids = stmt
            .query_map([vpu], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        if ids.is_empty() {
            return Err(Error::FeatureNotFound(format!("no features in VPU {}", vpu)));
        }
        Ok(ids)
    }

    /// Catchments draining into the nexus of a USGS gage
    pub fn cat_from_gage(&self, gage: &str) -> Result<Vec<String>> {
        let digits = numeric_stem(gage);
        info!("Getting catid for gage {}, in {}", digits, self.path.display());
        let nexus: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM hydrolocations WHERE hl_uri = ?1",
                [format!("Gages-{}", digits)],
                |row| row.get(0),
            )
            .optional()?;
        let nexus =
            nexus.ok_or_else(|| Error::FeatureNotFound(format!("No nexus found for gage ID {}", digits)))?;

        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT divide_id FROM network WHERE toid = ?1 AND divide_id IS NOT NULL")?;
        let cats = stmt
            .query_map([&nexus], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        if cats.is_empty() {
            return Err(Error::FeatureNotFound(format!(
                "No catchments drain to {} (gage {})",
                nexus, digits
            )));
        }
        Ok(cats)
    }

    /// Catchment whose divide contains a geographic point
    pub fn cat_from_point(&self, lat: f64, lon: f64) -> Result<String> {
        info!("Getting catid for {}, {}", lat, lon);
        let crs = self.table_crs("divides")?;
        let (x, y) = crs.from_lon_lat(lon, lat)?;
        let point = Point::new(x, y);

        let candidates: Vec<(String, Vec<u8>)> = if self.has_table("rtree_divides_geom")? {
            let mut stmt = self.conn.prepare(
                "SELECT d.divide_id, d.geom FROM rtree_divides_geom r \
                 JOIN divides d ON d.rowid = r.id \
                 WHERE r.minx <= ?1 AND r.maxx >= ?1 AND r.miny <= ?2 AND r.maxy >= ?2",
            )?;
            let rows = stmt
                .query_map(params![x, y], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        } else {
            let mut stmt = self.conn.prepare("SELECT divide_id, geom FROM divides")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        for (divide_id, geom) in candidates {
            if let Some(shape) = blob_to_geometry(&geom)? {
                if shape.contains(&point) {
                    return Ok(divide_id);
                }
            }
        }
        Err(Error::FeatureNotFound(format!(
            "No watershed boundary found for {}, {}",
            lat, lon
        )))
    }

    /// Unique `(divide_id, toid)` pairs: catchment to its outlet nexus
    pub fn cat_to_nex_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT divide_id, toid FROM divides \
             WHERE divide_id IS NOT NULL AND toid IS NOT NULL",
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Divide polygons, all of them or only `ids`
    pub fn divide_polygons(&self, ids: Option<&[String]>) -> Result<Vec<(String, MultiPolygon<f64>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT divide_id, geom FROM divides WHERE divide_id IS NOT NULL")?;
        let wanted: Option<BTreeSet<&str>> = ids.map(|ids| ids.iter().map(String::as_str).collect());

        let mut out = Vec::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<Vec<u8>>>(1)?))
        })?;
        for row in rows {
            let (divide_id, geom) = row?;
            if wanted.as_ref().is_some_and(|w| !w.contains(divide_id.as_str())) {
                continue;
            }
            let Some(geom) = geom else { continue };
            let shape = match blob_to_geometry(&geom)? {
                Some(Geometry::Polygon(p)) => MultiPolygon::new(vec![p]),
                Some(Geometry::MultiPolygon(mp)) => mp,
                Some(_) => {
                    return Err(Error::Geometry(format!("{} is not a polygon", divide_id)))
                }
                None => continue,
            };
            out.push((divide_id, shape));
        }
        Ok(out)
    }

    /// Model parameters of every divide
    pub fn divide_attributes(&self) -> Result<Vec<DivideAttributes>> {
        let columns = ATTRIBUTE_COLUMNS
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {}, \"centroid_y\" FROM \"divide-attributes\" WHERE divide_id IS NOT NULL",
            columns
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DivideAttributes {
                    divide_id: row.get(0)?,
                    bexp: row.get(1)?,
                    dksat: row.get(2)?,
                    psisat: row.get(3)?,
                    slope: row.get(4)?,
                    smcmax: row.get(5)?,
                    smcwlt: row.get(6)?,
                    gw_zmax: row.get(7)?,
                    gw_coeff: row.get(8)?,
                    gw_expon: row.get(9)?,
                    refkdt: row.get(10)?,
                    aspect: row.get(11)?,
                    isltyp: row.get(12)?,
                    ivgtyp: row.get(13)?,
                    centroid: (row.get(14)?, row.get(15)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Waterbodies whose flowpath attributes name a gage
    pub fn waterbodies_for_gage(&self, gage: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM \"flowpath-attributes\" WHERE gage = ?1")?;
        let ids = stmt
            .query_map([gage], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// CRS of a feature table, from `gpkg_spatial_ref_sys`
    pub fn table_crs(&self, table: &str) -> Result<CRS> {
        let row: Option<(i64, Option<String>, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT g.srs_id, g.definition, g.organization_coordsys_id \
                 FROM gpkg_geometry_columns AS c \
                 JOIN gpkg_spatial_ref_sys AS g ON c.srs_id = g.srs_id \
                 WHERE c.table_name = ?1",
                [table],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (srs_id, definition, org_id) =
            row.ok_or_else(|| Error::UnsupportedCrs(format!("no CRS registered for {}", table)))?;

        let mut crs = match definition {
            Some(wkt) if !wkt.is_empty() && wkt != "undefined" => CRS::from_wkt(wkt),
            _ => CRS::from_epsg(org_id.unwrap_or(srs_id) as u32),
        };
        if crs.epsg().is_none() {
            crs = CRS::from_epsg(org_id.unwrap_or(srs_id) as u32);
        }
        Ok(crs)
    }
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
