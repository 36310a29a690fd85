//! Writing a subset GeoPackage
//!
//! The source is ATTACHed to a fresh database and every layer is copied
//! with `INSERT .. SELECT`, filtered by membership in a temporary id table.
//! Schema, spatial index rows, indices and triggers come from the source so
//! the subset stays a valid GeoPackage.

use std::collections::BTreeSet;
use std::path::Path;

use ngprep_core::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::table_exists;

/// Layers copied into a subset, in dependency order
pub const SUBSET_TABLES: [&str; 10] = [
    "divides",
    "divide-attributes",
    "flowpath-attributes",
    "flowpath-attributes-ml",
    "flowpaths",
    "hydrolocations",
    "network",
    "nexus",
    "pois",
    "lakes",
];

/// GeoPackage bookkeeping tables carried over from the source
const META_TABLES: [&str; 5] = [
    "gpkg_spatial_ref_sys",
    "gpkg_contents",
    "gpkg_geometry_columns",
    "gpkg_extensions",
    "gpkg_ogr_contents",
];

/// `GPKG` in ASCII
const APPLICATION_ID: i32 = 0x4750_4B47;
const USER_VERSION: i32 = 10200;

/// Rows written per layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsetSummary {
    pub tables: Vec<(String, usize)>,
}

impl SubsetSummary {
    pub fn rows(&self, table: &str) -> usize {
        self.tables
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Write every feature of `source` whose key is in `ids` to a new
/// GeoPackage at `dest`, replacing any existing file.
pub fn write_subset(source: &Path, dest: &Path, ids: &BTreeSet<String>) -> Result<SubsetSummary> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if dest.exists() {
        std::fs::remove_file(dest)?;
    }

    let mut conn = Connection::open(dest)?;
    let source_path = source.to_string_lossy().to_string();
    conn.execute("ATTACH DATABASE ?1 AS src", [&source_path])?;

    let summary = {
        let tx = conn.transaction()?;
        let summary = copy_layers(&tx, ids)?;
        tx.commit()?;
        summary
    };

    conn.execute_batch("DETACH DATABASE src")?;
    conn.pragma_update(None, "application_id", APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", USER_VERSION)?;

    info!("Wrote subset geopackage {}", dest.display());
    Ok(summary)
}

fn copy_layers(conn: &Connection, ids: &BTreeSet<String>) -> Result<SubsetSummary> {
    conn.execute_batch("CREATE TEMP TABLE subset_ids (id TEXT PRIMARY KEY)")?;
    {
        let mut insert = conn.prepare("INSERT OR IGNORE INTO temp.subset_ids (id) VALUES (?1)")?;
        for id in ids {
            insert.execute([id])?;
        }
    }

    for table in META_TABLES {
        if source_table_exists(conn, table)? {
            create_like_source(conn, table)?;
        }
    }
    if source_table_exists(conn, "gpkg_spatial_ref_sys")? {
        conn.execute_batch("INSERT INTO main.gpkg_spatial_ref_sys SELECT * FROM src.gpkg_spatial_ref_sys")?;
    }

    let mut summary = SubsetSummary::default();
    let mut triggers = Vec::new();

    for table in SUBSET_TABLES {
        if !source_table_exists(conn, table)? {
            debug!("Source has no {} table, skipping", table);
            continue;
        }
        info!("Subsetting {}", table);
        create_like_source(conn, table)?;

        let filter = row_filter(conn, table)?;
        let copied = conn.execute(
            &format!(
                "INSERT INTO main.\"{t}\" SELECT * FROM src.\"{t}\" WHERE {filter}",
                t = table,
                filter = filter
            ),
            [],
        )?;
        summary.tables.push((table.to_string(), copied));

        copy_metadata_rows(conn, table)?;
        copy_rtree(conn, table)?;

        for sql in schema_sql(conn, "index", table)? {
            conn.execute_batch(&sql)?;
        }
        triggers.extend(schema_sql(conn, "trigger", table)?);
    }

    // Triggers go last so the bulk copy above does not fire them.
    for sql in triggers {
        if let Err(e) = conn.execute_batch(&sql) {
            warn!("Skipping trigger that does not apply to the subset: {}", e);
        }
    }

    update_contents(conn, &summary)?;
    Ok(summary)
}

/// SQL condition selecting the rows of `table` that belong to the subset
fn row_filter(conn: &Connection, table: &str) -> Result<String> {
    let columns = source_columns(conn, table)?;
    let has = |c: &str| columns.iter().any(|col| col == c);

    let filter = match table {
        "nexus" => "id IN (SELECT toid FROM main.divides)".to_string(),
        "lakes" if has("poi_id") && table_exists(conn, "pois")? => {
            "poi_id IN (SELECT poi_id FROM main.pois)".to_string()
        }
        _ if has("id") => "id IN (SELECT id FROM temp.subset_ids)".to_string(),
        _ if has("divide_id") => "divide_id IN (SELECT id FROM temp.subset_ids)".to_string(),
        _ => {
            return Err(Error::Other(format!(
                "table {} has neither an id nor a divide_id column",
                table
            )))
        }
    };
    Ok(filter)
}

fn source_table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM src.sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn source_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA src.table_info(\"{}\")", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// `CREATE` statements of the source for objects of `kind` on `table`
fn schema_sql(conn: &Connection, kind: &str, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT sql FROM src.sqlite_master WHERE type = ?1 AND tbl_name = ?2 AND sql IS NOT NULL",
    )?;
    let sql = stmt
        .query_map(params![kind, table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(sql)
}

fn create_like_source(conn: &Connection, table: &str) -> Result<()> {
    let sql: String = conn.query_row(
        "SELECT sql FROM src.sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    if !table_exists(conn, table)? {
        conn.execute_batch(&sql)?;
    }
    Ok(())
}

fn copy_metadata_rows(conn: &Connection, table: &str) -> Result<()> {
    for meta in ["gpkg_contents", "gpkg_geometry_columns", "gpkg_extensions"] {
        if table_exists(conn, meta)? {
            conn.execute(
                &format!(
                    "INSERT INTO main.{m} SELECT * FROM src.{m} WHERE table_name = ?1",
                    m = meta
                ),
                [table],
            )?;
        }
    }
    Ok(())
}

fn geometry_column(conn: &Connection, table: &str) -> Result<Option<String>> {
    if !source_table_exists(conn, "gpkg_geometry_columns")? {
        return Ok(None);
    }
    let column = conn
        .query_row(
            "SELECT column_name FROM src.gpkg_geometry_columns WHERE table_name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(column)
}

/// Copy the spatial index rows of the features just copied
fn copy_rtree(conn: &Connection, table: &str) -> Result<()> {
    let Some(column) = geometry_column(conn, table)? else {
        return Ok(());
    };
    let rtree = format!("rtree_{}_{}", table, column);
    if !source_table_exists(conn, &rtree)? {
        return Ok(());
    }
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE main.\"{r}\" USING rtree(id, minx, maxx, miny, maxy);
         INSERT INTO main.\"{r}\" SELECT * FROM src.\"{r}\" WHERE id IN (SELECT rowid FROM main.\"{t}\");",
        r = rtree,
        t = table
    ))?;
    Ok(())
}

/// Refresh extents in `gpkg_contents` and feature counts in
/// `gpkg_ogr_contents`
fn update_contents(conn: &Connection, summary: &SubsetSummary) -> Result<()> {
    let has_contents = table_exists(conn, "gpkg_contents")?;
    let has_ogr = table_exists(conn, "gpkg_ogr_contents")?;

    for (table, count) in &summary.tables {
        if has_contents {
            if let Some(column) = geometry_column(conn, table)? {
                let rtree = format!("rtree_{}_{}", table, column);
                if table_exists(conn, &rtree)? {
                    conn.execute(
                        &format!(
                            "UPDATE gpkg_contents SET \
                             min_x = (SELECT MIN(minx) FROM \"{r}\"), \
                             min_y = (SELECT MIN(miny) FROM \"{r}\"), \
                             max_x = (SELECT MAX(maxx) FROM \"{r}\"), \
                             max_y = (SELECT MAX(maxy) FROM \"{r}\"), \
                             last_change = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
                             WHERE table_name = ?1",
                            r = rtree
                        ),
                        [table],
                    )?;
                }
            }
        }
        if has_ogr {
            conn.execute(
                "INSERT OR REPLACE INTO gpkg_ogr_contents (table_name, feature_count) VALUES (?1, ?2)",
                params![table, *count as i64],
            )?;
        }
    }
    Ok(())
}
