//! End-to-end run over a small synthetic hydrofabric:
//!
//! ```text
//! wb-1 ─┐
//!       nex-10 ── wb-3 ── nex-30 ── wb-4 ── tnx-40
//! wb-2 ─┘         (gage 01646500 at nex-30)
//! ```
//!
//! Each divide is a 1 km square in CONUS Albers lying exactly on one cell
//! of a 2x2 forcing grid.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use geo_types::{polygon, Geometry};
use ngprep_core::io::write_geotiff;
use ngprep_core::{FilePaths, GeoTransform, Raster, CRS};
use ngprep_processing::forcings::{create_forcings, file_name, ForcingSourceKind, GeoTiffSource, NWM_VARIABLES};
use ngprep_processing::gpkg::{geometry_to_blob, Hydrofabric};
use ngprep_processing::network::NetworkGraph;
use ngprep_processing::prelude::*;
use ngprep_processing::realization::read_num_partitions;
use rusqlite::{params, Connection};

const X0: f64 = 1_000_000.0;
const Y0: f64 = 2_000_000.0;
const SIZE: f64 = 1000.0;

/// `(wb, cat, toid, col, row)` of every divide, grid rows counted from the top
const DIVIDES: [(&str, &str, &str, usize, usize); 4] = [
    ("wb-1", "cat-1", "nex-10", 0, 1),
    ("wb-2", "cat-2", "nex-10", 1, 1),
    ("wb-3", "cat-3", "nex-30", 0, 0),
    ("wb-4", "cat-4", "tnx-40", 1, 0),
];

fn cell_square(col: usize, row: usize) -> (f64, f64, f64, f64) {
    let minx = X0 + col as f64 * SIZE;
    let maxy = Y0 + 2.0 * SIZE - row as f64 * SIZE;
    (minx, maxy - SIZE, minx + SIZE, maxy)
}

fn build_hydrofabric(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gpkg_spatial_ref_sys (
             srs_name TEXT NOT NULL, srs_id INTEGER PRIMARY KEY,
             organization TEXT NOT NULL, organization_coordsys_id INTEGER NOT NULL,
             definition TEXT NOT NULL, description TEXT);
         INSERT INTO gpkg_spatial_ref_sys VALUES
             ('NAD83 / Conus Albers', 5070, 'EPSG', 5070, 'undefined', NULL);
         CREATE TABLE gpkg_contents (
             table_name TEXT NOT NULL PRIMARY KEY, data_type TEXT NOT NULL, identifier TEXT,
             description TEXT DEFAULT '', last_change DATETIME,
             min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE, srs_id INTEGER);
         INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id)
             VALUES ('divides', 'features', 'divides', 5070);
         CREATE TABLE gpkg_geometry_columns (
             table_name TEXT NOT NULL, column_name TEXT NOT NULL,
             geometry_type_name TEXT NOT NULL, srs_id INTEGER NOT NULL,
             z TINYINT NOT NULL, m TINYINT NOT NULL);
         INSERT INTO gpkg_geometry_columns VALUES ('divides', 'geom', 'POLYGON', 5070, 0, 0);
         CREATE TABLE divides (
             fid INTEGER PRIMARY KEY AUTOINCREMENT, geom BLOB, divide_id TEXT, toid TEXT,
             type TEXT, areasqkm REAL, id TEXT, vpuid TEXT);
         CREATE VIRTUAL TABLE rtree_divides_geom USING rtree(id, minx, maxx, miny, maxy);
         CREATE TABLE network (
             fid INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT, toid TEXT, divide_id TEXT, vpuid TEXT);
         CREATE TABLE nexus (fid INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT, toid TEXT, type TEXT);
         CREATE TABLE hydrolocations (fid INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT, hl_uri TEXT);
         CREATE TABLE \"flowpath-attributes\" (fid INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT, gage TEXT);
         CREATE TABLE \"divide-attributes\" (
             fid INTEGER PRIMARY KEY AUTOINCREMENT, divide_id TEXT,
             \"mode.bexp_soil_layers_stag=1\" REAL, \"geom_mean.dksat_soil_layers_stag=1\" REAL,
             \"geom_mean.psisat_soil_layers_stag=1\" REAL, \"mean.slope_1km\" REAL,
             \"mean.smcmax_soil_layers_stag=1\" REAL, \"mean.smcwlt_soil_layers_stag=1\" REAL,
             \"mean.Zmax\" REAL, \"mean.Coeff\" REAL, \"mode.Expon\" REAL, \"mean.refkdt\" REAL,
             \"circ_mean.aspect\" REAL, \"mode.ISLTYP\" REAL, \"mode.IVGTYP\" REAL,
             centroid_x REAL, centroid_y REAL);",
    )
    .unwrap();

    for (fid, (wb, cat, toid, col, row)) in DIVIDES.iter().enumerate() {
        let fid = fid as i64 + 1;
        let (minx, miny, maxx, maxy) = cell_square(*col, *row);
        let square = polygon![
            (x: minx, y: miny), (x: maxx, y: miny), (x: maxx, y: maxy), (x: minx, y: maxy), (x: minx, y: miny)
        ];
        let blob = geometry_to_blob(&Geometry::Polygon(square), 5070).unwrap();
        conn.execute(
            "INSERT INTO divides (fid, geom, divide_id, toid, type, areasqkm, id, vpuid)
             VALUES (?1, ?2, ?3, ?4, 'network', 1.0, ?5, '02')",
            params![fid, blob, cat, toid, wb],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO rtree_divides_geom VALUES (?1, ?2, ?3, ?4, ?5)",
            params![fid, minx, maxx, miny, maxy],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO network (id, toid, divide_id, vpuid) VALUES (?1, ?2, ?3, '02')",
            params![wb, toid, cat],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO \"divide-attributes\" VALUES
             (NULL, ?1, 5.5, 0.000002, 0.3, 0.01, 0.45, 0.07, 25.0, 0.005, 6.0, 3.0, 180.0, 3.0, 10.0, ?2, ?3)",
            params![cat, (minx + maxx) / 2.0, (miny + maxy) / 2.0],
        )
        .unwrap();
    }

    conn.execute_batch(
        "INSERT INTO network (id, toid, divide_id, vpuid) VALUES
             ('nex-10', 'wb-3', NULL, '02'), ('nex-30', 'wb-4', NULL, '02'), ('tnx-40', NULL, NULL, '02');
         INSERT INTO nexus (id, toid, type) VALUES
             ('nex-10', 'wb-3', 'nexus'), ('nex-30', 'wb-4', 'nexus'), ('tnx-40', NULL, 'terminal');
         INSERT INTO hydrolocations (id, hl_uri) VALUES ('nex-30', 'Gages-01646500');
         INSERT INTO \"flowpath-attributes\" (id, gage) VALUES
             ('wb-1', NULL), ('wb-2', NULL), ('wb-3', '01646500'), ('wb-4', NULL);",
    )
    .unwrap();
}

fn hour(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap().and_hms_opt(h, 0, 0).unwrap()
}

/// Three hourly steps of every NWM variable. Cell values are
/// `base + 10 * step + cell`; RAINRATE is 0.5 everywhere and T2D is missing
/// over cat-3 at the second step.
fn write_forcing_grids(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let transform = GeoTransform::new(X0, Y0 + 2.0 * SIZE, SIZE, -SIZE);
    for (i, (name, _)) in NWM_VARIABLES.iter().enumerate() {
        for step in 0..3u32 {
            let base = 100.0 * i as f32 + 10.0 * step as f32;
            let mut values: Vec<f32> = (0..4).map(|cell| base + cell as f32).collect();
            if *name == "RAINRATE" {
                values = vec![0.5; 4];
            }
            if *name == "T2D" && step == 1 {
                values[0] = f32::NAN;
            }
            let raster = Raster::from_vec(values, 2, 2)
                .unwrap()
                .with_transform(transform)
                .with_crs(CRS::conus_albers());
            write_geotiff(&raster, dir.join(file_name(name, hour(step)))).unwrap();
        }
    }
}

fn csv_column(path: &PathBuf, column: &str) -> Vec<f64> {
    let text = fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    let idx = header.iter().position(|h| *h == column).unwrap();
    lines
        .map(|line| line.split(',').nth(idx).unwrap().parse().unwrap())
        .collect()
}

#[test]
fn lookups_on_the_source_hydrofabric() {
    let dir = tempfile::tempdir().unwrap();
    let hf_path = dir.path().join("conus_nextgen.gpkg");
    build_hydrofabric(&hf_path);
    assert!(Hydrofabric::verify_indices(&hf_path).unwrap() > 0);
    assert_eq!(Hydrofabric::verify_indices(&hf_path).unwrap(), 0);

    let hf = Hydrofabric::open(&hf_path).unwrap();
    assert_eq!(hf.cat_from_gage("01646500").unwrap(), vec!["cat-3".to_string()]);
    assert!(hf.cat_from_gage("99999999").is_err());

    let (minx, miny, maxx, maxy) = cell_square(1, 1);
    let (lon, lat) = CRS::conus_albers()
        .to_lon_lat((minx + maxx) / 2.0, (miny + maxy) / 2.0)
        .unwrap();
    assert_eq!(hf.cat_from_point(lat, lon).unwrap(), "cat-2");
    assert!(hf.cat_from_point(10.0, -150.0).is_err());

    assert_eq!(hf.vpu_ids("02").unwrap().len(), 7);
    assert!(hf.vpu_ids("17").is_err());
}

#[test]
fn subset_forcings_realization_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let hf_path = dir.path().join("conus_nextgen.gpkg");
    build_hydrofabric(&hf_path);
    let hf = Hydrofabric::open(&hf_path).unwrap();

    let cache = dir.path().join("network.bin");
    let network = NetworkGraph::load_or_build(&hf, &cache).unwrap();
    assert!(cache.exists());
    assert_eq!(network.upstream_cats(&["cat-3"]).len(), 3);

    // subset
    let paths = FilePaths::for_folder("gage-01646500", &dir.path().join("out")).unwrap();
    let summary = subset(&["cat-3"], &hf, &network, &paths, true).unwrap();
    assert_eq!(summary.rows("divides"), 3);
    assert_eq!(summary.rows("network"), 5);
    assert_eq!(summary.rows("nexus"), 2);
    assert_eq!(summary.rows("hydrolocations"), 1);

    let sub = Hydrofabric::open(&paths.geopackage_path()).unwrap();
    let mut divides: Vec<String> = sub.divide_polygons(None).unwrap().into_iter().map(|(id, _)| id).collect();
    divides.sort();
    assert_eq!(divides, vec!["cat-1", "cat-2", "cat-3"]);
    assert!(sub.table_crs("divides").unwrap().is_conus_albers());
    drop(sub);

    // forcings
    let grids = dir.path().join("grids");
    write_forcing_grids(&grids);
    let source = GeoTiffSource::open(&grids, Some(CRS::conus_albers())).unwrap();
    let forcings = create_forcings(&source, ForcingSourceKind::Nwm, &paths, hour(0), hour(2)).unwrap();
    assert_eq!(forcings.catchments, 3);
    assert_eq!(forcings.timesteps, 3);
    assert_eq!(forcings.variables.len(), 9);

    let cat3 = paths.forcings_by_catchment_dir().join("cat-3.csv");
    let cat2 = paths.forcings_by_catchment_dir().join("cat-2.csv");
    assert!(!paths.forcings_by_catchment_dir().join("cat-4.csv").exists());
    // T2D is the sixth NWM variable; cat-3 sits on cell 0, cat-2 on cell 3
    assert_eq!(csv_column(&cat3, "TMP_2maboveground"), vec![500.0, 500.0, 520.0]);
    assert_eq!(csv_column(&cat2, "TMP_2maboveground"), vec![503.0, 513.0, 523.0]);
    assert_eq!(csv_column(&cat2, "precip_rate"), vec![0.5; 3]);
    assert_eq!(csv_column(&cat2, "APCP_surface"), vec![1800.0; 3]);

    // realization
    let start = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let end = NaiveDate::from_ymd_opt(2012, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let realization = create_realization(&paths, start, end).unwrap();
    assert_eq!(realization.catchments, 3);
    assert_eq!(realization.nts, 730 * 24 * 12);
    assert!((1..=2).contains(&realization.partitions));
    assert_eq!(read_num_partitions(&paths).unwrap(), realization.partitions);
    for cat in ["cat-1", "cat-2", "cat-3"] {
        assert!(paths.cat_config_dir().join("CFE").join(format!("{}.ini", cat)).exists());
        assert!(paths.cat_config_dir().join("NOAH-OWP-M").join(format!("{}.input", cat)).exists());
    }
    assert!(paths.troute_path().exists());

    // calibration
    create_calibration_config(&paths, "gage-01646500").unwrap();
    let crosswalk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(paths.calibration_dir().join("crosswalk.json")).unwrap()).unwrap();
    assert_eq!(crosswalk["cat-3"]["Gage_no"], "01646500");
    let conf = fs::read_to_string(paths.calibration_dir().join("ngen_cal_conf.yaml")).unwrap();
    assert!(conf.contains("evaluation_start: \"2011-01-01 00:00:00\""));
    let troute = fs::read_to_string(paths.calibration_dir().join("troute.yaml")).unwrap();
    assert!(!troute.contains("lakeout_output"));
}

#[test]
fn forcings_fill_a_missing_timestep() {
    let dir = tempfile::tempdir().unwrap();
    let hf_path = dir.path().join("conus_nextgen.gpkg");
    build_hydrofabric(&hf_path);
    let hf = Hydrofabric::open(&hf_path).unwrap();
    let network = NetworkGraph::load_or_build(&hf, &dir.path().join("network.bin")).unwrap();
    let paths = FilePaths::for_folder("cat-3", &dir.path().join("out")).unwrap();
    subset(&["cat-3"], &hf, &network, &paths, true).unwrap();

    let grids = dir.path().join("grids");
    write_forcing_grids(&grids);
    fs::remove_file(grids.join(file_name("RAINRATE", hour(1)))).unwrap();
    fs::remove_file(grids.join(file_name("T2D", hour(2)))).unwrap();

    let source = GeoTiffSource::open(&grids, None).unwrap();
    let forcings = create_forcings(&source, ForcingSourceKind::Nwm, &paths, hour(0), hour(2)).unwrap();
    assert_eq!(forcings.timesteps, 3);

    let cat2 = paths.forcings_by_catchment_dir().join("cat-2.csv");
    assert_eq!(csv_column(&cat2, "precip_rate"), vec![0.5; 3]);
    assert_eq!(csv_column(&cat2, "APCP_surface"), vec![1800.0; 3]);
    assert_eq!(csv_column(&cat2, "TMP_2maboveground"), vec![503.0, 513.0, 513.0]);
}

#[test]
fn vpu_subset_takes_every_feature() {
    let dir = tempfile::tempdir().unwrap();
    let hf_path = dir.path().join("conus_nextgen.gpkg");
    build_hydrofabric(&hf_path);
    let hf = Hydrofabric::open(&hf_path).unwrap();

    let paths = FilePaths::for_folder("vpu-02", dir.path()).unwrap();
    let summary = subset_vpu("02", &hf, &paths).unwrap();
    assert_eq!(summary.rows("divides"), 4);
    assert_eq!(summary.rows("network"), 7);
    assert_eq!(summary.rows("nexus"), 3);
}
