//! GeoTIFF reading and writing with the `tiff` crate
//!
//! Only the tags a forcing grid needs are handled: pixel scale and tiepoint
//! for the transform, the GeoKey directory for the EPSG code and
//! `GDAL_NODATA` for missing values.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Read the first band of a GeoTIFF into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut decoder = Decoder::new(file)
        .map_err(|e| Error::Other(format!("{}: TIFF decode error: {}", path.display(), e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let (rows, cols) = (height as usize, width as usize);

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(&buf),
        DecodingResult::F64(buf) => cast_all(&buf),
        DecodingResult::U8(buf) => cast_all(&buf),
        DecodingResult::U16(buf) => cast_all(&buf),
        DecodingResult::U32(buf) => cast_all(&buf),
        DecodingResult::I16(buf) => cast_all(&buf),
        DecodingResult::I32(buf) => cast_all(&buf),
        _ => {
            return Err(Error::UnsupportedDataType(format!(
                "{}: unsupported TIFF pixel format",
                path.display()
            )))
        }
    };

    // Multi-sample images decode interleaved; keep the first sample.
    let samples = data.len() / (rows * cols).max(1);
    let data = if samples > 1 {
        data.into_iter().step_by(samples).collect()
    } else {
        data
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;
    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    raster.set_nodata(read_nodata(&mut decoder));

    Ok(raster)
}

fn cast_all<S: num_traits::ToPrimitive + Copy + num_traits::NumCast, T: RasterElement>(buf: &[S]) -> Vec<T> {
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY)).ok()?;
    // Header [version, revision, minor, count] then [id, location, count, value]
    let count = *keys.get(3)? as usize;
    keys.get(4..4 + count * 4)?
        .chunks_exact(4)
        .filter(|k| k[1] == 0)
        .find(|k| k[0] == PROJECTED_CS_TYPE_KEY || k[0] == GEOGRAPHIC_TYPE_KEY)
        .map(|k| CRS::from_epsg(k[3] as u32))
}

fn read_nodata<T, R>(decoder: &mut Decoder<R>) -> Option<T>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let text = decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA)).ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    num_traits::cast(value)
}

/// Write a Raster as a single-band 32-bit float GeoTIFF
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    let mut encoder = TiffEncoder::new(file)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    let tag_err = |e: tiff::TiffError| Error::Other(format!("Cannot write GeoTIFF tag: {}", e));

    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tag_err)?;
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tag_err)?;

    // GTModelType: 1 projected, 2 geographic. GTRasterType: 1 PixelIsArea.
    let (model_type, crs_key) = match raster.crs() {
        Some(crs) if crs.is_geographic() => (2, GEOGRAPHIC_TYPE_KEY),
        _ => (1, PROJECTED_CS_TYPE_KEY),
    };
    let mut geokeys: Vec<u16> = vec![1, 1, 0, 2, GT_MODEL_TYPE_KEY, 0, 1, model_type, GT_RASTER_TYPE_KEY, 0, 1, 1];
    if let Some(code) = raster.crs().and_then(|c| c.epsg()) {
        geokeys[3] = 3;
        geokeys.extend_from_slice(&[crs_key, 0, 1, code as u16]);
    }
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(tag_err)?;

    if let Some(nd) = raster.nodata().and_then(|v| v.to_f64()) {
        let text = format!("{}", nd);
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), text.as_str())
            .map_err(tag_err)?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_keeps_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("T2D_2020010100.tif");

        let mut raster = Raster::from_vec(vec![280.0f32, 281.0, -9999.0, 283.0, 284.0, 285.0], 2, 3)
            .unwrap()
            .with_transform(GeoTransform::new(-2000.0, 1000.0, 1000.0, -1000.0))
            .with_crs(CRS::conus_albers());
        raster.set_nodata(Some(-9999.0));
        write_geotiff(&raster, &path).unwrap();

        let back: Raster<f64> = read_geotiff(&path).unwrap();
        assert_eq!(back.shape(), (2, 3));
        assert_eq!(back.transform(), raster.transform());
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(5070));
        assert_eq!(back.nodata(), Some(-9999.0));
        assert_eq!(back.value_f64(0, 1), 281.0);
        assert!(back.value_f64(0, 2).is_nan());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let r: Result<Raster<f32>> = read_geotiff("/definitely/not/here.tif");
        assert!(matches!(r, Err(Error::Io(_))));
    }
}
