//! GeoPackage geometry blobs
//!
//! A blob is a small binary header followed by standard WKB
//! (<http://www.geopackage.org/spec/#gpb_format>):
//!
//! ```text
//! 0..2  "GP"
//! 2     version
//! 3     flags: bit 0 byte order (1 = little endian)
//!              bits 1-3 envelope type (0..=4)
//!              bit 4 empty geometry
//! 4..8  srs_id (i32)
//! 8..   envelope, 0/32/48/48/64 bytes of f64
//! ```

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use geo::BoundingRect;
use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use ngprep_core::{Error, Result};

const ENVELOPE_SIZES: [usize; 5] = [0, 32, 48, 48, 64];

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WkbByteOrder {
    LittleEndian,
    BigEndian,
}

/// Decoded blob header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobHeader {
    pub srs_id: i32,
    /// `[min_x, max_x, min_y, max_y]` when the blob carries an envelope
    pub envelope: Option<[f64; 4]>,
    pub empty: bool,
    /// Header length in bytes; WKB starts here
    pub len: usize,
}

/// Parse the header of a GeoPackage geometry blob
pub fn parse_header(blob: &[u8]) -> Result<BlobHeader> {
    if blob.len() < 8 || &blob[0..2] != b"GP" {
        return Err(Error::Geometry("not a GeoPackage geometry blob".into()));
    }
    let flags = blob[3];
    let order = if flags & 1 == 1 {
        WkbByteOrder::LittleEndian
    } else {
        WkbByteOrder::BigEndian
    };
    let envelope_type = ((flags & 0b1110) >> 1) as usize;
    let empty = (flags & 0b1_0000) >> 4 == 1;

    let envelope_size = *ENVELOPE_SIZES
        .get(envelope_type)
        .ok_or_else(|| Error::Geometry(format!("invalid envelope type {}", envelope_type)))?;
    let len = 8 + envelope_size;
    if blob.len() < len {
        return Err(Error::Geometry("truncated GeoPackage header".into()));
    }

    let srs_id = read_i32(order, &blob[4..8]);
    let envelope = (envelope_size > 0).then(|| {
        [
            read_f64(order, &blob[8..16]),
            read_f64(order, &blob[16..24]),
            read_f64(order, &blob[24..32]),
            read_f64(order, &blob[32..40]),
        ]
    });

    Ok(BlobHeader {
        srs_id,
        envelope,
        empty,
        len,
    })
}

/// Decode a blob into a geometry; `None` for empty geometries
pub fn blob_to_geometry(blob: &[u8]) -> Result<Option<Geometry<f64>>> {
    let header = parse_header(blob)?;
    if header.empty {
        return Ok(None);
    }
    let mut reader = WkbReader::new(&blob[header.len..]);
    reader.geometry().map(Some)
}

/// Centre of the blob's bounding box. Uses the stored envelope when
/// present, otherwise decodes the geometry.
pub fn blob_envelope_centre(blob: &[u8]) -> Result<Option<(f64, f64)>> {
    let header = parse_header(blob)?;
    if header.empty {
        return Ok(None);
    }
    if let Some([min_x, max_x, min_y, max_y]) = header.envelope {
        return Ok(Some(((min_x + max_x) / 2.0, (min_y + max_y) / 2.0)));
    }
    Ok(blob_to_geometry(blob)?
        .and_then(|g| g.bounding_rect())
        .map(|r| r.center().x_y()))
}

/// Encode a geometry as a little-endian blob with an XY envelope
pub fn geometry_to_blob(geom: &Geometry<f64>, srs_id: i32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(b"GP");
    out.push(0);
    match geom.bounding_rect() {
        Some(rect) => {
            out.push(0b0000_0011);
            out.write_i32::<LittleEndian>(srs_id)?;
            for v in [rect.min().x, rect.max().x, rect.min().y, rect.max().y] {
                out.write_f64::<LittleEndian>(v)?;
            }
        }
        None => {
            out.push(0b0001_0001);
            out.write_i32::<LittleEndian>(srs_id)?;
        }
    }
    write_wkb(&mut out, geom)?;
    Ok(out)
}

fn read_i32(order: WkbByteOrder, data: &[u8]) -> i32 {
    match order {
        WkbByteOrder::LittleEndian => LittleEndian::read_i32(data),
        WkbByteOrder::BigEndian => BigEndian::read_i32(data),
    }
}

fn read_u32(order: WkbByteOrder, data: &[u8]) -> u32 {
    match order {
        WkbByteOrder::LittleEndian => LittleEndian::read_u32(data),
        WkbByteOrder::BigEndian => BigEndian::read_u32(data),
    }
}

fn read_f64(order: WkbByteOrder, data: &[u8]) -> f64 {
    match order {
        WkbByteOrder::LittleEndian => LittleEndian::read_f64(data),
        WkbByteOrder::BigEndian => BigEndian::read_f64(data),
    }
}

// ── WKB decoding ─────────────────────────────────────────────────────────

struct WkbReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WkbReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::Geometry("truncated WKB".into()))?;
        self.pos = end;
        Ok(slice)
    }

    fn byte_order(&mut self) -> Result<WkbByteOrder> {
        match self.take(1)?[0] {
            0 => Ok(WkbByteOrder::BigEndian),
            1 => Ok(WkbByteOrder::LittleEndian),
            b => Err(Error::Geometry(format!("invalid WKB byte order {}", b))),
        }
    }

    fn u32(&mut self, order: WkbByteOrder) -> Result<u32> {
        Ok(read_u32(order, self.take(4)?))
    }

    fn f64(&mut self, order: WkbByteOrder) -> Result<f64> {
        Ok(read_f64(order, self.take(8)?))
    }

    /// Byte order, base type and ordinate count of the next geometry
    fn geometry_header(&mut self) -> Result<(WkbByteOrder, u32, usize)> {
        let order = self.byte_order()?;
        let raw = self.u32(order)?;

        let mut dims = 2;
        if raw & EWKB_Z != 0 {
            dims += 1;
        }
        if raw & EWKB_M != 0 {
            dims += 1;
        }
        if raw & EWKB_SRID != 0 {
            self.take(4)?;
        }
        let code = raw & 0x0FFF_FFFF;
        let (base, iso_dims) = match code / 1000 {
            0 => (code, 0),
            1 | 2 => (code % 1000, 1),
            3 => (code % 1000, 2),
            _ => return Err(Error::Geometry(format!("unsupported WKB type {}", raw))),
        };
        Ok((order, base, dims + iso_dims))
    }

    fn coord(&mut self, order: WkbByteOrder, dims: usize) -> Result<Coord<f64>> {
        let x = self.f64(order)?;
        let y = self.f64(order)?;
        for _ in 2..dims {
            self.f64(order)?;
        }
        Ok(Coord { x, y })
    }

    fn line_string(&mut self, order: WkbByteOrder, dims: usize) -> Result<LineString<f64>> {
        let n = self.u32(order)? as usize;
        let coords = (0..n)
            .map(|_| self.coord(order, dims))
            .collect::<Result<Vec<_>>>()?;
        Ok(LineString::new(coords))
    }

    fn polygon(&mut self, order: WkbByteOrder, dims: usize) -> Result<Polygon<f64>> {
        let rings = self.u32(order)? as usize;
        if rings == 0 {
            return Ok(Polygon::new(LineString::new(vec![]), vec![]));
        }
        let exterior = self.line_string(order, dims)?;
        let interiors = (1..rings)
            .map(|_| self.line_string(order, dims))
            .collect::<Result<Vec<_>>>()?;
        Ok(Polygon::new(exterior, interiors))
    }

    /// Members of a Multi* geometry, each with its own header
    fn members<T>(
        &mut self,
        order: WkbByteOrder,
        expected: u32,
        mut read: impl FnMut(&mut Self, WkbByteOrder, usize) -> Result<T>,
    ) -> Result<Vec<T>> {
        let n = self.u32(order)? as usize;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let (member_order, base, dims) = self.geometry_header()?;
            if base != expected {
                return Err(Error::Geometry(format!(
                    "expected WKB member type {}, found {}",
                    expected, base
                )));
            }
            out.push(read(self, member_order, dims)?);
        }
        Ok(out)
    }

    fn geometry(&mut self) -> Result<Geometry<f64>> {
        let (order, base, dims) = self.geometry_header()?;
        let geom = match base {
            1 => Geometry::Point(Point::from(self.coord(order, dims)?)),
            2 => Geometry::LineString(self.line_string(order, dims)?),
            3 => Geometry::Polygon(self.polygon(order, dims)?),
            4 => {
                let points = self.members(order, 1, |r, o, d| r.coord(o, d).map(Point::from))?;
                Geometry::MultiPoint(MultiPoint::new(points))
            }
            5 => {
                let lines = self.members(order, 2, |r, o, d| r.line_string(o, d))?;
                Geometry::MultiLineString(MultiLineString::new(lines))
            }
            6 => {
                let polygons = self.members(order, 3, |r, o, d| r.polygon(o, d))?;
                Geometry::MultiPolygon(MultiPolygon::new(polygons))
            }
            other => {
                return Err(Error::Geometry(format!("unsupported WKB geometry type {}", other)))
            }
        };
        Ok(geom)
    }
}

// ── WKB encoding (little endian, XY) ─────────────────────────────────────

fn write_header(out: &mut Vec<u8>, code: u32) -> Result<()> {
    out.push(1);
    out.write_u32::<LittleEndian>(code)?;
    Ok(())
}

fn write_ring(out: &mut Vec<u8>, ring: &LineString<f64>) -> Result<()> {
    out.write_u32::<LittleEndian>(ring.0.len() as u32)?;
    for c in &ring.0 {
        out.write_f64::<LittleEndian>(c.x)?;
        out.write_f64::<LittleEndian>(c.y)?;
    }
    Ok(())
}

fn write_polygon(out: &mut Vec<u8>, polygon: &Polygon<f64>) -> Result<()> {
    write_header(out, 3)?;
    out.write_u32::<LittleEndian>(1 + polygon.interiors().len() as u32)?;
    write_ring(out, polygon.exterior())?;
    for ring in polygon.interiors() {
        write_ring(out, ring)?;
    }
    Ok(())
}

fn write_wkb(out: &mut Vec<u8>, geom: &Geometry<f64>) -> Result<()> {
    match geom {
        Geometry::Point(p) => {
            write_header(out, 1)?;
            out.write_f64::<LittleEndian>(p.x())?;
            out.write_f64::<LittleEndian>(p.y())?;
        }
        Geometry::LineString(ls) => {
            write_header(out, 2)?;
            write_ring(out, ls)?;
        }
        Geometry::Polygon(p) => write_polygon(out, p)?,
        Geometry::MultiPolygon(mp) => {
            write_header(out, 6)?;
            out.write_u32::<LittleEndian>(mp.0.len() as u32)?;
            for p in &mp.0 {
                write_polygon(out, p)?;
            }
        }
        _ => {
            return Err(Error::Geometry(
                "only points, line strings and polygons can be encoded".into(),
            ))
        }
    }
    Ok(())
}
