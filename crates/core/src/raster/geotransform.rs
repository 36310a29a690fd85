//! Affine geotransformation for north-up grids

use serde::{Deserialize, Serialize};

/// Coefficients mapping pixel (col, row) to grid coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// Forcing grids are north-up, so `pixel_height` is normally negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

/// Inclusive-exclusive range of columns and rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_start: usize,
    pub col_end: usize,
    pub row_start: usize,
    pub row_end: usize,
}

impl PixelWindow {
    pub fn is_empty(&self) -> bool {
        self.col_start >= self.col_end || self.row_start >= self.row_end
    }
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Top-left corner of pixel (col, row)
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + col as f64 * self.pixel_width,
            self.origin_y + row as f64 * self.pixel_height,
        )
    }

    /// Fractional (col, row) of a grid coordinate; use `.floor()` for indices
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-12 || self.pixel_height.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Area of one cell in squared grid units
    pub fn cell_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// Extent of pixel (col, row) as (min_x, min_y, max_x, max_y)
    pub fn cell_bounds(&self, col: usize, row: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.pixel_to_geo_corner(col, row);
        let (x1, y1) = self.pixel_to_geo_corner(col + 1, row + 1);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Pixels of a `width` x `height` grid touched by a bounding box,
    /// clamped to the grid
    pub fn window(
        &self,
        bbox: (f64, f64, f64, f64),
        width: usize,
        height: usize,
    ) -> PixelWindow {
        let (min_x, min_y, max_x, max_y) = bbox;
        let (c0, r0) = self.geo_to_pixel(min_x, max_y);
        let (c1, r1) = self.geo_to_pixel(max_x, min_y);
        let clamp = |v: f64, hi: usize| -> usize {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v as usize).min(hi)
            }
        };
        let (c_lo, c_hi) = (c0.min(c1), c0.max(c1));
        let (r_lo, r_hi) = (r0.min(r1), r0.max(r1));
        PixelWindow {
            col_start: clamp(c_lo.floor(), width),
            col_end: clamp(c_hi.ceil(), width),
            row_start: clamp(r_lo.floor(), height),
            row_end: clamp(r_hi.ceil(), height),
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo_corner(5, 10);
        assert_eq!((x, y), (150.0, 100.0));
        let (col, row) = gt.geo_to_pixel(x + 5.0, y - 5.0);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_cell_bounds_and_area() {
        let gt = GeoTransform::new(0.0, 100.0, 1000.0, -1000.0);
        assert_eq!(gt.cell_bounds(1, 0), (1000.0, -900.0, 2000.0, 100.0));
        assert_relative_eq!(gt.cell_area(), 1.0e6);
    }

    #[test]
    fn test_window_clamped_to_grid() {
        let gt = GeoTransform::new(0.0, 10.0, 1.0, -1.0);
        let w = gt.window((2.5, 4.2, 4.5, 7.9), 10, 10);
        assert_eq!(
            w,
            PixelWindow {
                col_start: 2,
                col_end: 5,
                row_start: 2,
                row_end: 6
            }
        );

        let outside = gt.window((-50.0, -50.0, -40.0, -40.0), 10, 10);
        assert!(outside.is_empty());

        let partial = gt.window((8.5, -5.0, 20.0, 1.5), 10, 10);
        assert_eq!((partial.col_start, partial.col_end), (8, 10));
        assert_eq!((partial.row_start, partial.row_end), (8, 10));
    }
}
