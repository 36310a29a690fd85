//! Grid cell coverage of catchment polygons
//!
//! The coverage of a cell is the area of the polygon inside the cell over
//! the cell area. Each polygon ring is clipped to the cell rectangle with
//! Sutherland-Hodgman; the clip window is convex, so the shoelace area of the
//! clipped ring is exact even for concave rings.

use geo::BoundingRect;
use geo_types::{Coord, LineString, MultiPolygon};
use ngprep_core::GeoTransform;

use crate::maybe_rayon::*;

/// Cells covered by one divide: `(row, col, coverage)`, coverage in (0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct CellWeights {
    pub divide_id: String,
    pub cells: Vec<(usize, usize, f64)>,
}

impl CellWeights {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Coverages below this are clipping noise along shared cell edges
const MIN_COVERAGE: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct ClipRect {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    Left,
    Right,
    Bottom,
    Top,
}

impl Edge {
    fn is_inside(&self, p: &Coord<f64>, rect: &ClipRect) -> bool {
        match self {
            Edge::Left => p.x >= rect.min_x,
            Edge::Right => p.x <= rect.max_x,
            Edge::Bottom => p.y >= rect.min_y,
            Edge::Top => p.y <= rect.max_y,
        }
    }

    fn intersect(&self, p: &Coord<f64>, q: &Coord<f64>, rect: &ClipRect) -> Coord<f64> {
        let dx = q.x - p.x;
        let dy = q.y - p.y;
        match self {
            Edge::Left => Coord { x: rect.min_x, y: p.y + (rect.min_x - p.x) / dx * dy },
            Edge::Right => Coord { x: rect.max_x, y: p.y + (rect.max_x - p.x) / dx * dy },
            Edge::Bottom => Coord { x: p.x + (rect.min_y - p.y) / dy * dx, y: rect.min_y },
            Edge::Top => Coord { x: p.x + (rect.max_y - p.y) / dy * dx, y: rect.max_y },
        }
    }
}

fn clip_edge(vertices: &[Coord<f64>], edge: Edge, rect: &ClipRect) -> Vec<Coord<f64>> {
    let n = vertices.len();
    let mut output = Vec::with_capacity(n + 2);
    for i in 0..n {
        let current = &vertices[i];
        let next = &vertices[(i + 1) % n];
        match (edge.is_inside(current, rect), edge.is_inside(next, rect)) {
            (true, true) => output.push(*next),
            (true, false) => output.push(edge.intersect(current, next, rect)),
            (false, true) => {
                output.push(edge.intersect(current, next, rect));
                output.push(*next);
            }
            (false, false) => {}
        }
    }
    output
}

/// Area of a ring inside `rect`
fn clipped_ring_area(ring: &LineString<f64>, rect: &ClipRect) -> f64 {
    let mut vertices: Vec<Coord<f64>> = ring.0.clone();
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    for edge in [Edge::Left, Edge::Right, Edge::Bottom, Edge::Top] {
        if vertices.len() < 3 {
            return 0.0;
        }
        vertices = clip_edge(&vertices, edge, rect);
    }
    shoelace(&vertices)
}

fn shoelace(vertices: &[Coord<f64>]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice.abs() / 2.0
}

/// Area of a multipolygon inside `rect`, holes subtracted
fn clipped_area(shape: &MultiPolygon<f64>, rect: &ClipRect) -> f64 {
    shape
        .iter()
        .map(|polygon| {
            let outer = clipped_ring_area(polygon.exterior(), rect);
            let holes: f64 = polygon
                .interiors()
                .iter()
                .map(|ring| clipped_ring_area(ring, rect))
                .sum();
            (outer - holes).max(0.0)
        })
        .sum()
}

/// Coverage of every grid cell touched by one divide
pub fn divide_weights(
    divide_id: &str,
    shape: &MultiPolygon<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
) -> CellWeights {
    let mut cells = Vec::new();
    if let Some(bbox) = shape.bounding_rect() {
        let window = transform.window(
            (bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y),
            cols,
            rows,
        );
        let cell_area = transform.cell_area();
        if !window.is_empty() && cell_area > 0.0 {
            for row in window.row_start..window.row_end {
                for col in window.col_start..window.col_end {
                    let (min_x, min_y, max_x, max_y) = transform.cell_bounds(col, row);
                    let rect = ClipRect { min_x, min_y, max_x, max_y };
                    let coverage = clipped_area(shape, &rect) / cell_area;
                    if coverage > MIN_COVERAGE {
                        cells.push((row, col, coverage.min(1.0)));
                    }
                }
            }
        }
    }
    CellWeights {
        divide_id: divide_id.to_string(),
        cells,
    }
}

/// Coverage of every divide, in input order
pub fn cell_weights(
    divides: &[(String, MultiPolygon<f64>)],
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
) -> Vec<CellWeights> {
    divides
        .par_iter()
        .map(|(id, shape)| divide_weights(id, shape, transform, rows, cols))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo_types::{polygon, Polygon};

    fn grid() -> GeoTransform {
        // 4 x 4 cells of 10 x 10 with the top-left corner at (0, 40)
        GeoTransform::new(0.0, 40.0, 10.0, -10.0)
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1), (x: x0, y: y0)]
    }

    fn weight_of(w: &CellWeights, row: usize, col: usize) -> f64 {
        w.cells
            .iter()
            .find(|(r, c, _)| *r == row && *c == col)
            .map(|(_, _, v)| *v)
            .unwrap_or(0.0)
    }

    #[test]
    fn test_aligned_cell_is_fully_covered() {
        let shape = MultiPolygon::new(vec![square(10.0, 20.0, 20.0, 30.0)]);
        let w = divide_weights("cat-1", &shape, &grid(), 4, 4);
        assert_eq!(w.cells.len(), 1);
        assert_eq!((w.cells[0].0, w.cells[0].1), (1, 1));
        assert_relative_eq!(w.cells[0].2, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_partial_coverage() {
        // Covers the right half of (row 0, col 0) and the left half of (row 0, col 1)
        let shape = MultiPolygon::new(vec![square(5.0, 30.0, 15.0, 40.0)]);
        let w = divide_weights("cat-1", &shape, &grid(), 4, 4);
        assert_eq!(w.cells.len(), 2);
        assert_relative_eq!(weight_of(&w, 0, 0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(weight_of(&w, 0, 1), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_triangle_and_concave() {
        // Lower-left triangle of cell (row 3, col 0)
        let tri = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)];
        let w = divide_weights("cat-t", &MultiPolygon::new(vec![tri]), &grid(), 4, 4);
        assert_relative_eq!(weight_of(&w, 3, 0), 0.5, epsilon = 1e-12);

        // L shape spanning three cells of the bottom-left 2 x 2 block
        let ell = polygon![
            (x: 0.0, y: 0.0), (x: 20.0, y: 0.0), (x: 20.0, y: 10.0),
            (x: 10.0, y: 10.0), (x: 10.0, y: 20.0), (x: 0.0, y: 20.0), (x: 0.0, y: 0.0)
        ];
        let w = divide_weights("cat-l", &MultiPolygon::new(vec![ell]), &grid(), 4, 4);
        assert_relative_eq!(weight_of(&w, 3, 0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(weight_of(&w, 3, 1), 1.0, epsilon = 1e-12);
        assert_relative_eq!(weight_of(&w, 2, 0), 1.0, epsilon = 1e-12);
        assert_eq!(weight_of(&w, 2, 1), 0.0);
    }

    #[test]
    fn test_hole_is_subtracted() {
        let outer = square(0.0, 30.0, 10.0, 40.0);
        let hole = square(2.5, 32.5, 7.5, 37.5);
        let shape = MultiPolygon::new(vec![Polygon::new(
            outer.exterior().clone(),
            vec![hole.exterior().clone()],
        )]);
        let w = divide_weights("cat-h", &shape, &grid(), 4, 4);
        assert_relative_eq!(weight_of(&w, 0, 0), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_outside_grid_has_no_cells() {
        let shape = MultiPolygon::new(vec![square(100.0, 100.0, 110.0, 110.0)]);
        let w = divide_weights("cat-x", &shape, &grid(), 4, 4);
        assert!(w.is_empty());
    }

    #[test]
    fn test_cell_weights_keeps_order() {
        let divides = vec![
            ("cat-1".to_string(), MultiPolygon::new(vec![square(0.0, 0.0, 10.0, 10.0)])),
            ("cat-2".to_string(), MultiPolygon::new(vec![square(30.0, 30.0, 40.0, 40.0)])),
        ];
        let weights = cell_weights(&divides, &grid(), 4, 4);
        assert_eq!(weights[0].divide_id, "cat-1");
        assert_eq!(weights[1].divide_id, "cat-2");
        assert_eq!((weights[1].cells[0].0, weights[1].cells[0].1), (0, 3));
    }
}
