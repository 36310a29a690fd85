//! Pure-Rust NAD83 / CONUS Albers (EPSG:5070) projection (Snyder 1987).
//!
//! The hydrofabric stores every layer in EPSG:5070, while map clicks and
//! model configuration use geographic coordinates. NAD83 and WGS84 differ by
//! well under a metre over CONUS, so no datum shift is applied.

// ── GRS80 ellipsoid and EPSG:5070 parameters ─────────────────────────────

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_222_101;
const E2: f64 = 2.0 * F - F * F;
const LAT_1: f64 = 29.5;
const LAT_2: f64 = 45.5;
const LAT_0: f64 = 23.0;
const LON_0: f64 = -96.0;

const INVERSE_TOLERANCE: f64 = 1e-12;
const INVERSE_MAX_ITER: usize = 20;

/// EPSG code of the projection implemented here
pub const EPSG: u32 = 5070;

// ── Public API ───────────────────────────────────────────────────────────

/// Project geographic (longitude, latitude) in degrees to EPSG:5070 metres.
pub fn to_albers(lon: f64, lat: f64) -> (f64, f64) {
    let c = Constants::get();
    let rho = c.rho(q(lat.to_radians()));
    let theta = c.n * (lon - LON_0).to_radians();
    (rho * theta.sin(), c.rho0 - rho * theta.cos())
}

/// Inverse of [`to_albers`]: EPSG:5070 metres to (longitude, latitude).
pub fn from_albers(x: f64, y: f64) -> (f64, f64) {
    let c = Constants::get();
    let dy = c.rho0 - y;
    let rho = (x * x + dy * dy).sqrt();
    let theta = x.atan2(dy);
    let q_val = (c.c - rho * rho * c.n * c.n / (A * A)) / c.n;

    let lon = LON_0 + (theta / c.n).to_degrees();
    (lon, inverse_latitude(q_val).to_degrees())
}

// ── Snyder eqs. 14-1 … 14-21 ─────────────────────────────────────────────

struct Constants {
    n: f64,
    c: f64,
    rho0: f64,
}

impl Constants {
    fn get() -> Self {
        let (p1, p2) = (LAT_1.to_radians(), LAT_2.to_radians());
        let (m1, m2) = (m(p1), m(p2));
        let (q1, q2) = (q(p1), q(p2));
        let n = (m1 * m1 - m2 * m2) / (q2 - q1);
        let c = m1 * m1 + n * q1;
        let mut out = Self { n, c, rho0: 0.0 };
        out.rho0 = out.rho(q(LAT_0.to_radians()));
        out
    }

    fn rho(&self, q_val: f64) -> f64 {
        A * (self.c - self.n * q_val).max(0.0).sqrt() / self.n
    }
}

fn m(phi: f64) -> f64 {
    let s = phi.sin();
    phi.cos() / (1.0 - E2 * s * s).sqrt()
}

fn q(phi: f64) -> f64 {
    let e = E2.sqrt();
    let s = phi.sin();
    (1.0 - E2) * (s / (1.0 - E2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln())
}

fn inverse_latitude(q_val: f64) -> f64 {
    let e = E2.sqrt();
    let mut phi = (q_val / 2.0).clamp(-1.0, 1.0).asin();
    for _ in 0..INVERSE_MAX_ITER {
        let s = phi.sin();
        let one_minus = 1.0 - E2 * s * s;
        let delta = one_minus * one_minus / (2.0 * phi.cos())
            * (q_val / (1.0 - E2) - s / one_minus
                + (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln());
        phi += delta;
        if delta.abs() < INVERSE_TOLERANCE {
            break;
        }
    }
    phi
}
