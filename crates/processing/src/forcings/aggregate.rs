//! Zonal weighted means and gap filling

use ngprep_core::Raster;

use super::weights::CellWeights;

/// Coverage-weighted mean of one timestep over a divide: Σ v·w / Σ w over
/// cells with a value. NaN when no covered cell has one.
pub fn weighted_mean(raster: &Raster<f32>, weights: &CellWeights) -> f64 {
    let mut sum = 0.0;
    let mut total = 0.0;
    for &(row, col, w) in &weights.cells {
        let v = raster.value_f64(row, col);
        if v.is_finite() {
            sum += v * w;
            total += w;
        }
    }
    if total > 0.0 {
        sum / total
    } else {
        f64::NAN
    }
}

/// Replace NaN gaps with the nearest valid value along the series. Ends
/// take the first or last valid value; a tie goes to the earlier one. An
/// all-NaN series is left as is.
pub fn fill_nan_nearest(series: &mut [f64]) {
    let n = series.len();
    let mut previous: Vec<Option<usize>> = vec![None; n];
    let mut last = None;
    for i in 0..n {
        if !series[i].is_nan() {
            last = Some(i);
        }
        previous[i] = last;
    }

    let mut next = None;
    let mut filled = series.to_vec();
    for i in (0..n).rev() {
        if !series[i].is_nan() {
            next = Some(i);
            continue;
        }
        let source = match (previous[i], next) {
            (Some(p), Some(q)) => {
                if i - p <= q - i {
                    p
                } else {
                    q
                }
            }
            (Some(p), None) => p,
            (None, Some(q)) => q,
            (None, None) => continue,
        };
        filled[i] = series[source];
    }
    series.copy_from_slice(&filled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn weights(cells: Vec<(usize, usize, f64)>) -> CellWeights {
        CellWeights {
            divide_id: "cat-1".into(),
            cells,
        }
    }

    #[test]
    fn test_weighted_mean() {
        let raster = Raster::from_vec(vec![1.0f32, 3.0, 5.0, 7.0], 2, 2).unwrap();
        let w = weights(vec![(0, 0, 1.0), (0, 1, 0.5), (1, 1, 0.5)]);
        // (1 + 1.5 + 3.5) / 2
        assert_relative_eq!(weighted_mean(&raster, &w), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_weighted_mean_skips_nan_and_nodata() {
        let mut raster = Raster::from_vec(vec![f32::NAN, 4.0, -9999.0, 8.0], 2, 2).unwrap();
        raster.set_nodata(Some(-9999.0));
        let w = weights(vec![(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 0.5)]);
        // (4 + 4) / 1.5
        assert_relative_eq!(weighted_mean(&raster, &w), 8.0 / 1.5, epsilon = 1e-12);

        let only_missing = weights(vec![(0, 0, 1.0), (1, 0, 1.0)]);
        assert!(weighted_mean(&raster, &only_missing).is_nan());
        assert!(weighted_mean(&raster, &weights(vec![])).is_nan());
    }

    #[test]
    fn test_fill_interior_and_ends() {
        let mut s = vec![f64::NAN, 1.0, f64::NAN, f64::NAN, f64::NAN, 5.0, f64::NAN];
        fill_nan_nearest(&mut s);
        assert_eq!(s, vec![1.0, 1.0, 1.0, 1.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_fill_tie_takes_earlier() {
        let mut s = vec![2.0, f64::NAN, 4.0];
        fill_nan_nearest(&mut s);
        assert_eq!(s, vec![2.0, 2.0, 4.0]);
    }

    #[test]
    fn test_fill_all_nan_untouched() {
        let mut s = vec![f64::NAN; 3];
        fill_nan_nearest(&mut s);
        assert!(s.iter().all(|v| v.is_nan()));

        let mut empty: Vec<f64> = vec![];
        fill_nan_nearest(&mut empty);
    }
}
