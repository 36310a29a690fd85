//! Cell value types a forcing grid can be decoded into

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Numeric type that can be stored in a raster cell.
pub trait RasterElement:
    Copy + Debug + PartialOrd + NumCast + Zero + Send + Sync + 'static
{
    /// Value substituted for cells that cannot be represented
    fn default_nodata() -> Self;

    /// Whether this value is missing (NaN, or equal to `nodata`)
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_int_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.is_some_and(|nd| *self == nd)
            }
        }
    )*};
}

macro_rules! impl_float_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                self.is_nan()
                    || nodata.is_some_and(|nd| (self - nd).abs() <= <$t>::EPSILON * 100.0)
            }
        }
    )*};
}

impl_int_element!(i16, i32, u8, u16, u32);
impl_float_element!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_nan_is_always_nodata() {
        assert!(f32::NAN.is_nodata(None));
        assert!((-9999.0f64).is_nodata(Some(-9999.0)));
        assert!(!1.5f64.is_nodata(Some(-9999.0)));
    }

    #[test]
    fn int_nodata_needs_explicit_value() {
        assert!(!0u8.is_nodata(None));
        assert!(255u8.is_nodata(Some(255)));
    }
}
