//! Bind parameters.
//!
//! Every parameter travels as either NULL or a binary-safe byte string; the
//! driver decides how the server should interpret it. NULL is never the same
//! thing as an empty string.

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use num_bigint::BigInt;
use rust_decimal::Decimal;

/// A single bind parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// SQL NULL
    Null,
    /// Binary-safe textual representation of the value
    Binary(Vec<u8>),
}

impl Param {
    /// Returns true for [`Param::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null)
    }

    /// Bytes of a non-NULL parameter.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Param::Null => None,
            Param::Binary(bytes) => Some(bytes),
        }
    }
}

/// Conversion of a Rust value into a [`Param`].
pub trait ToParam {
    /// Render this value as a bind parameter.
    fn to_param(&self) -> Param;
}

impl ToParam for Param {
    fn to_param(&self) -> Param {
        self.clone()
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn to_param(&self) -> Param {
        match self {
            Some(v) => v.to_param(),
            None => Param::Null,
        }
    }
}

impl<T: ToParam + ?Sized> ToParam for &T {
    fn to_param(&self) -> Param {
        (*self).to_param()
    }
}

impl ToParam for str {
    fn to_param(&self) -> Param {
        Param::Binary(self.as_bytes().to_vec())
    }
}

impl ToParam for String {
    fn to_param(&self) -> Param {
        Param::Binary(self.as_bytes().to_vec())
    }
}

impl ToParam for [u8] {
    fn to_param(&self) -> Param {
        Param::Binary(self.to_vec())
    }
}

impl ToParam for Vec<u8> {
    fn to_param(&self) -> Param {
        Param::Binary(self.clone())
    }
}

impl ToParam for bool {
    fn to_param(&self) -> Param {
        Param::Binary(if *self { b"t".to_vec() } else { b"f".to_vec() })
    }
}

macro_rules! impl_to_param_display {
    ($($t:ty),+) => {
        $(
            impl ToParam for $t {
                fn to_param(&self) -> Param {
                    Param::Binary(self.to_string().into_bytes())
                }
            }
        )+
    };
}

impl_to_param_display!(
    i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, f32, f64, Decimal, BigInt, BigDecimal
);

impl ToParam for NaiveDate {
    fn to_param(&self) -> Param {
        Param::Binary(self.format("%Y-%m-%d").to_string().into_bytes())
    }
}

impl ToParam for NaiveDateTime {
    fn to_param(&self) -> Param {
        Param::Binary(self.format("%Y-%m-%d %H:%M:%S%.f").to_string().into_bytes())
    }
}

impl ToParam for DateTime<FixedOffset> {
    fn to_param(&self) -> Param {
        Param::Binary(self.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string().into_bytes())
    }
}

impl ToParam for DateTime<Utc> {
    fn to_param(&self) -> Param {
        Param::Binary(self.format("%Y-%m-%d %H:%M:%S%.f+00:00").to_string().into_bytes())
    }
}

/// Trait for encoding multiple parameters.
pub trait ToParams {
    /// Number of parameters.
    fn param_count(&self) -> usize;

    /// Render all parameters in order.
    fn to_params(&self) -> Vec<Param>;
}

impl ToParams for () {
    fn param_count(&self) -> usize {
        0
    }

    fn to_params(&self) -> Vec<Param> {
        Vec::new()
    }
}

impl<T: ToParams + ?Sized> ToParams for &T {
    fn param_count(&self) -> usize {
        (*self).param_count()
    }

    fn to_params(&self) -> Vec<Param> {
        (*self).to_params()
    }
}

impl<T: ToParam> ToParams for [T] {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn to_params(&self) -> Vec<Param> {
        self.iter().map(ToParam::to_param).collect()
    }
}

impl<T: ToParam> ToParams for Vec<T> {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn to_params(&self) -> Vec<Param> {
        self.as_slice().to_params()
    }
}

// Tuple implementations via macro
macro_rules! impl_to_params {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: ToParam),+> ToParams for ($($T,)+) {
            fn param_count(&self) -> usize {
                $count
            }

            fn to_params(&self) -> Vec<Param> {
                vec![$(self.$idx.to_param()),+]
            }
        }
    };
}

impl_to_params!(1, 0: T0);
impl_to_params!(2, 0: T0, 1: T1);
impl_to_params!(3, 0: T0, 1: T1, 2: T2);
impl_to_params!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_to_params!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_to_params!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_to_params!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_to_params!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
impl_to_params!(9, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8);
impl_to_params!(10, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9);
impl_to_params!(11, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10);
impl_to_params!(12, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10, 11: T11);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_not_empty() {
        let params = (None::<&str>, "").to_params();
        assert_eq!(params, vec![Param::Null, Param::Binary(Vec::new())]);
    }

    #[test]
    fn test_binary_safe() {
        let data: &[u8] = b"a\0b\xff";
        assert_eq!(data.to_param().as_bytes(), Some(data));
    }

    #[test]
    fn test_tuple_params() {
        let params = (42_i64, "Apple", true, 1.5_f64);
        assert_eq!(params.param_count(), 4);
        assert_eq!(
            params.to_params(),
            vec![
                Param::Binary(b"42".to_vec()),
                Param::Binary(b"Apple".to_vec()),
                Param::Binary(b"t".to_vec()),
                Param::Binary(b"1.5".to_vec()),
            ]
        );
    }

    #[test]
    fn test_vec_params() {
        let params = vec![Some(1), None, Some(3)];
        assert_eq!(params.param_count(), 3);
        assert!(params.to_params()[1].is_null());
    }
}
