//! Typecasting of raw column data.
//!
//! Drivers hand over every cell as untyped bytes plus the column's declared
//! [`WireType`]. The [`Typecaster`] turns those into [`Value`]s, and
//! [`FromValue`] extracts plain Rust types from them.

pub mod timestamp;

use std::str::FromStr;
use std::sync::LazyLock;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, Utc};
use num_bigint::BigInt;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// Declared type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Boolean,
    Int,
    Text,
    Time,
    Numeric,
    Float,
}

/// A typecast column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i128),
    /// INT value outside the `i128` range.
    BigInt(BigInt),
    /// Raw bytes; not necessarily UTF-8.
    Text(Vec<u8>),
    Timestamp(DateTime<FixedOffset>),
    Numeric(BigDecimal),
    Float(f64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text content, if this is UTF-8 text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(bytes) => simdutf8::basic::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Text(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Extract a typed value.
    pub fn get<T: FromValue>(&self) -> Result<T> {
        T::from_value(self)
    }
}

static LOCAL_OFFSET: LazyLock<FixedOffset> = LazyLock::new(|| Local::now().offset().fix());

/// Converts raw column bytes into [`Value`]s.
///
/// Carries the UTC offset used to interpret zone-less TIME columns, so the
/// result does not depend on hidden process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Typecaster {
    local_offset: FixedOffset,
}

impl Default for Typecaster {
    fn default() -> Self {
        Self::local()
    }
}

impl Typecaster {
    /// Typecaster interpreting zone-less timestamps at `local_offset`.
    pub fn new(local_offset: FixedOffset) -> Self {
        Self { local_offset }
    }

    /// Typecaster using the process's local offset, computed once.
    pub fn local() -> Self {
        Self::new(*LOCAL_OFFSET)
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.local_offset
    }

    /// Cast non-NULL column data.
    ///
    /// NULL cells never reach this function; see
    /// [`ResultSet`](crate::result::ResultSet). TIME never fails: unparseable
    /// timestamps come back as [`Value::Text`].
    pub fn cast(&self, ty: WireType, raw: &[u8]) -> Result<Value> {
        match ty {
            WireType::Boolean => Ok(Value::Bool(matches!(raw, b"t" | b"1"))),
            WireType::Int => parse_int(raw),
            WireType::Text => Ok(Value::Text(raw.to_vec())),
            WireType::Time => Ok(timestamp::cast_time(raw, self.local_offset)),
            WireType::Numeric => parse_numeric(raw).map(Value::Numeric),
            WireType::Float => parse_float(raw).map(Value::Float),
        }
    }
}

fn ascii_text(raw: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(raw).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
}

fn parse_int(raw: &[u8]) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::Int(0));
    }
    let s = ascii_text(raw)?.trim();
    if let Ok(i) = s.parse::<i128>() {
        return Ok(Value::Int(i));
    }
    BigInt::from_str(s)
        .map(Value::BigInt)
        .map_err(|e| Error::Decode(format!("invalid integer {:?}: {}", s, e)))
}

fn parse_numeric(raw: &[u8]) -> Result<BigDecimal> {
    if raw.is_empty() {
        return Ok(BigDecimal::from(0));
    }
    let s = ascii_text(raw)?.trim();
    if s == "NaN" {
        return Err(Error::Decode("NaN cannot be represented as a decimal".into()));
    }
    BigDecimal::from_str(s).map_err(|e| Error::Decode(format!("invalid decimal {:?}: {}", s, e)))
}

fn parse_float(raw: &[u8]) -> Result<f64> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    let s = ascii_text(raw)?.trim();
    match s {
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        _ => s
            .parse()
            .map_err(|e| Error::Decode(format!("invalid float {:?}: {}", s, e))),
    }
}

/// Trait for extracting Rust types from a [`Value`].
pub trait FromValue: Sized {
    /// Decode from NULL.
    ///
    /// Default implementation returns an error. Override for types that can
    /// represent NULL (like `Option<T>`).
    fn from_null() -> Result<Self> {
        Err(Error::Decode("unexpected NULL value".into()))
    }

    /// Decode from a non-NULL value.
    fn from_non_null(value: &Value) -> Result<Self>;

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Self::from_null(),
            other => Self::from_non_null(other),
        }
    }
}

fn mismatch<T>(value: &Value, target: &str) -> Result<T> {
    Err(Error::Decode(format!("cannot decode {:?} as {}", value, target)))
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn from_non_null(value: &Value) -> Result<Self> {
        T::from_non_null(value).map(Some)
    }
}

impl FromValue for Value {
    fn from_null() -> Result<Self> {
        Ok(Value::Null)
    }

    fn from_non_null(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_non_null(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::BigInt(_) => Ok(true),
            other => mismatch(other, "bool"),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),+) => {
        $(
            impl FromValue for $t {
                fn from_non_null(value: &Value) -> Result<Self> {
                    match value {
                        Value::Int(i) => <$t>::try_from(*i).map_err(|_| {
                            Error::Decode(format!("{} out of range for {}", i, stringify!($t)))
                        }),
                        Value::BigInt(i) => Err(Error::Decode(format!(
                            "{} out of range for {}",
                            i,
                            stringify!($t)
                        ))),
                        other => mismatch(other, stringify!($t)),
                    }
                }
            }
        )+
    };
}

impl_from_value_int!(i16, i32, i64, i128, u32, u64);

impl FromValue for f64 {
    fn from_non_null(value: &Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => mismatch(other, "f64"),
        }
    }
}

impl FromValue for BigInt {
    fn from_non_null(value: &Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(BigInt::from(*i)),
            Value::BigInt(i) => Ok(i.clone()),
            other => mismatch(other, "BigInt"),
        }
    }
}

impl FromValue for BigDecimal {
    fn from_non_null(value: &Value) -> Result<Self> {
        match value {
            Value::Numeric(d) => Ok(d.clone()),
            Value::Int(i) => Ok(BigDecimal::new(BigInt::from(*i), 0)),
            Value::BigInt(i) => Ok(BigDecimal::new(i.clone(), 0)),
            other => mismatch(other, "BigDecimal"),
        }
    }
}

/// Narrowing to `rust_decimal`; fails rather than rounding.
impl FromValue for Decimal {
    fn from_non_null(value: &Value) -> Result<Self> {
        match value {
            Value::Numeric(d) => decimal_from_big(d),
            Value::Int(i) => decimal_from_parts(*i, 0),
            other => mismatch(other, "Decimal"),
        }
    }
}

fn decimal_from_big(d: &BigDecimal) -> Result<Decimal> {
    let (digits, scale) = d.as_bigint_and_exponent();
    let (digits, scale) = if scale < 0 {
        d.with_scale(0).into_bigint_and_exponent()
    } else {
        (digits, scale)
    };
    let out_of_range = || Error::Decode(format!("{} out of range for Decimal", d));
    let mantissa = i128::try_from(&digits).map_err(|_| out_of_range())?;
    let scale = u32::try_from(scale).map_err(|_| out_of_range())?;
    decimal_from_parts(mantissa, scale)
}

fn decimal_from_parts(mantissa: i128, scale: u32) -> Result<Decimal> {
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map_err(|e| Error::Decode(format!("{} out of range for Decimal: {}", mantissa, e)))
}

impl FromValue for String {
    fn from_non_null(value: &Value) -> Result<Self> {
        match value {
            Value::Text(bytes) => ascii_text(bytes).map(str::to_owned),
            other => mismatch(other, "String"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_non_null(value: &Value) -> Result<Self> {
        match value {
            Value::Text(bytes) => Ok(bytes.clone()),
            other => mismatch(other, "Vec<u8>"),
        }
    }
}

impl FromValue for DateTime<FixedOffset> {
    fn from_non_null(value: &Value) -> Result<Self> {
        match value {
            Value::Timestamp(dt) => Ok(*dt),
            Value::Text(bytes) => timestamp::parse_datetime(ascii_text(bytes)?),
            other => mismatch(other, "DateTime"),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_non_null(value: &Value) -> Result<Self> {
        DateTime::<FixedOffset>::from_non_null(value).map(|dt| dt.with_timezone(&Utc))
    }
}

impl FromValue for NaiveDateTime {
    fn from_non_null(value: &Value) -> Result<Self> {
        DateTime::<FixedOffset>::from_non_null(value).map(|dt| dt.naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caster() -> Typecaster {
        Typecaster::new(FixedOffset::east_opt(0).unwrap())
    }

    #[test]
    fn test_boolean() {
        let c = caster();
        assert_eq!(c.cast(WireType::Boolean, b"t").unwrap(), Value::Bool(true));
        assert_eq!(c.cast(WireType::Boolean, b"1").unwrap(), Value::Bool(true));
        assert_eq!(c.cast(WireType::Boolean, b"f").unwrap(), Value::Bool(false));
        assert_eq!(c.cast(WireType::Boolean, b"").unwrap(), Value::Bool(false));
        assert_eq!(c.cast(WireType::Boolean, b"true").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_int_beyond_64_bits() {
        let c = caster();
        assert_eq!(
            c.cast(WireType::Int, b"-170141183460469231731687303715884105728").unwrap(),
            Value::Int(i128::MIN)
        );
        assert_eq!(
            c.cast(WireType::Int, b"18446744073709551616").unwrap(),
            Value::Int(1 << 64)
        );
        assert_eq!(c.cast(WireType::Int, b"").unwrap(), Value::Int(0));
        assert!(matches!(c.cast(WireType::Int, b"12abc"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_int_beyond_128_bits() {
        let c = caster();
        let digits = "-1234567890123456789012345678901234567890";
        let value = c.cast(WireType::Int, digits.as_bytes()).unwrap();
        assert_eq!(value, Value::BigInt(BigInt::from_str(digits).unwrap()));
        assert_eq!(value.get::<BigInt>().unwrap().to_string(), digits);
        assert!(matches!(value.get::<i64>(), Err(Error::Decode(_))));
        assert_eq!(
            Value::Int(7).get::<BigInt>().unwrap(),
            BigInt::from(7)
        );
    }

    #[test]
    fn test_text_is_binary_safe() {
        let raw = b"a\0b\xff\xfe";
        assert_eq!(
            caster().cast(WireType::Text, raw).unwrap(),
            Value::Text(raw.to_vec())
        );
    }

    #[test]
    fn test_numeric_keeps_precision() {
        let value = caster()
            .cast(WireType::Numeric, b"12345678901234567890.123")
            .unwrap();
        assert_eq!(
            value,
            Value::Numeric(BigDecimal::from_str("12345678901234567890.123").unwrap())
        );
        let d = value.get::<Decimal>().unwrap();
        assert_eq!(d.to_string(), "12345678901234567890.123");
        assert_eq!(d.scale(), 3);
    }

    #[test]
    fn test_numeric_beyond_decimal_range() {
        let text = "1234567890123456789012345678901234567890.0123456789";
        let value = caster().cast(WireType::Numeric, text.as_bytes()).unwrap();
        let Value::Numeric(d) = &value else {
            panic!("expected numeric");
        };
        let (digits, scale) = d.as_bigint_and_exponent();
        assert_eq!(scale, 10);
        assert_eq!(
            digits.to_string(),
            "12345678901234567890123456789012345678900123456789"
        );
        assert!(matches!(value.get::<Decimal>(), Err(Error::Decode(_))));
        assert_eq!(value.get::<BigDecimal>().unwrap(), *d);

        let small = caster()
            .cast(WireType::Numeric, b"1234567890123456789012345678901.5")
            .unwrap();
        assert_eq!(
            small,
            Value::Numeric(BigDecimal::new(BigInt::from(12345678901234567890123456789015_i128), 1))
        );
    }

    #[test]
    fn test_numeric_edge_cases() {
        let c = caster();
        assert_eq!(
            c.cast(WireType::Numeric, b"").unwrap(),
            Value::Numeric(BigDecimal::from(0))
        );
        assert!(matches!(c.cast(WireType::Numeric, b"NaN"), Err(Error::Decode(_))));
        assert_eq!(
            c.cast(WireType::Numeric, b"1.5e3").unwrap().get::<Decimal>().unwrap(),
            Decimal::from(1500)
        );
    }

    #[test]
    fn test_float() {
        let c = caster();
        assert_eq!(c.cast(WireType::Float, b"1.5").unwrap(), Value::Float(1.5));
        assert_eq!(c.cast(WireType::Float, b"-2e3").unwrap(), Value::Float(-2000.0));
        assert_eq!(c.cast(WireType::Float, b"").unwrap(), Value::Float(0.0));
        assert_eq!(
            c.cast(WireType::Float, b"-Infinity").unwrap(),
            Value::Float(f64::NEG_INFINITY)
        );
        assert!(c.cast(WireType::Float, b"abc").is_err());
    }

    #[test]
    fn test_time_soft_failure() {
        assert_eq!(
            caster().cast(WireType::Time, b"garbage").unwrap(),
            Value::Text(b"garbage".to_vec())
        );
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Value::Int(42).get::<i32>().unwrap(), 42);
        assert!(Value::Int(1 << 40).get::<i32>().is_err());
        assert_eq!(Value::Null.get::<Option<i64>>().unwrap(), None);
        assert!(Value::Null.get::<i64>().is_err());
        assert_eq!(
            Value::Text(b"hello".to_vec()).get::<String>().unwrap(),
            "hello"
        );
        assert_eq!(
            Value::Int(7).get::<Decimal>().unwrap(),
            Decimal::from(7)
        );
    }
}
