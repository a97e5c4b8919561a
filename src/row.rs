//! Typecast rows and row decoding traits.

use std::sync::Arc;

use crate::conversion::{FromValue, Value};
use crate::error::{Error, Result};
use crate::result::Column;

/// One typecast row: column names in result order mapped to values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Value of the named column.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|i| self.values.get(i))
    }

    /// Value at a column index.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Decode the named column.
    pub fn try_get<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self
            .get(name)
            .ok_or_else(|| Error::Decode(format!("no column named {:?}", name)))?;
        T::from_value(value)
    }

    /// `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Builds application objects from rows.
///
/// Passed to [`ResultSet::each_mapped`](crate::result::ResultSet::each_mapped)
/// to take over row construction.
pub trait RowMapper {
    type Output;

    fn load(&self, row: Row) -> Result<Self::Output>;
}

impl<F, T> RowMapper for F
where
    F: Fn(Row) -> Result<T>,
{
    type Output = T;

    fn load(&self, row: Row) -> Result<T> {
        self(row)
    }
}

/// Trait for decoding a row into a Rust type.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

/// Decode a single column value.
fn decode_column<T: FromValue>(row: &Row, index: usize) -> Result<T> {
    let value = row
        .get_index(index)
        .ok_or_else(|| Error::Decode("not enough columns for tuple".into()))?;
    T::from_value(value)
}

macro_rules! impl_from_row {
    ($($idx:tt: $T:ident),+) => {
        impl<$($T: FromValue),+> FromRow for ($($T,)+) {
            fn from_row(row: &Row) -> Result<Self> {
                Ok(($(decode_column::<$T>(row, $idx)?,)+))
            }
        }
    };
}

impl_from_row!(0: T0);
impl_from_row!(0: T0, 1: T1);
impl_from_row!(0: T0, 1: T1, 2: T2);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_from_row!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
