//! Buffered result sets.

use std::sync::Arc;

use crate::conversion::{Typecaster, Value, WireType};
use crate::error::Result;
use crate::row::{FromRow, Row, RowMapper};

/// Raw cell data; `None` is SQL NULL.
pub type RawRow = Vec<Option<Vec<u8>>>;

/// Result column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: WireType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: WireType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Result of one command as delivered by a driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub columns: Vec<Column>,
    pub rows: Vec<RawRow>,
    /// Rows changed by a data-modifying command.
    pub affected_rows: u64,
    /// Identifier generated by the last insert, if the driver reports one.
    pub insert_id: Option<u64>,
}

impl RawResult {
    /// Result of a command that returns no rows.
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    /// Result of a query.
    pub fn with_rows(columns: Vec<Column>, rows: Vec<RawRow>) -> Self {
        Self {
            affected_rows: rows.len() as u64,
            columns,
            rows,
            insert_id: None,
        }
    }
}

/// A buffered result with a forward row cursor.
///
/// Values are typecast lazily, when a row is visited.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Arc<[Column]>,
    rows: Vec<RawRow>,
    affected_rows: u64,
    insert_id: Option<u64>,
    cursor: usize,
    caster: Typecaster,
}

impl ResultSet {
    pub fn new(raw: RawResult, caster: Typecaster) -> Self {
        Self {
            columns: raw.columns.into(),
            rows: raw.rows,
            affected_rows: raw.affected_rows,
            insert_id: raw.insert_id,
            cursor: 0,
            caster,
        }
    }

    /// Rows returned by a query, or rows affected by a command without a
    /// result set.
    pub fn rows(&self) -> u64 {
        if self.columns.is_empty() {
            self.affected_rows
        } else {
            self.rows.len() as u64
        }
    }

    /// Last generated identifier; only reported when [`rows`](Self::rows) is nonzero.
    pub fn insert_id(&self) -> Option<u64> {
        if self.rows() > 0 {
            self.insert_id
        } else {
            None
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn fields(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn types(&self) -> Vec<WireType> {
        self.columns.iter().map(|c| c.ty).collect()
    }

    /// Current cursor position (0-based).
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Raw values of the row under the cursor, advancing it.
    ///
    /// Returns `None` once the cursor is past the last row.
    pub fn fetchrow(&mut self) -> Option<&[Option<Vec<u8>>]> {
        let row = self.rows.get(self.cursor)?;
        self.cursor += 1;
        Some(row.as_slice())
    }

    /// Typecast the row at `index` without moving the cursor.
    pub fn row(&self, index: usize) -> Option<Result<Row>> {
        self.rows.get(index).map(|raw| self.cast_row(raw))
    }

    fn cast_row(&self, raw: &[Option<Vec<u8>>]) -> Result<Row> {
        let values = self
            .columns
            .iter()
            .zip(raw)
            .map(|(column, cell)| match cell {
                Some(data) => self.caster.cast(column.ty, data),
                None => Ok(Value::Null),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Row::new(Arc::clone(&self.columns), values))
    }

    /// Iterate the remaining rows, advancing the cursor.
    pub fn iter(&mut self) -> Rows<'_> {
        Rows { result: self }
    }

    /// Visit every remaining row in order. Leaves the cursor at the end; call
    /// [`rewind`](Self::rewind) to visit the rows again.
    pub fn each<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(Row) -> Result<()>,
    {
        for row in self.iter() {
            visit(row?)?;
        }
        Ok(())
    }

    /// Like [`each`](Self::each), with rows built by `mapper`.
    pub fn each_mapped<M, F>(&mut self, mapper: &M, mut visit: F) -> Result<()>
    where
        M: RowMapper,
        F: FnMut(M::Output) -> Result<()>,
    {
        for row in self.iter() {
            visit(mapper.load(row?)?)?;
        }
        Ok(())
    }

    /// Decode the remaining rows.
    pub fn collect<T: FromRow>(&mut self) -> Result<Vec<T>> {
        self.iter().map(|row| T::from_row(&row?)).collect()
    }
}

/// Iterator over the remaining rows of a [`ResultSet`].
pub struct Rows<'a> {
    result: &'a mut ResultSet,
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.result.rows.get(self.result.cursor)?;
        let row = self.result.cast_row(raw);
        self.result.cursor += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.result.rows.len().saturating_sub(self.result.cursor);
        (left, Some(left))
    }
}
