//! Prepared statements.

use crate::conversion::{Typecaster, WireType};
use crate::driver::PreparedCommand;
use crate::error::{Error, Result};
use crate::param::ToParams;
use crate::result::{Column, RawRow, ResultSet, Rows};
use crate::row::{Row, RowMapper};
use crate::trace;

/// A prepared statement and the result of its last execution.
///
/// Created by [`Conn::prepare`](super::Conn::prepare). The statement can be
/// executed any number of times; each execution replaces the buffered result
/// and resets the row cursor.
pub struct Statement {
    command: Box<dyn PreparedCommand>,
    caster: Typecaster,
    result: Option<ResultSet>,
}

impl Statement {
    pub(crate) fn new(command: Box<dyn PreparedCommand>, caster: Typecaster) -> Self {
        Self {
            command,
            caster,
            result: None,
        }
    }

    /// SQL text this statement was prepared from.
    pub fn command(&self) -> &str {
        self.command.command()
    }

    /// Bind `params` and execute.
    ///
    /// A failed execution discards the previous result.
    pub fn execute<P: ToParams>(&mut self, params: P) -> Result<&mut Self> {
        let params = params.to_params();
        trace::statement(self.command.command(), &params);
        self.result = None;
        let raw = self.command.execute(&params)?;
        self.result = Some(ResultSet::new(raw, self.caster));
        Ok(self)
    }

    /// Release server resources. The buffered result stays readable.
    pub fn finish(&mut self) -> Result<()> {
        self.command.finish()
    }

    /// Result of the last execution, if any.
    pub fn result(&self) -> Option<&ResultSet> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Option<ResultSet> {
        self.result
    }

    fn executed(&self) -> Result<&ResultSet> {
        self.result
            .as_ref()
            .ok_or_else(|| Error::InvalidUsage("statement has not been executed".into()))
    }

    fn executed_mut(&mut self) -> Result<&mut ResultSet> {
        self.result
            .as_mut()
            .ok_or_else(|| Error::InvalidUsage("statement has not been executed".into()))
    }

    pub fn rows(&self) -> Result<u64> {
        Ok(self.executed()?.rows())
    }

    pub fn insert_id(&self) -> Result<Option<u64>> {
        Ok(self.executed()?.insert_id())
    }

    pub fn columns(&self) -> Result<&[Column]> {
        Ok(self.executed()?.columns())
    }

    pub fn fields(&self) -> Result<Vec<&str>> {
        Ok(self.executed()?.fields())
    }

    pub fn types(&self) -> Result<Vec<WireType>> {
        Ok(self.executed()?.types())
    }

    /// Visit the remaining rows in order, typecast.
    pub fn each<F>(&mut self, visit: F) -> Result<()>
    where
        F: FnMut(Row) -> Result<()>,
    {
        self.executed_mut()?.each(visit)
    }

    /// Visit the remaining rows as built by `mapper`.
    pub fn each_mapped<M, F>(&mut self, mapper: &M, visit: F) -> Result<()>
    where
        M: RowMapper,
        F: FnMut(M::Output) -> Result<()>,
    {
        self.executed_mut()?.each_mapped(mapper, visit)
    }

    pub fn iter(&mut self) -> Result<Rows<'_>> {
        Ok(self.executed_mut()?.iter())
    }

    /// Raw values of the next row, without typecasting.
    pub fn fetchrow(&mut self) -> Result<Option<RawRow>> {
        Ok(self.executed_mut()?.fetchrow().map(<[_]>::to_vec))
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.executed_mut()?.rewind();
        Ok(())
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("command", &self.command.command())
            .field("result", &self.result)
            .finish()
    }
}
