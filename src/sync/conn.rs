//! Synchronous database connection.

use std::panic::{self, AssertUnwindSafe};

use crate::conversion::Typecaster;
use crate::copy::{CopyIn, CopySink};
use crate::driver::{self, Driver, Session};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::param::ToParams;
use crate::result::ResultSet;
use crate::trace;
use crate::transaction::Savepoints;

use super::Statement;

/// Synchronous database connection.
///
/// Owns one driver session. Operations run in call order; a connection-level
/// failure marks the connection broken.
pub struct Conn {
    session: Box<dyn Session>,
    opts: Opts,
    caster: Typecaster,
    savepoints: Savepoints,
    is_broken: bool,
    closed: bool,
}

impl Conn {
    /// Connect through the driver registered under `opts.driver`.
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        opts.validate()?;
        let driver = driver::driver(&opts.driver)?;
        Self::with_driver(driver.as_ref(), opts)
    }

    /// Connect through an explicit driver, bypassing the registry.
    pub fn with_driver(driver: &dyn Driver, opts: Opts) -> Result<Self> {
        opts.validate()?;
        let session = driver.connect(&opts)?;
        tracing::debug!(
            driver = %opts.driver,
            database = %opts.database,
            host = %opts.host,
            "connected"
        );
        let caster = opts
            .timezone
            .map(Typecaster::new)
            .unwrap_or_else(Typecaster::local);
        Ok(Self {
            session,
            opts,
            caster,
            savepoints: Savepoints::new(),
            is_broken: false,
            closed: false,
        })
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Typecaster applied to results of this connection.
    pub fn typecaster(&self) -> Typecaster {
        self.caster
    }

    /// Check if the connection is broken.
    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    /// Check if a transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.savepoints.is_empty()
    }

    /// Active savepoints, outermost first.
    pub fn savepoints(&self) -> &Savepoints {
        &self.savepoints
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            if e.is_connection_broken() {
                self.is_broken = true;
            }
        }
        result
    }

    /// Execute a command, returning the number of rows affected.
    ///
    /// Without parameters the command is sent as is. With parameters it is
    /// prepared, executed once and released.
    pub fn execute<P: ToParams>(&mut self, sql: &str, params: P) -> Result<u64> {
        let params = params.to_params();
        trace::statement(sql, &params);
        let result = if params.is_empty() {
            self.session.execute(sql)
        } else {
            self.execute_prepared(sql, &params)
        };
        self.check(result)
    }

    fn execute_prepared(&mut self, sql: &str, params: &[crate::param::Param]) -> Result<u64> {
        let mut command = self.session.prepare(sql)?;
        let executed = command.execute(params);
        let finished = command.finish();
        let raw = executed?;
        finished?;
        Ok(raw.affected_rows)
    }

    /// Run a query and buffer its rows.
    pub fn query<P: ToParams>(&mut self, sql: &str, params: P) -> Result<ResultSet> {
        let params = params.to_params();
        trace::statement(sql, &params);
        let result = self.session.query(sql, &params);
        let raw = self.check(result)?;
        Ok(ResultSet::new(raw, self.caster))
    }

    /// Prepare a statement.
    pub fn prepare(&mut self, sql: &str) -> Result<Statement> {
        let result = self.session.prepare(sql);
        let command = self.check(result)?;
        Ok(Statement::new(command, self.caster))
    }

    /// Check that the server still answers.
    pub fn ping(&mut self) -> Result<()> {
        let result = self.session.ping();
        self.check(result)
    }

    /// Open a transaction, or a savepoint when one is already open.
    ///
    /// Returns the savepoint name, generated when `name` is `None`.
    pub fn begin(&mut self, name: Option<&str>) -> Result<String> {
        let result = self.savepoints.begin(self.session.as_mut(), name);
        self.check(result)
    }

    /// Commit the savepoint `name`, which must be the innermost one, or the
    /// whole transaction when `name` is `None`.
    pub fn commit(&mut self, name: Option<&str>) -> Result<()> {
        let result = self.savepoints.commit(self.session.as_mut(), name);
        self.check(result)
    }

    /// Roll back to the savepoint `name`, or the whole transaction when `name`
    /// is `None`.
    pub fn rollback(&mut self, name: Option<&str>) -> Result<()> {
        let result = self.savepoints.rollback(self.session.as_mut(), name);
        self.check(result)
    }

    /// Run `body` inside a transaction or savepoint.
    ///
    /// On success the savepoint is committed if it is still the innermost one.
    /// On error or panic it is rolled back if still innermost, and the
    /// original failure is passed on. A failing rollback is only logged.
    pub fn transaction<F, R>(&mut self, name: Option<&str>, body: F) -> Result<R>
    where
        F: FnOnce(&mut Conn) -> Result<R>,
    {
        let name = self.begin(name)?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        match outcome {
            Ok(Ok(value)) => {
                if self.savepoints.top() == Some(name.as_str()) {
                    self.commit(Some(&name))?;
                }
                Ok(value)
            }
            Ok(Err(e)) => {
                self.rollback_if_innermost(&name);
                Err(e)
            }
            Err(payload) => {
                self.rollback_if_innermost(&name);
                panic::resume_unwind(payload)
            }
        }
    }

    fn rollback_if_innermost(&mut self, name: &str) {
        if self.savepoints.top() != Some(name) {
            return;
        }
        if let Err(e) = self.rollback(Some(name)) {
            tracing::warn!(savepoint = %name, error = %e, "rollback failed");
        }
    }

    /// Stream `chunks` into `table` with `COPY ... FROM STDIN`.
    ///
    /// Chunks are pulled lazily, one at a time. Returns the number of rows written.
    pub fn copy_in<I>(&mut self, table: &str, fields: &[&str], chunks: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        if trace::is_enabled() {
            trace::statement(&format!("COPY {} ({}) FROM STDIN", table, fields.join(", ")), &[]);
        }
        let mut source = CopyIn::new(chunks);
        let result = self.session.copy_in(table, fields, &mut source);
        self.check(result)
    }

    /// Run a `COPY ... TO STDOUT` command, handing its data to `sink`.
    ///
    /// Returns the number of rows read.
    pub fn copy_out<S: CopySink>(&mut self, sql: &str, sink: &mut S) -> Result<u64> {
        trace::statement(sql, &[]);
        let result = self.session.copy_out(sql, sink);
        self.check(result)
    }

    /// Close the connection gracefully.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.session.close()
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if !self.closed {
            // Ignore errors, the session is going away either way
            let _ = self.session.close();
        }
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("driver", &self.opts.driver)
            .field("database", &self.opts.database)
            .field("savepoints", &self.savepoints.names())
            .field("is_broken", &self.is_broken)
            .finish()
    }
}
