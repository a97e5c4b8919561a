//! Driver seam and driver registry.
//!
//! A driver turns [`Opts`] into a live [`Session`]; everything vendor specific
//! (wire framing, authentication, COPY sub-protocol) lives behind these traits.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::{Arc, LazyLock, RwLock};

use crate::copy::{CopySink, CopySource};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::param::Param;
use crate::result::RawResult;

/// Factory for sessions of one database vendor.
pub trait Driver: Send + Sync {
    /// Open a new session.
    fn connect(&self, opts: &Opts) -> Result<Box<dyn Session>>;
}

/// One live database session.
pub trait Session: Send {
    /// Run a command without bind parameters, returning rows affected.
    fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run a query and buffer its whole result.
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<RawResult>;

    /// Prepare a command for repeated execution.
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn PreparedCommand>>;

    /// Stream rows into `table` from `source`, returning rows written.
    ///
    /// An empty `fields` list means every column of the table.
    fn copy_in(&mut self, table: &str, fields: &[&str], source: &mut dyn CopySource)
    -> Result<u64>;

    /// Run a `COPY ... TO` command and hand its data to `sink`, returning rows read.
    fn copy_out(&mut self, sql: &str, sink: &mut dyn CopySink) -> Result<u64> {
        let _ = (sql, sink);
        Err(Error::Unsupported("copy out".into()))
    }

    /// Dispatch a query without waiting for its result.
    fn send_query(&mut self, sql: &str, params: &[Param]) -> Result<()>;

    /// Consume whatever input is available without blocking.
    ///
    /// Returns `Ok(None)` while the result of the last [`send_query`](Self::send_query)
    /// is still incomplete.
    fn poll_result(&mut self) -> Result<Option<RawResult>>;

    /// Ask the server to abandon the query in flight.
    fn cancel(&mut self) -> Result<()>;

    /// Descriptor that becomes readable when the session has input.
    fn socket(&self) -> RawFd;

    fn ping(&mut self) -> Result<()> {
        self.execute("SELECT 1").map(|_| ())
    }

    fn close(&mut self) -> Result<()>;

    fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN").map(|_| ())
    }

    fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").map(|_| ())
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("SAVEPOINT {}", name)).map(|_| ())
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("RELEASE SAVEPOINT {}", name))
            .map(|_| ())
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .map(|_| ())
    }
}

/// A server-side prepared command.
pub trait PreparedCommand: Send {
    /// Bind `params` and execute, buffering the result.
    fn execute(&mut self, params: &[Param]) -> Result<RawResult>;

    /// Release server resources. Executing afterwards re-prepares if the
    /// driver supports it.
    fn finish(&mut self) -> Result<()>;

    /// SQL text of the command.
    fn command(&self) -> &str;
}

static DRIVERS: LazyLock<RwLock<HashMap<String, Arc<dyn Driver>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Register `driver` under `name`, replacing any earlier registration.
pub fn register_driver(name: impl Into<String>, driver: Arc<dyn Driver>) {
    let name = name.into();
    tracing::debug!(driver = %name, "registering driver");
    let mut drivers = DRIVERS.write().unwrap_or_else(|e| e.into_inner());
    drivers.insert(name, driver);
}

/// Look up a registered driver.
pub fn driver(name: &str) -> Result<Arc<dyn Driver>> {
    let drivers = DRIVERS.read().unwrap_or_else(|e| e.into_inner());
    drivers
        .get(name)
        .cloned()
        .ok_or_else(|| Error::InvalidUsage(format!("unknown driver: {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    impl Driver for Refusing {
        fn connect(&self, opts: &Opts) -> Result<Box<dyn Session>> {
            Err(Error::Connection(format!("refused {}", opts.database)))
        }
    }

    #[test]
    fn test_registry() {
        assert!(matches!(
            driver("zero-dbi-test-missing"),
            Err(Error::InvalidUsage(_))
        ));

        register_driver("zero-dbi-test-refusing", Arc::new(Refusing));
        let d = driver("zero-dbi-test-refusing").unwrap();
        let opts = Opts {
            database: "app".into(),
            ..Opts::default()
        };
        match d.connect(&opts) {
            Err(Error::Connection(msg)) => assert_eq!(msg, "refused app"),
            _ => panic!("expected connection error"),
        }
    }
}
