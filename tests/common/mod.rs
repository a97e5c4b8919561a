//! Scripted in-process driver shared by the integration tests.
//!
//! Every session records the commands it receives. Query results are looked
//! up by SQL text, and readiness for pool requests is signalled over a real
//! `UnixStream` pair so the descriptors work with any event loop.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex, MutexGuard};

use zero_dbi::copy::{CopySink, CopySource};
use zero_dbi::driver::{Driver, PreparedCommand, Session};
use zero_dbi::error::{Error, ErrorFields, Result};
use zero_dbi::trace::format_params;
use zero_dbi::{Column, Opts, Param, RawResult, WireType};

#[derive(Clone, Copy)]
pub enum Failure {
    Execution,
    Connection,
}

impl Failure {
    fn error(self, sql: &str) -> Error {
        match self {
            Failure::Execution => Error::Execution(ErrorFields {
                severity: Some("ERROR".into()),
                code: Some("42601".into()),
                message: Some(format!("syntax error in {}", sql)),
                ..ErrorFields::default()
            }),
            Failure::Connection => Error::Connection("server closed the connection".into()),
        }
    }
}

#[derive(Default)]
struct State {
    log: Vec<String>,
    results: HashMap<String, RawResult>,
    failures: HashMap<String, Failure>,
    copied: Vec<u8>,
    copy_out: Vec<Vec<u8>>,
    peers: HashMap<RawFd, UnixStream>,
    connects: usize,
    refuse: bool,
    auto_complete: bool,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<State>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Result returned for `sql`, by queries, prepared commands and requests.
    pub fn on(&self, sql: &str, result: RawResult) -> &Self {
        self.state().results.insert(sql.to_string(), result);
        self
    }

    pub fn fail(&self, sql: &str, failure: Failure) -> &Self {
        self.state().failures.insert(sql.to_string(), failure);
        self
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state().refuse = refuse;
    }

    /// Make requests readable as soon as they are sent.
    pub fn auto_complete(&self, enabled: bool) {
        self.state().auto_complete = enabled;
    }

    pub fn copy_out_data(&self, chunks: &[&[u8]]) {
        self.state().copy_out = chunks.iter().map(|c| c.to_vec()).collect();
    }

    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut self.state().log)
    }

    pub fn copied(&self) -> Vec<u8> {
        self.state().copied.clone()
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    /// Deliver the pending result of the session behind `socket`.
    pub fn signal(&self, socket: RawFd) {
        let mut state = self.state();
        let peer = state.peers.get_mut(&socket).expect("unknown socket");
        peer.write_all(b"!").unwrap();
    }

    pub fn opts() -> Opts {
        Opts {
            driver: "mock".into(),
            database: "shop".into(),
            user: "app".into(),
            ..Opts::default()
        }
    }

    fn respond(&self, sql: &str) -> Result<RawResult> {
        let state = self.state();
        if let Some(failure) = state.failures.get(sql) {
            return Err(failure.error(sql));
        }
        Ok(state
            .results
            .get(sql)
            .cloned()
            .unwrap_or_else(|| RawResult::affected(1)))
    }

    fn record(&self, entry: String) {
        self.state().log.push(entry);
    }
}

impl Driver for MockDriver {
    fn connect(&self, _opts: &Opts) -> Result<Box<dyn Session>> {
        let mut state = self.state();
        if state.refuse {
            return Err(Error::Connection("connection refused".into()));
        }
        state.connects += 1;
        let (ours, theirs) = UnixStream::pair()?;
        ours.set_nonblocking(true)?;
        state.peers.insert(ours.as_raw_fd(), theirs);
        drop(state);
        Ok(Box::new(MockSession {
            driver: self.clone(),
            socket: ours,
            pending: None,
            closed: false,
        }))
    }
}

pub struct MockSession {
    driver: MockDriver,
    socket: UnixStream,
    pending: Option<Result<RawResult>>,
    closed: bool,
}

impl MockSession {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionBroken);
        }
        Ok(())
    }

    /// Read everything available; true if anything arrived.
    fn drain(&mut self) -> Result<bool> {
        let mut buf = [0u8; 64];
        let mut got = false;
        loop {
            match self.socket.read(&mut buf) {
                Ok(0) => return Err(Error::Connection("peer hung up".into())),
                Ok(_) => got = true,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(got),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Session for MockSession {
    fn execute(&mut self, sql: &str) -> Result<u64> {
        self.check_open()?;
        self.driver.record(sql.to_string());
        self.driver.respond(sql).map(|r| r.affected_rows)
    }

    fn query(&mut self, sql: &str, params: &[Param]) -> Result<RawResult> {
        self.check_open()?;
        self.driver.record(format_params(sql, params));
        self.driver.respond(sql)
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn PreparedCommand>> {
        self.check_open()?;
        self.driver.record(format!("PREPARE {}", sql));
        Ok(Box::new(MockCommand {
            driver: self.driver.clone(),
            sql: sql.to_string(),
        }))
    }

    fn copy_in(&mut self, table: &str, fields: &[&str], source: &mut dyn CopySource) -> Result<u64> {
        self.check_open()?;
        self.driver
            .record(format!("COPY {} ({}) FROM STDIN", table, fields.join(", ")));
        let mut data = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = source.read_into(&mut buf)?;
            if n == 0 {
                break;
            }
            assert!(n <= buf.len());
            data.extend_from_slice(&buf[..n]);
        }
        let rows = data.iter().filter(|&&b| b == b'\n').count() as u64;
        self.driver.state().copied.extend_from_slice(&data);
        Ok(rows)
    }

    fn copy_out(&mut self, sql: &str, sink: &mut dyn CopySink) -> Result<u64> {
        self.check_open()?;
        self.driver.record(sql.to_string());
        let chunks = self.driver.state().copy_out.clone();
        for chunk in &chunks {
            sink.write(chunk)?;
        }
        Ok(chunks.len() as u64)
    }

    fn send_query(&mut self, sql: &str, params: &[Param]) -> Result<()> {
        self.check_open()?;
        self.driver.record(format_params(sql, params));
        self.pending = Some(self.driver.respond(sql));
        let auto_complete = self.driver.state().auto_complete;
        if auto_complete {
            self.driver.signal(self.socket.as_raw_fd());
        }
        Ok(())
    }

    fn poll_result(&mut self) -> Result<Option<RawResult>> {
        self.check_open()?;
        if !self.drain()? {
            return Ok(None);
        }
        match self.pending.take() {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.check_open()?;
        self.driver.record("CANCEL".into());
        self.pending = None;
        self.drain()?;
        Ok(())
    }

    fn socket(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.driver.record("CLOSE".into());
        }
        Ok(())
    }
}

pub struct MockCommand {
    driver: MockDriver,
    sql: String,
}

impl PreparedCommand for MockCommand {
    fn execute(&mut self, params: &[Param]) -> Result<RawResult> {
        self.driver
            .record(format!("EXECUTE {}", format_params(&self.sql, params)));
        self.driver.respond(&self.sql)
    }

    fn finish(&mut self) -> Result<()> {
        self.driver.record(format!("FINISH {}", self.sql));
        Ok(())
    }

    fn command(&self) -> &str {
        &self.sql
    }
}

/// `users` table fixture: `id`, `name`, `balance`, `created_at`, `active`.
pub fn users() -> RawResult {
    RawResult::with_rows(
        vec![
            Column::new("id", WireType::Int),
            Column::new("name", WireType::Text),
            Column::new("balance", WireType::Numeric),
            Column::new("created_at", WireType::Time),
            Column::new("active", WireType::Boolean),
        ],
        vec![
            vec![
                Some(b"1".to_vec()),
                Some(b"Apple".to_vec()),
                Some(b"12345678901234567890.123".to_vec()),
                Some(b"2010-03-09 14:22:07.25+11".to_vec()),
                Some(b"t".to_vec()),
            ],
            vec![
                Some(b"2".to_vec()),
                Some(b"Benny".to_vec()),
                None,
                Some(b"2010-03-09 14:22:07".to_vec()),
                Some(b"f".to_vec()),
            ],
        ],
    )
}
