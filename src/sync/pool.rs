//! Fixed-size connection pool with asynchronous dispatch.

use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_queue::ArrayQueue;
use std_semaphore::Semaphore;

use crate::conversion::Typecaster;
use crate::driver::{self, Driver, Session};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::param::{Param, ToParams};
use crate::result::ResultSet;
use crate::trace;

use super::Request;

pub(super) type Callback = Box<dyn FnOnce(ResultSet) + Send>;

pub(super) struct Slot {
    /// `None` once the pool is closed.
    pub(super) session: Option<Box<dyn Session>>,
    pub(super) is_broken: bool,
}

pub(super) struct Shared {
    driver: Arc<dyn Driver>,
    opts: Opts,
    pub(super) caster: Typecaster,
    slots: Vec<Mutex<Slot>>,
    idle: ArrayQueue<usize>,
    /// One permit per idle slot. A dispatcher takes a permit before popping
    /// from `idle`, and a returned slot is pushed before its permit is released.
    semaphore: Semaphore,
    /// Permits not yet claimed by a dispatcher. Never above the semaphore
    /// count, so a positive value lets `try_execute` claim without blocking.
    available: AtomicIsize,
    closed: AtomicBool,
}

impl Shared {
    pub(super) fn lock(&self, slot: usize) -> MutexGuard<'_, Slot> {
        self.slots[slot].lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand a slot back to the pool.
    pub(super) fn release(&self, slot: usize) {
        let _ = self.idle.push(slot);
        self.semaphore.release();
        self.available.fetch_add(1, Ordering::SeqCst);
    }

    /// Pop an idle slot once a permit is held.
    fn take_idle(&self) -> Result<usize> {
        if self.is_closed() {
            // Pass the wake-up on to the next blocked dispatcher
            self.semaphore.release();
            return Err(Error::Connection("pool is closed".into()));
        }
        self.idle
            .pop()
            .ok_or_else(|| Error::Connection("pool has no idle slot".into()))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A fixed set of sessions, each running at most one [`Request`] at a time.
///
/// Cloning a `Pool` is cheap and yields another handle to the same sessions.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    /// Connect `size` sessions through the driver registered under `opts.driver`.
    pub fn new<O: TryInto<Opts>>(size: usize, opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        opts.validate()?;
        let driver = driver::driver(&opts.driver)?;
        Self::with_driver(driver, size, opts)
    }

    /// Connect `size` sessions through an explicit driver.
    pub fn with_driver(driver: Arc<dyn Driver>, size: usize, opts: Opts) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidUsage("pool size must be at least 1".into()));
        }
        opts.validate()?;

        let idle = ArrayQueue::new(size);
        let mut slots = Vec::with_capacity(size);
        for i in 0..size {
            let session = driver.connect(&opts)?;
            slots.push(Mutex::new(Slot {
                session: Some(session),
                is_broken: false,
            }));
            let _ = idle.push(i);
        }
        tracing::debug!(size, driver = %opts.driver, database = %opts.database, "pool connected");

        let caster = opts
            .timezone
            .map(Typecaster::new)
            .unwrap_or_else(Typecaster::local);
        Ok(Self {
            shared: Arc::new(Shared {
                driver,
                opts,
                caster,
                slots,
                idle,
                semaphore: Semaphore::new(size as isize),
                available: AtomicIsize::new(size as isize),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.shared.slots.len()
    }

    /// Number of slots without a request in flight.
    pub fn idle(&self) -> usize {
        self.shared.idle.len()
    }

    pub fn opts(&self) -> &Opts {
        &self.shared.opts
    }

    /// Dispatch a query on the next idle slot, blocking while every slot is busy.
    ///
    /// `on_complete` runs once, from [`Request::process`], when the result arrives.
    pub fn execute<P, F>(&self, sql: &str, params: P, on_complete: F) -> Result<Request>
    where
        P: ToParams,
        F: FnOnce(ResultSet) + Send + 'static,
    {
        let params = params.to_params();
        let slot = self.acquire()?;
        self.dispatch(slot, sql, &params, Box::new(on_complete))
    }

    /// Like [`execute`](Self::execute), but returns `Ok(None)` at once when no
    /// slot is idle.
    pub fn try_execute<P, F>(&self, sql: &str, params: P, on_complete: F) -> Result<Option<Request>>
    where
        P: ToParams,
        F: FnOnce(ResultSet) + Send + 'static,
    {
        let Some(slot) = self.try_acquire()? else {
            return Ok(None);
        };
        let params = params.to_params();
        self.dispatch(slot, sql, &params, Box::new(on_complete))
            .map(Some)
    }

    fn acquire(&self) -> Result<usize> {
        let shared = &self.shared;
        if shared.is_closed() {
            return Err(Error::Connection("pool is closed".into()));
        }
        shared.available.fetch_sub(1, Ordering::SeqCst);
        shared.semaphore.acquire();
        shared.take_idle()
    }

    fn try_acquire(&self) -> Result<Option<usize>> {
        let shared = &self.shared;
        if shared.is_closed() {
            return Err(Error::Connection("pool is closed".into()));
        }
        let claimed = shared
            .available
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n > 0).then(|| n - 1))
            .is_ok();
        if !claimed {
            return Ok(None);
        }
        // A claimed permit is backed by the semaphore, so this returns at once
        shared.semaphore.acquire();
        shared.take_idle().map(Some)
    }

    fn dispatch(&self, index: usize, sql: &str, params: &[Param], on_complete: Callback) -> Result<Request> {
        let result = self.send(index, sql, params);
        match result {
            Ok(socket) => {
                tracing::debug!(slot = index, "request dispatched");
                Ok(Request::new(
                    Arc::clone(&self.shared),
                    index,
                    socket,
                    on_complete,
                ))
            }
            Err(e) => {
                self.shared.release(index);
                Err(e)
            }
        }
    }

    fn send(&self, index: usize, sql: &str, params: &[Param]) -> Result<std::os::unix::io::RawFd> {
        let shared = &self.shared;
        let mut slot = shared.lock(index);
        if shared.is_closed() || slot.session.is_none() {
            return Err(Error::Connection("pool is closed".into()));
        }
        if slot.is_broken {
            tracing::debug!(slot = index, "reconnecting broken session");
            slot.session = Some(shared.driver.connect(&shared.opts)?);
            slot.is_broken = false;
        }

        trace::statement(sql, params);
        let result = match slot.session.as_mut() {
            Some(session) => session
                .send_query(sql, params)
                .map(|()| session.socket()),
            None => Err(Error::Connection("pool is closed".into())),
        };
        if let Err(ref e) = result
            && e.is_connection_broken()
        {
            slot.is_broken = true;
        }
        result
    }

    /// Close every session. Requests still in flight fail with
    /// [`Error::Connection`] on their next [`Request::process`].
    pub fn close(&self) {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for index in 0..shared.slots.len() {
            let mut slot = shared.lock(index);
            if let Some(mut session) = slot.session.take()
                && let Err(e) = session.close()
            {
                tracing::warn!(slot = index, error = %e, "failed to close session");
            }
        }
        // Wake blocked dispatchers; each one passes the permit on
        shared.semaphore.release();
        tracing::debug!("pool closed");
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size())
            .field("idle", &self.idle())
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}
