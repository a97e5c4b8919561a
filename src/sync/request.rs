//! Handle to a query in flight on a pool slot.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::result::ResultSet;

use super::pool::{Callback, Shared};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    Complete,
}

/// One asynchronous query dispatched by [`Pool::execute`](super::Pool::execute).
///
/// The request owns its pool slot until it completes or is cancelled. Wait
/// for [`socket`](Self::socket) to become readable with any event loop, then
/// call [`process`](Self::process). Dropping a pending request cancels it.
pub struct Request {
    shared: Arc<Shared>,
    slot: usize,
    socket: RawFd,
    on_complete: Option<Callback>,
    state: State,
}

impl Request {
    pub(super) fn new(shared: Arc<Shared>, slot: usize, socket: RawFd, on_complete: Callback) -> Self {
        Self {
            shared,
            slot,
            socket,
            on_complete: Some(on_complete),
            state: State::Pending,
        }
    }

    /// Descriptor of the slot's session. Valid for the lifetime of the request.
    pub fn socket(&self) -> RawFd {
        self.socket
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Consume available input without blocking.
    ///
    /// Returns `Ok(true)` once the result has arrived: the slot goes back to
    /// the pool and the completion callback runs. Returns `Ok(false)` while
    /// the result is incomplete. A driver error completes the request with
    /// that error. Processing a completed request is an error.
    pub fn process(&mut self) -> Result<bool> {
        if self.state == State::Complete {
            return Err(Error::InvalidUsage("request already completed".into()));
        }

        let polled = {
            let mut slot = self.shared.lock(self.slot);
            let result = match slot.session.as_mut() {
                Some(session) => session.poll_result(),
                None => Err(Error::Connection("pool is closed".into())),
            };
            if let Err(ref e) = result
                && e.is_connection_broken()
            {
                slot.is_broken = true;
            }
            result
        };

        match polled {
            Ok(None) => Ok(false),
            Ok(Some(raw)) => {
                self.complete();
                tracing::debug!(slot = self.slot, "request complete");
                let result = ResultSet::new(raw, self.shared.caster);
                if let Some(on_complete) = self.on_complete.take() {
                    on_complete(result);
                }
                Ok(true)
            }
            Err(e) => {
                self.complete();
                Err(e)
            }
        }
    }

    fn complete(&mut self) {
        self.state = State::Complete;
        self.shared.release(self.slot);
    }

    /// Abandon the query and return the slot to the pool. The callback never runs.
    pub fn cancel(mut self) -> Result<()> {
        self.cancel_inner()
    }

    fn cancel_inner(&mut self) -> Result<()> {
        if self.state == State::Complete {
            return Ok(());
        }
        let result = {
            let mut slot = self.shared.lock(self.slot);
            let result = match slot.session.as_mut() {
                Some(session) => session.cancel(),
                None => Ok(()),
            };
            if result.is_err() {
                slot.is_broken = true;
            }
            result
        };
        self.on_complete = None;
        self.complete();
        tracing::debug!(slot = self.slot, "request cancelled");
        result
    }
}

impl AsRawFd for Request {
    fn as_raw_fd(&self) -> RawFd {
        self.socket
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if let Err(e) = self.cancel_inner() {
            tracing::warn!(slot = self.slot, error = %e, "failed to cancel request");
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("slot", &self.slot)
            .field("socket", &self.socket)
            .field("state", &self.state)
            .finish()
    }
}
