//! Waiting for pool requests on a Tokio runtime.

use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use crate::error::Result;
use crate::sync::Request;

/// Drive `request` to completion, processing it whenever its socket becomes
/// readable.
///
/// The completion callback runs on the task that awaits this future.
pub async fn wait(request: &mut Request) -> Result<()> {
    if request.process()? {
        return Ok(());
    }
    // The reactor gets its own duplicate of the session's descriptor, so the
    // registration stays valid even if the pool closes the session meanwhile.
    // SAFETY: the request is pending, so its slot's session holds the descriptor open
    let borrowed = unsafe { BorrowedFd::borrow_raw(request.socket()) };
    let owned: OwnedFd = borrowed.try_clone_to_owned()?;
    // SAFETY: `owned` is moved into the AsyncFd and lives exactly as long as it
    let socket = unsafe { AsyncFd::register_with_interest(owned, Interest::READABLE) }
        .map_err(io::Error::from)?;
    loop {
        let mut ready = socket.readable().await?;
        if request.process()? {
            return Ok(());
        }
        ready.clear_ready();
    }
}
