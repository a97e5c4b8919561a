//! Statement tracing.
//!
//! When enabled, every statement sent through a [`Conn`](crate::sync::Conn),
//! [`Statement`](crate::sync::Statement) or [`Pool`](crate::sync::Pool) is
//! logged at `DEBUG` level under the `zero_dbi::trace` target.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::param::Param;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Turn statement tracing on or off. Returns the previous setting.
pub fn set_enabled(enabled: bool) -> bool {
    ENABLED.swap(enabled, Ordering::Relaxed)
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Render a statement and its bind values for display.
///
/// Values are quoted, NULL is shown bare and non-UTF-8 bytes are escaped.
pub fn format_params(sql: &str, params: &[Param]) -> String {
    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    out.push_str(sql);
    if params.is_empty() {
        return out;
    }
    out.push_str(" [");
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match param {
            Param::Null => out.push_str("NULL"),
            Param::Binary(bytes) => {
                let _ = write!(out, "'{}'", bytes.escape_ascii());
            }
        }
    }
    out.push(']');
    out
}

/// Log `sql` if tracing is on. Nothing is formatted otherwise.
pub(crate) fn statement(sql: &str, params: &[Param]) {
    if is_enabled() {
        tracing::debug!(target: "zero_dbi::trace", "{}", format_params(sql, params));
    }
}
