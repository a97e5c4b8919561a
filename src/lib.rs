//! Client-side core of a relational database access library.
//!
//! Vendor drivers plug in through the [`driver`] traits. On top of them this
//! crate provides connections with nested savepoint transactions, prepared
//! statements, `COPY` streaming, a request pool for issuing queries without
//! blocking, and typecasting of wire text into Rust values.
//!
//! # Example
//!
//! ```no_run
//! use zero_dbi::sync::Conn;
//!
//! fn main() -> zero_dbi::Result<()> {
//!     let mut conn = Conn::new("postgresql://app@localhost/shop")?;
//!
//!     conn.transaction(None, |conn| {
//!         conn.execute("insert into users (name) values (?)", ("Apple",))?;
//!         Ok(())
//!     })?;
//!
//!     let mut users = conn.prepare("select id, name from users where id > ?")?;
//!     users.execute((0,))?.each(|row| {
//!         println!("{:?} {:?}", row.get("id"), row.get("name"));
//!         Ok(())
//!     })?;
//!
//!     conn.close()
//! }
//! ```

pub mod conversion;
pub mod copy;
pub mod driver;
pub mod error;
pub mod opts;
pub mod param;
pub mod result;
pub mod row;
pub mod sync;
pub mod trace;
pub mod transaction;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use conversion::timestamp::{Timestamp, parse_datetime};
pub use conversion::{FromValue, Typecaster, Value, WireType};
pub use copy::{CopyIn, CopyOut, CopySink, CopySource};
pub use driver::{Driver, PreparedCommand, Session, register_driver};
pub use error::{Error, ErrorFields, ErrorKind, Result};
pub use opts::Opts;
pub use param::{Param, ToParam, ToParams};
pub use result::{Column, RawResult, ResultSet};
pub use row::{FromRow, Row, RowMapper};
