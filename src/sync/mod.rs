//! Synchronous connections, statements and the request pool.

mod conn;
mod pool;
mod request;
mod statement;

pub use conn::Conn;
pub use pool::Pool;
pub use request::Request;
pub use statement::Statement;
