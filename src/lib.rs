//! `dbilink`: a typed database client binding over an ODBC-style driver
//!
//! The crate sits between applications and a handle-oriented native driver
//! layer: it turns typed values into driver buffers and back, runs scalar
//! and vector executes with per-row statuses, streams blobs both ways in
//! bounded memory, scrolls cursors with bookmarks, and assembles portable
//! SELECT/UPDATE/INSERT statements from a constraint AST with per-dialect
//! strategies for the parts that are not portable.
//!
//! The driver itself is abstract: anything implementing the traits in
//! [`driver`] plugs in, which is also how the test suite runs the whole
//! engine against an in-memory backend.
pub mod blob;
pub mod connection;
pub mod constraint;
pub mod decimal;
pub mod driver;
pub mod env;
pub mod error;
pub mod fetch;
pub mod flavor;
pub mod params;
pub mod resultset;
pub mod statement;
pub mod transaction;
pub mod value;

pub use blob::{BlobKind, BlobRead, BlobSink, FetchBlob, InsertBlob};
pub use connection::Connection;
pub use constraint::{Assignment, Constraint};
pub use decimal::Decimal;
pub use env::Environment;
pub use error::{Error, Result};
pub use fetch::{Bookmark, ColumnRef, Fetch, FetchType};
pub use params::Param;
pub use resultset::{ColumnDef, JoinId, JoinType, Resultset, Row, Rows, TableDef};
pub use statement::Statement;
pub use transaction::Transaction;
pub use value::{Date, Time, Value};

#[cfg(test)]
mod tests;
