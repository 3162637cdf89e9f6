/// Error taxonomy and diagnostic plumbing
///
/// Every fatal condition in the crate surfaces as one [`Error`] value.
/// Driver failures carry the ordered diagnostic chain retrieved from the
/// failing handle; contract violations (bind mismatches, constraint misuse,
/// bad options) are dedicated variants raised before any native call where
/// that is feasible.
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::driver::{Diagnosable, Diagnostic, Return};

pub type Result<T> = std::result::Result<T, Error>;

/// Ordered diagnostics collected from a failing handle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticChain(pub Vec<Diagnostic>);

impl fmt::Display for DiagnosticChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "database error (no diagnostics available)");
        }
        let mut sep = "";
        for d in &self.0 {
            write!(f, "{sep}{}:{}:{}", d.sqlstate, d.native, d.message)?;
            sep = "\n";
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Diagnostics(DiagnosticChain),

    #[error("mutex poisoned in {context}")]
    LockPoisoned { context: String },

    #[error("connection is closed")]
    NotConnected,

    #[error("statement has {expected} parameters, {bound} were bound")]
    ParameterCountMismatch { expected: usize, bound: usize },

    #[error("parameter {position} has {actual} rows, expected {expected}")]
    RowCountMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("column name \"{name}\" is ambiguous")]
    AmbiguousColumn { name: String },

    #[error("column \"{name}\" not found in this resultset")]
    ColumnNotFound { name: String },

    #[error("column {column} out of range, resultset has {count} columns")]
    ColumnOutOfRange { column: usize, count: usize },

    #[error("row {row} was not in the last fetched row set of {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },

    #[error("blob length {length} exceeds the maximum the driver can declare")]
    BlobTooLarge { length: usize },

    #[error("vector value list can only be compared using '=' or '!=', not '{operator}'")]
    InvalidListOperator { operator: String },

    #[error("only '=' constraints can produce assignments, not '{operator}'")]
    OnlyEqualityAllowed { operator: String },

    #[error("duplicate column \"{name}\"")]
    DuplicateColumn { name: String },

    #[error("primary key column required for an UPDATE with joins on \"{table}\"")]
    PrimaryKeyRequired { table: String },

    #[error("primary key column \"{column}\" missing from INSERT into \"{table}\"")]
    MissingPrimaryKey { table: String, column: String },

    #[error("only one serial column can exist in table \"{table}\"")]
    MultipleSerialColumns { table: String },

    #[error("invalid character in connection parameter \"{name}\"")]
    InvalidConnectionParameter { name: String },

    #[error("invalid statement option {name}={value}")]
    InvalidStatementOption { name: String, value: String },

    #[error("{what} out of range")]
    ValueOverflow { what: &'static str },

    #[error("cannot parse \"{input}\" as a decimal value")]
    DecimalFormat { input: String },

    #[error("row {row} failed with status {status}")]
    RowFailed { row: usize, status: u8 },

    #[error("no rows in resultset")]
    NoRows,

    #[error("multiple rows in resultset")]
    MultipleRows,

    #[error("{context}")]
    Protocol { context: String },
}

impl Error {
    /// Whether this error carries driver diagnostics and every one of them
    /// reports the given SQLSTATE. Used for targeted recovery, e.g.
    /// detecting a duplicate-key failure.
    pub fn is(&self, sqlstate: &str) -> bool {
        match self {
            Error::Diagnostics(chain) => {
                !chain.0.is_empty() && chain.0.iter().all(|d| d.sqlstate == sqlstate)
            }
            _ => false,
        }
    }

    pub(crate) fn protocol(context: impl Into<String>) -> Self {
        Error::Protocol {
            context: context.into(),
        }
    }
}

/// Safely lock a mutex with proper error handling
///
/// Returns a descriptive error if the mutex is poisoned.
pub fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| Error::LockPoisoned {
        context: context.to_string(),
    })
}

/// Data-flow outcome of a checked native call.
#[derive(Debug)]
pub(crate) enum Flow<T> {
    Data(T),
    NoData,
    NeedData(u32),
}

impl<T> Flow<T> {
    /// Unwrap the data case; any other flow is a protocol violation.
    pub(crate) fn data(self, context: &str) -> Result<T> {
        match self {
            Flow::Data(v) => Ok(v),
            Flow::NoData => Err(Error::protocol(format!("unexpected no-data in {context}"))),
            Flow::NeedData(_) => Err(Error::protocol(format!(
                "unexpected need-data in {context}"
            ))),
        }
    }
}

/// Resolve a native return code against its handle.
///
/// Success passes through; success-with-info logs the warning diagnostics
/// and passes through; an error return collects the handle's diagnostic
/// chain into an [`Error`].
pub(crate) fn check<T, H: Diagnosable + ?Sized>(
    ret: Return<T>,
    handle: &H,
    context: &str,
) -> Result<Flow<T>> {
    match ret {
        Return::Success(v) => Ok(Flow::Data(v)),
        Return::Info(v) => {
            let chain = DiagnosticChain(handle.diagnostics());
            tracing::warn!("{context}: {chain}");
            Ok(Flow::Data(v))
        }
        Return::NoData => Ok(Flow::NoData),
        Return::NeedData(token) => Ok(Flow::NeedData(token)),
        Return::Error => {
            let diags = handle.diagnostics();
            if diags.is_empty() {
                Err(Error::protocol(format!("{context} failed")))
            } else {
                Err(Error::Diagnostics(DiagnosticChain(diags)))
            }
        }
    }
}
