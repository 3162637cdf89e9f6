/// Prepared statement lifecycle
///
/// A [`Statement`] owns one driver statement handle plus a clone of its
/// connection for the operations that must route back through it:
/// positioned updates prepare a sibling statement, and the query builder
/// asks the connection for its dialect.
///
/// Cursor behavior is fixed at prepare time through named options; the
/// fetch machinery for bound output columns lives in the fetch module and
/// extends this type.
use std::fmt;

use crate::connection::Connection;
use crate::driver::{CursorType, DriverStatement, StmtAttr};
use crate::error::{check, Error, Flow, Result};
use crate::fetch::{Bookmark, ColumnBind, Columns};
use crate::params::{verify_statuses, Param, ParamBinder};

pub struct Statement {
    pub(crate) conn: Connection,
    pub(crate) stmt: Box<dyn DriverStatement>,
    pub(crate) row_array_size: usize,
    pub(crate) bookmarks_enabled: bool,
    pub(crate) binds: Vec<ColumnBind>,
    pub(crate) bookmark_bound: bool,
    pub(crate) columns: Option<Columns>,
    pub(crate) last_fetch_rows: usize,
    pub(crate) bookmarks: Vec<Option<Bookmark>>,
}

// The driver handle is opaque, so Debug shows the engine-side state only.
impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("row_array_size", &self.row_array_size)
            .field("bookmarks_enabled", &self.bookmarks_enabled)
            .field("last_fetch_rows", &self.last_fetch_rows)
            .finish_non_exhaustive()
    }
}

impl Statement {
    /// Apply prepare-time options to a freshly prepared handle.
    ///
    /// Recognized options: `CURSOR_TYPE` (`FORWARD`, `STATIC`, `DYNAMIC`,
    /// `KEYSET(n)`), `BOOKMARKS` (`ON`/`OFF`), `CURSOR_NAME`. Names and
    /// values match case-insensitively, except the cursor name itself.
    pub(crate) fn new(
        conn: Connection,
        stmt: Box<dyn DriverStatement>,
        options: &[(&str, &str)],
    ) -> Result<Self> {
        let mut this = Statement::wrap(conn, stmt);
        for &(name, value) in options {
            let attr = if name.eq_ignore_ascii_case("CURSOR_TYPE") {
                StmtAttr::CursorType(parse_cursor_type(name, value)?)
            } else if name.eq_ignore_ascii_case("BOOKMARKS") {
                let on = if value.eq_ignore_ascii_case("ON") {
                    true
                } else if value.eq_ignore_ascii_case("OFF") {
                    false
                } else {
                    return Err(invalid_option(name, value));
                };
                this.bookmarks_enabled = on;
                StmtAttr::Bookmarks(on)
            } else if name.eq_ignore_ascii_case("CURSOR_NAME") {
                StmtAttr::CursorName(value.to_string())
            } else {
                return Err(invalid_option(name, value));
            };
            let ret = this.stmt.set_attr(attr);
            check(ret, &*this.stmt, "statement option")?.data("statement option")?;
        }
        Ok(this)
    }

    /// Wrap a driver statement that already carries a resultset, as the
    /// catalog enumerations produce.
    pub(crate) fn from_catalog(conn: Connection, stmt: Box<dyn DriverStatement>) -> Result<Self> {
        Ok(Statement::wrap(conn, stmt))
    }

    fn wrap(conn: Connection, stmt: Box<dyn DriverStatement>) -> Self {
        Statement {
            conn,
            stmt,
            row_array_size: 1,
            bookmarks_enabled: false,
            binds: Vec::new(),
            bookmark_bound: false,
            columns: None,
            last_fetch_rows: 0,
            bookmarks: Vec::new(),
        }
    }

    /// Execute with scalar parameters as a one-row paramset, verifying the
    /// row's outcome.
    pub fn execute(&mut self, params: Vec<Param>) -> Result<()> {
        let statuses = self.execute_vector(1, params)?;
        verify_statuses(&statuses)
    }

    /// Execute a paramset of `row_count` rows. Every vector parameter must
    /// carry exactly that many values. Returns per-row outcome statuses;
    /// inspecting them is the caller's responsibility.
    pub fn execute_vector(&mut self, row_count: usize, params: Vec<Param>) -> Result<Vec<u8>> {
        if row_count == 0 {
            return Err(Error::protocol("row array size not positive"));
        }
        self.invalidate_resultset();

        let ret = self.stmt.reset_parameters();
        check(ret, &*self.stmt, "reset_parameters")?.data("reset_parameters")?;

        let mut binder = ParamBinder::new(row_count);
        for param in params {
            binder.add(param)?;
        }
        binder.execute(&mut *self.stmt)
    }

    /// Advance to the next resultset of a multi-statement batch. Returns
    /// false once the batch is exhausted. Column metadata and binds from
    /// the previous resultset are discarded either way.
    pub fn more_results(&mut self) -> Result<bool> {
        self.invalidate_resultset();
        let ret = self.stmt.more_results();
        match check(ret, &*self.stmt, "more_results")? {
            Flow::NoData => Ok(false),
            Flow::Data(()) => Ok(true),
            Flow::NeedData(_) => Err(Error::protocol("unexpected need-data in more_results")),
        }
    }

    /// Rows affected by the last execute.
    pub fn row_count(&mut self) -> Result<i64> {
        let ret = self.stmt.row_count();
        check(ret, &*self.stmt, "row_count")?.data("row_count")
    }

    /// Cap the rows any subsequent execute's resultset can produce. Zero
    /// removes the cap.
    pub fn limit(&mut self, max_rows: u64) -> Result<()> {
        let ret = self.stmt.set_attr(StmtAttr::MaxRows(max_rows));
        check(ret, &*self.stmt, "limit")?.data("limit")?;
        Ok(())
    }

    /// This statement's cursor name, generating one if none was assigned.
    pub fn cursor_name(&mut self) -> Result<String> {
        let ret = self.stmt.cursor_name();
        check(ret, &*self.stmt, "cursor_name")?.data("cursor_name")
    }

    /// Run an UPDATE or DELETE against one row of the last fetched row
    /// array, by cursor position. `sql` is the statement without its WHERE
    /// clause; the cursor supplies the row identity.
    pub fn modify_fetched_row(
        &mut self,
        row: usize,
        sql: &str,
        params: Vec<Param>,
    ) -> Result<Statement> {
        if row >= self.last_fetch_rows {
            return Err(Error::RowOutOfRange {
                row,
                rows: self.last_fetch_rows,
            });
        }
        let ret = self.stmt.set_pos(row + 1);
        check(ret, &*self.stmt, "set_pos")?.data("set_pos")?;

        let cursor = self.cursor_name()?;
        let mut sibling = self
            .conn
            .prepare(&format!("{sql} WHERE CURRENT OF {cursor}"))?;
        sibling.execute(params)?;
        Ok(sibling)
    }

    pub(crate) fn invalidate_resultset(&mut self) {
        self.columns = None;
        self.binds.clear();
        self.bookmark_bound = false;
        self.last_fetch_rows = 0;
        self.bookmarks.clear();
    }
}

fn parse_cursor_type(name: &str, value: &str) -> Result<CursorType> {
    if value.eq_ignore_ascii_case("FORWARD") {
        return Ok(CursorType::ForwardOnly);
    }
    if value.eq_ignore_ascii_case("STATIC") {
        return Ok(CursorType::Static);
    }
    if value.eq_ignore_ascii_case("DYNAMIC") {
        return Ok(CursorType::Dynamic);
    }
    // KEYSET(n), n being the keyset window size. A window of zero rows is
    // meaningless, so it counts as an invalid value for a known option.
    let upper = value.to_ascii_uppercase();
    if let Some(rest) = upper.strip_prefix("KEYSET(") {
        if let Some(n) = rest.strip_suffix(')').and_then(|n| n.parse::<u32>().ok()) {
            if n > 0 {
                return Ok(CursorType::Keyset(n));
            }
        }
    }
    Err(invalid_option(name, value))
}

fn invalid_option(name: &str, value: &str) -> Error {
    Error::InvalidStatementOption {
        name: name.to_string(),
        value: value.to_string(),
    }
}
