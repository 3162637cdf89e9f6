/// Connection lifecycle and connection-level operations
///
/// A [`Connection`] owns a native driver connection behind `Arc<Mutex<…>>`
/// so it can be shared across threads; every native call on the connection
/// serializes through that mutex. Statements hold their own native handles
/// and a clone of the connection for operations that must go back through
/// it (positioned updates, dialect lookups).
///
/// Disconnect on drop is best-effort: a failure is logged, never raised.
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::driver::DriverConnection;
use crate::error::{check, safe_lock, Error, Result};
use crate::flavor::{self, Flavor};
use crate::params::Param;
use crate::statement::Statement;

pub(crate) struct ConnInner {
    pub(crate) driver: Box<dyn DriverConnection>,
    pub(crate) connected: bool,
    /// Nested logical transaction depth, managed by the transaction module.
    pub(crate) transaction_depth: usize,
}

impl ConnInner {
    fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        let ret = self.driver.disconnect();
        check(ret, &*self.driver, "disconnect")?.data("disconnect")?;
        Ok(())
    }
}

impl Drop for ConnInner {
    fn drop(&mut self) {
        if self.connected {
            if let Err(e) = self.disconnect() {
                tracing::warn!("disconnect during drop failed: {e}");
            }
        }
    }
}

/// An open database connection. Cloning shares the underlying handle.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Mutex<ConnInner>>,
    /// Lazily detected SQL dialect, immutable once populated.
    flavor: Arc<Mutex<Option<Arc<dyn Flavor>>>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connected = self.inner.lock().map(|g| g.connected).unwrap_or(false);
        f.debug_struct("Connection")
            .field("connected", &connected)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(driver: Box<dyn DriverConnection>) -> Self {
        Connection {
            inner: Arc::new(Mutex::new(ConnInner {
                driver,
                connected: true,
                transaction_depth: 0,
            })),
            flavor: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn lock(&self, context: &str) -> Result<MutexGuard<'_, ConnInner>> {
        let guard = safe_lock(&self.inner, context)?;
        if !guard.connected {
            return Err(Error::NotConnected);
        }
        Ok(guard)
    }

    /// Prepare a statement with default options.
    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        self.prepare_with_options(sql, &[])
    }

    /// Prepare a statement with named options (`CURSOR_TYPE`, `BOOKMARKS`,
    /// `CURSOR_NAME`). An unrecognized name or value fails before the SQL
    /// reaches the driver.
    pub fn prepare_with_options(&self, sql: &str, options: &[(&str, &str)]) -> Result<Statement> {
        let mut guard = self.lock("prepare")?;
        let ret = guard.driver.prepare(sql);
        let stmt = check(ret, &*guard.driver, "prepare")?.data("prepare")?;
        drop(guard);
        Statement::new(self.clone(), stmt, options)
    }

    /// Prepare and execute in one shot with scalar parameters, verifying
    /// the single row's outcome.
    pub fn execute(&self, sql: &str, params: Vec<Param>) -> Result<Statement> {
        let mut stmt = self.prepare(sql)?;
        stmt.execute(params)?;
        Ok(stmt)
    }

    /// Prepare and execute with vector parameters. Per-row outcomes come
    /// back in the status vector; verification is the caller's choice.
    pub fn execute_vector(
        &self,
        sql: &str,
        row_count: usize,
        params: Vec<Param>,
    ) -> Result<(Statement, Vec<u8>)> {
        let mut stmt = self.prepare(sql)?;
        let statuses = stmt.execute_vector(row_count, params)?;
        Ok((stmt, statuses))
    }

    /// Set or clear the autocommit flag.
    pub fn autocommit(&self, on: bool) -> Result<()> {
        let mut guard = self.lock("autocommit")?;
        let ret = guard.driver.set_autocommit(on);
        check(ret, &*guard.driver, "autocommit")?.data("autocommit")?;
        Ok(())
    }

    /// Flat commit. `turn_on_autocommit` re-enables autocommit in the same
    /// step.
    pub fn commit(&self, turn_on_autocommit: bool) -> Result<()> {
        let mut guard = self.lock("commit")?;
        let ret = guard.driver.commit();
        check(ret, &*guard.driver, "commit")?.data("commit")?;
        if turn_on_autocommit {
            let ret = guard.driver.set_autocommit(true);
            check(ret, &*guard.driver, "commit autocommit")?.data("commit autocommit")?;
        }
        Ok(())
    }

    /// Flat rollback, with the same autocommit flag as [`Connection::commit`].
    pub fn rollback(&self, turn_on_autocommit: bool) -> Result<()> {
        let mut guard = self.lock("rollback")?;
        let ret = guard.driver.rollback();
        check(ret, &*guard.driver, "rollback")?.data("rollback")?;
        if turn_on_autocommit {
            let ret = guard.driver.set_autocommit(true);
            check(ret, &*guard.driver, "rollback autocommit")?.data("rollback autocommit")?;
        }
        Ok(())
    }

    /// Explicit disconnect. Statements derived from this connection become
    /// unusable.
    pub fn disconnect(&self) -> Result<()> {
        safe_lock(&self.inner, "disconnect")?.disconnect()
    }

    /// Translate SQL into the driver's native form.
    pub fn native_sql(&self, sql: &str) -> Result<String> {
        let mut guard = self.lock("native_sql")?;
        let ret = guard.driver.native_sql(sql);
        check(ret, &*guard.driver, "native_sql")?.data("native_sql")
    }

    /// Enumerate tables. `literal_ids` requests literal identifier
    /// matching instead of search patterns.
    pub fn tables(
        &self,
        literal_ids: bool,
        catalog: &str,
        schema: &str,
        table: &str,
        table_type: &str,
    ) -> Result<Statement> {
        let mut guard = self.lock("tables")?;
        let ret = guard
            .driver
            .tables(literal_ids, catalog, schema, table, table_type);
        let stmt = check(ret, &*guard.driver, "tables")?.data("tables")?;
        drop(guard);
        Statement::from_catalog(self.clone(), stmt)
    }

    /// Enumerate columns.
    pub fn columns(
        &self,
        literal_ids: bool,
        catalog: &str,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Statement> {
        let mut guard = self.lock("columns")?;
        let ret = guard
            .driver
            .columns(literal_ids, catalog, schema, table, column);
        let stmt = check(ret, &*guard.driver, "columns")?.data("columns")?;
        drop(guard);
        Statement::from_catalog(self.clone(), stmt)
    }

    /// Enumerate a table's primary key columns.
    pub fn primary_keys(
        &self,
        literal_ids: bool,
        table: &str,
        catalog: &str,
        schema: &str,
    ) -> Result<Statement> {
        let mut guard = self.lock("primary_keys")?;
        let ret = guard
            .driver
            .primary_keys(literal_ids, table, catalog, schema);
        let stmt = check(ret, &*guard.driver, "primary_keys")?.data("primary_keys")?;
        drop(guard);
        Statement::from_catalog(self.clone(), stmt)
    }

    /// The connection's SQL dialect, detected once by probing and cached
    /// for the connection's lifetime.
    pub fn flavor(&self) -> Result<Arc<dyn Flavor>> {
        let mut slot = safe_lock(&self.flavor, "flavor")?;
        if let Some(f) = slot.as_ref() {
            return Ok(Arc::clone(f));
        }
        let detected = flavor::detect(self);
        *slot = Some(Arc::clone(&detected));
        Ok(detected)
    }
}
