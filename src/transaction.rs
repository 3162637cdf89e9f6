/// Nested logical transactions over flat commit/rollback primitives
///
/// Each connection carries a depth counter. The outermost `begin_work`
/// issues `START TRANSACTION`; nested calls issue `SAVEPOINT sp_<depth>`,
/// so logical scopes nest arbitrarily over drivers that only have one flat
/// transaction. Committing or rolling back an inner scope releases or
/// rewinds its savepoint; the outermost commit/rollback goes through the
/// driver's own primitive.
///
/// A commit or rollback failure at depth zero leaves the transaction state
/// unknowable, so the connection is unconditionally disconnected before the
/// error propagates.
use crate::connection::Connection;
use crate::error::Result;

impl Connection {
    /// Begin a transactional scope.
    pub fn begin_work(&self) -> Result<()> {
        self.begin_work_with_options("")
    }

    /// Begin a transactional scope, appending driver-specific options to
    /// the outermost `START TRANSACTION`.
    pub fn begin_work_with_options(&self, options: &str) -> Result<()> {
        let depth = self.lock("begin_work")?.transaction_depth;

        let sql = if depth == 0 {
            self.autocommit(false)?;
            if options.is_empty() {
                "START TRANSACTION".to_string()
            } else {
                format!("START TRANSACTION {options}")
            }
        } else {
            format!("SAVEPOINT {}", savepoint_name(depth))
        };

        tracing::debug!("{sql}");
        self.execute(&sql, Vec::new())?;

        self.lock("begin_work")?.transaction_depth = depth + 1;
        Ok(())
    }

    /// Commit the innermost open scope.
    pub fn commit_work(&self) -> Result<()> {
        self.close_work(true)
    }

    /// Roll back the innermost open scope.
    pub fn rollback_work(&self) -> Result<()> {
        self.close_work(false)
    }

    fn close_work(&self, commit: bool) -> Result<()> {
        let depth = self.lock("close_work")?.transaction_depth;
        let depth = depth.saturating_sub(1);

        let result = if depth == 0 {
            if commit {
                tracing::debug!("COMMIT");
                self.commit(true)
            } else {
                tracing::debug!("ROLLBACK");
                self.rollback(true)
            }
        } else {
            let sql = if commit {
                format!("RELEASE SAVEPOINT {}", savepoint_name(depth))
            } else {
                format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(depth))
            };
            tracing::debug!("{sql}");
            self.execute(&sql, Vec::new()).map(|_| ())
        };

        if let Err(e) = result {
            if depth == 0 {
                // Post-failure transaction state is unknowable.
                if let Err(e2) = self.disconnect() {
                    tracing::warn!("disconnect after failed transaction close: {e2}");
                }
            }
            return Err(e);
        }

        self.lock("close_work")?.transaction_depth = depth;
        Ok(())
    }

    /// Begin a scope and wrap it in a guard that rolls back unless
    /// committed.
    pub fn transaction(&self) -> Result<Transaction> {
        self.begin_work()?;
        Ok(Transaction {
            conn: self.clone(),
            closed: false,
        })
    }
}

/// Savepoint names are minted from the scope depth.
fn savepoint_name(depth: usize) -> String {
    format!("sp_{depth}")
}

/// Scoped transaction guard.
///
/// Wraps one `begin_work`/`commit_work` pair. Dropping the guard without
/// an explicit close rolls the scope back; after one explicit commit or
/// rollback the guard is inert and further closes are no-ops.
pub struct Transaction {
    conn: Connection,
    closed: bool,
}

impl Transaction {
    pub fn commit(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.conn.commit_work()
    }

    pub fn rollback(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.conn.rollback_work()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.conn.rollback_work() {
                tracing::warn!("rollback during drop failed: {e}");
            }
        }
    }
}
