/// SQL dialect differences
///
/// Everything the query builder does is portable SQL except three things:
/// how a serial (auto-allocating) column is declared, what placeholder an
/// INSERT supplies for it, and how the allocated value is read back. UPDATE
/// with joins also differs structurally between backends. Each backend gets
/// a [`Flavor`] implementation; a connection detects its flavor once by
/// probing and caches it.
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::connection::Connection;
use crate::constraint::Constraint;
use crate::error::{Error, Result};
use crate::resultset::Resultset;
use crate::value::Value;

pub trait Flavor: Send + Sync {
    /// Short dialect name, for logging only.
    fn name(&self) -> &'static str;

    /// Column datatype that auto-allocates row ids.
    fn datatype_serial(&self) -> &'static str;

    /// Placeholder an INSERT supplies for a serial column it does not set.
    fn default_value_serial(&self) -> &'static str;

    /// Constraint that re-selects the row just inserted, keyed on the
    /// serial columns the INSERT left to the database.
    fn inserted_serial(&self, table_name: &str, columns: &BTreeSet<String>) -> Result<Constraint>;

    /// Render an UPDATE that must honor the resultset's joins and
    /// constraints. `fields` and `placeholders` are the parallel SET lists;
    /// fields arrive alias-qualified.
    fn update_with_joins(
        &self,
        out: &mut String,
        rs: &Resultset,
        fields: &mut Vec<String>,
        placeholders: &[String],
    ) -> Result<()>;
}

pub(crate) struct MysqlFlavor;

impl Flavor for MysqlFlavor {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn datatype_serial(&self) -> &'static str {
        "BIGINT AUTO_INCREMENT"
    }

    fn default_value_serial(&self) -> &'static str {
        "NULL"
    }

    fn inserted_serial(&self, _table_name: &str, columns: &BTreeSet<String>) -> Result<Constraint> {
        if columns.len() > 1 {
            return Err(Error::MultipleSerialColumns {
                table: _table_name.to_string(),
            });
        }
        let column = columns
            .iter()
            .next()
            .ok_or_else(|| Error::protocol("no serial columns to read back"))?;
        Ok(Constraint::raw(
            column.clone(),
            "=",
            "LAST_INSERT_ID()",
            [],
        ))
    }

    /// MySQL can join directly in an UPDATE, so the statement reuses the
    /// resultset's own join and WHERE rendering verbatim.
    fn update_with_joins(
        &self,
        out: &mut String,
        rs: &Resultset,
        fields: &mut Vec<String>,
        placeholders: &[String],
    ) -> Result<()> {
        out.push_str("UPDATE ");
        out.push_str(rs.table_name());
        out.push_str(" AS ");
        out.push_str(rs.table_alias());
        rs.render_join_sql(out);
        render_update_set(out, fields, placeholders);
        rs.render_where(out);
        Ok(())
    }
}

pub(crate) struct PostgresFlavor;

impl Flavor for PostgresFlavor {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn datatype_serial(&self) -> &'static str {
        "BIGSERIAL"
    }

    fn default_value_serial(&self) -> &'static str {
        "DEFAULT"
    }

    fn inserted_serial(&self, table_name: &str, columns: &BTreeSet<String>) -> Result<Constraint> {
        Ok(Constraint::and(columns.iter().map(|column| {
            Constraint::raw(
                column.clone(),
                "=",
                "currval(pg_get_serial_sequence(?, ?))",
                [
                    Value::Text(table_name.to_string()),
                    Value::Text(column.clone()),
                ],
            )
        })))
    }

    /// PostgreSQL cannot join in an UPDATE directly. The joined resultset
    /// becomes a subselect of the table's primary key columns, and the
    /// UPDATE matches its own rows against the subselect on those keys.
    fn update_with_joins(
        &self,
        out: &mut String,
        rs: &Resultset,
        fields: &mut Vec<String>,
        placeholders: &[String],
    ) -> Result<()> {
        out.push_str("UPDATE ");
        out.push_str(rs.table_name());
        out.push_str(" AS updated_table");

        let alias = rs.table_alias().to_string();
        remove_prefix(fields, &alias);
        render_update_set(out, fields, placeholders);

        out.push_str(" FROM (");

        let primary_key_columns: Vec<String> = rs
            .primary_key_columns()
            .iter()
            .map(|c| format!("{alias}.{c}"))
            .collect();

        rs.render_select(out, &primary_key_columns);
        out.push_str(") AS joins WHERE ");

        let mut prefix = "";
        for column in rs.primary_key_columns() {
            out.push_str(prefix);
            out.push_str("updated_table.");
            out.push_str(column);
            out.push_str("=joins.");
            out.push_str(column);
            prefix = " AND ";
        }

        if prefix.is_empty() {
            return Err(Error::PrimaryKeyRequired {
                table: rs.table_name().to_string(),
            });
        }
        Ok(())
    }
}

/// Append ` SET field=placeholder, …` from the parallel lists.
pub(crate) fn render_update_set(out: &mut String, fields: &[String], placeholders: &[String]) {
    let mut sep = " SET ";
    for (field, placeholder) in fields.iter().zip(placeholders) {
        out.push_str(sep);
        out.push_str(field);
        out.push('=');
        out.push_str(placeholder);
        sep = ", ";
    }
}

/// Strip a leading `alias.` qualifier off each field name in place.
pub(crate) fn remove_prefix(fields: &mut [String], alias: &str) {
    for field in fields {
        if let Some(rest) = field
            .strip_prefix(alias)
            .and_then(|rest| rest.strip_prefix('.'))
        {
            *field = rest.to_string();
        }
    }
}

/// Detect the connection's dialect by probing a MySQL-only expression.
/// The probe failing means anything else, which this engine treats as
/// PostgreSQL.
pub(crate) fn detect(conn: &Connection) -> Arc<dyn Flavor> {
    match conn.execute("select @@version", Vec::new()) {
        Ok(_) => {
            tracing::debug!("dialect probe succeeded, using mysql flavor");
            Arc::new(MysqlFlavor)
        }
        Err(e) => {
            tracing::debug!("dialect probe failed ({e}), using postgres flavor");
            Arc::new(PostgresFlavor)
        }
    }
}
