/// Resultset/query builder
///
/// Declarative SELECT/UPDATE/INSERT assembly over one base table and a
/// graph of joins. The join graph is an arena of nodes indexed by
/// [`JoinId`]; the root resultset owns the arena and the table-alias
/// allocator, so there is never a question of who outlives whom.
///
/// SQL text and bound parameters are produced by the same traversals in
/// the same order, which keeps strictly positional placeholders correct by
/// construction. The row limit is never a SQL clause: it is pushed down to
/// the driver's max-rows attribute.
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::connection::Connection;
use crate::constraint::{Assignment, Constraint};
use crate::error::{Error, Result};
use crate::fetch::FetchType;
use crate::flavor::{remove_prefix, render_update_set, Flavor};
use crate::params::Param;
use crate::statement::Statement;
use crate::value::Value;

/// One declared column of a table.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub fetch_type: FetchType,
    /// Declared SQL type, used only by schema generation.
    pub sql_type: String,
}

/// Static description of a table the builder can query.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_keys: Vec<String>,
    pub serial_columns: Vec<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        TableDef {
            name: name.into(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            serial_columns: Vec::new(),
        }
    }

    pub fn column(
        mut self,
        name: impl Into<String>,
        fetch_type: FetchType,
        sql_type: impl Into<String>,
    ) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            fetch_type,
            sql_type: sql_type.into(),
        });
        self
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_keys.push(name.into());
        self
    }

    /// Mark a column as database-assigned. Serial columns are exempt from
    /// the INSERT primary-key presence check.
    pub fn serial(mut self, name: impl Into<String>) -> Self {
        self.serial_columns.push(name.into());
        self
    }

    fn is_serial(&self, column: &str) -> bool {
        self.serial_columns.iter().any(|c| c == column)
    }

    fn fetch_type_of(&self, column: &str) -> Option<FetchType> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.fetch_type)
    }

    /// CREATE TABLE statement in the given dialect's serial idiom.
    pub fn create_table_sql(&self, flavor: &dyn Flavor) -> String {
        let mut sql = format!("CREATE TABLE {}(", self.name);
        let mut sep = "";
        for c in &self.columns {
            sql.push_str(sep);
            sql.push_str(&c.name);
            sql.push(' ');
            if self.is_serial(&c.name) {
                sql.push_str(flavor.datatype_serial());
            } else {
                sql.push_str(&c.sql_type);
            }
            sep = ", ";
        }
        if !self.primary_keys.is_empty() {
            sql.push_str(", PRIMARY KEY(");
            sql.push_str(&self.primary_keys.join(", "));
            sql.push(')');
        }
        sql.push(')');
        sql
    }
}

/// Allocates table aliases within one join graph.
///
/// The base name is the table name with any trailing run of `_` and digits
/// stripped. The first use of a base name keeps it bare; later uses get
/// `_2`, `_3`, and so on. A table whose own name ends in digits therefore
/// counts against its stripped prefix; that behavior is long-standing and
/// kept as is.
#[derive(Debug, Default)]
struct Aliases {
    counter: HashMap<String, usize>,
}

impl Aliases {
    fn get_alias(&mut self, table_name: &str) -> String {
        let base =
            table_name.trim_end_matches(|c: char| c == '_' || c.is_ascii_digit());
        let count = self.counter.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base.to_string()
        } else {
            format!("{base}_{}", *count)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// Index of one join node in the resultset's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinId(usize);

struct JoinNode {
    join_type: JoinType,
    table: TableDef,
    alias: String,
    parent_alias: String,
    /// Equijoin column pairs: (parent column, joined column).
    on: Vec<(String, String)>,
    /// Whether the joined table's columns join the SELECT list.
    prefetch: bool,
    children: Vec<JoinId>,
}

/// Query builder over one base table.
pub struct Resultset {
    conn: Connection,
    table: TableDef,
    alias: String,
    aliases: Aliases,
    arena: Vec<JoinNode>,
    roots: Vec<JoinId>,
    where_clause: Vec<Constraint>,
    group_by: Vec<String>,
    having: Vec<Constraint>,
    order_by: Vec<String>,
    limit: u64,
}

impl Resultset {
    pub fn new(conn: Connection, table: TableDef) -> Self {
        let mut aliases = Aliases::default();
        let alias = aliases.get_alias(&table.name);
        Resultset {
            conn,
            table,
            alias,
            aliases,
            arena: Vec::new(),
            roots: Vec::new(),
            where_clause: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: 0,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn table_alias(&self) -> &str {
        &self.alias
    }

    pub(crate) fn primary_key_columns(&self) -> &[String] {
        &self.table.primary_keys
    }

    /// Add a join under `parent` (`None` joins against the base table).
    /// `on` pairs are (parent column, joined column); `prefetch` includes
    /// the joined table's columns in the SELECT list, ahead of the base
    /// table's own.
    pub fn add_join(
        &mut self,
        parent: Option<JoinId>,
        join_type: JoinType,
        table: TableDef,
        on: &[(&str, &str)],
        prefetch: bool,
    ) -> JoinId {
        let parent_alias = match parent {
            Some(JoinId(i)) => self.arena[i].alias.clone(),
            None => self.alias.clone(),
        };
        let alias = self.aliases.get_alias(&table.name);
        let id = JoinId(self.arena.len());
        self.arena.push(JoinNode {
            join_type,
            table,
            alias,
            parent_alias,
            on: on
                .iter()
                .map(|&(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            prefetch,
            children: Vec::new(),
        });
        match parent {
            Some(JoinId(i)) => self.arena[i].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Alias assigned to a join, for building constraints against it.
    pub fn join_alias(&self, join: JoinId) -> &str {
        &self.arena[join.0].alias
    }

    /// Add one constraint to the WHERE container. All constraints AND
    /// together.
    pub fn add_where(&mut self, constraint: Constraint) -> &mut Self {
        self.where_clause.push(constraint);
        self
    }

    pub fn group_by(&mut self, column: impl Into<String>) -> &mut Self {
        self.group_by.push(column.into());
        self
    }

    pub fn add_having(&mut self, constraint: Constraint) -> &mut Self {
        self.having.push(constraint);
        self
    }

    pub fn order_by(&mut self, column: impl Into<String>) -> &mut Self {
        self.order_by.push(column.into());
        self
    }

    /// Cap the number of rows the query returns. Applied through the
    /// driver's max-rows attribute, not as SQL.
    pub fn limit(&mut self, rows: u64) -> &mut Self {
        self.limit = rows;
        self
    }

    /// The SELECT list, in emission order: prefetched join columns first,
    /// then the base table's columns. Field names are unqualified for the
    /// base table, alias-qualified for prefetched joins.
    fn select_fields(&self) -> Vec<(String, String, FetchType)> {
        let mut fields = Vec::new();
        for id in &self.roots {
            self.collect_prefetch(*id, &mut fields);
        }
        for c in &self.table.columns {
            fields.push((
                c.name.clone(),
                format!("{}.{}", self.alias, c.name),
                c.fetch_type,
            ));
        }
        fields
    }

    fn collect_prefetch(&self, id: JoinId, fields: &mut Vec<(String, String, FetchType)>) {
        let node = &self.arena[id.0];
        if node.prefetch {
            for c in &node.table.columns {
                let qualified = format!("{}.{}", node.alias, c.name);
                fields.push((qualified.clone(), qualified, c.fetch_type));
            }
        }
        for child in &node.children {
            self.collect_prefetch(*child, fields);
        }
    }

    pub(crate) fn render_join_sql(&self, out: &mut String) {
        for id in &self.roots {
            self.render_join(*id, out);
        }
    }

    fn render_join(&self, id: JoinId, out: &mut String) {
        let node = &self.arena[id.0];
        out.push(' ');
        out.push_str(node.join_type.as_sql());
        out.push(' ');
        out.push_str(&node.table.name);
        out.push_str(" AS ");
        out.push_str(&node.alias);
        let mut sep = " ON ";
        for (parent_col, child_col) in &node.on {
            out.push_str(sep);
            out.push_str(&node.parent_alias);
            out.push('.');
            out.push_str(parent_col);
            out.push('=');
            out.push_str(&node.alias);
            out.push('.');
            out.push_str(child_col);
            sep = " AND ";
        }
        for child in &node.children {
            self.render_join(*child, out);
        }
    }

    /// WHERE clause, omitted entirely when the container is empty.
    pub(crate) fn render_where(&self, out: &mut String) {
        if self.where_clause.is_empty() {
            return;
        }
        out.push_str(" WHERE ");
        Constraint::and(self.where_clause.iter().cloned()).render_sql(out);
    }

    /// Full SELECT with an explicit, already-qualified column list. The
    /// dialect strategies use this to build primary-key subselects.
    pub(crate) fn render_select(&self, out: &mut String, columns: &[String]) {
        out.push_str("SELECT ");
        let mut sep = "";
        for c in columns {
            out.push_str(sep);
            out.push_str(c);
            sep = ", ";
        }
        out.push_str(" FROM ");
        out.push_str(&self.table.name);
        out.push_str(" AS ");
        out.push_str(&self.alias);
        self.render_join_sql(out);
        self.render_where(out);
        if !self.group_by.is_empty() {
            out.push_str(" GROUP BY ");
            out.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            out.push_str(" HAVING ");
            Constraint::and(self.having.iter().cloned()).render_sql(out);
        }
        if !self.order_by.is_empty() {
            out.push_str(" ORDER BY ");
            out.push_str(&self.order_by.join(", "));
        }
    }

    /// WHERE and HAVING parameters, in rendered order.
    fn filter_params(&self) -> Vec<Value> {
        let mut params = Vec::new();
        for c in &self.where_clause {
            c.parameters(&mut params);
        }
        for c in &self.having {
            c.parameters(&mut params);
        }
        params
    }

    /// The query's SELECT statement and its parameters.
    pub fn select_sql(&self) -> (String, Vec<Value>) {
        let columns: Vec<String> = self
            .select_fields()
            .into_iter()
            .map(|(_, qualified, _)| qualified)
            .collect();
        let mut sql = String::new();
        self.render_select(&mut sql, &columns);
        (sql, self.filter_params())
    }

    /// Execute the SELECT and return a row cursor.
    pub fn query(&self) -> Result<Rows> {
        let fields = self.select_fields();
        let (sql, params) = self.select_sql();
        tracing::debug!("{sql}");

        let mut stmt = self.conn.prepare(&sql)?;
        if self.limit > 0 {
            stmt.limit(self.limit)?;
        }
        stmt.execute(params.into_iter().map(Param::Value).collect())?;
        stmt.clear_binds(1)?;

        let mut bindings = Vec::with_capacity(fields.len());
        for (ordinal, (name, _, fetch_type)) in fields.iter().enumerate() {
            let binding = stmt.bind(ordinal, *fetch_type)?;
            bindings.push((name.clone(), binding));
        }
        Ok(Rows { stmt, bindings })
    }

    /// Execute an UPDATE carrying the resultset's joins and constraints.
    /// `assignments` is an equality constraint tree; returns affected rows.
    pub fn update(&self, assignments: &Constraint) -> Result<i64> {
        let mut list = Vec::new();
        assignments.assignments(&mut list)?;
        check_duplicates(&list)?;

        let mut fields: Vec<String> = list.iter().map(|a| a.field.clone()).collect();
        let placeholders: Vec<String> = list.iter().map(|a| a.placeholder.clone()).collect();

        let mut params: Vec<Value> = Vec::new();
        for a in &list {
            params.extend(a.params.iter().cloned());
        }

        let mut sql = String::new();
        if self.arena.is_empty() {
            remove_prefix(&mut fields, &self.alias);
            sql.push_str("UPDATE ");
            sql.push_str(&self.table.name);
            render_update_set(&mut sql, &fields, &placeholders);
            self.render_where(&mut sql);
        } else {
            let flavor = self.conn.flavor()?;
            flavor.update_with_joins(&mut sql, self, &mut fields, &placeholders)?;
        }
        params.extend(self.filter_params());
        tracing::debug!("{sql}");

        let mut stmt = self.conn.prepare(&sql)?;
        stmt.execute(params.into_iter().map(Param::Value).collect())?;
        stmt.row_count()
    }

    /// INSERT one row and return it as persisted, serial columns included.
    ///
    /// Every primary-key column must be assigned unless it is serial. The
    /// INSERT and the keyed readback SELECT travel as one two-statement
    /// batch; the INSERT's row count is skipped by advancing to the next
    /// resultset.
    pub fn insert(&self, values: &Constraint) -> Result<Row> {
        let mut list = Vec::new();
        values.assignments(&mut list)?;
        check_duplicates(&list)?;

        let assigned: HashSet<&str> = list.iter().map(|a| a.field.as_str()).collect();
        for pk in &self.table.primary_keys {
            if !assigned.contains(pk.as_str()) && !self.table.is_serial(pk) {
                return Err(Error::MissingPrimaryKey {
                    table: self.table.name.clone(),
                    column: pk.clone(),
                });
            }
        }

        let flavor = self.conn.flavor()?;

        // Unassigned serial columns still appear in the INSERT, carrying
        // the dialect's serial placeholder.
        let unassigned_serials: BTreeSet<String> = self
            .table
            .serial_columns
            .iter()
            .filter(|c| !assigned.contains(c.as_str()))
            .cloned()
            .collect();

        let mut sql = format!("INSERT INTO {}(", self.table.name);
        let mut params: Vec<Value> = Vec::new();
        let mut sep = "";
        for a in &list {
            sql.push_str(sep);
            sql.push_str(&a.field);
            sep = ", ";
        }
        for serial in &unassigned_serials {
            sql.push_str(sep);
            sql.push_str(serial);
            sep = ", ";
        }
        sql.push_str(") VALUES (");
        sep = "";
        for a in &list {
            sql.push_str(sep);
            sql.push_str(&a.placeholder);
            params.extend(a.params.iter().cloned());
            sep = ", ";
        }
        for _ in &unassigned_serials {
            sql.push_str(sep);
            sql.push_str(flavor.default_value_serial());
            sep = ", ";
        }
        sql.push(')');

        // Key the readback on the assigned primary keys plus whatever the
        // dialect says the database just allocated.
        let mut key = Vec::new();
        for pk in &self.table.primary_keys {
            if let Some(a) = list.iter().find(|a| &a.field == pk) {
                key.push(Constraint::raw(
                    pk.clone(),
                    "=",
                    a.placeholder.clone(),
                    a.params.iter().cloned(),
                ));
            }
        }
        let serial_keys: BTreeSet<String> = unassigned_serials
            .iter()
            .filter(|c| self.table.primary_keys.contains(c))
            .cloned()
            .collect();
        if !serial_keys.is_empty() {
            key.push(flavor.inserted_serial(&self.table.name, &serial_keys)?);
        }
        let key = Constraint::and(key);

        sql.push_str("; SELECT ");
        sep = "";
        for c in &self.table.columns {
            sql.push_str(sep);
            sql.push_str(&c.name);
            sep = ", ";
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.table.name);
        sql.push_str(" WHERE ");
        key.render_sql(&mut sql);
        key.parameters(&mut params);
        tracing::debug!("{sql}");

        let mut stmt = self.conn.prepare(&sql)?;
        stmt.execute(params.into_iter().map(Param::Value).collect())?;
        // First result of the batch is the INSERT's row count.
        if !stmt.more_results()? {
            return Err(Error::protocol("insert readback produced no resultset"));
        }
        stmt.clear_binds(1)?;
        let mut bindings = Vec::with_capacity(self.table.columns.len());
        for (ordinal, c) in self.table.columns.iter().enumerate() {
            let binding = stmt.bind(ordinal, c.fetch_type)?;
            bindings.push((c.name.clone(), binding));
        }
        Rows { stmt, bindings }.only()
    }

    /// Persist a row's dirty fields by primary key, then refresh the row
    /// from the database. Returns false if nothing was dirty.
    pub fn update_row(&self, row: &mut Row) -> Result<bool> {
        let dirty: Vec<(String, Value)> = row
            .fields
            .iter()
            .filter(|f| f.updated())
            .map(|f| (f.name.clone(), f.current.clone()))
            .collect();
        if dirty.is_empty() {
            return Ok(false);
        }

        let mut key = Vec::new();
        for pk in &self.table.primary_keys {
            let field = row.fields.iter().find(|f| &f.name == pk).ok_or_else(|| {
                Error::MissingPrimaryKey {
                    table: self.table.name.clone(),
                    column: pk.clone(),
                }
            })?;
            key.push(Constraint::cmp(pk.clone(), "=", field.original.clone()));
        }

        let mut sql = format!("UPDATE {}", self.table.name);
        let fields: Vec<String> = dirty.iter().map(|(n, _)| n.clone()).collect();
        let placeholders: Vec<String> = dirty.iter().map(|_| "?".to_string()).collect();
        render_update_set(&mut sql, &fields, &placeholders);
        let key = Constraint::and(key);
        sql.push_str(" WHERE ");
        key.render_sql(&mut sql);

        let mut params: Vec<Value> = dirty.into_iter().map(|(_, v)| v).collect();
        key.parameters(&mut params);
        tracing::debug!("{sql}");

        let mut stmt = self.conn.prepare(&sql)?;
        stmt.execute(params.into_iter().map(Param::Value).collect())?;

        self.refresh_row(row)
    }

    /// Re-select a row by the current values of its primary keys.
    fn refresh_row(&self, row: &mut Row) -> Result<bool> {
        let mut key = Vec::new();
        for pk in &self.table.primary_keys {
            let field = row.fields.iter().find(|f| &f.name == pk).ok_or_else(|| {
                Error::MissingPrimaryKey {
                    table: self.table.name.clone(),
                    column: pk.clone(),
                }
            })?;
            key.push(Constraint::cmp(pk.clone(), "=", field.current.clone()));
        }
        let key = Constraint::and(key);

        let mut sql = String::from("SELECT ");
        let mut sep = "";
        for c in &self.table.columns {
            sql.push_str(sep);
            sql.push_str(&c.name);
            sep = ", ";
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.table.name);
        sql.push_str(" WHERE ");
        key.render_sql(&mut sql);
        let mut params = Vec::new();
        key.parameters(&mut params);

        let mut stmt = self.conn.prepare(&sql)?;
        stmt.execute(params.into_iter().map(Param::Value).collect())?;
        stmt.clear_binds(1)?;
        let mut bindings = Vec::with_capacity(self.table.columns.len());
        for (ordinal, c) in self.table.columns.iter().enumerate() {
            let binding = stmt.bind(ordinal, c.fetch_type)?;
            bindings.push((c.name.clone(), binding));
        }
        let fresh = Rows { stmt, bindings }.maybe()?;
        match fresh {
            Some(fresh) => {
                *row = fresh;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The declared fetch type of a base-table column.
    pub fn column_fetch_type(&self, column: &str) -> Option<FetchType> {
        self.table.fetch_type_of(column)
    }
}

fn check_duplicates(list: &[Assignment]) -> Result<()> {
    let mut seen = HashSet::new();
    for a in list {
        if !seen.insert(a.field.as_str()) {
            return Err(Error::DuplicateColumn {
                name: a.field.clone(),
            });
        }
    }
    Ok(())
}

/// Cursor over an executed builder query.
pub struct Rows {
    stmt: Statement,
    bindings: Vec<(String, crate::fetch::ColumnBinding)>,
}

impl Rows {
    /// Fetch the next row, materialized with dirty tracking.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.stmt.fetch()? == 0 {
            return Ok(None);
        }
        let mut fields = Vec::with_capacity(self.bindings.len());
        for (name, binding) in &self.bindings {
            let value = self
                .stmt
                .column_values(*binding)?
                .first()
                .cloned()
                .ok_or_else(|| Error::protocol("fetch produced no value"))?;
            fields.push(Field {
                name: name.clone(),
                original: value.clone(),
                current: value,
            });
        }
        Ok(Some(Row { fields }))
    }

    /// Exactly one row, anything else is an error.
    pub fn only(mut self) -> Result<Row> {
        let row = self.next_row()?.ok_or(Error::NoRows)?;
        if self.next_row()?.is_some() {
            return Err(Error::MultipleRows);
        }
        Ok(row)
    }

    /// Zero or one row.
    pub fn maybe(mut self) -> Result<Option<Row>> {
        let Some(row) = self.next_row()? else {
            return Ok(None);
        };
        if self.next_row()?.is_some() {
            return Err(Error::MultipleRows);
        }
        Ok(Some(row))
    }

    /// The underlying statement, for row counts and batch advancement.
    pub fn statement(&mut self) -> &mut Statement {
        &mut self.stmt
    }
}

/// One materialized record with per-field dirty tracking.
#[derive(Debug, Clone)]
pub struct Row {
    fields: Vec<Field>,
}

/// One column of a [`Row`]: the value as fetched and the value as currently
/// set, so a later UPDATE touches only what changed.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    original: Value,
    current: Value,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.current
    }

    pub fn original(&self) -> &Value {
        &self.original
    }

    pub fn set(&mut self, value: impl Into<Value>) {
        self.current = value.into();
    }

    pub fn updated(&self) -> bool {
        self.current != self.original
    }
}

impl Row {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::ColumnNotFound {
                name: name.to_string(),
            })
    }

    pub fn field_mut(&mut self, name: &str) -> Result<&mut Field> {
        self.fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::ColumnNotFound {
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        Ok(self.field(name)?.value())
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.field_mut(name)?.set(value);
        Ok(())
    }
}
