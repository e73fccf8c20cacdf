//! SQL construction with table prefixing and parameter binding.
//!
//! Table arguments written as `"{name}"` are rewritten to `prefix + name`, so
//! callers can write prefix-agnostic fragments. Text operands are always bound
//! as named parameters; integers are inlined.
//!
//! ```
//! use elgg_core::SqlDialect;
//! use elgg_storage::QueryBuilder;
//!
//! let mut qb = QueryBuilder::new("elgg_", SqlDialect::Sqlite);
//! qb.select(&["e.*"]).from("{entities}", Some("e")).set_max_results(2);
//! assert_eq!(qb.get_sql(), "SELECT e.* FROM elgg_entities e LIMIT 2");
//! ```

use std::collections::HashMap;

use elgg_core::{OrderBy, SqlDialect, SqlValue};

use crate::error::StorageError;
use crate::options::QueryOptions;
use crate::traits::{Database, Row, prefix_table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// Binding hint for [`QueryBuilder::create_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    Text,
}

#[derive(Debug, Clone)]
pub enum Operand {
    Column(String),
    Int(i64),
    Text(String),
    Subquery(Box<QueryBuilder>),
}

impl Operand {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(Operand, Operand),
    Le(Operand, Operand),
    In(Operand, Vec<SqlValue>),
    IsNull(Operand),
    /// Never true; used to force an empty result.
    Never,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Raw(String),
}

impl Predicate {
    pub fn eq(left: Operand, right: Operand) -> Self {
        Self::Eq(left, right)
    }

    pub fn column_eq_int(column: &str, value: i64) -> Self {
        Self::Eq(Operand::column(column), Operand::Int(value))
    }

    pub fn column_eq_text(column: &str, value: &str) -> Self {
        Self::Eq(Operand::column(column), Operand::text(value))
    }
}

#[derive(Debug, Clone)]
pub enum QueryResult {
    Rows(Vec<Row>),
    Row(Option<Row>),
    InsertId(i64),
    Affected(usize),
}

#[derive(Debug, Clone)]
enum Source {
    Table { table: String, alias: Option<String> },
    Subquery { sql: String, alias: String },
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    prefix: String,
    dialect: SqlDialect,
    namespace: String,
    kind: QueryKind,
    select: Vec<String>,
    from: Option<Source>,
    joins: Vec<String>,
    wheres: Vec<String>,
    group_by: Vec<String>,
    order_by: Vec<OrderBy>,
    sets: Vec<(String, String)>,
    values: Vec<(String, String)>,
    max_results: Option<u64>,
    first_result: u64,
    params: Vec<(String, SqlValue)>,
    param_counter: usize,
    subquery_counter: usize,
    append: String,
}

impl QueryBuilder {
    pub fn new(prefix: &str, dialect: SqlDialect) -> Self {
        Self::with_namespace(prefix, dialect, "qb".to_string())
    }

    pub fn for_db(db: &dyn Database) -> Self {
        Self::new(db.prefix(), db.dialect())
    }

    fn with_namespace(prefix: &str, dialect: SqlDialect, namespace: String) -> Self {
        Self {
            prefix: prefix.to_string(),
            dialect,
            namespace,
            kind: QueryKind::Select,
            select: Vec::new(),
            from: None,
            joins: Vec::new(),
            wheres: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            sets: Vec::new(),
            values: Vec::new(),
            max_results: None,
            first_result: 0,
            params: Vec::new(),
            param_counter: 0,
            subquery_counter: 0,
            append: String::new(),
        }
    }

    /// A builder for a nested query whose parameter names cannot collide with
    /// this one's.
    pub fn subquery(&mut self) -> QueryBuilder {
        self.subquery_counter += 1;
        let namespace = format!("{}s{}", self.namespace, self.subquery_counter);
        Self::with_namespace(&self.prefix, self.dialect, namespace)
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn prefix_table(&self, table: &str) -> String {
        prefix_table(&self.prefix, table)
    }

    // ========================================================================
    // Statement shape
    // ========================================================================

    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        self.kind = QueryKind::Select;
        self.select = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn add_select(&mut self, column: &str) -> &mut Self {
        self.kind = QueryKind::Select;
        self.select.push(column.to_string());
        self
    }

    pub fn from(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        self.from = Some(Source::Table {
            table: self.prefix_table(table),
            alias: alias.map(str::to_string),
        });
        self
    }

    /// Select from a derived table. The inner builder's parameters move into
    /// this one.
    pub fn from_subquery(&mut self, inner: QueryBuilder, alias: &str) -> &mut Self {
        let sql = self.absorb(&inner);
        self.from = Some(Source::Subquery {
            sql,
            alias: alias.to_string(),
        });
        self
    }

    pub fn insert(&mut self, table: &str) -> &mut Self {
        self.kind = QueryKind::Insert;
        self.from = Some(Source::Table {
            table: self.prefix_table(table),
            alias: None,
        });
        self
    }

    pub fn update(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        self.kind = QueryKind::Update;
        self.from = Some(Source::Table {
            table: self.prefix_table(table),
            alias: alias.map(str::to_string),
        });
        self
    }

    pub fn delete(&mut self, table: &str) -> &mut Self {
        self.kind = QueryKind::Delete;
        self.from = Some(Source::Table {
            table: self.prefix_table(table),
            alias: None,
        });
        self
    }

    pub fn join(&mut self, kind: JoinKind, table: &str, alias: &str, on: &Predicate) -> &mut Self {
        let condition = self.render_predicate(on);
        let table = self.prefix_table(table);
        self.joins
            .push(format!("{} {table} {alias} ON {condition}", kind.as_sql()));
        self
    }

    pub fn inner_join(&mut self, table: &str, alias: &str, on: &Predicate) -> &mut Self {
        self.join(JoinKind::Inner, table, alias, on)
    }

    pub fn left_join(&mut self, table: &str, alias: &str, on: &Predicate) -> &mut Self {
        self.join(JoinKind::Left, table, alias, on)
    }

    /// Replace the WHERE clause.
    pub fn where_clause(&mut self, predicate: &Predicate) -> &mut Self {
        self.wheres.clear();
        self.and_where(predicate)
    }

    pub fn and_where(&mut self, predicate: &Predicate) -> &mut Self {
        let rendered = self.render_predicate(predicate);
        self.wheres.push(rendered);
        self
    }

    pub fn or_where(&mut self, predicate: &Predicate) -> &mut Self {
        let rendered = self.render_predicate(predicate);
        let current = self.render_wheres();
        self.wheres = match current {
            Some(existing) => vec![format!("({existing}) OR ({rendered})")],
            None => vec![rendered],
        };
        self
    }

    pub fn group_by(&mut self, expression: &str) -> &mut Self {
        self.group_by.push(expression.to_string());
        self
    }

    /// Assign a column in an UPDATE. `expression` is raw SQL, typically a
    /// parameter name from [`Self::create_named_parameter`].
    pub fn set(&mut self, column: &str, expression: &str) -> &mut Self {
        self.sets.push((column.to_string(), expression.to_string()));
        self
    }

    /// Assign a column in an INSERT.
    pub fn set_value(&mut self, column: &str, expression: &str) -> &mut Self {
        self.values.push((column.to_string(), expression.to_string()));
        self
    }

    pub fn order_by(&mut self, order: OrderBy) -> &mut Self {
        self.order_by = vec![order];
        self
    }

    pub fn add_order_by(&mut self, order: OrderBy) -> &mut Self {
        self.order_by.push(order);
        self
    }

    pub fn set_max_results(&mut self, max: u64) -> &mut Self {
        self.max_results = Some(max);
        self
    }

    pub fn set_first_result(&mut self, first: u64) -> &mut Self {
        self.first_result = first;
        self
    }

    /// Raw SQL appended after the generated statement, e.g. an upsert tail.
    pub fn append_sql(&mut self, sql: &str) -> &mut Self {
        self.append = format!(" {sql}");
        self
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    pub fn create_named_parameter(&mut self, value: impl Into<SqlValue>) -> String {
        self.param_counter += 1;
        let name = format!(":{}_{}", self.namespace, self.param_counter);
        self.params.push((name.clone(), value.into()));
        name
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<SqlValue>) -> &mut Self {
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name.to_string(), value)),
        }
        self
    }

    pub fn parameters(&self) -> &[(String, SqlValue)] {
        &self.params
    }

    /// Take over `inner`'s parameters and return its SQL. Names this builder
    /// already binds, or could still generate, are rebound under fresh ones.
    fn absorb(&mut self, inner: &QueryBuilder) -> String {
        let own = format!(":{}_", self.namespace);
        let mut renames = HashMap::new();
        for (name, value) in &inner.params {
            if name.starts_with(&own) || self.params.iter().any(|(n, _)| n == name) {
                let fresh = self.create_named_parameter(value.clone());
                renames.insert(name.as_str(), fresh);
            } else {
                self.params.push((name.clone(), value.clone()));
            }
        }
        rename_placeholders(&inner.get_sql(), &renames)
    }

    /// Build `(v1,v2,...)` for an IN operator. With [`ParamType::Integer`],
    /// plain non-negative integers are inlined; every other value is bound.
    pub fn create_set(&mut self, values: &[SqlValue], ty: ParamType) -> Result<String, StorageError> {
        if values.is_empty() {
            return Err(StorageError::InvalidArgument("cannot build an empty set".into()));
        }
        let mut placeholders = Vec::with_capacity(values.len());
        for value in values {
            match value {
                SqlValue::Null | SqlValue::Blob(_) => {
                    return Err(StorageError::InvalidArgument(format!(
                        "unsupported set member: {value:?}"
                    )));
                }
                SqlValue::Integer(n) if ty == ParamType::Integer && *n >= 0 => {
                    placeholders.push(n.to_string());
                }
                SqlValue::Text(s) if ty == ParamType::Integer && is_plain_integer(s) => {
                    placeholders.push(s.clone());
                }
                other => placeholders.push(self.create_named_parameter(other.clone())),
            }
        }
        Ok(format!("({})", placeholders.join(",")))
    }

    // ========================================================================
    // Options
    // ========================================================================

    /// Append the orderings found in `options`, first one as primary key.
    pub fn set_order_from_options(&mut self, options: &QueryOptions) -> Result<&mut Self, StorageError> {
        if let Some(order) = &options.order_by {
            for order_by in order.resolve()? {
                self.add_order_by(order_by);
            }
        }
        Ok(self)
    }

    /// Apply joins, wheres, ordering and paging from `options`.
    pub fn apply_options(&mut self, options: &QueryOptions) -> Result<&mut Self, StorageError> {
        for join in &options.joins {
            self.join(join.kind, &join.table, &join.alias, &join.on);
        }
        for predicate in &options.wheres {
            self.and_where(predicate);
        }
        self.set_order_from_options(options)?;
        if let Some(limit) = options.limit {
            self.set_max_results(limit);
        }
        self.set_first_result(options.offset);
        Ok(self)
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    fn render_operand(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Column(c) => c.clone(),
            Operand::Int(n) => n.to_string(),
            Operand::Text(s) => self.create_named_parameter(s.as_str()),
            Operand::Subquery(inner) => format!("({})", self.absorb(inner)),
        }
    }

    pub fn render_predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::Eq(l, r) => {
                let l = self.render_operand(l);
                let r = self.render_operand(r);
                format!("{l} = {r}")
            }
            Predicate::Le(l, r) => {
                let l = self.render_operand(l);
                let r = self.render_operand(r);
                format!("{l} <= {r}")
            }
            Predicate::In(l, values) => {
                let l = self.render_operand(l);
                let ty = if values.iter().all(|v| matches!(v, SqlValue::Integer(_))) {
                    ParamType::Integer
                } else {
                    ParamType::Text
                };
                // An empty IN list can never match.
                match self.create_set(values, ty) {
                    Ok(set) => format!("{l} IN {set}"),
                    Err(_) if values.is_empty() => "1 = 2".to_string(),
                    Err(_) => {
                        let bound: Vec<String> = values
                            .iter()
                            .map(|v| self.create_named_parameter(v.clone()))
                            .collect();
                        format!("{l} IN ({})", bound.join(","))
                    }
                }
            }
            Predicate::IsNull(op) => {
                let op = self.render_operand(op);
                format!("{op} IS NULL")
            }
            Predicate::Never => "1 = 2".to_string(),
            Predicate::And(parts) if parts.is_empty() => "1 = 1".to_string(),
            Predicate::And(parts) => {
                let rendered: Vec<String> = parts
                    .iter()
                    .map(|p| format!("({})", self.render_predicate(p)))
                    .collect();
                rendered.join(" AND ")
            }
            Predicate::Or(parts) if parts.is_empty() => "1 = 2".to_string(),
            Predicate::Or(parts) => {
                let rendered: Vec<String> = parts
                    .iter()
                    .map(|p| format!("({})", self.render_predicate(p)))
                    .collect();
                rendered.join(" OR ")
            }
            Predicate::Raw(sql) => sql.clone(),
        }
    }

    fn render_wheres(&self) -> Option<String> {
        match self.wheres.len() {
            0 => None,
            1 => Some(self.wheres[0].clone()),
            _ => Some(
                self.wheres
                    .iter()
                    .map(|w| format!("({w})"))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
        }
    }

    fn render_limit(&self) -> String {
        match (self.max_results, self.first_result) {
            (None, 0) => String::new(),
            (Some(max), 0) => format!(" LIMIT {max}"),
            (Some(max), first) => format!(" LIMIT {max} OFFSET {first}"),
            (None, first) => format!(" LIMIT {} OFFSET {first}", self.dialect.unbounded_limit()),
        }
    }

    fn render_from(&self) -> String {
        match &self.from {
            Some(Source::Table { table, alias: Some(alias) }) => format!("{table} {alias}"),
            Some(Source::Table { table, alias: None }) => table.clone(),
            Some(Source::Subquery { sql, alias }) => format!("({sql}) {alias}"),
            None => String::new(),
        }
    }

    pub fn get_sql(&self) -> String {
        let mut sql = match self.kind {
            QueryKind::Select => {
                let mut sql = format!("SELECT {}", self.select.join(", "));
                if self.from.is_some() {
                    sql.push_str(" FROM ");
                    sql.push_str(&self.render_from());
                }
                for join in &self.joins {
                    sql.push(' ');
                    sql.push_str(join);
                }
                if let Some(wheres) = self.render_wheres() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&wheres);
                }
                if !self.group_by.is_empty() {
                    sql.push_str(" GROUP BY ");
                    sql.push_str(&self.group_by.join(", "));
                }
                if !self.order_by.is_empty() {
                    let orders: Vec<String> = self.order_by.iter().map(|o| o.to_string()).collect();
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&orders.join(", "));
                }
                sql.push_str(&self.render_limit());
                sql
            }
            QueryKind::Insert => {
                let columns: Vec<&str> = self.values.iter().map(|(c, _)| c.as_str()).collect();
                let values: Vec<&str> = self.values.iter().map(|(_, v)| v.as_str()).collect();
                format!(
                    "INSERT INTO {} ({}) VALUES({})",
                    self.render_from(),
                    columns.join(", "),
                    values.join(", ")
                )
            }
            QueryKind::Update => {
                let sets: Vec<String> = self.sets.iter().map(|(c, v)| format!("{c} = {v}")).collect();
                let mut sql = format!("UPDATE {} SET {}", self.render_from(), sets.join(", "));
                if let Some(wheres) = self.render_wheres() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&wheres);
                }
                sql
            }
            QueryKind::Delete => {
                let mut sql = format!("DELETE FROM {}", self.render_from());
                if let Some(wheres) = self.render_wheres() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&wheres);
                }
                sql
            }
        };
        sql.push_str(&self.append);
        sql
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run the statement. For a SELECT, `single_row` asks for the first row
    /// only. Storage errors are passed through untouched.
    pub fn execute(&self, db: &dyn Database, single_row: bool) -> Result<QueryResult, StorageError> {
        let sql = self.get_sql();
        let params = self.parameters();
        match self.kind {
            QueryKind::Select if single_row => Ok(QueryResult::Row(db.get_data_row(&sql, params)?)),
            QueryKind::Select => Ok(QueryResult::Rows(db.get_data(&sql, params)?)),
            QueryKind::Insert => Ok(QueryResult::InsertId(db.insert_data(&sql, params)?)),
            QueryKind::Update => Ok(QueryResult::Affected(db.update_data(&sql, params)?)),
            QueryKind::Delete => Ok(QueryResult::Affected(db.delete_data(&sql, params)?)),
        }
    }

    pub fn fetch_all(&self, db: &dyn Database) -> Result<Vec<Row>, StorageError> {
        match self.execute(db, false)? {
            QueryResult::Rows(rows) => Ok(rows),
            other => Err(not_a_select(other)),
        }
    }

    pub fn fetch_one(&self, db: &dyn Database) -> Result<Option<Row>, StorageError> {
        match self.execute(db, true)? {
            QueryResult::Row(row) => Ok(row),
            other => Err(not_a_select(other)),
        }
    }

    /// Run an UPDATE or DELETE and return the affected row count.
    pub fn execute_write(&self, db: &dyn Database) -> Result<usize, StorageError> {
        match self.execute(db, false)? {
            QueryResult::Affected(n) => Ok(n),
            QueryResult::InsertId(_) => Ok(1),
            other => Err(StorageError::InvalidArgument(format!(
                "expected a write statement, got {other:?}"
            ))),
        }
    }
}

fn not_a_select(result: QueryResult) -> StorageError {
    StorageError::InvalidArgument(format!("expected a SELECT, got {result:?}"))
}

/// Rewrite whole `:name` placeholders found in `renames`, in one pass.
fn rename_placeholders(sql: &str, renames: &HashMap<&str, String>) -> String {
    if renames.is_empty() {
        return sql.to_string();
    }
    let is_name_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(start) = rest.find(':') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let len = tail.find(|c: char| !is_name_char(c)).unwrap_or(tail.len());
        let token = &rest[start..start + 1 + len];
        match renames.get(token) {
            Some(fresh) => out.push_str(fresh),
            None => out.push_str(token),
        }
        rest = &rest[start + 1 + len..];
    }
    out.push_str(rest);
    out
}

fn is_plain_integer(s: &str) -> bool {
    match s.as_bytes() {
        [] => false,
        [b'0'] => true,
        [first, rest @ ..] => (b'1'..=b'9').contains(first) && rest.iter().all(u8::is_ascii_digit),
    }
}
