use elgg_core::{SqlDialect, SqlValue};

use crate::error::StorageError;

/// Named parameters bound to a statement, e.g. `(":qb_1", Text("foo"))`.
pub type Params = [(String, SqlValue)];

/// One result row: column names in select order, with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, StorageError> {
        self.get(column)
            .and_then(SqlValue::as_integer)
            .ok_or_else(|| StorageError::Serialization(format!("column {column} is not an integer")))
    }

    pub fn get_string(&self, column: &str) -> Option<String> {
        self.get(column).and_then(SqlValue::to_text)
    }

    pub fn columns(&self) -> impl Iterator<Item = &(String, SqlValue)> {
        self.columns.iter()
    }
}

/// The SQL-executing service every component talks to.
///
/// Errors from the engine are returned as-is; this layer never retries.
pub trait Database {
    fn prefix(&self) -> &str;

    fn dialect(&self) -> SqlDialect;

    /// `"{name}"` becomes `prefix + name`; anything else passes through.
    fn prefix_table(&self, table: &str) -> String {
        prefix_table(self.prefix(), table)
    }

    fn get_data(&self, sql: &str, params: &Params) -> Result<Vec<Row>, StorageError>;

    fn get_data_row(&self, sql: &str, params: &Params) -> Result<Option<Row>, StorageError> {
        Ok(self.get_data(sql, params)?.into_iter().next())
    }

    /// Returns the id of the inserted row.
    fn insert_data(&self, sql: &str, params: &Params) -> Result<i64, StorageError>;

    /// Returns the number of rows changed.
    fn update_data(&self, sql: &str, params: &Params) -> Result<usize, StorageError>;

    /// Returns the number of rows removed.
    fn delete_data(&self, sql: &str, params: &Params) -> Result<usize, StorageError>;

    /// Starts a transaction. Returns false when one is already open, in which
    /// case the caller must not commit or roll back.
    fn begin(&self) -> Result<bool, StorageError>;

    fn commit(&self) -> Result<(), StorageError>;

    fn rollback(&self) -> Result<(), StorageError>;
}

pub fn prefix_table(prefix: &str, table: &str) -> String {
    match table.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        Some(name) => format!("{prefix}{name}"),
        None => table.to_string(),
    }
}

/// Run `f` inside a transaction, rolling back if it fails. Nested calls join
/// the outer transaction.
pub fn transaction<T, E>(db: &dyn Database, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
where
    E: From<StorageError>,
{
    let started = db.begin()?;
    match f() {
        Ok(value) => {
            if started {
                db.commit()?;
            }
            Ok(value)
        }
        Err(e) => {
            if started {
                if let Err(rollback_err) = db.rollback() {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_braced_tables_only() {
        assert_eq!(prefix_table("test_", "{foo}"), "test_foo");
        assert_eq!(prefix_table("test_", "foo"), "foo");
        assert_eq!(prefix_table("test_", ""), "");
        assert_eq!(prefix_table("test_", "{foo"), "{foo");
    }

    #[test]
    fn row_lookup_by_column() {
        let row = Row::new(vec![
            ("id".into(), SqlValue::Integer(3)),
            ("name".into(), SqlValue::Text("x".into())),
        ]);
        assert_eq!(row.get_i64("id").unwrap(), 3);
        assert_eq!(row.get_string("name").as_deref(), Some("x"));
        assert!(row.get("missing").is_none());
        assert!(row.get_i64("name").is_err());
    }
}
