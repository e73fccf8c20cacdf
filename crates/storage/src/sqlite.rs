use rusqlite::Connection;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

use elgg_core::{SiteConfig, SqlDialect, SqlValue};

use crate::error::StorageError;
use crate::traits::{Database, Params, Row};

/// Borrowed bridge from [`SqlValue`] to rusqlite's binding machinery.
struct Bind<'a>(&'a SqlValue);

impl ToSql for Bind<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self.0 {
            SqlValue::Null => ValueRef::Null,
            SqlValue::Integer(n) => ValueRef::Integer(*n),
            SqlValue::Real(f) => ValueRef::Real(*f),
            SqlValue::Text(s) => ValueRef::Text(s.as_bytes()),
            SqlValue::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

fn read_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(n) => SqlValue::Integer(n),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}

pub struct SqliteDatabase {
    conn: Connection,
    prefix: String,
}

impl SqliteDatabase {
    pub fn open(path: &str, prefix: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Connection(format!("{path}: {e}")))?;
        crate::schema::init_schema(&conn, prefix)?;
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    pub fn open_in_memory(prefix: &str) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        crate::schema::init_schema(&conn, prefix)?;
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    pub fn from_config(config: &SiteConfig) -> Result<Self, StorageError> {
        if config.dialect != SqlDialect::Sqlite {
            return Err(StorageError::Connection(format!(
                "the sqlite driver cannot serve the {:?} dialect",
                config.dialect
            )));
        }
        if config.database == ":memory:" {
            Self::open_in_memory(&config.dbprefix)
        } else {
            Self::open(&config.database, &config.dbprefix)
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn execute(&self, sql: &str, params: &Params) -> Result<usize, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let binds: Vec<(&str, Bind<'_>)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), Bind(value)))
            .collect();
        let named: Vec<(&str, &dyn ToSql)> = binds
            .iter()
            .map(|(name, bind)| (*name, bind as &dyn ToSql))
            .collect();
        Ok(stmt.execute(named.as_slice())?)
    }
}

impl Database for SqliteDatabase {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn get_data(&self, sql: &str, params: &Params) -> Result<Vec<Row>, StorageError> {
        tracing::trace!(sql, "get_data");
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let binds: Vec<(&str, Bind<'_>)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), Bind(value)))
            .collect();
        let named: Vec<(&str, &dyn ToSql)> = binds
            .iter()
            .map(|(name, bind)| (*name, bind as &dyn ToSql))
            .collect();

        let rows = stmt
            .query_map(named.as_slice(), |row| {
                let mut columns = Vec::with_capacity(names.len());
                for (idx, name) in names.iter().enumerate() {
                    columns.push((name.clone(), read_value(row.get_ref(idx)?)));
                }
                Ok(Row::new(columns))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_data(&self, sql: &str, params: &Params) -> Result<i64, StorageError> {
        tracing::trace!(sql, "insert_data");
        self.execute(sql, params)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_data(&self, sql: &str, params: &Params) -> Result<usize, StorageError> {
        tracing::trace!(sql, "update_data");
        self.execute(sql, params)
    }

    fn delete_data(&self, sql: &str, params: &Params) -> Result<usize, StorageError> {
        tracing::trace!(sql, "delete_data");
        self.execute(sql, params)
    }

    fn begin(&self) -> Result<bool, StorageError> {
        if !self.conn.is_autocommit() {
            return Ok(false);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(true)
    }

    fn commit(&self) -> Result<(), StorageError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<(), StorageError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::transaction;

    fn params(list: &[(&str, SqlValue)]) -> Vec<(String, SqlValue)> {
        list.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn crud_roundtrip_with_named_params() {
        let db = SqliteDatabase::open_in_memory("t_").unwrap();
        db.insert_data(
            "INSERT INTO t_datalists (name, value) VALUES (:n, :v)",
            &params(&[(":n", "a".into()), (":v", "1".into())]),
        )
        .unwrap();

        let row = db
            .get_data_row(
                "SELECT name, value FROM t_datalists WHERE name = :n",
                &params(&[(":n", "a".into())]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(row.get_string("value").as_deref(), Some("1"));

        let changed = db
            .update_data(
                "UPDATE t_datalists SET value = :v WHERE name = :n",
                &params(&[(":n", "a".into()), (":v", "2".into())]),
            )
            .unwrap();
        assert_eq!(changed, 1);

        let removed = db.delete_data("DELETE FROM t_datalists", &[]).unwrap();
        assert_eq!(removed, 1);
        assert!(db.get_data("SELECT * FROM t_datalists", &[]).unwrap().is_empty());
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = SqliteDatabase::open_in_memory("t_").unwrap();
        let result: Result<(), StorageError> = transaction(&db, || {
            db.insert_data("INSERT INTO t_datalists (name, value) VALUES ('x', 'y')", &[])?;
            Err(StorageError::InvalidArgument("forced".into()))
        });
        assert!(result.is_err());
        assert!(db.get_data("SELECT * FROM t_datalists", &[]).unwrap().is_empty());
    }

    #[test]
    fn nested_transaction_joins_outer() {
        let db = SqliteDatabase::open_in_memory("t_").unwrap();
        let result: Result<(), StorageError> = transaction(&db, || {
            transaction(&db, || {
                db.insert_data("INSERT INTO t_datalists (name, value) VALUES ('x', 'y')", &[])?;
                Ok::<(), StorageError>(())
            })?;
            assert!(!db.conn().is_autocommit());
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(db.get_data("SELECT * FROM t_datalists", &[]).unwrap().len(), 1);
    }

    #[test]
    fn config_rejects_foreign_dialect() {
        let config = SiteConfig {
            dialect: SqlDialect::Mysql,
            ..SiteConfig::default()
        };
        assert!(matches!(
            SqliteDatabase::from_config(&config),
            Err(StorageError::Connection(_))
        ));
    }
}
