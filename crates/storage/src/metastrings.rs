use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use elgg_core::MetastringId;

use crate::error::StorageError;
use crate::query::{Predicate, QueryBuilder};
use crate::traits::Database;

/// Interned strings shared by metadata names and values.
pub struct Metastrings {
    db: Rc<dyn Database>,
    ids: RefCell<HashMap<String, MetastringId>>,
}

impl Metastrings {
    pub fn new(db: Rc<dyn Database>) -> Self {
        Self {
            db,
            ids: RefCell::new(HashMap::new()),
        }
    }

    /// Case-sensitive lookup.
    pub fn get_id(&self, string: &str) -> Result<Option<MetastringId>, StorageError> {
        if let Some(id) = self.ids.borrow().get(string) {
            return Ok(Some(*id));
        }
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        qb.select(&["id"])
            .from("{metastrings}", None)
            .and_where(&Predicate::column_eq_text("string", string));
        let Some(row) = qb.fetch_one(self.db.as_ref())? else {
            return Ok(None);
        };
        let id = MetastringId::from_raw(row.get_i64("id")?);
        self.ids.borrow_mut().insert(string.to_string(), id);
        Ok(Some(id))
    }

    pub fn get_or_create_id(&self, string: &str) -> Result<MetastringId, StorageError> {
        if let Some(id) = self.get_id(string)? {
            return Ok(id);
        }
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        let value = qb.create_named_parameter(string);
        qb.insert("{metastrings}").set_value("string", &value);
        let id = match qb.execute(self.db.as_ref(), false)? {
            crate::query::QueryResult::InsertId(id) => MetastringId::from_raw(id),
            other => {
                return Err(StorageError::Serialization(format!(
                    "unexpected insert result {other:?}"
                )));
            }
        };
        tracing::trace!(string, id = %id, "metastring created");
        self.ids.borrow_mut().insert(string.to_string(), id);
        Ok(id)
    }

    pub fn get_string(&self, id: MetastringId) -> Result<Option<String>, StorageError> {
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        qb.select(&["string"])
            .from("{metastrings}", None)
            .and_where(&Predicate::column_eq_int("id", id.get()));
        Ok(qb.fetch_one(self.db.as_ref())?.and_then(|row| row.get_string("string")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteDatabase;

    #[test]
    fn interns_case_sensitively() {
        let db: Rc<dyn Database> = Rc::new(SqliteDatabase::open_in_memory("t_").unwrap());
        let strings = Metastrings::new(db);

        assert!(strings.get_id("Foo").unwrap().is_none());
        let upper = strings.get_or_create_id("Foo").unwrap();
        let lower = strings.get_or_create_id("foo").unwrap();
        assert_ne!(upper, lower);
        assert_eq!(strings.get_or_create_id("Foo").unwrap(), upper);
        assert_eq!(strings.get_string(lower).unwrap().as_deref(), Some("foo"));
    }
}
