use std::rc::Rc;

use elgg_core::{AccessId, Guid};
use elgg_storage::{Database, Metastrings, Operand, Predicate, QueryBuilder, QueryResult, StorageError};
use time::OffsetDateTime;

use crate::access::access_predicate;
use crate::error::EngineError;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Text,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub id: i64,
    pub entity_guid: Guid,
    pub name: String,
    pub value: String,
    pub owner_guid: Guid,
    pub access_id: AccessId,
}

/// Metadata rows whose names and values live in the metastrings table.
pub struct MetadataStore {
    db: Rc<dyn Database>,
    session: Rc<Session>,
    metastrings: Rc<Metastrings>,
}

impl MetadataStore {
    pub fn new(db: Rc<dyn Database>, session: Rc<Session>, metastrings: Rc<Metastrings>) -> Self {
        Self {
            db,
            session,
            metastrings,
        }
    }

    pub fn create(
        &self,
        entity_guid: Guid,
        name: &str,
        value: &str,
        value_type: ValueType,
        owner_guid: Guid,
        access_id: AccessId,
    ) -> Result<i64, EngineError> {
        let name_id = self.metastrings.get_or_create_id(name)?;
        let value_id = self.metastrings.get_or_create_id(value)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        let value_type = qb.create_named_parameter(value_type.as_str());
        qb.insert("{metadata}")
            .set_value("entity_guid", &entity_guid.to_string())
            .set_value("name_id", &name_id.to_string())
            .set_value("value_id", &value_id.to_string())
            .set_value("value_type", &value_type)
            .set_value("owner_guid", &owner_guid.to_string())
            .set_value("access_id", &access_id.to_string())
            .set_value("time_created", &now.to_string());
        match qb.execute(self.db.as_ref(), false)? {
            QueryResult::InsertId(id) => Ok(id),
            other => Err(StorageError::Serialization(format!("unexpected insert result {other:?}")).into()),
        }
    }

    /// First metadata row named `name` on the entity that the acting user
    /// can see.
    pub fn get(&self, entity_guid: Guid, name: &str) -> Result<Option<Metadata>, EngineError> {
        let Some(name_id) = self.metastrings.get_id(name)? else {
            return Ok(None);
        };
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        qb.select(&["md.id", "md.owner_guid", "md.access_id", "v.string AS value"])
            .from("{metadata}", Some("md"))
            .inner_join(
                "{metastrings}",
                "v",
                &Predicate::eq(Operand::column("v.id"), Operand::column("md.value_id")),
            )
            .and_where(&Predicate::column_eq_int("md.entity_guid", entity_guid.get()))
            .and_where(&Predicate::column_eq_int("md.name_id", name_id.get()))
            .order_by(elgg_core::OrderBy::asc("md.id")?)
            .set_max_results(1);
        if let Some(access) = access_predicate(&self.session, "md.access_id", "md.owner_guid") {
            qb.and_where(&access);
        }
        let Some(row) = qb.fetch_one(self.db.as_ref())? else {
            return Ok(None);
        };
        Ok(Some(Metadata {
            id: row.get_i64("id")?,
            entity_guid,
            name: name.to_string(),
            value: row.get_string("value").unwrap_or_default(),
            owner_guid: Guid::from_raw(row.get_i64("owner_guid")?),
            access_id: AccessId::from_raw(row.get_i64("access_id")?),
        }))
    }

    /// Removes every row named `name` on the entity, regardless of access.
    pub fn delete(&self, entity_guid: Guid, name: &str) -> Result<usize, EngineError> {
        let Some(name_id) = self.metastrings.get_id(name)? else {
            return Ok(0);
        };
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        qb.delete("{metadata}")
            .and_where(&Predicate::column_eq_int("entity_guid", entity_guid.get()))
            .and_where(&Predicate::column_eq_int("name_id", name_id.get()));
        Ok(qb.execute_write(self.db.as_ref())?)
    }

    /// Owner and access of the first row named `name`, regardless of access.
    pub fn owner_and_access(&self, entity_guid: Guid, name: &str) -> Result<Option<(Guid, AccessId)>, EngineError> {
        let Some(name_id) = self.metastrings.get_id(name)? else {
            return Ok(None);
        };
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        qb.select(&["owner_guid", "access_id"])
            .from("{metadata}", None)
            .and_where(&Predicate::column_eq_int("name_id", name_id.get()))
            .and_where(&Predicate::column_eq_int("entity_guid", entity_guid.get()))
            .set_max_results(1);
        let Some(row) = qb.fetch_one(self.db.as_ref())? else {
            return Ok(None);
        };
        Ok(Some((
            Guid::from_raw(row.get_i64("owner_guid")?),
            AccessId::from_raw(row.get_i64("access_id")?),
        )))
    }

    pub fn set_owner(&self, entity_guid: Guid, name: &str, owner: Guid) -> Result<usize, EngineError> {
        self.update_column(entity_guid, name, "owner_guid", owner.get())
    }

    pub fn set_access(&self, entity_guid: Guid, name: &str, access: AccessId) -> Result<usize, EngineError> {
        self.update_column(entity_guid, name, "access_id", access.get())
    }

    fn update_column(&self, entity_guid: Guid, name: &str, column: &str, value: i64) -> Result<usize, EngineError> {
        let Some(name_id) = self.metastrings.get_id(name)? else {
            return Ok(0);
        };
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        qb.update("{metadata}", None)
            .set(column, &value.to_string())
            .and_where(&Predicate::column_eq_int("name_id", name_id.get()))
            .and_where(&Predicate::column_eq_int("entity_guid", entity_guid.get()));
        Ok(qb.execute_write(self.db.as_ref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elgg_storage::SqliteDatabase;

    fn store() -> (Rc<Session>, MetadataStore) {
        let db: Rc<dyn Database> = Rc::new(SqliteDatabase::open_in_memory("t_").unwrap());
        let session = Rc::new(Session::new());
        let metastrings = Rc::new(Metastrings::new(db.clone()));
        (session.clone(), MetadataStore::new(db, session, metastrings))
    }

    #[test]
    fn access_limits_visibility() {
        let (session, store) = store();
        let entity = Guid::from_raw(10);
        store
            .create(entity, "secret", "x", ValueType::Text, Guid::from_raw(3), AccessId::PRIVATE)
            .unwrap();

        assert!(store.get(entity, "secret").unwrap().is_none());
        session.login(Guid::from_raw(3));
        assert_eq!(store.get(entity, "secret").unwrap().unwrap().value, "x");
        session.logout();
        assert_eq!(
            store.owner_and_access(entity, "secret").unwrap(),
            Some((Guid::from_raw(3), AccessId::PRIVATE))
        );
    }

    #[test]
    fn update_and_delete_by_name() {
        let (_session, store) = store();
        let entity = Guid::from_raw(10);
        store
            .create(entity, "flag", "1", ValueType::Integer, Guid::NONE, AccessId::PUBLIC)
            .unwrap();
        assert_eq!(store.set_access(entity, "flag", AccessId::LOGGED_IN).unwrap(), 1);
        assert!(store.get(entity, "flag").unwrap().is_none());
        assert_eq!(store.delete(entity, "flag").unwrap(), 1);
        assert_eq!(store.delete(entity, "missing").unwrap(), 0);
        assert!(store.owner_and_access(entity, "flag").unwrap().is_none());
    }
}
