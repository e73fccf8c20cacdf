use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use elgg_core::{AccessId, CoreError, Guid, OrderBy};
use elgg_storage::{Database, Predicate, QueryBuilder, QueryOptions, Row, StorageError};
use time::OffsetDateTime;

use crate::access::access_predicate;
use crate::error::EngineError;
use crate::session::Session;

/// Listing order used when a query supplies none.
pub const DEFAULT_ORDER: &str = "e.time_created DESC, e.guid DESC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Object,
    User,
    Group,
    Site,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::User => "user",
            Self::Group => "group",
            Self::Site => "site",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object" => Ok(Self::Object),
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "site" => Ok(Self::Site),
            other => Err(CoreError::InvalidData(format!("unknown entity type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub guid: Guid,
    pub entity_type: EntityType,
    pub subtype: String,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    pub access_id: AccessId,
    pub time_created: i64,
}

impl Entity {
    fn from_row(row: &Row) -> Result<Self, EngineError> {
        let entity_type = row
            .get_string("type")
            .ok_or_else(|| StorageError::Serialization("entity row without type".into()))?
            .parse::<EntityType>()?;
        Ok(Self {
            guid: Guid::from_raw(row.get_i64("guid")?),
            entity_type,
            subtype: row.get_string("subtype").unwrap_or_default(),
            owner_guid: Guid::from_raw(row.get_i64("owner_guid")?),
            container_guid: Guid::from_raw(row.get_i64("container_guid")?),
            access_id: AccessId::from_raw(row.get_i64("access_id")?),
            time_created: row.get_i64("time_created")?,
        })
    }
}

/// Fields for a new entity.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub entity_type: EntityType,
    pub subtype: String,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    pub access_id: AccessId,
    /// Defaults to now.
    pub time_created: Option<i64>,
}

impl NewEntity {
    pub fn object(subtype: &str, owner: Guid) -> Self {
        Self {
            entity_type: EntityType::Object,
            subtype: subtype.to_string(),
            owner_guid: owner,
            container_guid: owner,
            access_id: AccessId::PUBLIC,
            time_created: None,
        }
    }

    pub fn user() -> Self {
        Self {
            entity_type: EntityType::User,
            subtype: String::new(),
            owner_guid: Guid::NONE,
            container_guid: Guid::NONE,
            access_id: AccessId::PUBLIC,
            time_created: None,
        }
    }
}

/// Edit rights on entities. The host application may substitute its own
/// rules.
pub trait Permissions {
    fn can_edit(&self, entity: &Entity, user: Guid) -> bool;
}

/// A user may edit itself and anything it owns or contains.
#[derive(Debug, Default)]
pub struct OwnerPermissions;

impl Permissions for OwnerPermissions {
    fn can_edit(&self, entity: &Entity, user: Guid) -> bool {
        user.is_positive()
            && (entity.guid == user || entity.owner_guid == user || entity.container_guid == user)
    }
}

pub struct EntityStore {
    db: Rc<dyn Database>,
    session: Rc<Session>,
    permissions: Box<dyn Permissions>,
}

impl EntityStore {
    pub fn new(db: Rc<dyn Database>, session: Rc<Session>, permissions: Box<dyn Permissions>) -> Self {
        Self {
            db,
            session,
            permissions,
        }
    }

    pub fn create(&self, new: &NewEntity) -> Result<Entity, EngineError> {
        let time_created = new
            .time_created
            .unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp());
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        let ty = qb.create_named_parameter(new.entity_type.as_str());
        let subtype = qb.create_named_parameter(new.subtype.as_str());
        qb.insert("{entities}")
            .set_value("type", &ty)
            .set_value("subtype", &subtype)
            .set_value("owner_guid", &new.owner_guid.to_string())
            .set_value("container_guid", &new.container_guid.to_string())
            .set_value("access_id", &new.access_id.to_string())
            .set_value("time_created", &time_created.to_string());
        let guid = match qb.execute(self.db.as_ref(), false)? {
            elgg_storage::QueryResult::InsertId(id) => Guid::from_raw(id),
            other => {
                return Err(StorageError::Serialization(format!("unexpected insert result {other:?}")).into());
            }
        };
        tracing::debug!(guid = %guid, entity_type = %new.entity_type, "entity created");
        Ok(Entity {
            guid,
            entity_type: new.entity_type,
            subtype: new.subtype.clone(),
            owner_guid: new.owner_guid,
            container_guid: new.container_guid,
            access_id: new.access_id,
            time_created,
        })
    }

    /// Load an entity visible to the acting user.
    pub fn get(&self, guid: Guid) -> Result<Option<Entity>, EngineError> {
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        qb.select(&["e.*"])
            .from("{entities}", Some("e"))
            .and_where(&Predicate::column_eq_int("e.guid", guid.get()));
        if let Some(access) = access_predicate(&self.session, "e.access_id", "e.owner_guid") {
            qb.and_where(&access);
        }
        qb.fetch_one(self.db.as_ref())?
            .map(|row| Entity::from_row(&row))
            .transpose()
    }

    pub fn can_edit(&self, entity: &Entity, user: Guid) -> bool {
        self.permissions.can_edit(entity, user)
    }

    /// `SELECT e.* FROM {entities} e` shaped by `options`, restricted to rows
    /// the acting user may see.
    pub fn list(&self, options: &QueryOptions) -> Result<Vec<Entity>, EngineError> {
        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        qb.select(&["e.*"]).from("{entities}", Some("e"));
        qb.apply_options(options)?;
        if options.order_by.is_none() {
            for part in DEFAULT_ORDER.split(',') {
                qb.add_order_by(OrderBy::from_string(part)?);
            }
        }
        if let Some(access) = access_predicate(&self.session, "e.access_id", "e.owner_guid") {
            qb.and_where(&access);
        }
        qb.fetch_all(self.db.as_ref())?
            .iter()
            .map(Entity::from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elgg_storage::SqliteDatabase;

    fn store(session: Rc<Session>) -> EntityStore {
        let db: Rc<dyn Database> = Rc::new(SqliteDatabase::open_in_memory("t_").unwrap());
        EntityStore::new(db, session, Box::new(OwnerPermissions))
    }

    #[test]
    fn private_entities_are_hidden_from_others() {
        let session = Rc::new(Session::new());
        let store = store(session.clone());
        let owner = store.create(&NewEntity::user()).unwrap();
        let mut new = NewEntity::object("blog", owner.guid);
        new.access_id = AccessId::PRIVATE;
        let post = store.create(&new).unwrap();

        assert!(store.get(post.guid).unwrap().is_none());
        session.login(owner.guid);
        assert_eq!(store.get(post.guid).unwrap(), Some(post.clone()));
        session.logout();
        let _guard = session.ignore_access_guard();
        assert!(store.get(post.guid).unwrap().is_some());
    }

    #[test]
    fn owners_and_containers_can_edit() {
        let store = store(Rc::new(Session::new()));
        let owner = store.create(&NewEntity::user()).unwrap();
        let other = store.create(&NewEntity::user()).unwrap();
        let post = store.create(&NewEntity::object("blog", owner.guid)).unwrap();

        assert!(store.can_edit(&post, owner.guid));
        assert!(store.can_edit(&owner, owner.guid));
        assert!(!store.can_edit(&post, other.guid));
        assert!(!store.can_edit(&post, Guid::NONE));
    }

    #[test]
    fn default_listing_is_newest_first() {
        let store = store(Rc::new(Session::new()));
        let mut guids = Vec::new();
        for t in [100, 300, 200] {
            let mut new = NewEntity::object("page", Guid::NONE);
            new.time_created = Some(t);
            guids.push(store.create(&new).unwrap().guid);
        }
        let listed: Vec<Guid> = store
            .list(&QueryOptions::default())
            .unwrap()
            .into_iter()
            .map(|e| e.guid)
            .collect();
        assert_eq!(listed, vec![guids[1], guids[2], guids[0]]);
    }
}
