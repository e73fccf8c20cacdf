//! Named, ordered lists of entity guids attached to an owning entity.
//!
//! Membership is stored as rows in the shared relationship table:
//! `guid_one` is the item, `guid_two` the owning entity, `relationship` a key
//! derived from the owner and collection name, and the row id doubles as the
//! item's priority. A metadata marker on the owner records that the
//! collection exists.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use elgg_core::{AccessId, Guid, OrderBy, SqlValue};
use elgg_storage::{Database, Operand, Predicate, QueryBuilder, Row, transaction};
use time::OffsetDateTime;

use crate::entities::{Entity, EntityStore};
use crate::error::EngineError;
use crate::metadata::{MetadataStore, ValueType};
use crate::modifier::CollectionQueryModifier;
use crate::session::Session;

pub const TABLE: &str = "{entity_relationships}";
pub const COL_PRIORITY: &str = "id";
pub const COL_ITEM: &str = "guid_one";
pub const COL_ENTITY_GUID: &str = "guid_two";
pub const COL_KEY: &str = "relationship";
pub const METADATA_NAME_PREFIX: &str = "collection_exists:";

/// Services a collection needs to read and write its rows.
pub struct CollectionContext {
    pub db: Rc<dyn Database>,
    pub session: Rc<Session>,
    pub entities: Rc<EntityStore>,
    pub metadata: Rc<MetadataStore>,
}

/// Relationship key for a collection: owner and name hashed, so names cannot
/// collide across owners.
pub fn relationship_key(entity_guid: Guid, name: &str) -> String {
    let hash = blake3::hash(format!("{entity_guid}|{name}").as_bytes());
    format!("in_collection:{}", STANDARD.encode(hash.as_bytes()))
}

fn marker_name(name: &str) -> String {
    format!("{METADATA_NAME_PREFIX}{name}")
}

fn cast_positive<T>(items: &[T]) -> Result<Vec<Guid>, EngineError>
where
    T: Copy + Into<i64>,
{
    items
        .iter()
        .map(|item| {
            let raw: i64 = (*item).into();
            Guid::positive(raw).map_err(|_| EngineError::InvalidParameter(format!("unrecognised item value: {raw}")))
        })
        .collect()
}

fn guid_set(items: &[Guid]) -> Vec<SqlValue> {
    items.iter().map(|g| SqlValue::Integer(g.get())).collect()
}

#[derive(Clone, Copy)]
struct EditCache {
    user: Guid,
    generation: u64,
    allowed: bool,
}

pub struct Collection {
    entity: Entity,
    name: String,
    relationship_key: String,
    ctx: Rc<CollectionContext>,
    is_deleted: Cell<bool>,
    can_edit_cache: Cell<Option<EditCache>>,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("entity_guid", &self.entity.guid)
            .field("name", &self.name)
            .field("is_deleted", &self.is_deleted.get())
            .finish()
    }
}

impl Collection {
    fn new(entity: Entity, name: &str, ctx: Rc<CollectionContext>) -> Self {
        Self {
            relationship_key: relationship_key(entity.guid, name),
            entity,
            name: name.to_string(),
            ctx,
            is_deleted: Cell::new(false),
            can_edit_cache: Cell::new(None),
        }
    }

    pub fn entity_guid(&self) -> Guid {
        self.entity.guid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relationship_key(&self) -> &str {
        &self.relationship_key
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted.get()
    }

    fn db(&self) -> &dyn Database {
        self.ctx.db.as_ref()
    }

    fn builder(&self) -> QueryBuilder {
        QueryBuilder::for_db(self.db())
    }

    fn in_collection(&self) -> Predicate {
        Predicate::And(vec![
            Predicate::column_eq_int(COL_ENTITY_GUID, self.entity.guid.get()),
            Predicate::column_eq_text(COL_KEY, &self.relationship_key),
        ])
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    /// Whether the acting user may modify this collection.
    pub fn can_edit(&self) -> bool {
        self.can_edit_as(self.ctx.session.user_guid())
    }

    /// The last answer is cached per user until the session's acting user
    /// changes or [`Self::reset_permission_cache`] is called.
    pub fn can_edit_as(&self, user: Guid) -> bool {
        if self.is_deleted.get() {
            return false;
        }
        let generation = self.ctx.session.generation();
        if let Some(cached) = self.can_edit_cache.get() {
            if cached.user == user && cached.generation == generation {
                return cached.allowed;
            }
        }
        let allowed = self.ctx.entities.can_edit(&self.entity, user);
        self.can_edit_cache.set(Some(EditCache {
            user,
            generation,
            allowed,
        }));
        allowed
    }

    pub fn reset_permission_cache(&self) {
        self.can_edit_cache.set(None);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    fn fetch_items(
        &self,
        ascending: bool,
        filter: Option<Predicate>,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Guid>, EngineError> {
        let mut qb = self.builder();
        qb.select(&[COL_PRIORITY, COL_ITEM])
            .from(TABLE, None)
            .and_where(&self.in_collection());
        if let Some(filter) = filter {
            qb.and_where(&filter);
        }
        let order = if ascending {
            OrderBy::asc(COL_PRIORITY)?
        } else {
            OrderBy::desc(COL_PRIORITY)?
        };
        qb.order_by(order).set_first_result(offset);
        if let Some(limit) = limit {
            qb.set_max_results(limit);
        }
        items_from_rows(&qb.fetch_all(self.db())?)
    }

    /// All items in priority order.
    pub fn items(&self) -> Result<Vec<Guid>, EngineError> {
        self.fetch_items(true, None, 0, None)
    }

    pub fn count(&self) -> Result<usize, EngineError> {
        let mut qb = self.builder();
        qb.select(&["COUNT(*) AS cnt"])
            .from(TABLE, None)
            .and_where(&self.in_collection());
        let count = match qb.fetch_one(self.db())? {
            Some(row) => row.get_i64("cnt")?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Zero-based position of `item`, or `None` if it is not a member.
    pub fn index_of<T: Copy + Into<i64>>(&self, item: T) -> Result<Option<usize>, EngineError> {
        let item = cast_positive(&[item])?[0];
        let mut qb = self.builder();
        let mut target = qb.subquery();
        target
            .select(&[COL_PRIORITY])
            .from(TABLE, None)
            .and_where(&self.in_collection())
            .and_where(&Predicate::column_eq_int(COL_ITEM, item.get()))
            .order_by(OrderBy::asc(COL_PRIORITY)?)
            .set_max_results(1);
        qb.select(&["COUNT(*) AS cnt"])
            .from(TABLE, None)
            .and_where(&self.in_collection())
            .and_where(&Predicate::Le(
                Operand::column(COL_PRIORITY),
                Operand::Subquery(Box::new(target)),
            ));
        let count = match qb.fetch_one(self.db())? {
            Some(row) => row.get_i64("cnt")?,
            None => 0,
        };
        Ok(usize::try_from(count - 1).ok())
    }

    /// Items selected with `array_slice` rules: a negative `offset` counts
    /// from the end, a negative `length` stops that many before the end, and
    /// `None` runs to the end.
    pub fn slice(&self, offset: i64, length: Option<i64>) -> Result<Vec<Guid>, EngineError> {
        if length == Some(0) {
            return Ok(Vec::new());
        }
        let from_start = offset.unsigned_abs();
        match (offset.signum(), length) {
            (0 | 1, None) => self.fetch_items(true, None, from_start, None),
            (0 | 1, Some(len)) if len > 0 => self.fetch_items(true, None, from_start, Some(len as u64)),
            (0, Some(len)) => {
                let mut items = self.fetch_items(false, None, len.unsigned_abs(), None)?;
                items.reverse();
                Ok(items)
            }
            (1, Some(len)) => {
                // Drop the last |len| items, then skip `offset` from the front.
                self.fetch_window(len.unsigned_abs(), None, true, from_start, None)
            }
            (_, None) => {
                let mut items = self.fetch_items(false, None, 0, Some(from_start))?;
                items.reverse();
                Ok(items)
            }
            (_, Some(len)) if len > 0 => {
                // The last |offset| items, then the first `len` of those.
                self.fetch_window(0, Some(from_start), true, 0, Some(len as u64))
            }
            (_, Some(len)) => {
                // The last |offset| items, minus the last |len|.
                let mut items = self.fetch_window(0, Some(from_start), false, len.unsigned_abs(), None)?;
                items.reverse();
                Ok(items)
            }
        }
    }

    /// Select a window from the tail of the collection, then page through it.
    ///
    /// The inner query walks priorities descending, skipping `tail_skip` and
    /// keeping `tail_take`; the outer query re-sorts the window and applies
    /// `offset`/`limit`.
    fn fetch_window(
        &self,
        tail_skip: u64,
        tail_take: Option<u64>,
        ascending: bool,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Guid>, EngineError> {
        let mut qb = self.builder();
        let mut window = qb.subquery();
        window
            .select(&[COL_PRIORITY, COL_ITEM])
            .from(TABLE, None)
            .and_where(&self.in_collection())
            .order_by(OrderBy::desc(COL_PRIORITY)?)
            .set_first_result(tail_skip);
        if let Some(take) = tail_take {
            window.set_max_results(take);
        }

        let order = if ascending {
            OrderBy::asc(COL_PRIORITY)?
        } else {
            OrderBy::desc(COL_PRIORITY)?
        };
        qb.select(&[COL_PRIORITY, COL_ITEM])
            .from_subquery(window, "win")
            .order_by(order)
            .set_first_result(offset);
        if let Some(limit) = limit {
            qb.set_max_results(limit);
        }
        items_from_rows(&qb.fetch_all(self.db())?)
    }

    fn intersect(&self, items: &[Guid]) -> Result<Vec<Guid>, EngineError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Predicate::In(Operand::column(COL_ITEM), guid_set(items));
        self.fetch_items(true, Some(filter), 0, None)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Append items not already present, keeping their given order. Returns
    /// false if the acting user cannot edit.
    pub fn push<T: Copy + Into<i64>>(&self, items: &[T]) -> Result<bool, EngineError> {
        if !self.can_edit() {
            return Ok(false);
        }
        if items.is_empty() {
            return Ok(true);
        }
        let mut seen = HashSet::new();
        let items: Vec<Guid> = cast_positive(items)?
            .into_iter()
            .filter(|g| seen.insert(*g))
            .collect();

        transaction(self.db(), || {
            let existing: HashSet<Guid> = self.intersect(&items)?.into_iter().collect();
            let now = OffsetDateTime::now_utc().unix_timestamp();
            for item in items.iter().filter(|g| !existing.contains(g)) {
                let mut qb = self.builder();
                let key = qb.create_named_parameter(self.relationship_key.as_str());
                qb.insert(TABLE)
                    .set_value(COL_ITEM, &item.to_string())
                    .set_value(COL_KEY, &key)
                    .set_value(COL_ENTITY_GUID, &self.entity.guid.to_string())
                    .set_value("time_created", &now.to_string());
                qb.execute(self.db(), false)?;
            }
            Ok(true)
        })
    }

    /// Exchange the positions of two items. Priorities are never renumbered;
    /// the rows trade item values. Returns false unless both are members and
    /// distinct.
    pub fn swap_items<T: Copy + Into<i64>>(&self, a: T, b: T) -> Result<bool, EngineError> {
        if !self.can_edit() {
            return Ok(false);
        }
        let pair = cast_positive(&[a, b])?;

        transaction(self.db(), || {
            let mut qb = self.builder();
            qb.select(&[COL_PRIORITY, COL_ITEM])
                .from(TABLE, None)
                .and_where(&self.in_collection())
                .and_where(&Predicate::In(Operand::column(COL_ITEM), guid_set(&pair)));
            let rows = qb.fetch_all(self.db())?;
            let [first, second] = rows.as_slice() else {
                return Ok(false);
            };
            let (p1, i1) = (first.get_i64(COL_PRIORITY)?, first.get_i64(COL_ITEM)?);
            let (p2, i2) = (second.get_i64(COL_PRIORITY)?, second.get_i64(COL_ITEM)?);
            if i1 == i2 {
                return Ok(false);
            }

            // Park row 2 on a placeholder so (item, key, entity) stays unique
            // between the updates.
            for (priority, item) in [(p2, -p2), (p1, i2), (p2, i1)] {
                if self.set_item_at(priority, item)? != 1 {
                    return Err(EngineError::Conflict(format!(
                        "collection {} changed while swapping {i1} and {i2}",
                        self.name
                    )));
                }
            }
            Ok(true)
        })
    }

    fn set_item_at(&self, priority: i64, item: i64) -> Result<usize, EngineError> {
        let mut qb = self.builder();
        qb.update(TABLE, None)
            .set(COL_ITEM, &item.to_string())
            .and_where(&self.in_collection())
            .and_where(&Predicate::column_eq_int(COL_PRIORITY, priority));
        Ok(qb.execute_write(self.db())?)
    }

    /// Returns the number of rows removed, or `None` if the acting user
    /// cannot edit.
    pub fn remove<T: Copy + Into<i64>>(&self, items: &[T]) -> Result<Option<usize>, EngineError> {
        if !self.can_edit() {
            return Ok(None);
        }
        if items.is_empty() {
            return Ok(Some(0));
        }
        let items = cast_positive(items)?;
        let mut qb = self.builder();
        qb.delete(TABLE)
            .and_where(&self.in_collection())
            .and_where(&Predicate::In(Operand::column(COL_ITEM), guid_set(&items)));
        Ok(Some(qb.execute_write(self.db())?))
    }

    pub fn remove_all(&self) -> Result<Option<usize>, EngineError> {
        if !self.can_edit() {
            return Ok(None);
        }
        self.delete_rows().map(Some)
    }

    fn delete_rows(&self) -> Result<usize, EngineError> {
        let mut qb = self.builder();
        qb.delete(TABLE).and_where(&self.in_collection());
        Ok(qb.execute_write(self.db())?)
    }

    /// Remove all items and the existence marker. The instance stays deleted
    /// even if the name is created again.
    pub fn delete(&self) -> Result<bool, EngineError> {
        if !self.can_edit() {
            return Ok(false);
        }
        transaction(self.db(), || {
            self.delete_rows()?;
            self.ctx.metadata.delete(self.entity.guid, &marker_name(&self.name))
        })?;
        self.is_deleted.set(true);
        self.can_edit_cache.set(None);
        tracing::debug!(entity_guid = %self.entity.guid, name = %self.name, "collection deleted");
        Ok(true)
    }

    fn mark_undeleted(&self) {
        self.is_deleted.set(false);
    }

    // ========================================================================
    // Marker ownership and access
    // ========================================================================

    pub fn access_id(&self) -> Result<Option<AccessId>, EngineError> {
        if self.is_deleted.get() {
            return Ok(None);
        }
        Ok(self
            .ctx
            .metadata
            .owner_and_access(self.entity.guid, &marker_name(&self.name))?
            .map(|(_, access)| access))
    }

    /// Anyone who can edit the owning entity may change the marker's access,
    /// whatever the marker's own access level. Returns false without writing
    /// otherwise.
    pub fn set_access_id(&self, access: AccessId) -> Result<bool, EngineError> {
        if self.is_deleted.get() {
            return Err(EngineError::CollectionDeleted(self.name.clone()));
        }
        if !self.can_edit() {
            return Ok(false);
        }
        self.ctx
            .metadata
            .set_access(self.entity.guid, &marker_name(&self.name), access)?;
        Ok(true)
    }

    pub fn owner_guid(&self) -> Result<Option<Guid>, EngineError> {
        if self.is_deleted.get() {
            return Ok(None);
        }
        Ok(self
            .ctx
            .metadata
            .owner_and_access(self.entity.guid, &marker_name(&self.name))?
            .map(|(owner, _)| owner))
    }

    pub fn set_owner_guid(&self, owner: Guid) -> Result<bool, EngineError> {
        if self.is_deleted.get() {
            return Err(EngineError::CollectionDeleted(self.name.clone()));
        }
        if !self.can_edit() {
            return Ok(false);
        }
        self.ctx
            .metadata
            .set_owner(self.entity.guid, &marker_name(&self.name), owner)?;
        Ok(true)
    }
}

fn items_from_rows(rows: &[Row]) -> Result<Vec<Guid>, EngineError> {
    rows.iter()
        .map(|row| Ok(Guid::from_raw(row.get_i64(COL_ITEM)?)))
        .collect()
}

/// Hands out one shared instance per (entity, name).
pub struct CollectionRegistry {
    ctx: Rc<CollectionContext>,
    instances: RefCell<HashMap<(Guid, String), Rc<Collection>>>,
}

impl CollectionRegistry {
    pub fn new(ctx: Rc<CollectionContext>) -> Self {
        Self {
            ctx,
            instances: RefCell::new(HashMap::new()),
        }
    }

    fn instance(&self, entity: &Entity, name: &str) -> Rc<Collection> {
        self.instances
            .borrow_mut()
            .entry((entity.guid, name.to_string()))
            .or_insert_with(|| Rc::new(Collection::new(entity.clone(), name, self.ctx.clone())))
            .clone()
    }

    /// Look up a collection, optionally creating it.
    ///
    /// Anyone who can see the existence marker gets the collection. Beyond
    /// that, only a user who can edit the entity may find a collection whose
    /// marker is hidden from them, or create a missing one.
    pub fn fetch(
        &self,
        entity: Option<&Entity>,
        name: &str,
        auto_create: bool,
    ) -> Result<Option<Rc<Collection>>, EngineError> {
        let Some(entity) = entity else {
            return Ok(None);
        };
        if name.is_empty() {
            return Ok(None);
        }
        let marker = marker_name(name);
        if self.ctx.metadata.get(entity.guid, &marker)?.is_some() {
            return Ok(Some(self.instance(entity, name)));
        }
        if !self.ctx.entities.can_edit(entity, self.ctx.session.user_guid()) {
            return Ok(None);
        }
        if self.exists(entity.guid, name)? {
            return Ok(Some(self.instance(entity, name)));
        }
        if !auto_create {
            return Ok(None);
        }
        self.ctx.metadata.create(
            entity.guid,
            &marker,
            "1",
            ValueType::Integer,
            Guid::NONE,
            AccessId::PUBLIC,
        )?;
        tracing::debug!(entity_guid = %entity.guid, name, "collection created");
        let collection = self.instance(entity, name);
        // A previously deleted instance may still be cached.
        collection.mark_undeleted();
        Ok(Some(collection))
    }

    /// Whether the collection exists, ignoring access control.
    pub fn exists(&self, entity_guid: Guid, name: &str) -> Result<bool, EngineError> {
        let _guard = self.ctx.session.ignore_access_guard();
        if self.ctx.entities.get(entity_guid)?.is_none() {
            return Ok(false);
        }
        Ok(self.ctx.metadata.get(entity_guid, &marker_name(name))?.is_some())
    }

    /// Drop cached instances, e.g. at the end of a request.
    pub fn clear(&self) {
        self.instances.borrow_mut().clear();
    }

    /// Collection items first, then everything else.
    pub fn sticky_modifier(&self, entity: &Entity, name: &str) -> Result<CollectionQueryModifier, EngineError> {
        Ok(self.selector_modifier(entity, name)?.use_sticky_model())
    }

    /// Everything except collection items.
    pub fn filter_modifier(&self, entity: &Entity, name: &str) -> Result<CollectionQueryModifier, EngineError> {
        Ok(self.selector_modifier(entity, name)?.use_as_filter())
    }

    /// Only collection items, in collection order.
    pub fn selector_modifier(&self, entity: &Entity, name: &str) -> Result<CollectionQueryModifier, EngineError> {
        let collection = self.fetch(Some(entity), name, false)?;
        Ok(CollectionQueryModifier::new(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_differ_per_owner_and_name() {
        let a = relationship_key(Guid::from_raw(1), "featured");
        let b = relationship_key(Guid::from_raw(2), "featured");
        let c = relationship_key(Guid::from_raw(1), "featured2");
        assert!(a.starts_with("in_collection:"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, relationship_key(Guid::from_raw(1), "featured"));
    }

    #[test]
    fn items_must_be_positive() {
        assert!(cast_positive(&[1i64, 2, 3]).is_ok());
        assert!(matches!(
            cast_positive(&[1i64, 0]),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(cast_positive(&[-5i64]).is_err());
    }
}
