pub mod access;
pub mod collection;
pub mod entities;
pub mod error;
pub mod metadata;
pub mod modifier;
pub mod session;

pub use collection::{Collection, CollectionContext, CollectionRegistry, relationship_key};
pub use entities::{DEFAULT_ORDER, Entity, EntityStore, EntityType, NewEntity, OwnerPermissions, Permissions};
pub use error::EngineError;
pub use metadata::{Metadata, MetadataStore, ValueType};
pub use modifier::{AliasGenerator, CollectionQueryModifier, ListingOptions, apply_to_options};
pub use session::{IgnoreAccessGuard, Session};

use std::rc::Rc;

use elgg_core::{Guid, SiteConfig};
use elgg_storage::{Database, Datalist, Metastrings, SqliteDatabase};

/// One installation: storage, settings and the services built on them.
pub struct Site {
    config: SiteConfig,
    db: Rc<dyn Database>,
    session: Rc<Session>,
    datalist: Datalist,
    entities: Rc<EntityStore>,
    metadata: Rc<MetadataStore>,
    collections: CollectionRegistry,
}

impl Site {
    pub fn new(config: SiteConfig, db: Rc<dyn Database>) -> Self {
        Self::with_permissions(config, db, Box::new(OwnerPermissions))
    }

    pub fn with_permissions(config: SiteConfig, db: Rc<dyn Database>, permissions: Box<dyn Permissions>) -> Self {
        let session = Rc::new(Session::new());
        let metastrings = Rc::new(Metastrings::new(db.clone()));
        let entities = Rc::new(EntityStore::new(db.clone(), session.clone(), permissions));
        let metadata = Rc::new(MetadataStore::new(db.clone(), session.clone(), metastrings));
        let collections = CollectionRegistry::new(Rc::new(CollectionContext {
            db: db.clone(),
            session: session.clone(),
            entities: entities.clone(),
            metadata: metadata.clone(),
        }));
        Self {
            datalist: Datalist::new(db.clone()),
            config,
            db,
            session,
            entities,
            metadata,
            collections,
        }
    }

    /// Open the SQLite database named by `config`.
    pub fn open(config: SiteConfig) -> Result<Self, EngineError> {
        let db = SqliteDatabase::from_config(&config)?;
        Ok(Self::new(config, Rc::new(db)))
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn db(&self) -> &Rc<dyn Database> {
        &self.db
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn datalist(&self) -> &Datalist {
        &self.datalist
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn collections(&self) -> &CollectionRegistry {
        &self.collections
    }

    // ========================================================================
    // Entities
    // ========================================================================

    pub fn create_entity(&self, new: &NewEntity) -> Result<Entity, EngineError> {
        self.entities.create(new)
    }

    pub fn get_entity(&self, guid: Guid) -> Result<Option<Entity>, EngineError> {
        self.entities.get(guid)
    }

    /// List entities after folding in any collection modifiers.
    pub fn get_entities(&self, mut options: ListingOptions) -> Result<Vec<Entity>, EngineError> {
        apply_to_options(&mut options, "e.guid")?;
        self.entities.list(&options.query)
    }

    // ========================================================================
    // Collections
    // ========================================================================

    pub fn fetch_collection(
        &self,
        entity: Option<&Entity>,
        name: &str,
        auto_create: bool,
    ) -> Result<Option<Rc<Collection>>, EngineError> {
        self.collections.fetch(entity, name, auto_create)
    }
}
