use std::path::Path;
use std::rc::Rc;

use elgg_core::{AccessId, Guid, SiteConfig};
use elgg_engine::{EngineError, Entity, NewEntity, Site};
use elgg_simplecache::SiteApplication;
use elgg_storage::Database;
use tempfile::TempDir;

use crate::views::MockViews;

pub struct TestSite {
    pub site: Site,
}

impl TestSite {
    /// A site over a private in-memory database.
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            site: Site::open(SiteConfig::default())?,
        })
    }

    /// A site whose database file lives in a fresh temporary directory.
    pub fn on_disk() -> Result<(Self, TempDir), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let site = Self::open_at(dir.path())?;
        Ok((site, dir))
    }

    /// Open (or reopen) the database file inside `dir`.
    pub fn open_at(dir: &Path) -> Result<Self, EngineError> {
        let config = SiteConfig {
            database: dir.join("elgg.sqlite").to_string_lossy().into_owned(),
            ..SiteConfig::default()
        };
        Ok(Self {
            site: Site::open(config)?,
        })
    }

    pub fn db(&self) -> Rc<dyn Database> {
        self.site.db().clone()
    }

    pub fn create_user(&self) -> Result<Entity, EngineError> {
        self.site.create_entity(&NewEntity::user())
    }

    /// A public object owned by `owner`, created at `time_created`.
    pub fn create_object(&self, owner: Guid, time_created: i64) -> Result<Entity, EngineError> {
        let mut new = NewEntity::object("page", owner);
        new.time_created = Some(time_created);
        self.site.create_entity(&new)
    }

    pub fn create_private_object(&self, owner: Guid) -> Result<Entity, EngineError> {
        let mut new = NewEntity::object("page", owner);
        new.access_id = AccessId::PRIVATE;
        self.site.create_entity(&new)
    }

    pub fn login(&self, user: &Entity) {
        self.site.session().login(user.guid);
    }

    pub fn logout(&self) {
        self.site.session().logout();
    }

    /// A cache front end sharing this site's database. `dataroot` and
    /// `enabled` land in the settings; `None` leaves them to the datalist.
    pub fn cache_app(
        &self,
        dataroot: Option<&Path>,
        enabled: Option<bool>,
        views: Rc<MockViews>,
    ) -> SiteApplication {
        let config = SiteConfig {
            dataroot: dataroot.map(Path::to_path_buf),
            simplecache_enabled: enabled,
            ..self.site.config().clone()
        };
        SiteApplication::with_database(config, self.db(), views)
    }
}

