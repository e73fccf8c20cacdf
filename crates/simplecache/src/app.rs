use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use elgg_core::{SiteConfig, SqlValue};
use elgg_storage::{Database, Datalist, Operand, Predicate, QueryBuilder, SqliteDatabase, StorageError};

use crate::error::CacheError;

/// Datalist entry holding the current cache generation timestamp.
pub const LASTCACHE_KEY: &str = "simplecache_lastupdated";

/// Renders views for the cache handlers.
pub trait ViewSystem {
    fn view_exists(&self, view: &str, viewtype: &str) -> bool;

    fn is_cacheable(&self, view: &str) -> bool;

    fn render(&self, view: &str, viewtype: &str) -> String;

    /// Final transformation applied before content is written to the cache.
    fn process_for_cache(&self, _view: &str, _viewtype: &str, content: String) -> String {
        content
    }
}

/// What the cache handlers need from the host application.
pub trait Application {
    /// Settings from the settings file, before any database access.
    fn settings(&self) -> &SiteConfig;

    fn database(&self) -> Result<Rc<dyn Database>, StorageError>;

    /// Full boot; only needed when a view has to be rendered.
    fn boot_core(&self) -> Result<Rc<dyn ViewSystem>, CacheError>;

    /// Timestamp of the current cache generation. Requires a booted core.
    fn last_cache(&self) -> Result<i64, CacheError>;
}

/// Settings resolved by the minimal boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub dataroot: PathBuf,
    pub simplecache_enabled: bool,
}

impl CacheSettings {
    pub fn cache_dir(&self) -> PathBuf {
        self.dataroot.join("views_simplecache")
    }
}

fn truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "0"
}

/// Resolve the data root and the enabled flag, preferring the settings file
/// and falling back to the datalist table for whatever is missing.
pub fn minimal_boot(app: &dyn Application) -> Result<CacheSettings, CacheError> {
    let settings = app.settings();
    if let (Some(dataroot), Some(enabled)) = (&settings.dataroot, settings.simplecache_enabled) {
        return Ok(CacheSettings {
            dataroot: dataroot.clone(),
            simplecache_enabled: enabled,
        });
    }

    let db = app.database().map_err(|e| {
        tracing::warn!(error = %e, "simplecache cannot reach the database");
        match e {
            StorageError::Connection(_) => CacheError::Forbidden(CacheError::NO_DB_SERVER),
            _ => CacheError::Forbidden(CacheError::NO_DATABASE),
        }
    })?;

    let mut qb = QueryBuilder::for_db(db.as_ref());
    qb.select(&["name", "value"]).from("{datalists}", None).and_where(&Predicate::In(
        Operand::column("name"),
        vec![SqlValue::from("dataroot"), SqlValue::from("simplecache_enabled")],
    ));
    let rows = qb.fetch_all(db.as_ref()).map_err(|e| {
        tracing::warn!(error = %e, "simplecache cannot read the datalist");
        CacheError::Forbidden(CacheError::NO_DATABASE)
    })?;
    if rows.is_empty() {
        tracing::warn!("datalist has neither dataroot nor simplecache_enabled");
        return Err(CacheError::Forbidden(CacheError::NO_DATAROOT));
    }

    let mut dataroot = settings.dataroot.clone();
    let mut enabled = settings.simplecache_enabled;
    for row in &rows {
        match (row.get_string("name").as_deref(), row.get_string("value")) {
            (Some("dataroot"), Some(value)) if dataroot.is_none() && !value.is_empty() => {
                dataroot = Some(PathBuf::from(value));
            }
            (Some("simplecache_enabled"), Some(value)) if enabled.is_none() => {
                enabled = Some(truthy(&value));
            }
            _ => {}
        }
    }

    let Some(dataroot) = dataroot else {
        tracing::warn!("no dataroot configured");
        return Err(CacheError::Forbidden(CacheError::NO_DATAROOT));
    };
    Ok(CacheSettings {
        dataroot,
        simplecache_enabled: enabled.unwrap_or(false),
    })
}

/// An [`Application`] over a SQLite installation and a view system.
pub struct SiteApplication {
    config: SiteConfig,
    db: RefCell<Option<Rc<dyn Database>>>,
    views: Rc<dyn ViewSystem>,
}

impl SiteApplication {
    /// Connects lazily, on first database access.
    pub fn new(config: SiteConfig, views: Rc<dyn ViewSystem>) -> Self {
        Self {
            config,
            db: RefCell::new(None),
            views,
        }
    }

    pub fn with_database(config: SiteConfig, db: Rc<dyn Database>, views: Rc<dyn ViewSystem>) -> Self {
        Self {
            config,
            db: RefCell::new(Some(db)),
            views,
        }
    }
}

impl Application for SiteApplication {
    fn settings(&self) -> &SiteConfig {
        &self.config
    }

    fn database(&self) -> Result<Rc<dyn Database>, StorageError> {
        if let Some(db) = self.db.borrow().as_ref() {
            return Ok(db.clone());
        }
        let db: Rc<dyn Database> = Rc::new(SqliteDatabase::from_config(&self.config)?);
        *self.db.borrow_mut() = Some(db.clone());
        Ok(db)
    }

    fn boot_core(&self) -> Result<Rc<dyn ViewSystem>, CacheError> {
        self.database()?;
        Ok(self.views.clone())
    }

    fn last_cache(&self) -> Result<i64, CacheError> {
        let datalist = Datalist::new(self.database()?);
        Ok(datalist
            .get(LASTCACHE_KEY)?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoViews;

    impl ViewSystem for NoViews {
        fn view_exists(&self, _view: &str, _viewtype: &str) -> bool {
            false
        }

        fn is_cacheable(&self, _view: &str) -> bool {
            false
        }

        fn render(&self, _view: &str, _viewtype: &str) -> String {
            String::new()
        }
    }

    fn app(config: SiteConfig) -> SiteApplication {
        let db = SqliteDatabase::open_in_memory(&config.dbprefix).unwrap();
        SiteApplication::with_database(config, Rc::new(db), Rc::new(NoViews))
    }

    #[test]
    fn settings_file_wins() {
        let config = SiteConfig {
            dataroot: Some(PathBuf::from("/data")),
            simplecache_enabled: Some(true),
            ..SiteConfig::default()
        };
        let resolved = minimal_boot(&app(config)).unwrap();
        assert_eq!(resolved.cache_dir(), PathBuf::from("/data/views_simplecache"));
        assert!(resolved.simplecache_enabled);
    }

    #[test]
    fn falls_back_to_datalist() {
        let app = app(SiteConfig::default());
        assert!(matches!(
            minimal_boot(&app),
            Err(CacheError::Forbidden(CacheError::NO_DATAROOT))
        ));

        let datalist = Datalist::new(app.database().unwrap());
        datalist.set("dataroot", "/srv/data").unwrap();
        datalist.set("simplecache_enabled", "1").unwrap();
        let resolved = minimal_boot(&app).unwrap();
        assert_eq!(resolved.dataroot, PathBuf::from("/srv/data"));
        assert!(resolved.simplecache_enabled);
    }

    #[test]
    fn last_cache_defaults_to_zero() {
        let app = app(SiteConfig::default());
        assert_eq!(app.last_cache().unwrap(), 0);
        Datalist::new(app.database().unwrap()).set(LASTCACHE_KEY, "77").unwrap();
        assert_eq!(app.last_cache().unwrap(), 77);
    }
}
