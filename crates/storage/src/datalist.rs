use std::collections::HashMap;
use std::rc::Rc;

use time::OffsetDateTime;

use crate::cache::MemoryPool;
use crate::error::StorageError;
use crate::query::QueryBuilder;
use crate::traits::Database;

/// Installation-wide name/value settings.
///
/// All rows are loaded into one memoized map; every write drops the whole
/// map so the next read sees fresh data.
pub struct Datalist {
    db: Rc<dyn Database>,
    cache: MemoryPool<Rc<HashMap<String, String>>>,
}

impl Datalist {
    pub const ALL_RESULTS_KEY: &'static str = "*";
    pub const MAX_NAME_LENGTH: usize = 255;

    pub fn new(db: Rc<dyn Database>) -> Self {
        Self {
            db,
            cache: MemoryPool::new(),
        }
    }

    fn check_name(name: &str) -> Result<&str, StorageError> {
        let name = name.trim();
        let len = name.chars().count();
        if len > Self::MAX_NAME_LENGTH {
            tracing::error!(
                len,
                "the name length for configuration variables cannot be greater than {}",
                Self::MAX_NAME_LENGTH
            );
            return Err(StorageError::NameTooLong {
                len,
                max: Self::MAX_NAME_LENGTH,
            });
        }
        Ok(name)
    }

    /// `Ok(None)` when the name is not set.
    pub fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        let name = Self::check_name(name)?;
        Ok(self.load_all()?.get(name).cloned())
    }

    pub fn set(&self, name: &str, value: &str) -> Result<(), StorageError> {
        let name = Self::check_name(name)?;

        let mut qb = QueryBuilder::for_db(self.db.as_ref());
        let name_param = qb.create_named_parameter(name);
        let value_param = qb.create_named_parameter(value);
        qb.insert("{datalists}")
            .set_value("name", &name_param)
            .set_value("value", &value_param)
            .append_sql(&self.db.dialect().upsert_clause(&["name"], &["value"]));
        let result = qb.execute(self.db.as_ref(), false);

        self.cache.invalidate(Self::ALL_RESULTS_KEY);
        result.map(|_| ())
    }

    pub fn load_all(&self) -> Result<Rc<HashMap<String, String>>, StorageError> {
        self.cache.get(Self::ALL_RESULTS_KEY, || {
            let mut qb = QueryBuilder::for_db(self.db.as_ref());
            qb.select(&["name", "value"]).from("{datalists}", None);
            let mut map = HashMap::new();
            for row in qb.fetch_all(self.db.as_ref())? {
                if let (Some(name), Some(value)) = (row.get_string("name"), row.get_string("value")) {
                    map.insert(name, value);
                }
            }
            tracing::debug!(entries = map.len(), "datalist loaded");
            Ok(Rc::new(map))
        })
    }

    /// Run `f` unless it has been recorded as run after `since` (a unix
    /// timestamp), then record the run under `name`. Returns whether `f` ran.
    ///
    /// If the datalist cannot be read, nothing runs.
    pub fn run_function_once(&self, name: &str, since: i64, f: impl FnOnce()) -> bool {
        let last_run = match self.get(name) {
            Ok(Some(value)) => value.trim().parse::<i64>().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(name, error = %e, "unable to check datalist");
                return false;
            }
        };
        if last_run > since {
            return false;
        }

        f();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if let Err(e) = self.set(name, &now.to_string()) {
            tracing::warn!(name, error = %e, "unable to record function run");
        }
        true
    }
}
