use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Rendered views persisted under `<dataroot>/views_simplecache/`.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a cache key, e.g. `"default|css/elgg"`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(blake3::hash(key.as_bytes()).to_hex().as_str())
    }

    /// `Ok(None)` when nothing is cached under `key`.
    pub fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write through a temporary file and rename it into place, so readers
    /// never see a partial file. Concurrent writers of the same key leave one
    /// complete copy.
    pub fn write(&self, key: &str, content: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        let path = self.path_for(key);
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_directory_and_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let store = CacheStore::new(root.path().join("views_simplecache"));
        assert_eq!(store.read("default|css/elgg").unwrap(), None);

        store.write("default|css/elgg", "a").unwrap();
        store.write("default|css/elgg", "b").unwrap();
        assert_eq!(store.read("default|css/elgg").unwrap().as_deref(), Some("b"));
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[test]
    fn keys_map_to_distinct_files() {
        let store = CacheStore::new(PathBuf::from("/tmp/x"));
        assert_ne!(store.path_for("default|a"), store.path_for("default|b"));
        assert_eq!(store.path_for("k"), store.path_for("k"));
    }
}
