use std::cell::RefCell;
use std::collections::HashMap;

/// Request-scoped memoization keyed by string.
#[derive(Debug)]
pub struct MemoryPool<V: Clone> {
    values: RefCell<HashMap<String, V>>,
}

impl<V: Clone> Default for MemoryPool<V> {
    fn default() -> Self {
        Self {
            values: RefCell::new(HashMap::new()),
        }
    }
}

impl<V: Clone> MemoryPool<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing it with `f` on a miss.
    /// Failures are not cached.
    pub fn get<E>(&self, key: &str, f: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.values.borrow().get(key) {
            return Ok(value.clone());
        }
        // No borrow is held while `f` runs; it may touch the pool.
        let value = f()?;
        self.values.borrow_mut().insert(key.to_string(), value.clone());
        Ok(value)
    }

    pub fn put(&self, key: &str, value: V) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }

    pub fn invalidate(&self, key: &str) {
        self.values.borrow_mut().remove(key);
    }

    pub fn clear(&self) {
        self.values.borrow_mut().clear();
    }
}
