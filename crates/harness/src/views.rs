use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use elgg_simplecache::ViewSystem;

/// In-memory views that count how often they are rendered.
#[derive(Debug, Default)]
pub struct MockViews {
    views: RefCell<HashMap<String, String>>,
    uncacheable: RefCell<HashSet<String>>,
    renders: Cell<usize>,
}

impl MockViews {
    /// Appended to content by [`ViewSystem::process_for_cache`].
    pub const CACHE_MARKER: &'static str = "\n/* simplecache */";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_view(&self, view: &str, content: &str) {
        self.views.borrow_mut().insert(view.to_string(), content.to_string());
    }

    pub fn mark_uncacheable(&self, view: &str) {
        self.uncacheable.borrow_mut().insert(view.to_string());
    }

    pub fn render_count(&self) -> usize {
        self.renders.get()
    }
}

impl ViewSystem for MockViews {
    fn view_exists(&self, view: &str, _viewtype: &str) -> bool {
        self.views.borrow().contains_key(view)
    }

    fn is_cacheable(&self, view: &str) -> bool {
        !self.uncacheable.borrow().contains(view)
    }

    fn render(&self, view: &str, _viewtype: &str) -> String {
        self.renders.set(self.renders.get() + 1);
        self.views.borrow().get(view).cloned().unwrap_or_default()
    }

    fn process_for_cache(&self, _view: &str, _viewtype: &str, content: String) -> String {
        content + Self::CACHE_MARKER
    }
}
