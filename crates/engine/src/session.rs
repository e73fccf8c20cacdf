use std::cell::Cell;

use elgg_core::Guid;

/// The acting user and access override for one unit of work.
#[derive(Debug, Default)]
pub struct Session {
    user: Cell<Option<Guid>>,
    ignore_access: Cell<bool>,
    generation: Cell<u64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, user: Guid) {
        self.user.set(Some(user));
        self.bump();
    }

    pub fn logout(&self) {
        self.user.set(None);
        self.bump();
    }

    fn bump(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    /// The acting user, or [`Guid::NONE`] when logged out.
    pub fn user_guid(&self) -> Guid {
        self.user.get().unwrap_or(Guid::NONE)
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.get().is_some_and(|g| g.is_positive())
    }

    /// Changes whenever the acting user changes.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn ignore_access(&self) -> bool {
        self.ignore_access.get()
    }

    /// Returns the previous value.
    pub fn set_ignore_access(&self, ignore: bool) -> bool {
        self.ignore_access.replace(ignore)
    }

    /// Ignore access until the guard is dropped, then restore the previous
    /// setting.
    pub fn ignore_access_guard(&self) -> IgnoreAccessGuard<'_> {
        let previous = self.set_ignore_access(true);
        IgnoreAccessGuard {
            session: self,
            previous,
        }
    }
}

pub struct IgnoreAccessGuard<'a> {
    session: &'a Session,
    previous: bool,
}

impl Drop for IgnoreAccessGuard<'_> {
    fn drop(&mut self) {
        self.session.set_ignore_access(self.previous);
    }
}
