//! HTTP front for cached static views.
//!
//! [`CacheHandler`] answers `/<ts>/<viewtype>/<view>` requests and
//! [`ComboHandler`] concatenates AMD modules. Both avoid a full boot when the
//! answer is already on disk.

pub mod amd;
pub mod app;
pub mod combo;
pub mod error;
pub mod handler;
pub mod headers;
pub mod request;
pub mod store;

pub use app::{Application, CacheSettings, LASTCACHE_KEY, SiteApplication, ViewSystem, minimal_boot};
pub use combo::ComboHandler;
pub use error::CacheError;
pub use handler::CacheHandler;
pub use request::{ComboRequest, ViewRequest, parse_combo_vars, parse_request_var};
pub use store::CacheStore;
