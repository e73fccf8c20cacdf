pub mod config;
pub mod error;
pub mod ids;
pub mod order_by;
pub mod value;

pub use config::{SiteConfig, SqlDialect};
pub use error::CoreError;
pub use ids::*;
pub use order_by::{Direction, OrderBy};
pub use value::SqlValue;
