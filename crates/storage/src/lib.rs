pub mod cache;
pub mod datalist;
pub mod error;
pub mod metastrings;
pub mod options;
pub mod query;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use cache::MemoryPool;
pub use datalist::Datalist;
pub use error::StorageError;
pub use metastrings::Metastrings;
pub use options::{JoinSpec, OrderItem, OrderOption, QueryOptions};
pub use query::{JoinKind, Operand, ParamType, Predicate, QueryBuilder, QueryKind, QueryResult};
pub use sqlite::SqliteDatabase;
pub use traits::*;
