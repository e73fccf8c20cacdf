use elgg_core::CoreError;
use elgg_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("collection has been deleted: {0}")]
    CollectionDeleted(String),

    #[error("concurrent modification: {0}")]
    Conflict(String),
}
