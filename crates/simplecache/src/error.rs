use elgg_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Rejected request; the message is safe to show the client.
    #[error("{0}")]
    Forbidden(&'static str),
}

impl CacheError {
    pub const BAD_REQUEST: &'static str = "Cache error: bad request";
    pub const NO_DB_SERVER: &'static str = "Cache error: unable to connect to database server";
    pub const NO_DATABASE: &'static str = "Cache error: unable to connect to Elgg database";
    pub const NO_DATAROOT: &'static str = "Cache error: unable to get the data root";

    /// The short message sent with a 403.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Forbidden(msg) => msg,
            _ => Self::BAD_REQUEST,
        }
    }
}
