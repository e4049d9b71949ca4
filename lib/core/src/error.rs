use thiserror::Error;
use toolcat_schema::SchemaError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema configuration error: {0}")]
    SchemaConfiguration(String),

    #[error("Record ingestion error at record {row}: {message}")]
    RecordIngestion { row: usize, message: String },

    #[error("Facet unavailable: {0}")]
    FacetUnavailable(String),

    #[error("Unknown attribute group: {0}")]
    UnknownGroup(String),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::SchemaConfiguration(err.to_string())
    }
}

impl Error {
    /// Errors that must abort a rebuild before the store is touched
    pub fn is_fatal_for_rebuild(&self) -> bool {
        matches!(
            self,
            Error::SchemaConfiguration(_) | Error::RecordIngestion { .. } | Error::Integrity(_)
        )
    }
}
