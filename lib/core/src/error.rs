use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Ordering violation in partition {partition} at key {key}: {message}")]
    OrderingViolation {
        partition: usize,
        key: String,
        message: String,
    },

    #[error("Invalid partitioner: {0}")]
    InvalidPartitioner(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn ordering(partition: usize, key: &impl std::fmt::Display, message: impl Into<String>) -> Self {
        Error::OrderingViolation {
            partition,
            key: key.to_string(),
            message: message.into(),
        }
    }
}
