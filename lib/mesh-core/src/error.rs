use mesh_api::AddressError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid workload: {0}")]
    InvalidWorkload(String),

    #[error("Invalid service: {0}")]
    InvalidService(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
