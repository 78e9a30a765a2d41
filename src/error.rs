use thiserror::Error;

/// Error taxonomy per spec §7: syntax/binding errors are a collaborator
/// concern (the binder/planner), so this enum covers runtime execution,
/// storage, and not-implemented errors only.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("recovery error: {0}")]
    Recovery(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Io(e) => DbError::Storage(e.to_string()),
            DbError::Storage(s) => DbError::Storage(s.clone()),
            DbError::Index(s) => DbError::Index(s.clone()),
            DbError::Execution(s) => DbError::Execution(s.clone()),
            DbError::Transaction(s) => DbError::Transaction(s.clone()),
            DbError::Catalog(s) => DbError::Catalog(s.clone()),
            DbError::Serialization(s) => DbError::Serialization(s.clone()),
            DbError::NotImplemented(s) => DbError::NotImplemented(s.clone()),
            DbError::Corruption(s) => DbError::Corruption(s.clone()),
            DbError::Recovery(s) => DbError::Recovery(s.clone()),
            DbError::InvalidInput(s) => DbError::InvalidInput(s.clone()),
            DbError::NotFound(s) => DbError::NotFound(s.clone()),
            DbError::AlreadyExists(s) => DbError::AlreadyExists(s.clone()),
            DbError::Internal(s) => DbError::Internal(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<bincode::error::EncodeError> for DbError {
    fn from(e: bincode::error::EncodeError) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for DbError {
    fn from(e: bincode::error::DecodeError) -> Self {
        DbError::Serialization(e.to_string())
    }
}
