mod error;

pub use error::{ConfigError, ExtractError, FetchError, StorageError, ValidationError, WriteError};

/// Result type for contracts API calls
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for local file writes
pub type WriteResult<T> = Result<T, WriteError>;

/// Result type for object store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for a whole extraction run
pub type ExtractResult<T> = Result<T, ExtractError>;
