use thiserror::Error;

/// Errors from a single request against the contracts API
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server returned status {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("Failed to decode page: {0}")]
    Decode(String),

    #[error("Giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// True for 4xx responses. Retry currently ignores this and retries every
    /// failed attempt.
    pub fn is_client_error(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => (400..500).contains(status),
            FetchError::Exhausted { last, .. } => last.is_client_error(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Errors while writing the local CSV file
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors from the object store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload of {key} failed: {message}")]
    Upload {
        key: String,
        message: String,
    },
}

/// Field-level validation errors for configuration values
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required {
        field: String,
    },

    #[error("Field '{field}' contains invalid format: {reason}")]
    Format {
        field: String,
        reason: String,
    },

    #[error("Field '{field}' contains an invalid value: {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        Self::Required {
            field: field.to_string(),
        }
    }

    pub fn format(field: &str, reason: &str) -> Self {
        Self::Format {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Other(String),
}

/// Top-level error for one extraction run
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Write failed: {0}")]
    Write(#[from] WriteError),

    #[error("Upload failed: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        let not_found = FetchError::Status { status: 404, body: String::new() };
        let unavailable = FetchError::Status { status: 503, body: String::new() };
        assert!(not_found.is_client_error());
        assert!(!unavailable.is_client_error());
        assert!(!FetchError::Transport("reset".to_string()).is_client_error());

        let exhausted = FetchError::Exhausted { attempts: 5, last: Box::new(not_found) };
        assert!(exhausted.is_client_error());
    }

    #[test]
    fn test_error_messages() {
        let err = ExtractError::from(FetchError::Exhausted {
            attempts: 3,
            last: Box::new(FetchError::Status { status: 500, body: "boom".to_string() }),
        });
        assert_eq!(
            err.to_string(),
            "Fetch failed: Giving up after 3 attempts: Server returned status 500: boom"
        );

        let err = ConfigError::from(ValidationError::required("BUCKET_NAME"));
        assert_eq!(err.to_string(), "Invalid configuration: Field 'BUCKET_NAME' is required");
    }
}
