use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Marketplace API error: {0}")]
    Marketplace(#[from] MarketplaceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<std::time::Duration>,
    },

    #[error("Request failed: {message}")]
    RequestFailed {
        message: String,
        status_code: Option<u16>,
    },
}

#[derive(Error, Debug, Clone)]
pub enum MarketplaceError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Authentication response did not contain an access token")]
    MissingToken,

    #[error("Access token rejected")]
    Unauthorized,

    #[error("Session handshake failed: {reason}")]
    SessionHandshakeFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to write ledger {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Failed to read ledger {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Ledger {path} is corrupt: {details}")]
    CorruptLedger { path: String, details: String },

    #[error("Permission denied for ledger: {path}")]
    PermissionDenied { path: String },

    #[error("Insufficient storage space")]
    InsufficientSpace,

    #[error("Database connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("Notification sink is not configured")]
    NotConfigured,

    #[error("Bot token rejected by Discord")]
    Unauthorized,

    #[error("Channel not found or not accessible: {channel_id}")]
    ChannelNotFound { channel_id: u64 },

    #[error("Discord rate limit hit. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Delivery failed ({status_code:?}): {reason}")]
    DeliveryFailed {
        status_code: Option<u16>,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {details}")]
    InvalidFormat { details: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Permission denied accessing config: {path}")]
    PermissionDenied { path: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl StorageError {
    /// Classifies an IO failure against the ledger at `path`.
    pub fn from_io(path: &str, error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path: path.to_string(),
            },
            // ENOSPC
            _ if error.raw_os_error() == Some(28) => StorageError::InsufficientSpace,
            _ => StorageError::WriteFailed {
                path: path.to_string(),
                reason: error.to_string(),
            },
        }
    }
}
