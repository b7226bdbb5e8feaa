use crate::error::*;
use std::time::Duration;
use tracing::{debug, error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn requires_reauthentication(&self) -> bool;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Marketplace(e) => {
                error!("Marketplace error details: {:?}", e);
            }
            CoreError::Storage(e) => {
                error!("Storage error details: {:?}", e);
            }
            CoreError::Notify(e) => {
                error!("Notification error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Marketplace(e) => e.is_retryable(),
            CoreError::Storage(e) => e.is_retryable(),
            CoreError::Notify(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Timeout { .. } => true,
            CoreError::RateLimited { .. } => true,
            CoreError::RequestFailed { status_code, .. } => {
                matches!(status_code, Some(500..=599))
            }
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Marketplace(e) => e.retry_after(),
            CoreError::Notify(e) => e.retry_after(),
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            CoreError::RateLimited { retry_after, .. } => *retry_after,
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn requires_reauthentication(&self) -> bool {
        match self {
            CoreError::Marketplace(e) => e.requires_reauthentication(),
            _ => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Marketplace(e) => e.user_friendly_message(),
            CoreError::Storage(e) => e.user_friendly_message(),
            CoreError::Notify(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { .. } => {
                "Invalid input provided. Please check your input and try again.".to_string()
            }
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            CoreError::NotFound { resource } => format!("Could not find: {}", resource),
            CoreError::RateLimited { message, .. } => {
                format!(
                    "Rate limited: {}. Please wait before trying again.",
                    message
                )
            }
            CoreError::RequestFailed { message, .. } => {
                format!("Request failed: {}", message)
            }
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Marketplace(_) => "MARKETPLACE".to_string(),
            CoreError::Storage(_) => "STORAGE".to_string(),
            CoreError::Notify(_) => "NOTIFY".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::NotFound { .. } => "NOT_FOUND".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
            CoreError::RateLimited { .. } => "RATE_LIMITED".to_string(),
            CoreError::RequestFailed { .. } => "REQUEST_FAILED".to_string(),
        }
    }
}

impl ErrorExt for MarketplaceError {
    fn log_error(&self) -> &Self {
        error!("MarketplaceError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("MarketplaceError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            MarketplaceError::RateLimitExceeded { .. } => true,
            MarketplaceError::RequestTimeout => true,
            MarketplaceError::ServerError { status_code } => *status_code >= 500,
            MarketplaceError::SessionHandshakeFailed { .. } => true,
            MarketplaceError::AuthenticationFailed { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            MarketplaceError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(30)),
            _ => None,
        }
    }

    fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            MarketplaceError::Unauthorized | MarketplaceError::MissingToken
        )
    }

    fn user_friendly_message(&self) -> String {
        match self {
            MarketplaceError::AuthenticationFailed { .. } | MarketplaceError::MissingToken => {
                "Vinted authentication failed. Will retry shortly.".to_string()
            }
            MarketplaceError::Unauthorized => {
                "Vinted access token is invalid or expired. Re-authenticating.".to_string()
            }
            MarketplaceError::SessionHandshakeFailed { .. } => {
                "Could not establish a Vinted session. Will retry on the next cycle.".to_string()
            }
            MarketplaceError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            MarketplaceError::Forbidden { resource } => {
                format!("Access denied to {}.", resource)
            }
            MarketplaceError::ItemNotFound { .. } => {
                "The requested item could not be found.".to_string()
            }
            MarketplaceError::RequestTimeout => {
                "Request to Vinted timed out. Please try again.".to_string()
            }
            _ => "Vinted API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            MarketplaceError::AuthenticationFailed { .. } => "VINTED_AUTH_FAILED".to_string(),
            MarketplaceError::MissingToken => "VINTED_MISSING_TOKEN".to_string(),
            MarketplaceError::Unauthorized => "VINTED_UNAUTHORIZED".to_string(),
            MarketplaceError::SessionHandshakeFailed { .. } => {
                "VINTED_SESSION_HANDSHAKE".to_string()
            }
            MarketplaceError::RateLimitExceeded { .. } => "VINTED_RATE_LIMIT".to_string(),
            MarketplaceError::Forbidden { .. } => "VINTED_FORBIDDEN".to_string(),
            MarketplaceError::ItemNotFound { .. } => "VINTED_ITEM_NOT_FOUND".to_string(),
            MarketplaceError::RequestTimeout => "VINTED_TIMEOUT".to_string(),
            MarketplaceError::InvalidResponse { .. } => "VINTED_INVALID_RESPONSE".to_string(),
            MarketplaceError::ServerError { .. } => "VINTED_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for StorageError {
    fn log_error(&self) -> &Self {
        error!("StorageError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("StorageError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::DatabaseLocked
                | StorageError::ConnectionFailed { .. }
                | StorageError::WriteFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            StorageError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ if self.is_retryable() => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    fn requires_reauthentication(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            StorageError::CorruptLedger { path, .. } => format!(
                "The seen-items ledger at {} is corrupt. Fix or move it before restarting.",
                path
            ),
            StorageError::PermissionDenied { path } => {
                format!("Permission denied writing {}. Please check file permissions.", path)
            }
            StorageError::InsufficientSpace => "Not enough storage space available.".to_string(),
            StorageError::DatabaseLocked => {
                "Database is temporarily busy. Please try again.".to_string()
            }
            _ => "Could not persist the seen-items ledger.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            StorageError::WriteFailed { .. } => "STORAGE_WRITE_FAILED".to_string(),
            StorageError::ReadFailed { .. } => "STORAGE_READ_FAILED".to_string(),
            StorageError::CorruptLedger { .. } => "STORAGE_CORRUPT".to_string(),
            StorageError::PermissionDenied { .. } => "STORAGE_PERMISSION_DENIED".to_string(),
            StorageError::InsufficientSpace => "STORAGE_INSUFFICIENT_SPACE".to_string(),
            StorageError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            StorageError::DatabaseLocked => "DB_LOCKED".to_string(),
            StorageError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for NotifyError {
    fn log_error(&self) -> &Self {
        error!("NotifyError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("NotifyError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            NotifyError::RateLimited { .. } => true,
            NotifyError::DeliveryFailed { status_code, .. } => {
                status_code.map_or(true, |code| code >= 500)
            }
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            NotifyError::RateLimited { retry_after } => Some(Duration::from_secs(*retry_after)),
            _ if self.is_retryable() => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    fn requires_reauthentication(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            NotifyError::NotConfigured => {
                "No Discord bot token configured; notifications are disabled.".to_string()
            }
            NotifyError::Unauthorized => {
                "Discord rejected the bot token. Please check the configuration.".to_string()
            }
            NotifyError::ChannelNotFound { channel_id } => format!(
                "Discord channel {} was not found or the bot cannot post there.",
                channel_id
            ),
            NotifyError::RateLimited { retry_after } => {
                format!("Discord rate limit hit. Retry after {} seconds.", retry_after)
            }
            NotifyError::DeliveryFailed { .. } => "Failed to deliver the notification.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            NotifyError::NotConfigured => "NOTIFY_NOT_CONFIGURED".to_string(),
            NotifyError::Unauthorized => "NOTIFY_UNAUTHORIZED".to_string(),
            NotifyError::ChannelNotFound { .. } => "NOTIFY_CHANNEL_NOT_FOUND".to_string(),
            NotifyError::RateLimited { .. } => "NOTIFY_RATE_LIMIT".to_string(),
            NotifyError::DeliveryFailed { .. } => "NOTIFY_DELIVERY_FAILED".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors need user intervention
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn requires_reauthentication(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => {
                "Configuration file not found. Using built-in defaults.".to_string()
            }
            ConfigError::InvalidFormat { .. } | ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::PermissionDenied { .. } => {
                "Permission denied accessing configuration. Please check file permissions."
                    .to_string()
            }
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is invalid: {}", reason)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidFormat { .. } => "CONFIG_INVALID_FORMAT".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::PermissionDenied { .. } => "CONFIG_PERMISSION_DENIED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

/// Logs failures seen by the monitor together with their error code and
/// whether a later attempt could succeed.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    include_hints: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            include_hints: true,
        }
    }

    /// Toggle the user-facing hint that follows each report.
    pub fn with_hints(mut self, enabled: bool) -> Self {
        self.include_hints = enabled;
        self
    }

    pub fn report_error(&self, context: &str, error: &CoreError) {
        error!(
            code = %error.error_code(),
            retryable = error.is_retryable(),
            "{}: {}",
            context,
            error
        );
        self.hint(error);
    }

    pub fn report_warning(&self, context: &str, error: &CoreError) {
        warn!(code = %error.error_code(), "{}: {}", context, error);
        self.hint(error);
    }

    fn hint(&self, error: &CoreError) {
        if !self.include_hints {
            return;
        }
        match error.retry_after() {
            Some(delay) => debug!(
                "{} A later attempt may succeed in {:?}.",
                error.user_friendly_message(),
                delay
            ),
            None => debug!("{}", error.user_friendly_message()),
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
