//! Recovery policy for failures observed by the monitor loop.
//!
//! Every error the loop sees is mapped to one of a small set of strategies.
//! None of them stop the loop: the worst case is a fixed backoff before the
//! next attempt.

use crate::{CoreError, ErrorExt, MarketplaceError};
use std::time::Duration;

/// Fixed wait applied after authentication failures and unexpected errors.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);

/// Recovery strategy for handling errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Drop the current credential and authenticate again
    Reauthenticate,
    /// Wait before resuming the interrupted state
    Backoff { delay: Duration },
    /// Skip the current item or term and continue
    Skip,
}

impl RecoveryStrategy {
    pub fn is_skip(&self) -> bool {
        matches!(self, RecoveryStrategy::Skip)
    }

    pub fn is_reauthenticate(&self) -> bool {
        matches!(self, RecoveryStrategy::Reauthenticate)
    }
}

/// Maps errors onto the monitor's recovery policy
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        if error.requires_reauthentication() {
            return RecoveryStrategy::Reauthenticate;
        }

        match error {
            // Authentication itself failed - wait, then try again
            CoreError::Marketplace(MarketplaceError::AuthenticationFailed { .. }) => {
                RecoveryStrategy::Backoff {
                    delay: DEFAULT_BACKOFF,
                }
            }

            // Transient network trouble and malformed payloads only cost one item
            CoreError::Marketplace(_)
            | CoreError::Network(_)
            | CoreError::Timeout { .. }
            | CoreError::RateLimited { .. }
            | CoreError::RequestFailed { .. }
            | CoreError::Serialization(_)
            | CoreError::InvalidInput { .. }
            | CoreError::NotFound { .. } => RecoveryStrategy::Skip,

            // A failed write blocks notification for that item only
            CoreError::Storage(_) | CoreError::Io(_) => RecoveryStrategy::Skip,

            // Delivery is never retried; the item is already recorded
            CoreError::Notify(_) => RecoveryStrategy::Skip,

            CoreError::Config(_) | CoreError::Internal { .. } => RecoveryStrategy::Backoff {
                delay: DEFAULT_BACKOFF,
            },
        }
    }
}
