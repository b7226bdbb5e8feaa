pub mod api;
pub mod auth;
pub mod fetcher;
pub mod metrics;
pub mod normalize;
pub mod rate_limiter;


pub use api::{VintedApiClient, VintedApiConfig};
pub use auth::{AuthState, Credential, SessionManager};
pub use fetcher::ListingFetcher;
pub use normalize::{candidate_id, normalize, InvalidListing};

use async_trait::async_trait;
use monitor_core::CoreError;
use serde_json::Value;

/// The marketplace operations the monitor depends on.
///
/// Implementations report failures as [`CoreError`]; an expired or rejected
/// token must surface as `MarketplaceError::Unauthorized` so callers can
/// re-authenticate.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    /// Obtain a fresh access token for `device_id`.
    async fn authenticate(&self, device_id: &str) -> Result<String, CoreError>;

    /// Site-specific handshake that yields the session cookies later calls need.
    async fn fetch_session_cookies(&self, credential: &Credential) -> Result<String, CoreError>;

    /// Newest-first search results for `term`, in upstream order.
    async fn search(&self, term: &str, credential: &Credential) -> Result<Vec<Value>, CoreError>;

    /// Full item payload, or `None` when the item no longer exists.
    async fn details(
        &self,
        item_id: &str,
        credential: &Credential,
    ) -> Result<Option<Value>, CoreError>;
}
