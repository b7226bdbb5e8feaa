use crate::auth::Credential;
use crate::MarketplaceClient;
use monitor_core::{CoreError, ErrorExt};
use serde_json::Value;
use tracing::{debug, warn};

/// Wraps a [`MarketplaceClient`] so that a single bad call never aborts a poll
/// cycle.
///
/// Transport, status and parse failures degrade to "no results" and are
/// logged. The only error handed back is a rejected token, which the monitor
/// answers by re-authenticating.
#[derive(Debug)]
pub struct ListingFetcher<C> {
    client: C,
}

impl<C: MarketplaceClient> ListingFetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn search(&self, term: &str, credential: &Credential) -> Result<Vec<Value>, CoreError> {
        match self.client.search(term, credential).await {
            Ok(items) => {
                debug!(term, count = items.len(), "search returned candidates");
                Ok(items)
            }
            Err(e) if e.requires_reauthentication() => Err(e),
            Err(e) => {
                warn!(term, error = %e, "Failed to search products");
                Ok(Vec::new())
            }
        }
    }

    pub async fn fetch_details(
        &self,
        item_id: &str,
        credential: &Credential,
    ) -> Result<Option<Value>, CoreError> {
        match self.client.details(item_id, credential).await {
            Ok(details) => Ok(details),
            Err(e) if e.requires_reauthentication() => Err(e),
            Err(e) => {
                warn!(item_id, error = %e, "Failed to get product details");
                Ok(None)
            }
        }
    }
}
