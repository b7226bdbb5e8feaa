use crate::auth::Credential;
use crate::metrics::{ApiMetrics, Endpoint, MetricsCollector, Outcome};
use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter, MAX_COOLDOWN};
use crate::MarketplaceClient;
use async_trait::async_trait;
use monitor_core::{CoreError, MarketplaceConfig, MarketplaceError};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, RETRY_AFTER,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

const APP_VERSION: &str = "25.20.1";
const USER_AGENT: &str = "vinted-ios Vinted/25.20.1 (iOS)";
const DEVICE_MODEL: &str = "iPhone15,4";

#[derive(Debug, Clone)]
pub struct VintedApiConfig {
    pub base_url: Url,
    pub per_page: u32,
    pub locale: String,
    pub timeout: Duration,
}

impl VintedApiConfig {
    pub fn from_marketplace(config: &MarketplaceConfig) -> Result<Self, CoreError> {
        let base_url = Url::parse(&format!("https://{}", config.host.trim_end_matches('/')))
            .map_err(|e| CoreError::InvalidInput {
                message: format!("invalid marketplace host {:?}: {}", config.host, e),
            })?;

        Ok(Self {
            base_url,
            per_page: config.per_page,
            locale: config.locale.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn host(&self) -> &str {
        self.base_url.host_str().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// HTTP client for the private API used by the Vinted iOS app.
#[derive(Debug)]
pub struct VintedApiClient {
    http_client: Client,
    config: VintedApiConfig,
    rate_limiter: RateLimiter,
    metrics: MetricsCollector,
}

impl VintedApiClient {
    pub fn new(config: VintedApiConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            config,
            rate_limiter: RateLimiter::new(RateLimitConfig::vinted()),
            metrics: MetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &VintedApiConfig {
        &self.config
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, CoreError> {
        self.config
            .base_url
            .join(endpoint)
            .map_err(|e| CoreError::InvalidInput {
                message: format!("invalid endpoint {}: {}", endpoint, e),
            })
    }

    fn item_details_url(&self, item_id: &str) -> Result<Url, CoreError> {
        let mut url = self.endpoint_url("/api/v2/items")?;
        url.path_segments_mut()
            .map_err(|_| CoreError::InvalidInput {
                message: "marketplace base URL cannot carry a path".to_string(),
            })?
            .push(item_id)
            .push("details");
        Ok(url)
    }

    fn app_headers(&self, device_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("short-bundle-version", HeaderValue::from_static(APP_VERSION));
        headers.insert("x-app-version", HeaderValue::from_static(APP_VERSION));
        headers.insert("x-device-model", HeaderValue::from_static(DEVICE_MODEL));
        if let Ok(locale) = HeaderValue::from_str(&self.config.locale) {
            headers.insert(ACCEPT_LANGUAGE, locale);
        }
        if let Ok(device) = HeaderValue::from_str(device_id) {
            headers.insert("x-device-uuid", device);
        }
        headers
    }

    fn authorized(&self, method: Method, url: Url, credential: &Credential) -> RequestBuilder {
        let mut request = self
            .http_client
            .request(method, url)
            .headers(self.app_headers(credential.device_id()))
            .bearer_auth(credential.access_token());

        if let Some(cookies) = credential.session_cookies() {
            request = request.header(COOKIE, cookies);
        }
        request
    }

    /// Send a request, pacing it through the rate limiter and mapping failure
    /// statuses onto [`MarketplaceError`].
    async fn execute(
        &self,
        endpoint: Endpoint,
        request: RequestBuilder,
    ) -> Result<Response, CoreError> {
        let path = endpoint.path();
        let waited = self.rate_limiter.acquire_permit().await;
        if waited > Duration::from_millis(100) {
            debug!("Held back {:?} by rate limiter for {}", waited, path);
        }

        let start_time = Instant::now();
        debug!("Making Vinted API request: {}", path);
        let result = request.send().await;

        let (outcome, result) = match result {
            Ok(response) => {
                let status = response.status();
                let retry_after = parse_retry_after(response.headers());

                let outcome = Outcome::from_status(status.as_u16());
                match classify_status(status, path, retry_after) {
                    None => (outcome, Ok(response)),
                    Some(api_error) => {
                        warn!("Request failed with status: {} for {}", status, path);
                        if let MarketplaceError::RateLimitExceeded { retry_after } = &api_error {
                            self.rate_limiter
                                .cool_down(Duration::from_secs(*retry_after))
                                .await;
                        }
                        (outcome, Err(CoreError::Marketplace(api_error)))
                    }
                }
            }
            Err(e) => {
                error!("Network error for {}: {}", path, e);
                let mapped = if e.is_timeout() {
                    CoreError::Marketplace(MarketplaceError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                };
                (Outcome::Transport, Err(mapped))
            }
        };

        self.metrics
            .record(endpoint, outcome, start_time.elapsed())
            .await;

        result
    }

    async fn parse_json(response: Response, what: &str) -> Result<Value, CoreError> {
        response.json::<Value>().await.map_err(|e| {
            error!("Failed to parse {}: {}", what, e);
            CoreError::Marketplace(MarketplaceError::InvalidResponse {
                details: format!("failed to parse {}", what),
            })
        })
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.snapshot().await
    }

    pub async fn export_metrics(&self) -> Result<String, serde_json::Error> {
        self.metrics.export_json().await
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

#[async_trait]
impl MarketplaceClient for VintedApiClient {
    async fn authenticate(&self, device_id: &str) -> Result<String, CoreError> {
        let url = self.endpoint_url(Endpoint::Token.path())?;
        let body = serde_json::json!({
            "grant_type": "password",
            "client_id": "ios",
            "scope": "public",
        });
        let request = self
            .http_client
            .post(url)
            .headers(self.app_headers(device_id))
            .json(&body);

        let response = self
            .execute(Endpoint::Token, request)
            .await
            .map_err(|e| match e {
                CoreError::Marketplace(MarketplaceError::RequestTimeout) | CoreError::Network(_) => e,
                other => CoreError::Marketplace(MarketplaceError::AuthenticationFailed {
                    reason: other.to_string(),
                }),
            })?;

        let token: TokenResponse = response.json().await.map_err(|e| {
            CoreError::Marketplace(MarketplaceError::AuthenticationFailed {
                reason: format!("unreadable token response: {}", e),
            })
        })?;

        match token.access_token {
            Some(token) if !token.trim().is_empty() => {
                info!("Obtained Vinted access token");
                Ok(token)
            }
            _ => Err(CoreError::Marketplace(MarketplaceError::MissingToken)),
        }
    }

    async fn fetch_session_cookies(&self, credential: &Credential) -> Result<String, CoreError> {
        let url = self.endpoint_url(Endpoint::SessionHandshake.path())?;
        let request = self.authorized(Method::GET, url, credential);

        let response = self
            .execute(Endpoint::SessionHandshake, request)
            .await
            .map_err(|e| {
                CoreError::Marketplace(MarketplaceError::SessionHandshakeFailed {
                    reason: e.to_string(),
                })
            })?;

        let cookies = response
            .cookies()
            .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
            .collect::<Vec<_>>()
            .join("; ");

        debug!("Session handshake returned {} bytes of cookies", cookies.len());
        Ok(cookies)
    }

    async fn search(&self, term: &str, credential: &Credential) -> Result<Vec<Value>, CoreError> {
        let mut url = self.endpoint_url(Endpoint::CatalogSearch.path())?;
        url.query_pairs_mut()
            .append_pair("search_text", term)
            .append_pair("order", "newest_first")
            .append_pair("per_page", &self.config.per_page.to_string())
            .append_pair("page", "1");

        let request = self.authorized(Method::GET, url, credential);
        let response = self.execute(Endpoint::CatalogSearch, request).await?;
        let body = Self::parse_json(response, "catalog items").await?;

        let items = match body.get("items") {
            Some(Value::Array(items)) => items.clone(),
            _ => {
                warn!("Catalog response for {:?} had no items array", term);
                Vec::new()
            }
        };

        info!("Retrieved {} items for {:?}", items.len(), term);
        Ok(items)
    }

    async fn details(
        &self,
        item_id: &str,
        credential: &Credential,
    ) -> Result<Option<Value>, CoreError> {
        let url = self.item_details_url(item_id)?;
        let request = self.authorized(Method::GET, url, credential);

        match self.execute(Endpoint::ItemDetails, request).await {
            Ok(response) => Ok(Some(Self::parse_json(response, "item details").await?)),
            Err(CoreError::Marketplace(MarketplaceError::ItemNotFound { .. })) => {
                debug!("Item {} no longer exists", item_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Seconds from a `Retry-After` header, capped to the longest cooldown the
/// limiter honours. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|secs| secs.min(MAX_COOLDOWN.as_secs()))
}

/// Map a non-success status onto the error the rest of the system reacts to.
pub fn classify_status(
    status: StatusCode,
    endpoint: &str,
    retry_after: Option<u64>,
) -> Option<MarketplaceError> {
    if status.is_success() {
        return None;
    }

    let error = match status.as_u16() {
        401 => MarketplaceError::Unauthorized,
        403 => MarketplaceError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => MarketplaceError::ItemNotFound {
            item_id: endpoint.to_string(),
        },
        429 => MarketplaceError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(60),
        },
        code if status.is_server_error() => MarketplaceError::ServerError { status_code: code },
        code => MarketplaceError::InvalidResponse {
            details: format!("unexpected status {} from {}", code, endpoint),
        },
    };
    Some(error)
}
