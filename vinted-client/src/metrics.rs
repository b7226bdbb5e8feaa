use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// The marketplace calls the client makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Token,
    SessionHandshake,
    CatalogSearch,
    ItemDetails,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Token => "/oauth/token",
            Endpoint::SessionHandshake => "/api/v2/system_configuration",
            Endpoint::CatalogSearch => "/api/v2/catalog/items",
            Endpoint::ItemDetails => "/api/v2/items/{id}/details",
        }
    }
}

/// How a single call ended, as far as the statistics care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Unauthorized,
    RateLimited,
    NotFound,
    ServerError,
    OtherStatus,
    Transport,
}

impl Outcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Outcome::Success,
            401 => Outcome::Unauthorized,
            404 => Outcome::NotFound,
            429 => Outcome::RateLimited,
            500..=599 => Outcome::ServerError,
            _ => Outcome::OtherStatus,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointMetrics {
    pub requests: u64,
    pub successes: u64,
    pub unauthorized: u64,
    pub rate_limited: u64,
    pub not_found: u64,
    pub server_errors: u64,
    pub transport_errors: u64,
    pub total_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl EndpointMetrics {
    fn record(&mut self, outcome: Outcome, latency: Duration) {
        let latency_ms = latency.as_millis().min(u64::MAX as u128) as u64;
        self.requests += 1;
        self.total_latency_ms += latency_ms;
        self.max_latency_ms = self.max_latency_ms.max(latency_ms);

        match outcome {
            Outcome::Success => self.successes += 1,
            Outcome::Unauthorized => self.unauthorized += 1,
            Outcome::RateLimited => self.rate_limited += 1,
            Outcome::NotFound => self.not_found += 1,
            Outcome::ServerError => self.server_errors += 1,
            Outcome::Transport => self.transport_errors += 1,
            Outcome::OtherStatus => {}
        }
    }

    pub fn average_latency(&self) -> Duration {
        match self.requests {
            0 => Duration::ZERO,
            n => Duration::from_millis(self.total_latency_ms / n),
        }
    }

    pub fn success_rate(&self) -> f64 {
        match self.requests {
            0 => 0.0,
            n => self.successes as f64 / n as f64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiMetrics {
    pub endpoints: BTreeMap<Endpoint, EndpointMetrics>,
}

impl ApiMetrics {
    pub fn total_requests(&self) -> u64 {
        self.endpoints.values().map(|m| m.requests).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.endpoints
            .values()
            .map(|m| m.requests - m.successes)
            .sum()
    }

    pub fn endpoint(&self, endpoint: Endpoint) -> Option<&EndpointMetrics> {
        self.endpoints.get(&endpoint)
    }
}

/// Request statistics for the lifetime of the client, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, endpoint: Endpoint, outcome: Outcome, latency: Duration) {
        self.metrics
            .write()
            .await
            .endpoints
            .entry(endpoint)
            .or_default()
            .record(outcome, latency);
    }

    pub async fn snapshot(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&*self.metrics.read().await)
    }
}
