use crate::render::{build_message, RenderedMessage};
use crate::Notifier;
use async_trait::async_trait;
use monitor_core::{CoreError, Listing, NotifyError, RunConfig};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DISCORD_API: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = "DiscordBot (https://github.com/vinted-monitor/vinted-monitor, 0.1)";

#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
}

/// Posts rendered listings to a channel through the Discord REST API.
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    token: Option<String>,
    channel_id: u64,
    max_images: usize,
    host: String,
}

impl DiscordNotifier {
    pub fn new(config: &RunConfig) -> Result<Self, CoreError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.marketplace.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            token: config
                .token
                .clone()
                .filter(|token| !token.trim().is_empty()),
            channel_id: config.channel_id,
            max_images: config.max_images_per_post,
            host: config.marketplace.host.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.channel_id != 0
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, NotifyError> {
        let token = self.token.as_deref().ok_or(NotifyError::NotConfigured)?;
        let value = HeaderValue::from_str(&format!("Bot {}", token)).map_err(|_| {
            NotifyError::DeliveryFailed {
                status_code: None,
                reason: "bot token contains invalid header characters".to_string(),
            }
        })?;
        Ok(request.header(AUTHORIZATION, value))
    }

    /// Verify the bot token and report who we are logged in as. Run once
    /// before the monitor starts.
    pub async fn connect(&self) -> Result<BotIdentity, CoreError> {
        let request = self.authorized(self.client.get(format!("{}/users/@me", DISCORD_API)))?;
        let response = request.send().await.map_err(delivery_error)?;
        let response = self.check_status(response)?;

        let identity: BotIdentity = response.json().await.map_err(|e| NotifyError::DeliveryFailed {
            status_code: None,
            reason: format!("unreadable identity response: {}", e),
        })?;

        info!("Logged in as {} (id {})", identity.username, identity.id);
        Ok(identity)
    }

    pub async fn send(&self, message: &RenderedMessage) -> Result<(), CoreError> {
        if self.channel_id == 0 {
            return Err(NotifyError::NotConfigured.into());
        }

        let url = format!("{}/channels/{}/messages", DISCORD_API, self.channel_id);
        let request = self.authorized(self.client.post(url))?;
        let response = request
            .json(&message.to_payload())
            .send()
            .await
            .map_err(delivery_error)?;
        self.check_status(response)?;
        Ok(())
    }

    fn check_status(&self, response: Response) -> Result<Response, NotifyError> {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<f64>().ok())
            .map(|secs| secs.ceil() as u64);

        match classify_status(status, self.channel_id, retry_after) {
            None => Ok(response),
            Some(e) => {
                warn!("Discord returned {}: {}", status, e);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for DiscordNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordNotifier")
            .field("configured", &self.token.is_some())
            .field("channel_id", &self.channel_id)
            .field("max_images", &self.max_images)
            .field("host", &self.host)
            .finish()
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, listing: &Listing) -> Result<(), CoreError> {
        if !self.is_configured() {
            return Err(NotifyError::NotConfigured.into());
        }

        let message = build_message(listing, self.max_images, &self.host);
        debug!(
            id = %listing.id,
            embeds = message.embeds.len(),
            "Sending listing notification"
        );

        match self.send(&message).await {
            Ok(()) => {
                info!("Sent notification for product {}", listing.id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send notification for product {}: {}", listing.id, e);
                Err(e)
            }
        }
    }
}

fn delivery_error(e: reqwest::Error) -> NotifyError {
    NotifyError::DeliveryFailed {
        status_code: e.status().map(|status| status.as_u16()),
        reason: e.to_string(),
    }
}

/// Map a Discord response status onto [`NotifyError`].
pub fn classify_status(
    status: StatusCode,
    channel_id: u64,
    retry_after: Option<u64>,
) -> Option<NotifyError> {
    if status.is_success() {
        return None;
    }

    let error = match status {
        StatusCode::UNAUTHORIZED => NotifyError::Unauthorized,
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => NotifyError::ChannelNotFound { channel_id },
        StatusCode::TOO_MANY_REQUESTS => NotifyError::RateLimited {
            retry_after: retry_after.unwrap_or(1),
        },
        other => NotifyError::DeliveryFailed {
            status_code: Some(other.as_u16()),
            reason: other
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        },
    };
    Some(error)
}
