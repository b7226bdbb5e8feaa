pub mod discord;
pub mod render;

pub use discord::{BotIdentity, DiscordNotifier};
pub use render::{build_message, country_flag, Button, Embed, RenderedMessage};

use async_trait::async_trait;
use monitor_core::{CoreError, Listing};
use std::sync::Arc;

/// Delivers one message per new listing. Failures are reported, never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, listing: &Listing) -> Result<(), CoreError>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn notify(&self, listing: &Listing) -> Result<(), CoreError> {
        (**self).notify(listing).await
    }
}
