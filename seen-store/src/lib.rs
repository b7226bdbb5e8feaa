pub mod json;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use json::JsonLedger;
pub use sqlite::SqliteLedger;

use async_trait::async_trait;
use monitor_core::{CoreError, Listing, SeenRecord, StorageBackend, StorageConfig};
use tracing::info;

/// Durable record of listing ids that have already been handled.
///
/// Entries are only ever added. `is_seen` answers from memory; `record`
/// returns once the entry is durable, and leaves the in-memory view untouched
/// when it fails.
#[async_trait]
pub trait SeenStore: Send {
    fn is_seen(&self, id: &str) -> bool;

    /// Persist `listing` under its id. Re-recording an id replaces the stored
    /// payload and keeps the first-seen time.
    async fn record(&mut self, listing: &Listing) -> Result<(), CoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, id: &str) -> Option<SeenRecord>;
}

#[async_trait]
impl<S: SeenStore + ?Sized> SeenStore for Box<S> {
    fn is_seen(&self, id: &str) -> bool {
        (**self).is_seen(id)
    }

    async fn record(&mut self, listing: &Listing) -> Result<(), CoreError> {
        (**self).record(listing).await
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, id: &str) -> Option<SeenRecord> {
        (**self).get(id)
    }
}

/// Open the ledger selected by `config`.
pub async fn open_store(config: &StorageConfig) -> Result<Box<dyn SeenStore>, CoreError> {
    let store: Box<dyn SeenStore> = match config.backend {
        StorageBackend::Json => Box::new(JsonLedger::open(&config.path).await?),
        StorageBackend::Sqlite => Box::new(SqliteLedger::open(&config.path).await?),
    };
    info!(
        backend = ?config.backend,
        path = %config.path,
        entries = store.len(),
        "Opened seen-listing ledger"
    );
    Ok(store)
}
