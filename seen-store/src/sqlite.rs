use crate::SeenStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monitor_core::{CoreError, Listing, SeenRecord, StorageError};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Ledger backed by a single SQLite table.
///
/// Ids and payloads are loaded once at open so lookups never touch the
/// database; the table is the durable copy.
#[derive(Debug)]
pub struct SqliteLedger {
    pool: SqlitePool,
    // `None` for rows whose payload no longer decodes as a listing
    entries: HashMap<String, Option<SeenRecord>>,
}

impl SqliteLedger {
    /// Open (creating if needed) the database at `location`, which is either a
    /// `sqlite:` URL or a plain file path.
    pub async fn open(location: &str) -> Result<Self, CoreError> {
        let base = if location.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(location).map_err(StorageError::from)?
        } else {
            SqliteConnectOptions::new().filename(location)
        };
        let options = base
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let mut ledger = Self {
            pool,
            entries: HashMap::new(),
        };
        ledger.initialize_schema().await?;
        ledger.load_entries().await?;
        Ok(ledger)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_listings (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                first_seen DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Seen-listing schema initialized");
        Ok(())
    }

    async fn load_entries(&mut self) -> Result<(), StorageError> {
        let rows = sqlx::query_as::<_, (String, String, DateTime<Utc>)>(
            "SELECT id, data, first_seen FROM seen_listings",
        )
        .fetch_all(&self.pool)
        .await?;

        for (id, data, first_seen) in rows {
            let record = match serde_json::from_str::<Listing>(&data) {
                Ok(listing) => Some(SeenRecord {
                    data: listing,
                    timestamp: first_seen,
                }),
                Err(e) => {
                    warn!(id = %id, error = %e, "Stored listing payload is unreadable");
                    None
                }
            };
            self.entries.insert(id, record);
        }

        info!("Loaded {} seen listings from SQLite", self.entries.len());
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SeenStore for SqliteLedger {
    fn is_seen(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    async fn record(&mut self, listing: &Listing) -> Result<(), CoreError> {
        let data = serde_json::to_string(listing)?;

        let first_seen = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            INSERT INTO seen_listings (id, data, first_seen)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data
            RETURNING first_seen
            "#,
        )
        .bind(&listing.id)
        .bind(&data)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::from)?;

        self.entries.insert(
            listing.id.clone(),
            Some(SeenRecord {
                data: listing.clone(),
                timestamp: first_seen,
            }),
        );
        debug!(id = %listing.id, total = self.entries.len(), "Recorded listing");
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, id: &str) -> Option<SeenRecord> {
        self.entries.get(id).cloned().flatten()
    }
}
