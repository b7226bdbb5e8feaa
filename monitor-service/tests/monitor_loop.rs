use async_trait::async_trait;
use discord_notifier::{build_message, Notifier};
use monitor_core::{
    CoreError, Listing, MarketplaceError, NotifyError, RunConfig, SeenRecord, StorageError,
};
use monitor_service::{passes_country_filter, MonitorLoop, MonitorState, Resume};
use seen_store::{JsonLedger, SeenStore};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use vinted_client::{Credential, MarketplaceClient, SessionManager};

#[derive(Default)]
struct FakeMarketplace {
    auth_failures_left: Mutex<u32>,
    auth_calls: Mutex<u32>,
    results: HashMap<String, Vec<Value>>,
    details: HashMap<String, Value>,
    unauthorized_searches_left: Mutex<u32>,
    searched: Mutex<Vec<String>>,
    detail_calls: Mutex<Vec<String>>,
}

impl FakeMarketplace {
    fn with_item(term: &str, id: &str, details: Value) -> Self {
        let mut fake = Self::default();
        fake.add_item(term, id, details);
        fake
    }

    fn add_item(&mut self, term: &str, id: &str, details: Value) {
        self.results
            .entry(term.to_string())
            .or_default()
            .push(json!({ "id": id }));
        self.details.insert(id.to_string(), details);
    }

    fn searched(&self) -> Vec<String> {
        self.searched.lock().unwrap().clone()
    }

    fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketplaceClient for FakeMarketplace {
    async fn authenticate(&self, _device_id: &str) -> Result<String, CoreError> {
        *self.auth_calls.lock().unwrap() += 1;
        let mut failures = self.auth_failures_left.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(MarketplaceError::AuthenticationFailed {
                reason: "status 503".to_string(),
            }
            .into());
        }
        Ok("token".to_string())
    }

    async fn fetch_session_cookies(&self, _credential: &Credential) -> Result<String, CoreError> {
        Ok("_vinted_session=1".to_string())
    }

    async fn search(&self, term: &str, _credential: &Credential) -> Result<Vec<Value>, CoreError> {
        self.searched.lock().unwrap().push(term.to_string());
        let mut unauthorized = self.unauthorized_searches_left.lock().unwrap();
        if *unauthorized > 0 {
            *unauthorized -= 1;
            return Err(MarketplaceError::Unauthorized.into());
        }
        Ok(self.results.get(term).cloned().unwrap_or_default())
    }

    async fn details(
        &self,
        item_id: &str,
        _credential: &Credential,
    ) -> Result<Option<Value>, CoreError> {
        self.detail_calls.lock().unwrap().push(item_id.to_string());
        Ok(self.details.get(item_id).cloned())
    }
}

#[derive(Default)]
struct MemoryStore {
    records: HashMap<String, SeenRecord>,
    fail_writes: bool,
}

#[async_trait]
impl SeenStore for MemoryStore {
    fn is_seen(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    async fn record(&mut self, listing: &Listing) -> Result<(), CoreError> {
        if self.fail_writes {
            return Err(StorageError::InsufficientSpace.into());
        }
        self.records
            .insert(listing.id.clone(), SeenRecord::new(listing.clone()));
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, id: &str) -> Option<SeenRecord> {
        self.records.get(id).cloned()
    }
}

/// Captures what would have been posted.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(Listing, usize)>>,
    panic_on: HashSet<String>,
    fail: bool,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(Listing, usize)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, listing: &Listing) -> Result<(), CoreError> {
        if self.panic_on.contains(&listing.id) {
            panic!("renderer blew up on {}", listing.id);
        }
        if self.fail {
            return Err(NotifyError::NotConfigured.into());
        }
        let images = build_message(listing, 4, "www.vinted.de").image_count();
        self.sent.lock().unwrap().push((listing.clone(), images));
        Ok(())
    }
}

fn item(id: &str, country: &str, photos: usize) -> Value {
    let photos: Vec<Value> = (0..photos)
        .map(|i| json!({ "url": format!("https://images.example/{}/{}.jpg", id, i) }))
        .collect();
    json!({
        "item": {
            "id": id,
            "title": format!("Item {}", id),
            "price": { "amount": "19.5", "currency_code": "EUR" },
            "url": format!("https://www.vinted.de/items/{}", id),
            "photos": photos,
            "size_title": "L",
            "brand_dto": { "title": "Ralph Lauren" },
            "status": "Very good",
            "user": {
                "feedback_reputation": 1.0,
                "feedback_count": 7,
                "country_title_local": country
            }
        }
    })
}

fn config(terms: &[&str]) -> RunConfig {
    RunConfig {
        search_terms: terms.iter().map(|t| t.to_string()).collect(),
        ..RunConfig::default()
    }
}

fn monitor<S: SeenStore>(
    client: FakeMarketplace,
    store: S,
    notifier: RecordingNotifier,
    config: RunConfig,
) -> MonitorLoop<FakeMarketplace, S, RecordingNotifier> {
    MonitorLoop::with_session(
        client,
        SessionManager::with_device_id("device".to_string()),
        store,
        notifier,
        config,
    )
}

/// Drive the loop from a fresh start through its first poll cycle.
async fn first_cycle<S: SeenStore>(monitor: &mut MonitorLoop<FakeMarketplace, S, RecordingNotifier>) {
    assert_eq!(monitor.step().await, MonitorState::Authenticating);
    assert_eq!(monitor.step().await, MonitorState::Polling);
    assert_eq!(monitor.step().await, MonitorState::Sleeping);
}

#[tokio::test(start_paused = true)]
async fn test_new_item_is_recorded_and_notified_once() {
    let client = FakeMarketplace::with_item("nike", "42", item("42", "Deutschland", 2));
    let mut monitor = monitor(
        client,
        MemoryStore::default(),
        RecordingNotifier::default(),
        config(&["nike"]),
    );

    first_cycle(&mut monitor).await;

    assert!(monitor.store().is_seen("42"));
    let sent = monitor.notifier().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.id, "42");
    assert_eq!(sent[0].1, 2);

    let report = monitor.last_report().unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.recorded, 1);
    assert_eq!(report.notified, 1);
}

#[tokio::test(start_paused = true)]
async fn test_seen_item_is_not_fetched_again() {
    let client = FakeMarketplace::with_item("nike", "42", item("42", "Deutschland", 1));
    let mut monitor = monitor(
        client,
        MemoryStore::default(),
        RecordingNotifier::default(),
        config(&["nike"]),
    );

    first_cycle(&mut monitor).await;
    assert_eq!(monitor.step().await, MonitorState::Polling);
    assert_eq!(monitor.step().await, MonitorState::Sleeping);

    assert_eq!(monitor.client().searched(), vec!["nike", "nike"]);
    assert_eq!(monitor.client().detail_calls(), vec!["42"]);
    assert_eq!(monitor.notifier().sent().len(), 1);
    assert_eq!(monitor.last_report().unwrap().skipped_seen, 1);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failures_back_off_before_polling() {
    let client = FakeMarketplace {
        auth_failures_left: Mutex::new(3),
        ..FakeMarketplace::with_item("nike", "42", item("42", "Deutschland", 1))
    };
    let mut monitor = monitor(
        client,
        MemoryStore::default(),
        RecordingNotifier::default(),
        config(&["nike", "polo"]),
    );

    assert_eq!(monitor.step().await, MonitorState::Authenticating);
    for _ in 0..3 {
        let started = tokio::time::Instant::now();
        assert_eq!(
            monitor.step().await,
            MonitorState::BackoffWait {
                delay: Duration::from_secs(30),
                resume: Resume::Authenticating,
            }
        );
        assert_eq!(monitor.step().await, MonitorState::Authenticating);
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(monitor.client().searched().is_empty());
    }

    assert_eq!(monitor.step().await, MonitorState::Polling);
    assert_eq!(monitor.step().await, MonitorState::Sleeping);
    assert_eq!(monitor.client().searched(), vec!["nike", "polo"]);
    assert_eq!(*monitor.client().auth_calls.lock().unwrap(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_country_filter_drops_foreign_items() {
    let mut client = FakeMarketplace::with_item("nike", "1", item("1", "Frankreich", 1));
    client.add_item("nike", "2", item("2", "Deutschland", 1));
    let mut monitor = monitor(
        client,
        MemoryStore::default(),
        RecordingNotifier::default(),
        config(&["nike"]),
    );

    first_cycle(&mut monitor).await;

    assert!(!monitor.store().is_seen("1"));
    assert!(monitor.store().is_seen("2"));
    let sent = monitor.notifier().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.id, "2");
    assert_eq!(monitor.last_report().unwrap().filtered, 1);
}

#[test]
fn test_passes_country_filter() {
    let mut listing = vinted_client::normalize(&item("5", "Deutschland", 0)).unwrap();
    assert!(passes_country_filter(&listing, "Deutschland"));

    listing.country = "Unknown".to_string();
    assert!(!passes_country_filter(&listing, "Deutschland"));
    listing.country = "Österreich".to_string();
    assert!(!passes_country_filter(&listing, "Deutschland"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_record_skips_notification() {
    let client = FakeMarketplace::with_item("nike", "42", item("42", "Deutschland", 1));
    let store = MemoryStore {
        fail_writes: true,
        ..MemoryStore::default()
    };
    let mut monitor = monitor(client, store, RecordingNotifier::default(), config(&["nike"]));

    first_cycle(&mut monitor).await;

    assert!(!monitor.store().is_seen("42"));
    assert!(monitor.notifier().sent().is_empty());
    assert_eq!(monitor.last_report().unwrap().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_notify_failure_keeps_item_recorded() {
    let client = FakeMarketplace::with_item("nike", "42", item("42", "Deutschland", 1));
    let notifier = RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    };
    let mut monitor = monitor(client, MemoryStore::default(), notifier, config(&["nike"]));

    first_cycle(&mut monitor).await;

    assert!(monitor.store().is_seen("42"));
    let report = monitor.last_report().unwrap();
    assert_eq!(report.recorded, 1);
    assert_eq!(report.notified, 0);
    assert_eq!(report.failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_candidate_does_not_stop_cycle() {
    let mut client = FakeMarketplace::with_item("nike", "boom", item("boom", "Deutschland", 1));
    client.add_item("nike", "43", item("43", "Deutschland", 1));
    let notifier = RecordingNotifier {
        panic_on: HashSet::from(["boom".to_string()]),
        ..RecordingNotifier::default()
    };
    let mut monitor = monitor(client, MemoryStore::default(), notifier, config(&["nike"]));

    first_cycle(&mut monitor).await;

    let sent = monitor.notifier().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.id, "43");
    assert_eq!(monitor.last_report().unwrap().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_token_triggers_reauthentication() {
    let client = FakeMarketplace {
        unauthorized_searches_left: Mutex::new(1),
        ..FakeMarketplace::with_item("nike", "42", item("42", "Deutschland", 1))
    };
    let mut monitor = monitor(
        client,
        MemoryStore::default(),
        RecordingNotifier::default(),
        config(&["nike", "polo"]),
    );

    let poll_interval = config(&[]).poll_interval();

    assert_eq!(monitor.step().await, MonitorState::Authenticating);
    assert_eq!(monitor.step().await, MonitorState::Polling);
    // Remaining terms are abandoned for this cycle
    assert_eq!(
        monitor.step().await,
        MonitorState::BackoffWait {
            delay: poll_interval,
            resume: Resume::Authenticating,
        }
    );
    assert_eq!(monitor.client().searched(), vec!["nike"]);

    assert_eq!(monitor.step().await, MonitorState::Authenticating);
    assert_eq!(monitor.step().await, MonitorState::Polling);
    assert_eq!(monitor.step().await, MonitorState::Sleeping);
    assert_eq!(*monitor.client().auth_calls.lock().unwrap(), 2);
    assert!(monitor.store().is_seen("42"));
}

#[tokio::test(start_paused = true)]
async fn test_persistently_rejected_tokens_are_paced() {
    let client = FakeMarketplace {
        unauthorized_searches_left: Mutex::new(u32::MAX),
        ..FakeMarketplace::default()
    };
    let config = config(&["nike"]);
    let poll_interval = config.poll_interval();
    let mut monitor = monitor(
        client,
        MemoryStore::default(),
        RecordingNotifier::default(),
        config,
    );

    let started = tokio::time::Instant::now();
    for _ in 0..20 {
        monitor.step().await;
    }

    let auth_calls = *monitor.client().auth_calls.lock().unwrap();
    assert_eq!(auth_calls, 7);
    assert_eq!(monitor.client().searched().len(), 6);
    assert!(started.elapsed() >= poll_interval * (auth_calls - 1));
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown_signal() {
    let client = FakeMarketplace::with_item("nike", "42", item("42", "Deutschland", 1));
    let mut monitor = monitor(
        client,
        MemoryStore::default(),
        RecordingNotifier::default(),
        config(&["nike"]),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::join!(monitor.run(shutdown_rx), async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown_tx.send(true).unwrap();
    });

    assert_eq!(monitor.state(), &MonitorState::Sleeping);
    assert!(monitor.client().searched().len() >= 3);
    assert_eq!(monitor.notifier().sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_json_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("products.json");

    let client = FakeMarketplace::with_item("nike", "42", item("42", "Deutschland", 1));
    let ledger = JsonLedger::open(&path).await.unwrap();
    let mut first = monitor(client, ledger, RecordingNotifier::default(), config(&["nike"]));
    first_cycle(&mut first).await;
    assert_eq!(first.notifier().sent().len(), 1);

    let client = FakeMarketplace::with_item("nike", "42", item("42", "Deutschland", 1));
    let ledger = JsonLedger::open(&path).await.unwrap();
    let mut second = monitor(client, ledger, RecordingNotifier::default(), config(&["nike"]));
    first_cycle(&mut second).await;

    assert!(second.notifier().sent().is_empty());
    assert!(second.client().detail_calls().is_empty());
}
