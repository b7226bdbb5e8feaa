use crate::{open_store, JsonLedger, SeenStore, SqliteLedger};
use monitor_core::{CoreError, Listing, Photo, StorageBackend, StorageConfig, StorageError};
use rust_decimal_macros::dec;
use tempfile::tempdir;

fn listing(id: &str, title: &str) -> Listing {
    Listing {
        id: id.to_string(),
        title: title.to_string(),
        price: dec!(12.50),
        url: format!("https://www.vinted.de/items/{}", id),
        description: "Barely worn".to_string(),
        photos: vec![Photo {
            url: "https://images.example/1.jpg".to_string(),
            full_size_url: None,
        }],
        size_title: "M".to_string(),
        total_reviews: 3,
        feedback_reputation: 1.0,
        brand: "Ralph Lauren".to_string(),
        condition: "Very good".to_string(),
        country: "Deutschland".to_string(),
    }
}

#[tokio::test]
async fn test_json_ledger_records_and_reopens() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("products.json");

    let mut ledger = JsonLedger::open(&path).await.unwrap();
    assert!(ledger.is_empty());
    assert!(!ledger.is_seen("42"));

    ledger.record(&listing("42", "Polo")).await.unwrap();
    assert!(ledger.is_seen("42"));
    assert_eq!(ledger.get("42").unwrap().data.title, "Polo");

    let reopened = JsonLedger::open(&path).await.unwrap();
    assert!(reopened.is_seen("42"));
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.get("42").unwrap().data.price, dec!(12.50));
}

#[tokio::test]
async fn test_json_ledger_record_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("products.json");
    let mut ledger = JsonLedger::open(&path).await.unwrap();

    ledger.record(&listing("42", "Polo")).await.unwrap();
    let first_seen = ledger.get("42").unwrap().timestamp;
    ledger.record(&listing("42", "Polo shirt")).await.unwrap();

    assert_eq!(ledger.len(), 1);
    let record = ledger.get("42").unwrap();
    assert_eq!(record.data.title, "Polo shirt");
    assert_eq!(record.timestamp, first_seen);
}

#[tokio::test]
async fn test_json_ledger_reads_legacy_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("products.json");
    std::fs::write(
        &path,
        r#"{
            "7": {
                "data": {"id": "7", "title": "Jacket", "price": 30.0, "url": "", "photos": []},
                "timestamp": "2024-05-01T12:30:00.123456"
            },
            "8": {"data": "not a listing", "timestamp": "yesterday"}
        }"#,
    )
    .unwrap();

    let ledger = JsonLedger::open(&path).await.unwrap();
    assert!(ledger.is_seen("7"));
    // Unreadable payloads still count as seen
    assert!(ledger.is_seen("8"));
    assert!(ledger.get("8").is_none());

    let record = ledger.get("7").unwrap();
    assert_eq!(record.data.title, "Jacket");
    assert_eq!(record.data.brand, "Unknown");
}

#[tokio::test]
async fn test_json_ledger_rejects_corrupt_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("products.json");
    std::fs::write(&path, "{\"42\": {\"data\":").unwrap();

    let result = JsonLedger::open(&path).await;
    assert!(matches!(
        result,
        Err(CoreError::Storage(StorageError::CorruptLedger { .. }))
    ));

    std::fs::write(&path, "[1, 2, 3]").unwrap();
    assert!(JsonLedger::open(&path).await.is_err());
}

#[tokio::test]
async fn test_json_ledger_empty_file_starts_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("products.json");
    std::fs::write(&path, "\n").unwrap();

    let ledger = JsonLedger::open(&path).await.unwrap();
    assert_eq!(ledger.len(), 0);
}

#[tokio::test]
async fn test_json_ledger_failed_write_leaves_state_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing-dir").join("products.json");

    let mut ledger = JsonLedger::open(&path).await.unwrap();
    let result = ledger.record(&listing("42", "Polo")).await;

    assert!(matches!(result, Err(CoreError::Storage(_))));
    assert!(!ledger.is_seen("42"));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_sqlite_ledger_records_and_reopens() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seen.db");
    let location = path.to_str().unwrap();

    let mut ledger = SqliteLedger::open(location).await.unwrap();
    assert!(!ledger.is_seen("42"));
    ledger.record(&listing("42", "Polo")).await.unwrap();
    ledger.record(&listing("43", "Cap")).await.unwrap();
    assert!(ledger.is_seen("42"));
    ledger.close().await;

    let reopened = SqliteLedger::open(location).await.unwrap();
    assert_eq!(reopened.len(), 2);
    assert!(reopened.is_seen("43"));
    assert_eq!(reopened.get("42").unwrap().data.title, "Polo");
}

#[tokio::test]
async fn test_sqlite_ledger_keeps_first_seen() {
    let dir = tempdir().unwrap();
    let location = format!("sqlite://{}", dir.path().join("seen.db").display());

    let mut ledger = SqliteLedger::open(&location).await.unwrap();
    ledger.record(&listing("42", "Polo")).await.unwrap();
    let first_seen = ledger.get("42").unwrap().timestamp;

    ledger.record(&listing("42", "Polo shirt")).await.unwrap();
    let record = ledger.get("42").unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(record.data.title, "Polo shirt");
    assert_eq!(record.timestamp, first_seen);
}

#[tokio::test]
async fn test_open_store_selects_backend() {
    let dir = tempdir().unwrap();

    let config = StorageConfig {
        backend: StorageBackend::Json,
        path: dir.path().join("products.json").display().to_string(),
    };
    let mut store = open_store(&config).await.unwrap();
    store.record(&listing("1", "Scarf")).await.unwrap();
    assert!(store.is_seen("1"));

    let config = StorageConfig {
        backend: StorageBackend::Sqlite,
        path: dir.path().join("seen.db").display().to_string(),
    };
    let store = open_store(&config).await.unwrap();
    assert!(store.is_empty());
}
