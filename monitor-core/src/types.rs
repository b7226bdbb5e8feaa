use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder for descriptive fields the marketplace did not provide.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_size_url: Option<String>,
}

/// A normalized marketplace item. Built once by the normalizer and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default = "unknown")]
    pub size_title: String,
    #[serde(default)]
    pub total_reviews: u64,
    #[serde(default)]
    pub feedback_reputation: f64,
    #[serde(default = "unknown")]
    pub brand: String,
    #[serde(default = "unknown")]
    pub condition: String,
    #[serde(default = "unknown")]
    pub country: String,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

impl Listing {
    /// URL of the first photo, if it has one.
    pub fn primary_image(&self) -> Option<&str> {
        self.photos
            .first()
            .map(|photo| photo.url.as_str())
            .filter(|url| !url.is_empty())
    }

    /// Seller rating on the 1..=5 star scale shown to users.
    pub fn star_rating(&self) -> f64 {
        1.0 + 4.0 * self.feedback_reputation
    }
}

/// Ledger entry for a listing that has been judged new.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenRecord {
    pub data: Listing,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl SeenRecord {
    pub fn new(listing: Listing) -> Self {
        Self {
            data: listing,
            timestamp: Utc::now(),
        }
    }
}

/// Accepts RFC 3339 timestamps as well as naive ISO-8601 ones (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
