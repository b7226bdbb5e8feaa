//! Maps raw Vinted payloads onto [`Listing`].
//!
//! All coercion and defaulting happens here in one pass. The only hard
//! requirements are an `item` object and an identifier inside it; every other
//! field degrades to a default when it is missing or has the wrong shape.

use monitor_core::{Listing, Photo, UNKNOWN};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidListing {
    #[error("payload has no `item` object")]
    MissingItem,

    #[error("item has no usable identifier")]
    MissingId,
}

/// Normalize an item-details payload (`{"item": {...}}`).
pub fn normalize(raw: &Value) -> Result<Listing, InvalidListing> {
    let item = raw
        .get("item")
        .and_then(Value::as_object)
        .ok_or(InvalidListing::MissingItem)?;

    let id = item
        .get("id")
        .and_then(coerce_id)
        .ok_or(InvalidListing::MissingId)?;

    let user = item.get("user").and_then(Value::as_object);
    let brand_dto = item.get("brand_dto").and_then(Value::as_object);

    let brand = brand_dto
        .and_then(|brand| text(brand, "title"))
        .or_else(|| text(item, "brand_title"))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let country = user
        .and_then(|user| {
            text(user, "country_title_local").or_else(|| text(user, "country_title"))
        })
        .unwrap_or_else(|| UNKNOWN.to_string());

    Ok(Listing {
        id,
        title: text(item, "title").unwrap_or_default(),
        price: item.get("price").map(coerce_price).unwrap_or_default(),
        url: text(item, "url").unwrap_or_default(),
        description: text(item, "description").unwrap_or_default(),
        photos: photos(item),
        size_title: text(item, "size_title").unwrap_or_else(|| UNKNOWN.to_string()),
        total_reviews: user
            .and_then(|user| user.get("feedback_count"))
            .and_then(coerce_u64)
            .unwrap_or(0),
        feedback_reputation: user
            .and_then(|user| user.get("feedback_reputation"))
            .and_then(coerce_f64)
            .map(|score| score.clamp(0.0, 1.0))
            .unwrap_or(0.0),
        brand,
        condition: text(item, "status").unwrap_or_else(|| UNKNOWN.to_string()),
        country,
    })
}

/// Identifier of a search-result summary, if it carries one.
pub fn candidate_id(summary: &Value) -> Option<String> {
    summary.get("id").and_then(coerce_id)
}

fn coerce_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => n
            .as_u64()
            .map(|id| id.to_string())
            .or_else(|| n.as_i64().map(|id| id.to_string())),
        _ => None,
    }
}

/// Non-empty string field, trimmed.
fn text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn coerce_price(value: &Value) -> Decimal {
    let amount = match value {
        Value::Object(price) => price.get("amount").and_then(coerce_decimal),
        other => coerce_decimal(other),
    };
    amount.unwrap_or_default().max(Decimal::ZERO)
}

fn coerce_decimal(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().replace(',', "."),
        _ => return None,
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn photos(item: &Map<String, Value>) -> Vec<Photo> {
    item.get("photos")
        .and_then(Value::as_array)
        .map(|photos| {
            photos
                .iter()
                .filter_map(Value::as_object)
                .map(|photo| Photo {
                    url: text(photo, "url").unwrap_or_default(),
                    full_size_url: text(photo, "full_size_url"),
                })
                .collect()
        })
        .unwrap_or_default()
}
