use monitor_core::{Listing, UNKNOWN};
use serde::Serialize;
use serde_json::{json, Value};

pub const MAX_EMBEDS: usize = 10;
pub const MAX_TITLE_CHARS: usize = 256;
pub const MAX_DESCRIPTION_CHARS: usize = 4096;
pub const MAX_FIELD_VALUE_CHARS: usize = 1024;

const FOOTER: &str = "Vinted Monitor";
const FALLBACK_FLAG: &str = "🏳️";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

impl Embed {
    fn field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let value = if value.trim().is_empty() {
            UNKNOWN.to_string()
        } else {
            truncate(&value, MAX_FIELD_VALUE_CHARS)
        };
        self.fields.push(EmbedField {
            name: name.to_string(),
            value,
            inline: true,
        });
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image.as_ref().map(|image| image.url.as_str())
    }
}

/// Link button rendered under the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub url: String,
}

/// Everything posted for one listing: the detail embed, extra photo embeds
/// and the link buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub embeds: Vec<Embed>,
    pub buttons: Vec<Button>,
}

impl RenderedMessage {
    /// Number of embeds carrying a photo.
    pub fn image_count(&self) -> usize {
        self.embeds
            .iter()
            .filter(|embed| embed.image.is_some())
            .count()
    }

    /// Body for `POST /channels/{id}/messages`.
    pub fn to_payload(&self) -> Value {
        let buttons: Vec<Value> = self
            .buttons
            .iter()
            .map(|button| {
                json!({
                    "type": 2,
                    "style": 5,
                    "label": button.label,
                    "url": button.url,
                })
            })
            .collect();

        let mut payload = json!({ "embeds": self.embeds });
        if !buttons.is_empty() {
            payload["components"] = json!([{ "type": 1, "components": buttons }]);
        }
        payload
    }
}

/// Render `listing` into a message with at most `max_images` photos.
/// `host` is the marketplace host used for the purchase and message links.
pub fn build_message(listing: &Listing, max_images: usize, host: &str) -> RenderedMessage {
    let item_url = Some(listing.url.clone()).filter(|url| !url.is_empty());

    let mut primary = Embed {
        title: Some(truncate(&listing.title, MAX_TITLE_CHARS)).filter(|t| !t.is_empty()),
        url: item_url.clone(),
        description: Some(truncate(&listing.description, MAX_DESCRIPTION_CHARS))
            .filter(|d| !d.is_empty()),
        ..Embed::default()
    };
    primary.field("Price", format!("{} €", listing.price));
    primary.field("Size", listing.size_title.as_str());
    primary.field("Brand", listing.brand.as_str());
    primary.field("Country", country_flag(&listing.country));
    primary.field(
        "User Rating",
        format!(
            "({}) of {}",
            format_rating(listing.star_rating()),
            listing.total_reviews
        ),
    );
    primary.field("Condition", listing.condition.as_str());
    primary.image = listing
        .primary_image()
        .map(|url| EmbedImage { url: url.to_string() });
    primary.footer = Some(EmbedFooter {
        text: FOOTER.to_string(),
    });

    let mut embeds = vec![primary];

    // Discord groups embeds sharing a url into one gallery
    let limit = max_images.min(MAX_EMBEDS);
    let extra = listing
        .photos
        .iter()
        .take(limit)
        .skip(1)
        .filter(|photo| !photo.url.is_empty())
        .map(|photo| Embed {
            url: item_url.clone(),
            image: Some(EmbedImage {
                url: photo.url.clone(),
            }),
            ..Embed::default()
        });
    embeds.extend(extra);

    RenderedMessage {
        embeds,
        buttons: buttons_for(listing, host),
    }
}

fn buttons_for(listing: &Listing, host: &str) -> Vec<Button> {
    let mut buttons = vec![
        Button {
            label: "Buy Now".to_string(),
            url: format!(
                "https://{}/transaction/buy/new?transaction%5Bitem_id%5D={}",
                host, listing.id
            ),
        },
        Button {
            label: "Send Message".to_string(),
            url: format!("https://{}/items/{}/want_it/new", host, listing.id),
        },
    ];
    if !listing.url.is_empty() {
        buttons.push(Button {
            label: "Open Product".to_string(),
            url: listing.url.clone(),
        });
    }
    buttons
}

/// Flag emoji for a seller country as the marketplace names it in German.
pub fn country_flag(country: &str) -> &'static str {
    match country {
        "Deutschland" => "🇩🇪",
        "Frankreich" => "🇫🇷",
        "Spanien" => "🇪🇸",
        "Italien" => "🇮🇹",
        "Österreich" => "🇦🇹",
        "Schweiz" => "🇨🇭",
        "Niederlande" => "🇳🇱",
        "Belgien" => "🇧🇪",
        "Portugal" => "🇵🇹",
        "Vereinigtes Königreich" => "🇬🇧",
        _ => FALLBACK_FLAG,
    }
}

/// Two decimal places, trailing zeros dropped, at least one decimal kept.
fn format_rating(stars: f64) -> String {
    let rounded = (stars * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{:.1}", rounded)
    } else {
        format!("{}", rounded)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
