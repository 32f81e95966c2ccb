use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{cmp::Ordering, fmt};
use tracing::warn;

pub const DEFAULT_REDIRECT_URL: &str = "https://www.google.com";
pub const DEFAULT_REMINDER_MESSAGE: &str =
    "Before you start scrolling, think about your goals and stick to the plan.";

/// Host-assigned browser tab identifier.
pub type TabId = i64;

/// Opaque site identifier. The options page may persist ids as numbers or
/// strings; the stored representation is kept so comparisons stay strict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SiteId {
    Number(i64),
    Text(String),
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteId::Number(id) => write!(f, "{id}"),
            SiteId::Text(id) => f.write_str(id),
        }
    }
}

impl From<&str> for SiteId {
    fn from(value: &str) -> Self {
        SiteId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedSite {
    pub id: SiteId,
    #[serde(default)]
    pub name: String,
    /// Delimiter-separated match substrings.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub remaining_time: i64,
    #[serde(default)]
    pub total_time: u64,
    #[serde(default)]
    pub daily_total_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reset_date: Option<String>,
    /// Fields owned by the options page that the tracker never touches.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrackedSite {
    pub fn new(id: impl Into<SiteId>, name: &str, url: &str, remaining_time: i64) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            url: url.to_string(),
            enabled: true,
            remaining_time,
            total_time: 0,
            daily_total_time: 0,
            last_reset_date: None,
            extra: Map::new(),
        }
    }

    /// Zeroes the daily counter when `date_key` differs from the last reset.
    /// Returns whether a reset happened.
    pub fn reset_daily_if_stale(&mut self, date_key: &str) -> bool {
        if self.last_reset_date.as_deref() == Some(date_key) {
            return false;
        }
        self.daily_total_time = 0;
        self.last_reset_date = Some(date_key.to_string());
        true
    }

    /// Spends one second of budget. No-op once the budget is exhausted.
    pub fn charge_second(&mut self) -> bool {
        if self.remaining_time <= 0 {
            return false;
        }
        self.remaining_time -= 1;
        self.total_time = self.total_time.saturating_add(1);
        self.daily_total_time = self.daily_total_time.saturating_add(1);
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_time <= 0
    }
}

/// Everything persisted in the budget store.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreData {
    #[serde(default, deserialize_with = "normalize_websites")]
    pub websites: Vec<TrackedSite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub reminder_message: Option<String>,
}

impl StoreData {
    pub fn site(&self, id: &SiteId) -> Option<&TrackedSite> {
        self.websites.iter().find(|site| &site.id == id)
    }

    pub fn site_mut(&mut self, id: &SiteId) -> Option<&mut TrackedSite> {
        self.websites.iter_mut().find(|site| &site.id == id)
    }

    pub fn redirect_target(&self) -> &str {
        self.redirect_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(DEFAULT_REDIRECT_URL)
    }

    pub fn reminder_text(&self) -> &str {
        self.reminder_message
            .as_deref()
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(DEFAULT_REMINDER_MESSAGE)
    }

    /// Fills in absent keys. Returns whether anything changed.
    pub fn apply_defaults(&mut self) -> bool {
        let mut changed = false;
        if self.redirect_url.is_none() {
            self.redirect_url = Some(DEFAULT_REDIRECT_URL.to_string());
            changed = true;
        }
        if self.reminder_message.is_none() {
            self.reminder_message = Some(DEFAULT_REMINDER_MESSAGE.to_string());
            changed = true;
        }
        changed
    }
}

/// Accepts the site list as a sequence or as a keyed object (`{"0": {...}}`),
/// always yielding a sequence.
fn normalize_websites<'de, D>(deserializer: D) -> Result<Vec<TrackedSite>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => {
            warn!("websites stored as an object, normalizing to a list");
            let mut keyed: Vec<(String, Value)> = map.into_iter().collect();
            keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b));
            keyed.into_iter().map(|(_, site)| site).collect()
        }
        Some(other) => {
            return Err(D::Error::custom(format!(
                "websites must be a list or object, got {other}"
            )));
        }
    };

    entries
        .into_iter()
        .map(|site| serde_json::from_value(site).map_err(D::Error::custom))
        .collect()
}

fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        _ => None,
    })
}

/// Messages the tracker receives from pages and from the options page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerMessage {
    #[serde(rename_all = "camelCase")]
    StartTracking { site_id: SiteId, url: String },
    #[serde(rename_all = "camelCase")]
    UpdateTimer { site_id: SiteId, remaining_time: i64 },
    RedirectFromReminder,
}

/// Messages the tracker delivers to a page document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    #[serde(rename_all = "camelCase")]
    UpdateCountdown { site_id: SiteId, remaining_time: i64 },
    #[serde(rename_all = "camelCase")]
    ShowReminder { message: String, site_name: String },
    Redirect { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingRecord {
    pub site_id: SiteId,
    pub url: String,
}

/// Body of a host tab-activation event.
#[derive(Debug, Deserialize, Default)]
pub struct TabActivatedRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Body of a host tab-update event. Only `status == "complete"` counts as loaded.
#[derive(Debug, Deserialize)]
pub struct TabUpdatedRequest {
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
}
