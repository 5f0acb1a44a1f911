//! Data models for TheBox channel player

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque channel identifier handed over by navigation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Descriptive channel data shown next to the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub epg_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChannelMetadata {
    /// Tags shown under the channel name (category, language, country)
    pub fn tags(&self) -> Vec<&str> {
        let mut tags = Vec::with_capacity(3);
        if let Some(category) = self.category.as_deref() {
            tags.push(category);
        }
        if let Some(language) = self.language.as_deref() {
            tags.push(language);
        }
        if !self.country_code.is_empty() {
            tags.push(self.country_code.as_str());
        }
        tags
    }

    pub fn description(&self) -> String {
        format!("{} is a television channel available on TheBox.", self.name)
    }

    /// Last update as a local calendar date
    pub fn last_updated_label(&self) -> String {
        match self.updated_at {
            Some(ts) => ts.with_timezone(&Local).format("%Y-%m-%d").to_string(),
            None => "Unknown".to_string(),
        }
    }
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.fff]` (taken as UTC)
/// or epoch milliseconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
    }

    let raw: Option<Raw> = Option::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(Raw::Millis(ms)) => Utc.timestamp_millis_opt(ms).single(),
        Some(Raw::Text(text)) => parse_timestamp(&text),
    })
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Playable location resolved for one channel
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub channel_id: ChannelId,
    pub stream_url: String,
}

impl StreamDescriptor {
    /// URL to hand to the session, `None` when the server returned a blank one
    pub fn playable_url(&self) -> Option<&str> {
        let url = self.stream_url.trim();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }
}

/// Player status shown by the status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    #[default]
    Loading,
    Playing,
    Error,
    Unavailable,
}

impl PlayerStatus {
    /// `Error` and `Unavailable` are only left by starting a new session
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerStatus::Error | PlayerStatus::Unavailable)
    }

    pub fn status_text(&self) -> &'static str {
        match self {
            PlayerStatus::Playing => "Live",
            PlayerStatus::Loading => "Loading...",
            PlayerStatus::Error | PlayerStatus::Unavailable => "Unavailable",
        }
    }
}

/// Failure categories surfaced to the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The stream lookup failed and nothing played before the watchdog fired
    StreamResolution,
    /// Fatal error reported by the streaming engine
    EngineFatal { network: bool },
    /// Neither a streaming engine nor native playback is available
    Unsupported,
    /// Watchdog fired before the stream became ready
    Timeout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub details: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(
            ErrorKind::Timeout,
            "Stream failed to load within the time limit.",
        )
    }

    pub fn stream_resolution(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::StreamResolution, details)
    }

    pub fn unsupported(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, details)
    }

    pub fn engine_fatal(network: bool, details: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineFatal { network }, details)
    }
}

/// Human-readable reason for a failed player.
///
/// A missing stream URL takes precedence over whatever detail was recorded.
pub fn error_message(has_stream_url: bool, detail: Option<&ErrorDetail>) -> String {
    if !has_stream_url {
        return "The stream URL is not available.".to_string();
    }
    match detail {
        Some(ErrorDetail {
            kind: ErrorKind::EngineFatal { network: true },
            details,
        }) => format!("Network Error: {}", details),
        Some(ErrorDetail {
            kind: ErrorKind::EngineFatal { network: false },
            details,
        }) => format!("Stream Error: {}", details),
        Some(ErrorDetail {
            kind: ErrorKind::Unsupported,
            ..
        }) => "Adaptive streaming is not supported on this platform.".to_string(),
        Some(ErrorDetail {
            kind: ErrorKind::Timeout,
            details,
        }) => details.clone(),
        Some(ErrorDetail {
            kind: ErrorKind::StreamResolution,
            details,
        }) => format!("The stream could not be resolved: {}", details),
        _ => "An unknown error occurred. Try again later.".to_string(),
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
