//! Catalog API client used to resolve channels for playback

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::models::{ChannelId, ChannelMetadata, StreamDescriptor};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("Channel not found")]
    NotFound,
    #[error("Stream is unavailable")]
    Unavailable,
    #[error("Network error: {0}")]
    Network(String),
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("Invalid response: {0}")]
    Decode(String),
}

/// The two lookups the player needs for a channel.
///
/// Calls block; the controller runs them off the UI thread.
pub trait ChannelResolver: Send + Sync {
    fn get_channel(&self, id: &ChannelId) -> Result<ChannelMetadata, ResolveError>;
    fn get_channel_stream(&self, id: &ChannelId) -> Result<StreamDescriptor, ResolveError>;
}

pub struct ApiClient {
    base_url: String,
    user_agent: String,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: format!("thebox_player/{}", env!("CARGO_PKG_VERSION")),
            agent,
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        if !user_agent.is_empty() {
            self.user_agent = user_agent.to_string();
        }
        self
    }

    fn channel_url(&self, id: &ChannelId) -> String {
        format!("{}/iptv/channels/{}", self.base_url, urlencoding::encode(id.as_str()))
    }

    fn stream_url(&self, id: &ChannelId) -> String {
        format!("{}/stream", self.channel_url(id))
    }

    /// GET returning (status, body). Only transport failures are errors here.
    fn get(&self, url: &str) -> Result<(u16, String), ResolveError> {
        debug!(url, "GET");
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json")
            .call()
            .map_err(|e| match e {
                ureq::Error::Timeout(_) => ResolveError::Network("No response from server".to_string()),
                other => ResolveError::Network(other.to_string()),
            })?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ResolveError::Network(format!("Read failed: {}", e)))?;
        Ok((status, body))
    }
}

impl ChannelResolver for ApiClient {
    fn get_channel(&self, id: &ChannelId) -> Result<ChannelMetadata, ResolveError> {
        let (status, body) = self.get(&self.channel_url(id))?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body, false));
        }
        decode_channel(&body)
    }

    fn get_channel_stream(&self, id: &ChannelId) -> Result<StreamDescriptor, ResolveError> {
        let (status, body) = self.get(&self.stream_url(id))?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body, true));
        }
        decode_stream(id, &body)
    }
}

pub fn decode_channel(body: &str) -> Result<ChannelMetadata, ResolveError> {
    serde_json::from_str(body).map_err(|e| ResolveError::Decode(e.to_string()))
}

/// The stream endpoint answers either with a bare JSON string or with
/// `{"streamUrl": "..."}`.
pub fn decode_stream(id: &ChannelId, body: &str) -> Result<StreamDescriptor, ResolveError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StreamPayload {
        Bare(String),
        Object {
            #[serde(rename = "streamUrl", default)]
            stream_url: Option<String>,
        },
    }

    let payload: StreamPayload =
        serde_json::from_str(body).map_err(|e| ResolveError::Decode(e.to_string()))?;
    let stream_url = match payload {
        StreamPayload::Bare(url) => url,
        StreamPayload::Object { stream_url } => stream_url.unwrap_or_default(),
    };

    Ok(StreamDescriptor {
        channel_id: id.clone(),
        stream_url,
    })
}

/// Map a non-success HTTP status onto the resolver error taxonomy.
pub fn classify_status(status: u16, body: &str, stream_call: bool) -> ResolveError {
    match status {
        404 => ResolveError::NotFound,
        410 | 503 if stream_call => ResolveError::Unavailable,
        _ => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("HTTP {}", status));
            ResolveError::Http { status, message }
        }
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
