use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::posts::domain::{PostDraft, PostRecord};

pub const POSTS_PATH: &str = "/api/posts";

/// Classified outcome of a failed remote write. Every failure maps to exactly one variant.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The endpoint could not be reached at all. Only this class triggers the local fallback.
    #[error("could not reach {endpoint}: {reason}")]
    Connectivity { endpoint: String, reason: String },

    /// The endpoint answered with a non-success status.
    #[error("server rejected the post ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Success status, but the body is not a post. The write may have landed.
    #[error("unreadable response from server: {0}")]
    Malformed(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl RemoteError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RemoteError::Connectivity { .. })
    }
}

/// Performs a single network write of a draft.
#[async_trait]
pub trait RemoteWriteClient: Send + Sync {
    async fn create(&self, draft: &PostDraft) -> Result<PostRecord, RemoteError>;
}

/// Environment "is online" signal. Only used to classify otherwise ambiguous transport failures.
pub trait ConnectivityHint: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Hint for environments with no network status source.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeOnline;

impl ConnectivityHint for AssumeOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Switchable hint, flipped by whatever watches the network.
#[derive(Debug)]
pub struct OnlineFlag(AtomicBool);

impl OnlineFlag {
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityHint for OnlineFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `RemoteWriteClient` over HTTP: `POST {base_url}/api/posts`.
pub struct HttpRemoteClient {
    client: reqwest::Client,
    endpoint: String,
    hint: Arc<dyn ConnectivityHint>,
}

impl HttpRemoteClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoteError::Other(e.to_string()))?;

        Ok(Self::with_client(client, &config.url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), POSTS_PATH),
            hint: Arc::new(AssumeOnline),
        }
    }

    pub fn with_hint(mut self, hint: Arc<dyn ConnectivityHint>) -> Self {
        self.hint = hint;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteWriteClient for HttpRemoteClient {
    async fn create(&self, draft: &PostDraft) -> Result<PostRecord, RemoteError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(draft)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &self.endpoint, self.hint.as_ref()))?;

        let status = response.status();
        let body = response.text().await;

        if !status.is_success() {
            let body = body.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: rejection_message(status, &body),
            });
        }

        let body = body.map_err(|e| RemoteError::Malformed(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| RemoteError::Malformed(e.to_string()))
    }
}

/// Map a transport error to its class using the error's structure, never its text.
pub fn classify_transport_error(
    err: &reqwest::Error,
    endpoint: &str,
    hint: &dyn ConnectivityHint,
) -> RemoteError {
    if err.is_connect() || err.is_timeout() || !hint.is_online() {
        RemoteError::Connectivity {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    } else {
        RemoteError::Other(err.to_string())
    }
}

/// Pick a displayable message out of a rejection body.
pub fn rejection_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(|m| m.as_str()) {
                return message.to_string();
            }
        }
    }

    let text = body.trim();
    if !text.is_empty() {
        return text.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("Unknown status")
        .to_string()
}
