//! Remote store capability.
//!
//! The engine only sees the [`RemoteStore`] trait; production wiring injects
//! [`HttpRemote`], tests inject an in-memory double. The remote namespaces
//! data by the opaque user id supplied by the external identity provider —
//! credentials themselves are never handled here beyond forwarding a token.

use std::time::Duration;

use api_types::{PullRequest, PullResponse, PushRequest, PushResponse};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

/// Failure talking to the remote store.
///
/// Retryable failures feed the backoff loop; the rest abort the cycle.
#[derive(Debug)]
pub enum RemoteError {
    Timeout,
    Transport(String),
    /// Non-2xx response: `(status, message)`.
    Status(u16, String),
    Decode(String),
}

impl RemoteError {
    /// Timeouts, transport failures and server-side errors are worth
    /// retrying; client-side rejections and decode failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status(code, _) => *code >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "remote call timed out"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Status(code, msg) => write!(f, "remote returned {code}: {msg}"),
            Self::Decode(msg) => write!(f, "invalid remote response: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Pushes journaled changes oldest-first; the response names the
    /// sequence numbers made durable remotely.
    async fn push(&self, request: PushRequest) -> Result<PushResponse, RemoteError>;

    /// Pulls the remote change stream from a cursor (exclusive).
    async fn pull(&self, request: PullRequest) -> Result<PullResponse, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// HTTP client for the remote store.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    base_url: Url,
    token: String,
    http: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| RemoteError::Transport(format!("invalid base_url: {err}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(Self {
            base_url,
            token: token.to_string(),
            http,
        })
    }

    async fn post_json<Req, Resp>(&self, path: &str, payload: &Req) -> Result<Resp, RemoteError>
    where
        Req: serde::Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|err| RemoteError::Transport(format!("invalid base_url: {err}")))?;

        let res = self
            .http
            .post(endpoint)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RemoteError::Timeout
                } else {
                    RemoteError::Transport(err.to_string())
                }
            })?;

        if res.status().is_success() {
            return res
                .json::<Resp>()
                .await
                .map_err(|err| RemoteError::Decode(err.to_string()));
        }

        let status = res.status();
        let body = res
            .json::<ErrorResponse>()
            .await
            .map(|err| err.error)
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(RemoteError::Status(status.as_u16(), body))
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn push(&self, request: PushRequest) -> Result<PushResponse, RemoteError> {
        self.post_json("sync/push", &request).await
    }

    async fn pull(&self, request: PullRequest) -> Result<PullResponse, RemoteError> {
        self.post_json("sync/pull", &request).await
    }
}
