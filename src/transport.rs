//! HTTP transport primitive shared by the Ollama and envelope clients.
//!
//! One call, one JSON body in, one decoded JSON body out. Non-2xx statuses
//! and connection failures are reported as distinct [`TransportError`]
//! variants so callers can wrap them in their own operation-level errors.
//! There is no retry logic here.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client as HttpClient, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout. Applies to the connect phase only; long-running
/// streams are never cut off by the transport.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors produced by a single HTTP exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (DNS, refused, reset, ...).
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// A 2xx body that is not the JSON we expected.
    #[error("failed to decode response body: {reason}")]
    Decode { reason: String },
}

impl TransportError {
    /// HTTP status code, if the server responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ─── HttpTransport ───────────────────────────────────────────────────────────

/// Thin wrapper over a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Network {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }

    /// Perform a request and decode the 2xx body as `T`.
    pub async fn request_json<T, B>(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<&B>,
    ) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(method, url, headers, body).await?;
        response.json::<T>().await.map_err(|e| TransportError::Decode {
            reason: e.to_string(),
        })
    }

    /// POST a JSON body and hand back the raw response for incremental
    /// consumption. Status is checked before returning.
    pub async fn open_stream<B>(&self, url: &str, body: &B) -> Result<Response, TransportError>
    where
        B: Serialize + ?Sized,
    {
        self.send(Method::POST, url, HeaderMap::new(), Some(body))
            .await
    }

    async fn send<B>(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<&B>,
    ) -> Result<Response, TransportError>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| TransportError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
