//! HTTP transport boundary.

use std::collections::BTreeMap;
use std::fmt;

/// Connection-level failure: DNS, refused connection, timeout. HTTP status
/// codes are NOT transport failures; any completed exchange yields bytes.
#[derive(Debug)]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// One synchronous form POST. Object-safe so tests can inject a capturing
/// mock; `Send + Sync` so a client can be moved behind a lock if callers
/// need to share it.
pub trait Transport: Send + Sync {
    fn post_form(
        &self,
        url: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, TransportError>;
}

/// Blocking reqwest transport: a single `application/x-www-form-urlencoded`
/// POST per call, every field value percent-encoded (including the already
/// base64-encoded payload). No retries, no status-code branching.
pub struct HttpTransport {
    http: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn post_form(
        &self,
        url: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, TransportError> {
        let resp = self
            .http
            .post(url)
            .form(fields)
            .send()
            .map_err(|e| TransportError::new(format!("webservice post failed: {e}")))?;
        let body = resp
            .bytes()
            .map_err(|e| TransportError::new(format!("webservice body read failed: {e}")))?;
        Ok(body.to_vec())
    }
}
