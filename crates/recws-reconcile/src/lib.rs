//! recws-reconcile
//!
//! Reconciliation specialization of the webservice client: fixes the
//! reconciliation route, normalizes the sale/payment kind and the document
//! format, builds the auth context from the request text, and overlays the
//! reconciliation service's own error messages on the core result.

use std::collections::BTreeMap;

use recws_core::response::WsResponse;
use recws_core::transport::Transport;
use recws_core::{codec, WebserviceClient};

/// Remote route handling card reconciliation (fixed by the service).
pub const RECONCILIATION_ROUTE: &str = "vdk-cartoes/conciliacao";

/// Characters taken from each end of the request text for the auth context.
const CONTEXT_SPAN: usize = 32;

/// Messages for the reconciliation service's own codes. Codes outside this
/// table keep the core's message.
const RECONCILE_MESSAGES: &[(i64, &str)] = &[
    (1, "failed to connect to the database"),
    (2, "error in the request text"),
    (3, "error in the request header"),
    (4, "error in the request header"),
    (5, "establishment not found"),
    (6, "no acquirer information in the period"),
    (7, "no records in the request"),
    (8, "client not found"),
];

/// Sale-or-payment request kind (the `t` wire field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Sale,
    Payment,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Sale => "v",
            Kind::Payment => "p",
        }
    }

    /// Silent-default normalization: only a case-insensitive `"p"` selects
    /// payments, every other input falls back to sales. The service's
    /// existing callers rely on the fallback, so it is not a validation
    /// error.
    pub fn normalize(input: &str) -> Self {
        if input.eq_ignore_ascii_case("p") {
            Kind::Payment
        } else {
            Kind::Sale
        }
    }
}

/// Document format negotiated for both the request text and the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
        }
    }

    /// Anything that is not case-insensitively `"xml"` negotiates JSON.
    pub fn normalize(input: &str) -> Self {
        if input.eq_ignore_ascii_case("xml") {
            Format::Xml
        } else {
            Format::Json
        }
    }
}

/// Client for the card-reconciliation service.
///
/// Thin wrapper over [`WebserviceClient`]: one route, a fixed field layout
/// (`t`, `c`, `compreq`, `req`, `forreq`, `forresp`) and the domain error
/// table. The request text is always shipped compressed.
pub struct ReconciliationClient {
    ws: WebserviceClient,
    user: String,
}

impl ReconciliationClient {
    /// Creates a reconciliation client for the webservice at `base_url`,
    /// authenticating as caller `user`.
    pub fn new(base_url: impl Into<String>, user: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            ws: WebserviceClient::new(base_url, user.clone()),
            user,
        }
    }

    /// Same as [`ReconciliationClient::new`] but over an injected transport.
    pub fn with_transport(
        base_url: impl Into<String>,
        user: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        let user = user.into();
        Self {
            ws: WebserviceClient::with_transport(base_url, user.clone(), transport),
            user,
        }
    }

    /// Requests reconciliation of sale or payment records.
    ///
    /// `text` is the request document in `format` (`"json"` or `"xml"`),
    /// `secret` the caller's key and `client_id` the establishment
    /// identifier. On success `events[0]` carries the reconciliation result
    /// document; its interpretation is entirely the caller's.
    pub fn request(
        &mut self,
        text: &str,
        secret: &str,
        client_id: &str,
        kind: &str,
        format: &str,
    ) -> WsResponse {
        let kind = Kind::normalize(kind);
        let format = Format::normalize(format);
        let context = auth_context(&self.user, text);

        let mut fields = BTreeMap::new();
        fields.insert("t".to_string(), kind.as_str().to_string());
        fields.insert("c".to_string(), client_id.to_string());
        // The payload always travels compressed; `compreq` announces that.
        fields.insert("compreq".to_string(), "s".to_string());
        // Gzip into an in-memory buffer cannot fail.
        fields.insert(
            "req".to_string(),
            codec::compress_payload(text.as_bytes()).unwrap_or_default(),
        );
        fields.insert("forreq".to_string(), format.as_str().to_string());
        fields.insert("forresp".to_string(), format.as_str().to_string());

        let mut resp = self
            .ws
            .request(RECONCILIATION_ROUTE, secret, &context, fields, false);
        overlay_message(&mut resp);
        resp
    }

    /// Progress log of the most recent request, one rendered line per entry.
    pub fn rec_log(&self) -> Vec<String> {
        self.ws.rec_log()
    }
}

/// Auth context: caller identity plus the first and the last
/// [`CONTEXT_SPAN`] characters of the request text. Texts shorter than the
/// span contribute themselves twice (head and tail overlap in full) — that
/// duplication is part of the service's reference derivation. Char-based so
/// multi-byte text never splits a code point.
fn auth_context(user: &str, text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let head: String = chars.iter().take(CONTEXT_SPAN).collect();
    let tail: String = chars[chars.len().saturating_sub(CONTEXT_SPAN)..]
        .iter()
        .collect();

    let mut out = String::with_capacity(user.len() + head.len() + tail.len());
    out.push_str(user);
    out.push_str(&head);
    out.push_str(&tail);
    out
}

/// Replaces the message for codes owned by the reconciliation service;
/// everything else keeps the core's message.
fn overlay_message(resp: &mut WsResponse) {
    if let Some((_, msg)) = RECONCILE_MESSAGES.iter().find(|(c, _)| *c == resp.code) {
        resp.message = (*msg).to_string();
    }
}
