//! Response shape and the error taxonomy of the webservice protocol.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::reqlog::LogEntry;

/// Success code as reported by the service.
pub const SUCCESS: i64 = 0;

// Client-local codes. The negative range is reserved for failures detected
// outside the requested service's own domain.
/// Route has no `/` separator; rejected before any network call.
pub const ROUTE_INVALID: i64 = -10;
/// Connection-level failure; no response was received.
pub const TRANSPORT_FAILURE: i64 = -11;
/// Response received but not parseable as the negotiated format.
pub const RESPONSE_CORRUPT: i64 = -12;
/// Response parsed but the mandatory `e` code field is absent.
pub const RESPONSE_MISSING_CODE: i64 = -13;

/// Fixed messages for protocol-level codes. −1..−4 are emitted by the remote
/// dispatcher itself; −10..−13 are detected locally around the exchange.
const CORE_MESSAGES: &[(i64, &str)] = &[
    (-1, "webservice route not specified"),
    (-2, "webservice route invalid"),
    (-3, "webservice route not found"),
    (-4, "validation key incorrect or missing required variable"),
    (ROUTE_INVALID, "invalid route"),
    (TRANSPORT_FAILURE, "webservice access error"),
    (RESPONSE_CORRUPT, "webservice response corrupted"),
    (RESPONSE_MISSING_CODE, "webservice response corrupted (missing \"e\")"),
];

/// Default message for a code: fixed strings for protocol codes, a generic
/// pointer for service-domain codes. Specializations overlay their own table
/// on top of this one for the domain codes they own.
pub fn core_message(code: i64) -> &'static str {
    if code == SUCCESS {
        return "request completed successfully";
    }
    CORE_MESSAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, m)| *m)
        .unwrap_or("service-specific error, consult the service reference material")
}

/// One element of a successful response's `evt` sequence.
///
/// A decode failure poisons that event only; the surrounding response stays
/// successful and the raw wire text is preserved for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
    /// Decoded event text (base64 and gzip framing removed).
    Text(String),
    /// Event exactly as received; compressed passthrough was requested.
    Compressed(String),
    /// This event could not be decoded.
    Corrupt { raw: String, reason: String },
}

impl Event {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Event::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Outcome of one webservice call. `code == 0` means success; negative codes
/// are protocol-level, positive codes belong to the requested service.
///
/// Every call produces one of these; transport and protocol failures are
/// reported through `code`, never as panics or `Err` at the call boundary.
#[derive(Debug, Clone, Serialize)]
pub struct WsResponse {
    pub code: i64,
    pub message: String,
    /// Per-item outcomes; populated only on success.
    pub events: Vec<Event>,
    /// Additional envelope fields, verbatim; populated only on success.
    pub extra: Map<String, Value>,
    /// Full progress log of the call that produced this response.
    pub log: Vec<LogEntry>,
}

impl WsResponse {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS
    }

    pub(crate) fn failure(code: i64, log: Vec<LogEntry>) -> Self {
        Self {
            code,
            message: core_message(code).to_string(),
            events: Vec::new(),
            extra: Map::new(),
            log,
        }
    }
}
