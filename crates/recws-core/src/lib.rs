//! recws-core
//!
//! Generic client for the reconciliation provider's webservices: builds an
//! authenticated form POST, ships a gzip+base64 payload, validates the JSON
//! envelope of the response and maps protocol failures to stable error codes.
//!
//! This crate owns everything route-agnostic. The reconciliation
//! specialization (fixed route, domain error table) lives in
//! `recws-reconcile`.

pub mod auth;
pub mod codec;
pub mod reqlog;
pub mod response;
pub mod transport;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::reqlog::{LogEntry, RequestLog};
use crate::response::{
    Event, WsResponse, RESPONSE_CORRUPT, RESPONSE_MISSING_CODE, ROUTE_INVALID, SUCCESS,
    TRANSPORT_FAILURE,
};
use crate::transport::{HttpTransport, Transport};

/// Client for one webservice endpoint. Base URL and caller identity are
/// fixed at construction; the instance is reused across sequential calls.
///
/// `request` takes `&mut self` because the most recent call's log is retained
/// for [`WebserviceClient::rec_log`]; sharing an instance across threads
/// therefore requires external synchronization, which the borrow checker
/// enforces instead of leaving it as a data race.
pub struct WebserviceClient {
    base_url: String,
    user: String,
    transport: Box<dyn Transport>,
    last_log: Vec<LogEntry>,
}

impl WebserviceClient {
    /// Creates a client speaking HTTP to `base_url` as caller `user`.
    pub fn new(base_url: impl Into<String>, user: impl Into<String>) -> Self {
        Self::with_transport(base_url, user, Box::new(HttpTransport::new()))
    }

    /// Creates a client over an injected transport (tests, instrumentation).
    pub fn with_transport(
        base_url: impl Into<String>,
        user: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            user: user.into(),
            transport,
            last_log: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Progress log of the most recent `request` call, one rendered line per
    /// entry. Reflects only that call: the log is rebuilt from scratch at the
    /// start of every request.
    pub fn rec_log(&self) -> Vec<String> {
        self.last_log.iter().map(LogEntry::render).collect()
    }

    /// Performs one synchronous webservice call.
    ///
    /// `fields` carries the route-specific variables; `r` (route), `u`
    /// (caller) and `k` (derived access key) are filled in here, and a
    /// caller-supplied `fr` format override is dropped before transmission.
    /// With `events_compressed` the response events are handed back still in
    /// their base64+gzip wire form.
    ///
    /// Never fails outright: transport and protocol failures are reported
    /// through [`WsResponse::code`], and nothing is retried.
    pub fn request(
        &mut self,
        route: &str,
        secret: &str,
        context: &str,
        fields: BTreeMap<String, String>,
        events_compressed: bool,
    ) -> WsResponse {
        let mut log = RequestLog::new();
        log.push("request started");

        let outcome = self.exchange(route, secret, context, fields, &mut log);
        log.push("request finished");

        let response = match outcome {
            Ok(envelope) => finish(envelope, events_compressed, log),
            Err(code) => WsResponse::failure(code, log.into_entries()),
        };
        self.last_log = response.log.clone();
        response
    }

    /// Runs the exchange up to envelope validation. `Err` carries the
    /// protocol-level error code; `Ok` carries the parsed envelope, which is
    /// guaranteed to hold an integer `e` field.
    fn exchange(
        &self,
        route: &str,
        secret: &str,
        context: &str,
        mut fields: BTreeMap<String, String>,
        log: &mut RequestLog,
    ) -> Result<serde_json::Map<String, Value>, i64> {
        if !route.contains('/') {
            log.push(format!("the requested route ({route}) is invalid"));
            return Err(ROUTE_INVALID);
        }
        log.push(format!("route set to {route}"));

        let key = auth::derive_key(secret, context);
        // The service's reference client logs the derived key in cleartext
        // and operator tooling greps these lines; kept for parity even
        // though the key is request-scoped material.
        log.push(format!("access key set to {key}"));

        fields.insert("r".to_string(), route.to_string());
        fields.insert("u".to_string(), self.user.clone());
        fields.insert("k".to_string(), key);
        fields.remove("fr");

        log.push(format!("connecting to webservice at {}", self.base_url));
        let body = match self.transport.post_form(&self.base_url, &fields) {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, url = %self.base_url, "webservice transport failure");
                log.push("error accessing the webservice");
                return Err(TRANSPORT_FAILURE);
            }
        };
        log.push("webservice response received");

        let parsed: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(err) => {
                warn!(error = %err, "webservice response is not parseable");
                log.push("webservice response corrupted");
                return Err(RESPONSE_CORRUPT);
            }
        };

        // A present but non-integer `e` counts as missing.
        match parsed {
            Value::Object(envelope) if envelope.get("e").and_then(Value::as_i64).is_some() => {
                log.push("webservice response validated");
                Ok(envelope)
            }
            _ => {
                log.push("webservice response corrupted (missing \"e\")");
                Err(RESPONSE_MISSING_CODE)
            }
        }
    }
}

/// Builds the final response from a validated envelope. A non-zero service
/// code keeps only code + message; on success the events are decoded and the
/// remaining envelope fields are carried through verbatim.
fn finish(
    mut envelope: serde_json::Map<String, Value>,
    events_compressed: bool,
    log: RequestLog,
) -> WsResponse {
    // `exchange` guarantees an integer `e`.
    let code = envelope
        .remove("e")
        .and_then(|v| v.as_i64())
        .unwrap_or(RESPONSE_MISSING_CODE);

    if code != SUCCESS {
        return WsResponse::failure(code, log.into_entries());
    }

    let events = envelope
        .remove("evt")
        .and_then(|v| match v {
            Value::Array(items) => Some(items),
            _ => None,
        })
        .unwrap_or_default()
        .into_iter()
        .map(|item| decode_event(item, events_compressed))
        .collect();

    WsResponse {
        code: SUCCESS,
        message: response::core_message(SUCCESS).to_string(),
        events,
        extra: envelope,
        log: log.into_entries(),
    }
}

/// Decodes one `evt` element. A failed decode poisons that event only; the
/// response as a whole stays successful.
fn decode_event(item: Value, events_compressed: bool) -> Event {
    let raw = match item {
        Value::String(s) => s,
        other => {
            return Event::Corrupt {
                raw: other.to_string(),
                reason: "event is not a string".to_string(),
            }
        }
    };
    if events_compressed {
        return Event::Compressed(raw);
    }
    match codec::decompress_event(&raw) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Event::Text(text),
            Err(err) => {
                debug!(error = %err, "event decoded to non-utf8 text");
                Event::Corrupt {
                    raw,
                    reason: "event text is not valid utf-8".to_string(),
                }
            }
        },
        Err(err) => {
            debug!(error = %err, "event decompression failed");
            Event::Corrupt {
                raw,
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::sync::{Arc, Mutex};

    /// Capturing transport: records every call and replies with a canned
    /// body or a canned connection failure.
    #[derive(Clone)]
    struct MockTransport {
        reply: Result<Vec<u8>, String>,
        calls: Arc<Mutex<Vec<(String, BTreeMap<String, String>)>>>,
    }

    impl MockTransport {
        fn replying(body: &str) -> Self {
            Self {
                reply: Ok(body.as_bytes().to_vec()),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<(String, BTreeMap<String, String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn post_form(
            &self,
            url: &str,
            fields: &BTreeMap<String, String>,
        ) -> Result<Vec<u8>, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), fields.clone()));
            match &self.reply {
                Ok(body) => Ok(body.clone()),
                Err(msg) => Err(TransportError::new(msg.clone())),
            }
        }
    }

    fn client_with(mock: &MockTransport) -> WebserviceClient {
        WebserviceClient::with_transport(
            "https://ws.example.test/endpoint",
            "acme-user",
            Box::new(mock.clone()),
        )
    }

    fn success_body(event_texts: &[&str]) -> String {
        let events: Vec<String> = event_texts
            .iter()
            .map(|t| codec::compress_payload(t.as_bytes()).unwrap())
            .collect();
        serde_json::json!({ "e": 0, "evt": events }).to_string()
    }

    #[test]
    fn route_without_separator_never_reaches_the_transport() {
        let mock = MockTransport::replying("{}");
        let mut client = client_with(&mock);

        let resp = client.request("noseparator", "s", "ctx", BTreeMap::new(), false);

        assert_eq!(resp.code, ROUTE_INVALID);
        assert_eq!(resp.message, "invalid route");
        assert!(resp.events.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn transport_failure_maps_to_access_error() {
        let mock = MockTransport::failing("connection refused");
        let mut client = client_with(&mock);

        let resp = client.request("svc/op", "s", "ctx", BTreeMap::new(), false);

        assert_eq!(resp.code, TRANSPORT_FAILURE);
        assert_eq!(resp.message, "webservice access error");
    }

    #[test]
    fn unparseable_body_maps_to_response_corrupt() {
        let mock = MockTransport::replying("<<< not json >>>");
        let mut client = client_with(&mock);

        let resp = client.request("svc/op", "s", "ctx", BTreeMap::new(), false);

        assert_eq!(resp.code, RESPONSE_CORRUPT);
        assert_eq!(resp.message, "webservice response corrupted");
        assert!(resp.events.is_empty());
    }

    #[test]
    fn body_without_code_field_maps_to_missing_code() {
        for body in [r#"{"msg":"no code here"}"#, r#"{"e":"zero"}"#, "[1,2,3]"] {
            let mock = MockTransport::replying(body);
            let mut client = client_with(&mock);
            let resp = client.request("svc/op", "s", "ctx", BTreeMap::new(), false);
            assert_eq!(resp.code, RESPONSE_MISSING_CODE, "body: {body}");
            assert_eq!(resp.message, "webservice response corrupted (missing \"e\")");
        }
    }

    #[test]
    fn service_code_is_adopted_with_generic_message() {
        let mock = MockTransport::replying(r#"{"e":7,"detail":"x"}"#);
        let mut client = client_with(&mock);

        let resp = client.request("svc/op", "s", "ctx", BTreeMap::new(), false);

        assert_eq!(resp.code, 7);
        assert_eq!(
            resp.message,
            "service-specific error, consult the service reference material"
        );
        assert!(resp.events.is_empty());
        assert!(resp.extra.is_empty());
    }

    #[test]
    fn success_decodes_events_and_keeps_extra_fields() {
        let body = {
            let ev = codec::compress_payload(b"first event").unwrap();
            serde_json::json!({ "e": 0, "evt": [ev], "ref": "abc-123" }).to_string()
        };
        let mock = MockTransport::replying(&body);
        let mut client = client_with(&mock);

        let resp = client.request("svc/op", "s", "ctx", BTreeMap::new(), false);

        assert!(resp.is_success());
        assert_eq!(resp.message, "request completed successfully");
        assert_eq!(resp.events.len(), 1);
        assert_eq!(resp.events[0].as_text(), Some("first event"));
        assert_eq!(resp.extra.get("ref").and_then(Value::as_str), Some("abc-123"));
    }

    #[test]
    fn success_without_events_field_yields_empty_events() {
        let mock = MockTransport::replying(r#"{"e":0}"#);
        let mut client = client_with(&mock);

        let resp = client.request("svc/op", "s", "ctx", BTreeMap::new(), false);

        assert!(resp.is_success());
        assert!(resp.events.is_empty());
    }

    #[test]
    fn compressed_passthrough_returns_wire_events() {
        let wire = codec::compress_payload(b"still compressed").unwrap();
        let body = serde_json::json!({ "e": 0, "evt": [wire.clone()] }).to_string();
        let mock = MockTransport::replying(&body);
        let mut client = client_with(&mock);

        let resp = client.request("svc/op", "s", "ctx", BTreeMap::new(), true);

        assert!(resp.is_success());
        assert_eq!(resp.events, vec![Event::Compressed(wire)]);
    }

    #[test]
    fn corrupt_event_is_isolated_from_the_rest() {
        let good = codec::compress_payload(b"good").unwrap();
        let body = serde_json::json!({ "e": 0, "evt": [good, "!!! not base64"] }).to_string();
        let mock = MockTransport::replying(&body);
        let mut client = client_with(&mock);

        let resp = client.request("svc/op", "s", "ctx", BTreeMap::new(), false);

        assert!(resp.is_success());
        assert_eq!(resp.events.len(), 2);
        assert_eq!(resp.events[0].as_text(), Some("good"));
        assert!(matches!(resp.events[1], Event::Corrupt { .. }));
    }

    #[test]
    fn auth_fields_are_merged_and_format_override_is_stripped() {
        let mock = MockTransport::replying(&success_body(&[]));
        let mut client = client_with(&mock);

        let mut fields = BTreeMap::new();
        fields.insert("t".to_string(), "v".to_string());
        fields.insert("fr".to_string(), "must-not-survive".to_string());

        client.request("svc/op", "topsecret", "ctx", fields, false);

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        let (url, sent) = &calls[0];
        assert_eq!(url, "https://ws.example.test/endpoint");
        assert_eq!(sent.get("r").map(String::as_str), Some("svc/op"));
        assert_eq!(sent.get("u").map(String::as_str), Some("acme-user"));
        assert_eq!(
            sent.get("k").map(String::as_str),
            Some(auth::derive_key("topsecret", "ctx").as_str())
        );
        assert_eq!(sent.get("t").map(String::as_str), Some("v"));
        assert!(!sent.contains_key("fr"));
    }

    #[test]
    fn derived_key_appears_in_the_request_log() {
        let mock = MockTransport::replying(&success_body(&[]));
        let mut client = client_with(&mock);

        let resp = client.request("svc/op", "topsecret", "ctx", BTreeMap::new(), false);

        let key = auth::derive_key("topsecret", "ctx");
        assert!(resp
            .log
            .iter()
            .any(|e| e.text == format!("access key set to {key}")));
    }

    #[test]
    fn log_reflects_only_the_most_recent_call() {
        let mock = MockTransport::replying(&success_body(&[]));
        let mut client = client_with(&mock);

        client.request("bad-route", "s", "ctx", BTreeMap::new(), false);
        let first = client.rec_log();
        assert!(first.iter().any(|l| l.contains("is invalid")));

        client.request("svc/op", "s", "ctx", BTreeMap::new(), false);
        let second = client.rec_log();
        assert!(second.iter().any(|l| l.contains("route set to svc/op")));
        assert!(!second.iter().any(|l| l.contains("is invalid")));
    }

    #[test]
    fn every_call_logs_start_and_finish() {
        let mock = MockTransport::failing("down");
        let mut client = client_with(&mock);

        let resp = client.request("svc/op", "s", "ctx", BTreeMap::new(), false);

        assert_eq!(resp.log.first().map(|e| e.text.as_str()), Some("request started"));
        assert_eq!(resp.log.last().map(|e| e.text.as_str()), Some("request finished"));
    }
}
