//! Error taxonomy and the classifier that turns a finished transport attempt
//! into an [`Outcome`].
//!
//! Classification order (first match wins):
//!
//! 1. timeout / stream reset / interrupted IO fault → `TimedOut`
//! 2. host resolution fault → `NoConnectivity`
//! 3. any other IO fault → `Unknown`
//! 4. status ≥ 500 → `InternalServerError`, body ignored
//! 5. absent body or a body that is not a JSON object → `InternalServerError`
//! 6. status 200 → `Success(body)`
//! 7. otherwise the body's error shape, then the status table for ≥ 400,
//!    and finally `Success(body)` for an unrecognised 2xx/3xx body.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::transport::{RawResponse, TransportFault};

/// Result of one attempt, delivered exactly once per task.
pub type Outcome = Result<Value, SearchError>;

/// Closed set of failure categories a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    NotSupported,
    NoInternetPermission,
    NoConnectivity,
    InternalServerError,
    TimedOut,
    Canceled,
    ServiceDisabled,
    RoutingUnableToOpenApp,
    RoutingUnableToOpenWebUrl,
    RoutingUnableToOpenShortcut,
    RoutingUnableToOpenPlayStore,
    RoutingUnknown,
    Unknown,
}

impl ErrorKind {
    /// Numeric status/code table shared by HTTP statuses and body `code`s.
    pub fn from_status(code: i64) -> Self {
        match code {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Unauthorized,
            404 => ErrorKind::NotSupported,
            _ => ErrorKind::Unknown,
        }
    }

    /// Stable snake-case name, used in logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::NoInternetPermission => "no_internet_permission",
            ErrorKind::NoConnectivity => "no_connectivity",
            ErrorKind::InternalServerError => "internal_server_error",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::Canceled => "canceled",
            ErrorKind::ServiceDisabled => "service_disabled",
            ErrorKind::RoutingUnableToOpenApp => "routing_unable_to_open_app",
            ErrorKind::RoutingUnableToOpenWebUrl => "routing_unable_to_open_web_url",
            ErrorKind::RoutingUnableToOpenShortcut => "routing_unable_to_open_shortcut",
            ErrorKind::RoutingUnableToOpenPlayStore => "routing_unable_to_open_play_store",
            ErrorKind::RoutingUnknown => "routing_unknown",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Canonical message for errors that were not built from a server body.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::NoConnectivity => {
                "Poor network connectivity. Please try again later. Please make sure app has internet access permission"
            }
            ErrorKind::NoInternetPermission => {
                "Internet access permission is missing for this application."
            }
            ErrorKind::InternalServerError => {
                "Unable to process your request now. An internal error happened. Please try later."
            }
            ErrorKind::TimedOut => {
                "Request to Branch server timed out. Please check your connection or try again later."
            }
            ErrorKind::Canceled => {
                "Request was canceled due to new requests being scheduled before it could be completed."
            }
            ErrorKind::ServiceDisabled => "The search service is disabled.",
            ErrorKind::RoutingUnableToOpenApp => {
                "Unable to open the destination application or its fallback url."
            }
            ErrorKind::RoutingUnableToOpenWebUrl => {
                "Unable to open the web url associated with the app."
            }
            ErrorKind::RoutingUnableToOpenShortcut => {
                "Unable to open the shortcut associated with the link."
            }
            ErrorKind::RoutingUnableToOpenPlayStore => "Unable to open the store page for the app.",
            ErrorKind::RoutingUnknown => "An unknown error happened. Unable to open the app.",
            ErrorKind::BadRequest
            | ErrorKind::Unauthorized
            | ErrorKind::NotSupported
            | ErrorKind::Unknown => "An unknown error occurred.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure: the only error type a request callback receives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SearchError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SearchError {
    /// Error carrying the kind's canonical message.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, message: kind.default_message().to_string() }
    }

    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Build from a server error object: `{ "code": <int>, "message": <string> }`.
    ///
    /// `code` may arrive as a number or a numeric string; anything else maps
    /// to [`ErrorKind::Unknown`].
    pub fn from_body(object: &Map<String, Value>) -> Self {
        let code = match object.get("code") {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        let message = match object.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self { kind: ErrorKind::from_status(code), message }
    }

    pub fn canceled() -> Self {
        Self::new(ErrorKind::Canceled)
    }
}

/// Map a transport fault to its error kind (rules 1–3).
pub fn classify_fault(fault: &TransportFault) -> ErrorKind {
    match fault {
        TransportFault::TimedOut(_) => ErrorKind::TimedOut,
        TransportFault::HostUnresolved(_) => ErrorKind::NoConnectivity,
        TransportFault::Io(_) => ErrorKind::Unknown,
    }
}

/// Classify a finished attempt into an [`Outcome`].
pub fn classify(result: Result<RawResponse, TransportFault>) -> Outcome {
    let response = match result {
        Ok(response) => response,
        Err(fault) => return Err(SearchError::new(classify_fault(&fault))),
    };

    if response.status >= 500 {
        return Err(SearchError::new(ErrorKind::InternalServerError));
    }

    let Some(body) = response.body.as_deref() else {
        return Err(SearchError::new(ErrorKind::InternalServerError));
    };
    let object = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => object,
        _ => return Err(SearchError::new(ErrorKind::InternalServerError)),
    };

    if response.status == 200 {
        return Ok(Value::Object(object));
    }

    if let Some(Value::Object(nested)) = object.get("error") {
        if nested.contains_key("message") {
            return Err(SearchError::from_body(nested));
        }
    }
    if object.contains_key("code") && object.contains_key("message") {
        return Err(SearchError::from_body(&object));
    }
    if response.status >= 400 {
        return Err(SearchError::new(ErrorKind::from_status(i64::from(response.status))));
    }

    // Non-200, below 400, no recognised error shape: passed through as success.
    Ok(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(status: u16, body: Option<&str>) -> Result<RawResponse, TransportFault> {
        Ok(RawResponse { status, body: body.map(str::to_string) })
    }

    fn kind_of(outcome: Outcome) -> ErrorKind {
        outcome.expect_err("expected a failure").kind
    }

    #[test]
    fn faults_map_to_kinds() {
        assert_eq!(kind_of(classify(Err(TransportFault::TimedOut("t".into())))), ErrorKind::TimedOut);
        assert_eq!(
            kind_of(classify(Err(TransportFault::HostUnresolved("dns".into())))),
            ErrorKind::NoConnectivity
        );
        assert_eq!(kind_of(classify(Err(TransportFault::Io("eof".into())))), ErrorKind::Unknown);
    }

    #[test]
    fn server_error_ignores_body() {
        assert_eq!(kind_of(classify(reply(500, None))), ErrorKind::InternalServerError);
        assert_eq!(kind_of(classify(reply(500, Some("")))), ErrorKind::InternalServerError);
        assert_eq!(
            kind_of(classify(reply(503, Some(r#"{"success":true}"#)))),
            ErrorKind::InternalServerError
        );
    }

    #[test]
    fn absent_or_malformed_body_is_server_error() {
        assert_eq!(kind_of(classify(reply(200, None))), ErrorKind::InternalServerError);
        assert_eq!(kind_of(classify(reply(200, Some("<html>")))), ErrorKind::InternalServerError);
        assert_eq!(kind_of(classify(reply(200, Some("[1,2]")))), ErrorKind::InternalServerError);
    }

    #[test]
    fn ok_status_is_success() {
        let body = classify(reply(200, Some(r#"{"success":true,"results":[]}"#))).unwrap();
        assert_eq!(body, json!({"success": true, "results": []}));
    }

    #[test]
    fn nested_error_object_wins() {
        let err = classify(reply(
            403,
            Some(r#"{"error":{"code":401,"message":"bad key"}}"#),
        ))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(err.message, "bad key");
    }

    #[test]
    fn top_level_code_and_message() {
        let err = classify(reply(400, Some(r#"{"code":404,"message":"no region"}"#))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotSupported);
        assert_eq!(err.message, "no region");
    }

    #[test]
    fn string_code_is_accepted() {
        let err = classify(reply(418, Some(r#"{"code":"400","message":"m"}"#))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);
    }

    #[test]
    fn unknown_code_maps_to_unknown() {
        let err = classify(reply(409, Some(r#"{"code":409,"message":"conflict"}"#))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
    }

    #[test]
    fn status_table_used_without_error_shape() {
        assert_eq!(kind_of(classify(reply(401, Some("{}")))), ErrorKind::Unauthorized);
        assert_eq!(kind_of(classify(reply(400, Some(r#"{"x":1}"#)))), ErrorKind::BadRequest);
        assert_eq!(kind_of(classify(reply(404, Some("{}")))), ErrorKind::NotSupported);
        assert_eq!(kind_of(classify(reply(429, Some("{}")))), ErrorKind::Unknown);
    }

    #[test]
    fn non_object_error_member_falls_through_to_status() {
        assert_eq!(
            kind_of(classify(reply(401, Some(r#"{"error":"nope"}"#)))),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn error_object_without_message_is_not_an_error_shape() {
        assert_eq!(
            kind_of(classify(reply(400, Some(r#"{"error":{"code":401}}"#)))),
            ErrorKind::BadRequest
        );
    }

    #[test]
    fn unrecognised_non_error_status_passes_through_as_success() {
        // 2xx/3xx other than 200 with no error shape is delivered as a success.
        let body = classify(reply(202, Some(r#"{"queued":true}"#))).unwrap();
        assert_eq!(body, json!({"queued": true}));
        let body = classify(reply(304, Some("{}"))).unwrap();
        assert_eq!(body, json!({}));
    }

    #[test]
    fn error_shape_applies_below_400_too() {
        let err = classify(reply(202, Some(r#"{"code":401,"message":"m"}"#))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[test]
    fn null_message_becomes_empty() {
        let err = classify(reply(400, Some(r#"{"code":400,"message":null}"#))).unwrap_err();
        assert_eq!(err.message, "");
    }

    #[test]
    fn canceled_has_canonical_message() {
        let err = SearchError::canceled();
        assert_eq!(err.kind, ErrorKind::Canceled);
        assert!(err.message.contains("canceled"));
        assert!(err.to_string().starts_with("canceled:"));
    }
}
