//! Error taxonomy
//!
//! Maps transport failures, HTTP status codes, and mapping-layer problems
//! onto one typed error enum. HTTP statuses commonly returned by OpenStack
//! services (400/401/403/404/409/429) get dedicated variants so callers can
//! match on them.

use reqwest::StatusCode;
use serde_json::Value;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the SDK.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authentication against the identity service failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Configuration could not be loaded or is incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// No endpoint for the requested service in the catalog or overrides.
    #[error("no endpoint found for service '{service}' (interface '{interface}')")]
    EndpointNotFound { service: String, interface: String },

    /// The resource definition does not allow this verb.
    #[error("operation '{operation}' is not supported by resource '{resource}'")]
    MethodNotSupported {
        resource: String,
        operation: &'static str,
    },

    /// A list/find filter name is not declared for the resource.
    #[error("invalid query parameter '{param}' for resource '{resource}'")]
    InvalidQuery { resource: String, param: String },

    /// 404 from the service, or find matched nothing.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// find matched more than one resource by name.
    #[error("too many matches for '{name}' in '{resource}'")]
    TooManyMatches { resource: String, name: String },

    /// 400 from the service.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 401 from the service.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 403 from the service.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// 409 from the service.
    #[error("conflict: {0}")]
    Conflict(String),

    /// 429 from the service.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body did not have the declared shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A waiter hit its deadline.
    #[error("timed out waiting for '{resource}' {id} (last status: {last_status})")]
    WaitTimeout {
        resource: String,
        id: String,
        last_status: String,
    },

    /// A waiter observed a terminal failure status.
    #[error("resource '{resource}' {id} entered failure status '{status}': {fault}")]
    ResourceFailed {
        resource: String,
        id: String,
        status: String,
        fault: String,
    },

    /// Unknown resource, service, or action key.
    #[error("unknown {kind} '{key}'")]
    UnknownKey { kind: &'static str, key: String },

    /// The resource has no value for its id field yet.
    #[error("resource '{resource}' has no identity set")]
    NoIdentity { resource: String },

    /// A `{param}` placeholder in the base path has no URI attribute.
    #[error("missing URI parameter '{param}' for resource '{resource}'")]
    MissingUriParam { resource: String, param: String },

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Map a non-success HTTP status and body to the matching variant.
    ///
    /// OpenStack services wrap error details in a handful of shapes
    /// (`{"error": {"message": ...}}`, `{"badRequest": {"message": ...}}`,
    /// `{"itemNotFound": {"message": ...}}`); the first `message` found
    /// anywhere one level down wins.
    pub fn from_response(status: StatusCode, body: &Value) -> Self {
        let message = extract_message(body).unwrap_or_else(|| status.to_string());
        match status.as_u16() {
            400 => Error::BadRequest(message),
            401 => Error::Unauthorized(message),
            403 => Error::Forbidden(message),
            404 => Error::NotFound(message),
            409 => Error::Conflict(message),
            429 => Error::RateLimited(message),
            code => Error::Http {
                status: code,
                message,
            },
        }
    }

    /// Whether this error is a 404-style not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Pull a human-readable message out of an OpenStack error body.
fn extract_message(body: &Value) -> Option<String> {
    let obj = body.as_object()?;
    for value in obj.values() {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return Some(message.to_string());
        }
    }
    // Some services return {"message": "..."} directly
    obj.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        let body = json!({"itemNotFound": {"message": "No server found", "code": 404}});
        let err = Error::from_response(StatusCode::NOT_FOUND, &body);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("No server found"));
    }

    #[test]
    fn test_conflict_mapping() {
        let body = json!({"conflictingRequest": {"message": "Volume in use"}});
        let err = Error::from_response(StatusCode::CONFLICT, &body);
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_unknown_status_falls_through() {
        let err = Error::from_response(StatusCode::BAD_GATEWAY, &Value::Null);
        match err {
            Error::Http { status, .. } => assert_eq!(status, 502),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_flat_message_shape() {
        let body = json!({"message": "boom"});
        let err = Error::from_response(StatusCode::BAD_REQUEST, &body);
        assert!(err.to_string().contains("boom"));
    }
}
