//! Client-facing errors produced on the request path.



//		Packages

use axum::{
	Json,
	http::StatusCode,
	response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error as ThisError;



//		Structs

//		GrafanaError
/// The Grafana-style error body returned to clients: `{"message": ..., "error": ...}`.
///
/// Both fields are omitted (yielding a bare `{}`) when
/// [`from_backend_body()`](Self::from_backend_body) finds no top-level
/// `error` object to extract from, matching the original re-package
/// behaviour.
#[derive(Debug, Serialize)]
pub struct GrafanaError {
	//		Public properties
	/// A human-readable summary of the failure.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,

	/// Additional detail about the failure.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error:   Option<String>,
}

impl GrafanaError {
	//		new
	/// Builds a [`GrafanaError`] with the same text in both fields.
	#[must_use]
	pub fn new<S: Into<String>>(message: S) -> Self {
		let message = message.into();
		Self {
			error:   Some(message.clone()),
			message: Some(message),
		}
	}

	//		from_backend_body
	/// Re-packages a backend `400` body into a [`GrafanaError`].
	///
	/// Parses `decoded` as JSON and, if it has a top-level `error` object,
	/// takes `message`/`details` from it (each defaulting to `"?"` if
	/// absent). If there is no `error` object at all, returns an empty
	/// [`GrafanaError`] that serialises as a bare `{}`.
	#[must_use]
	pub fn from_backend_body(decoded: &[u8]) -> Self {
		let parsed = serde_json::from_slice::<JsonValue>(decoded).unwrap_or(JsonValue::Null);
		let Some(err) = parsed.get("error").and_then(JsonValue::as_object) else {
			return Self { message: None, error: None };
		};
		let message = err.get("message").and_then(JsonValue::as_str).unwrap_or("?").to_owned();
		let error   = err.get("details").and_then(JsonValue::as_str).unwrap_or("?").to_owned();
		Self { message: Some(message), error: Some(error) }
	}
}



//		Enums

//		ProxyError
/// The taxonomy of client-visible outcomes for a forwarded request.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum ProxyError {
	/// The query body could not be parsed, or a required field was missing
	/// or invalid.
	#[error("Bad query: {0}")]
	BadQuery(String),

	/// A configured rule denied the request.
	#[error("Query blocked by rule '{rule}': {msg}")]
	RuleDeny {
		/// The name of the rule that produced the denial.
		rule: String,

		/// The human-readable reason for the denial.
		msg:  String,
	},

	/// The write endpoint `/api/put` is never allowed through the proxy.
	#[error("/api/put not allowed")]
	PutNotAllowed,

	/// The backend did not respond within the configured timeout.
	#[error("Query timed out. Configured timeout: {0}s")]
	BackendTimeout(u64),

	/// Any other transport or parse failure while exchanging with the
	/// backend.
	#[error("Invalid response from backend: {0}")]
	BackendError(String),
}

//󰭅		IntoResponse
impl IntoResponse for ProxyError {
	//		into_response
	fn into_response(self) -> Response {
		let status = match self {
			Self::BadQuery(_) | Self::RuleDeny { .. } | Self::PutNotAllowed => StatusCode::FORBIDDEN,
			Self::BackendTimeout(_)                                        => StatusCode::GATEWAY_TIMEOUT,
			Self::BackendError(_)                                          => StatusCode::BAD_GATEWAY,
		};
		let body = GrafanaError::new(self.to_string());
		(status, Json(body)).into_response()
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rule_deny_maps_to_forbidden() {
		let err = ProxyError::RuleDeny { rule: "too_many_datapoints".to_owned(), msg: "nope".to_owned() };
		assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN, "rule denials should surface as 403");
	}

	#[test]
	fn timeout_maps_to_gateway_timeout() {
		let err = ProxyError::BackendTimeout(30);
		assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT, "backend timeouts should surface as 504");
	}

	#[test]
	fn backend_error_maps_to_bad_gateway() {
		let err = ProxyError::BackendError("connection reset".to_owned());
		assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY, "other backend failures should surface as 502");
	}

	#[test]
	fn backend_body_extracts_nested_message_and_details() {
		let body  = br#"{"error":{"message":"Unable to parse","details":"invalid metric name","code":400}}"#;
		let error = GrafanaError::from_backend_body(body);
		assert_eq!(error.message.as_deref(), Some("Unable to parse"));
		assert_eq!(error.error.as_deref(), Some("invalid metric name"));
	}

	#[test]
	fn backend_body_without_error_key_is_empty() {
		let error = GrafanaError::from_backend_body(b"{\"ok\":true}");
		assert_eq!(error.message, None);
		assert_eq!(error.error, None);
		assert_eq!(serde_json::to_string(&error).expect("should serialise"), "{}");
	}

	#[test]
	fn backend_body_error_missing_fields_defaults_to_question_mark() {
		let error = GrafanaError::from_backend_body(b"{\"error\":{}}");
		assert_eq!(error.message.as_deref(), Some("?"));
		assert_eq!(error.error.as_deref(), Some("?"));
	}
}
