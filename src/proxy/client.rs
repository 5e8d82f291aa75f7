//! Backend forwarding: header discipline, timeout accounting, and response
//! post-processing for the `/api/query` path and the transparent passthrough
//! paths.



//		Packages

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use reqwest::Client as HttpClient;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::errors::ProxyError;
use crate::query::{Query, Response as TsdbResponse, response::{decode_content_body, encode_content_body}};



//		Constants

/// Headers meaningful only for a single transport hop (RFC 2616 §13.5.1);
/// stripped from both inbound and outbound header sets before forwarding.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
	"connection",
	"keep-alive",
	"proxy-authenticate",
	"proxy-authorization",
	"te",
	"trailers",
	"transfer-encoding",
	"upgrade",
];



//		Structs

//		ForwardedResponse
/// The outcome of a successful backend exchange, ready to be turned into an
/// Axum response by the caller.
#[derive(Debug)]
pub struct ForwardedResponse {
	/// The status code to return to the client.
	pub status:  StatusCode,

	/// The headers to return to the client, already hop-by-hop-stripped.
	pub headers: HeaderMap,

	/// The response body.
	pub body:    Bytes,

	/// How long the backend exchange took, in seconds.
	pub elapsed: f64,
}

//		QueryOutcome
/// The outcome of forwarding a `/api/query` request, carrying enough detail
/// for the caller to both reply to the client and record stats.
pub enum QueryOutcome {
	/// The backend replied with a parsed series response.
	Success {
		/// The response to send to the client.
		forwarded: ForwardedResponse,

		/// The parsed backend response, for stats recording.
		parsed:    TsdbResponse,
	},

	/// The backend replied with a non-200, non-400 status; the body is
	/// streamed through unchanged.
	Passthrough(ForwardedResponse),

	/// The backend returned 400; re-packaged into Grafana-style JSON.
	BadRequest(ForwardedResponse),
}



//		Functions

//		strip_hop_by_hop
/// Removes every hop-by-hop header (case-insensitively) from `headers`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
	for name in HOP_BY_HOP_HEADERS {
		let _ = headers.remove(name);
	}
}

//		backend_uri
/// Builds the full backend URI for a given path-and-query.
#[must_use]
pub fn backend_uri(config: &Config, path_and_query: &str) -> String {
	format!("http://{}:{}{path_and_query}", config.backend_host, config.backend_port)
}

//		forward_passthrough
/// Forwards a request unchanged (the `GET *` and non-`/api/*` `POST *`
/// paths), rewriting `Host` and stripping hop-by-hop headers both ways.
///
/// # Errors
///
/// Returns [`ProxyError::BackendTimeout`] if the exchange exceeds `timeout`
/// seconds, or [`ProxyError::BackendError`] for any other transport failure.
pub async fn forward_passthrough(
	client:         &HttpClient,
	config:         &Config,
	method:         Method,
	path_and_query: &str,
	mut headers:    HeaderMap,
	body:           Bytes,
	timeout:        Duration,
) -> Result<ForwardedResponse, ProxyError> {
	strip_hop_by_hop(&mut headers);
	let _ = headers.insert(
		axum::http::header::HOST,
		HeaderValue::from_str(&format!("{}:{}", config.backend_host, config.backend_port)).unwrap_or_else(|_| HeaderValue::from_static("invalid-host")),
	);

	let uri     = backend_uri(config, path_and_query);
	let started = Instant::now();
	let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);
	let response = client
		.request(reqwest_method, &uri)
		.headers(convert_headers_to_reqwest(&headers))
		.body(body.to_vec())
		.timeout(timeout)
		.send()
		.await
		.map_err(classify_reqwest_error(timeout))?;

	let elapsed = started.elapsed().as_secs_f64();
	let status  = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
	let mut out_headers = convert_headers_from_reqwest(response.headers());
	let body_bytes = response.bytes().await.map_err(|e| ProxyError::BackendError(e.to_string()))?;
	strip_hop_by_hop(&mut out_headers);
	recompute_content_length(&mut out_headers, body_bytes.len());

	Ok(ForwardedResponse { status, headers: out_headers, body: body_bytes, elapsed })
}

//		forward_query
/// Forwards a parsed `/api/query` request, classifying the outcome: 200 is
/// parsed for stats and re-emitted with the summary stripped; 400 is
/// re-packaged into Grafana-style JSON; anything else is streamed through
/// unchanged.
///
/// # Errors
///
/// Returns [`ProxyError::BackendTimeout`] on a socket timeout, or
/// [`ProxyError::BackendError`] for any other transport failure.
pub async fn forward_query(
	client:  &HttpClient,
	config:  &Config,
	query:   &Query,
	mut headers: HeaderMap,
	timeout: Duration,
) -> Result<QueryOutcome, ProxyError> {
	strip_hop_by_hop(&mut headers);
	let _ = headers.insert(
		axum::http::header::HOST,
		HeaderValue::from_str(&format!("{}:{}", config.backend_host, config.backend_port)).unwrap_or_else(|_| HeaderValue::from_static("invalid-host")),
	);
	let _ = headers.insert(
		HeaderName::from_static("x-protector"),
		HeaderValue::from_str(query.id()).unwrap_or_else(|_| HeaderValue::from_static("unknown")),
	);

	let body = query.to_outbound_json().map_err(|e| ProxyError::BadQuery(e.to_string()))?;
	let uri  = backend_uri(config, "/api/query");
	let started = Instant::now();
	let response = client
		.post(&uri)
		.headers(convert_headers_to_reqwest(&headers))
		.body(body)
		.timeout(timeout)
		.send()
		.await
		.map_err(classify_reqwest_error(timeout))?;

	let elapsed = started.elapsed().as_secs_f64();
	let status  = response.status();
	let encoding = response.headers().get(reqwest::header::CONTENT_ENCODING).and_then(|v| v.to_str().ok()).map(ToOwned::to_owned);
	let mut out_headers = convert_headers_from_reqwest(response.headers());
	let raw_body = response.bytes().await.map_err(|e| ProxyError::BackendError(e.to_string()))?;
	strip_hop_by_hop(&mut out_headers);

	let decoded = decode_content_body(&raw_body, encoding.as_deref()).map_err(|e| ProxyError::BackendError(e.to_string()))?;

	if status == reqwest::StatusCode::OK {
		let parsed = TsdbResponse::parse(&decoded).map_err(|e| ProxyError::BackendError(e.to_string()))?;
		let client_body = parsed.to_client_json().map_err(|e| ProxyError::BackendError(e.to_string()))?;
		let encoded = encode_content_body(&client_body, encoding.as_deref()).map_err(|e| ProxyError::BackendError(e.to_string()))?;
		recompute_content_length(&mut out_headers, encoded.len());
		return Ok(QueryOutcome::Success {
			forwarded: ForwardedResponse { status: StatusCode::OK, headers: out_headers, body: Bytes::from(encoded), elapsed },
			parsed,
		});
	}

	if status == reqwest::StatusCode::BAD_REQUEST {
		let error = crate::errors::proxy::GrafanaError::from_backend_body(&decoded);
		let repackaged = serde_json::to_vec(&error).unwrap_or_default();
		let encoded = encode_content_body(&repackaged, encoding.as_deref()).map_err(|e| ProxyError::BackendError(e.to_string()))?;
		recompute_content_length(&mut out_headers, encoded.len());
		return Ok(QueryOutcome::BadRequest(ForwardedResponse {
			status:  StatusCode::BAD_REQUEST,
			headers: out_headers,
			body:    Bytes::from(encoded),
			elapsed,
		}));
	}

	recompute_content_length(&mut out_headers, raw_body.len());
	Ok(QueryOutcome::Passthrough(ForwardedResponse {
		status:  StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
		headers: out_headers,
		body:    raw_body,
		elapsed,
	}))
}

//		classify_reqwest_error
/// Builds a closure translating a [`reqwest::Error`] into the appropriate
/// [`ProxyError`] variant, distinguishing a socket timeout from any other
/// transport failure.
fn classify_reqwest_error(timeout: Duration) -> impl Fn(reqwest::Error) -> ProxyError {
	move |error| {
		if error.is_timeout() {
			ProxyError::BackendTimeout(timeout.as_secs())
		} else {
			ProxyError::BackendError(error.to_string())
		}
	}
}

//		recompute_content_length
/// Sets `Content-Length` to the actual body size.
fn recompute_content_length(headers: &mut HeaderMap, len: usize) {
	let _ = headers.insert(axum::http::header::CONTENT_LENGTH, HeaderValue::from(len));
}

//		convert_headers_to_reqwest
/// Converts an Axum [`HeaderMap`] into a [`reqwest::header::HeaderMap`].
fn convert_headers_to_reqwest(headers: &HeaderMap) -> reqwest::header::HeaderMap {
	let mut out = reqwest::header::HeaderMap::new();
	for (name, value) in headers {
		if let (Ok(name), Ok(value)) = (
			reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
			reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
		) {
			let _ = out.insert(name, value);
		}
	}
	out
}

//		convert_headers_from_reqwest
/// Converts a [`reqwest::header::HeaderMap`] into an Axum [`HeaderMap`].
fn convert_headers_from_reqwest(headers: &reqwest::header::HeaderMap) -> HeaderMap {
	let mut out = HeaderMap::new();
	for (name, value) in headers {
		if let (Ok(name), Ok(value)) = (
			HeaderName::from_bytes(name.as_str().as_bytes()),
			HeaderValue::from_bytes(value.as_bytes()),
		) {
			let _ = out.append(name, value);
		}
	}
	out
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hop_by_hop_headers_are_stripped() {
		let mut headers = HeaderMap::new();
		let _ = headers.insert(axum::http::header::CONNECTION, HeaderValue::from_static("keep-alive"));
		let _ = headers.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
		strip_hop_by_hop(&mut headers);
		assert!(!headers.contains_key(axum::http::header::CONNECTION));
		assert!(headers.contains_key(axum::http::header::CONTENT_TYPE), "non-hop-by-hop headers must survive");
	}

	#[test]
	fn backend_uri_joins_host_port_and_path() {
		let config = Config { backend_host: "tsdb.internal".to_owned(), backend_port: 4242, ..Config::default() };
		assert_eq!(backend_uri(&config, "/api/query"), "http://tsdb.internal:4242/api/query");
	}
}
