//! Route wiring: the guarded `/api/query` path, the always-refused
//! `/api/put`, the Prometheus `/metrics` endpoint, the leaderboard reads,
//! and the transparent passthrough fallback.



//		Packages

use axum::{
	Json, Router,
	body::Body,
	extract::{Method, Request, State},
	http::{HeaderMap, HeaderValue, StatusCode, Uri, header::{CONNECTION, CONTENT_TYPE}},
	middleware::{self, Next},
	response::{IntoResponse, Response as AxumResponse},
	routing::{get, post},
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::errors::ProxyError;
use crate::guard::Verdict;
use crate::protector::TopKind;
use crate::proxy::client::{ForwardedResponse, QueryOutcome, forward_passthrough, forward_query};
use crate::query::Query;
use crate::state::AppState;



//		Functions

//		build_router
/// Builds the application's Axum [`Router`], wired with request tracing and
/// panic recovery.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
	Router::new()
		.route("/api/query", post(handle_query))
		.route("/api/put", post(handle_put))
		.route("/metrics", get(handle_metrics))
		.route("/top/duration", get(handle_top_duration))
		.route("/top/dps", get(handle_top_dps))
		.fallback(handle_forward)
		.with_state(state)
		.layer(middleware::from_fn(close_connection))
		.layer(TraceLayer::new_for_http())
		.layer(CatchPanicLayer::new())
}

//		close_connection
/// Stamps `Connection: close` on every response this proxy sends, per
/// §4.6: the proxy never keeps a client connection alive across requests.
async fn close_connection(request: Request, next: Next) -> AxumResponse {
	let mut response = next.run(request).await;
	let _ = response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
	response
}

//		handle_query
/// Runs the admission check and, unless it is actually denied, forwards to
/// the backend and records the outcome.
async fn handle_query(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> AxumResponse {
	let mut query = match Query::parse(&body) {
		Ok(query) => query,
		Err(error) => return finish(&state, "POST", "/api/query", ProxyError::BadQuery(error.to_string()).into_response()),
	};

	if let Ok(start) = query.start_ts() {
		let elapsed_secs = Utc::now().timestamp().saturating_sub(start);
		state.telemetry.record_query_interval_days(f64_max(elapsed_secs, 0) / 86_400.0);
	}

	let verdict = state.protector.check(&mut query).await;
	if let Verdict::Deny { rule, msg } = &verdict {
		state.telemetry.record_blocked(state.config.safe_mode, rule);
		if !state.config.safe_mode {
			let response = ProxyError::RuleDeny { rule: rule.clone(), msg: msg.clone() }.into_response();
			return finish(&state, "POST", "/api/query", response);
		}
	}

	let timeout = Duration::from_secs(state.config.timeout);
	let started = Instant::now();
	match forward_query(&state.http_client, &state.config, &query, headers, timeout).await {
		Ok(QueryOutcome::Success { forwarded, parsed }) => {
			state.protector.save_stats(&query, Some(&parsed), forwarded.elapsed, false).await;
			state.telemetry.record_backend_latency(forwarded.elapsed, forwarded.status.as_u16(), "/api/query", "POST");
			if let Some(dps) = parsed.emitted_dps() {
				state.telemetry.record_datapoints_served(dps);
			}
			finish(&state, "POST", "/api/query", response_from(forwarded))
		},
		Ok(QueryOutcome::BadRequest(forwarded) | QueryOutcome::Passthrough(forwarded)) => {
			state.telemetry.record_backend_latency(forwarded.elapsed, forwarded.status.as_u16(), "/api/query", "POST");
			finish(&state, "POST", "/api/query", response_from(forwarded))
		},
		Err(ProxyError::BackendTimeout(configured)) => {
			let elapsed = started.elapsed().as_secs_f64();
			state.protector.save_stats(&query, None, elapsed, true).await;
			finish(&state, "POST", "/api/query", ProxyError::BackendTimeout(configured).into_response())
		},
		Err(error) => finish(&state, "POST", "/api/query", error.into_response()),
	}
}

//		handle_put
/// `/api/put` is never allowed through the proxy, regardless of safe mode.
async fn handle_put(State(state): State<Arc<AppState>>) -> AxumResponse {
	finish(&state, "POST", "/api/put", ProxyError::PutNotAllowed.into_response())
}

//		handle_metrics
/// Renders the current metrics snapshot in Prometheus text exposition
/// format.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> AxumResponse {
	state.telemetry.set_safe_mode(state.config.safe_mode);
	(StatusCode::OK, [(CONTENT_TYPE, "text/plain; version=0.0.4")], state.telemetry.render()).into_response()
}

//		handle_top_duration
/// Reads the `top_duration` leaderboards for the current local day.
async fn handle_top_duration(State(state): State<Arc<AppState>>) -> AxumResponse {
	Json(state.protector.get_top(TopKind::Duration).await).into_response()
}

//		handle_top_dps
/// Reads the `top_dps` leaderboards for the current local day.
async fn handle_top_dps(State(state): State<Arc<AppState>>) -> AxumResponse {
	Json(state.protector.get_top(TopKind::Dps).await).into_response()
}

//		handle_forward
/// Transparently forwards any request that did not match a dedicated route.
async fn handle_forward(State(state): State<Arc<AppState>>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> AxumResponse {
	let path_and_query = uri.path_and_query().map_or_else(|| uri.path().to_owned(), |pq| pq.as_str().to_owned());
	let timeout = Duration::from_secs(state.config.timeout);
	let method_label = method.as_str().to_owned();
	match forward_passthrough(&state.http_client, &state.config, method, &path_and_query, headers, body, timeout).await {
		Ok(forwarded) => {
			state.telemetry.record_backend_latency(forwarded.elapsed, forwarded.status.as_u16(), &path_and_query, &method_label);
			finish(&state, &method_label, &path_and_query, response_from(forwarded))
		},
		Err(error) => finish(&state, &method_label, &path_and_query, error.into_response()),
	}
}

//		finish
/// Records `requests_total` for a completed response and returns it.
fn finish(state: &AppState, method: &str, path: &str, response: AxumResponse) -> AxumResponse {
	state.telemetry.record_request(method, path, response.status().as_u16());
	response
}

//		response_from
/// Converts a [`ForwardedResponse`] into an Axum response.
fn response_from(forwarded: ForwardedResponse) -> AxumResponse {
	let mut response = AxumResponse::new(Body::from(forwarded.body));
	*response.status_mut()  = forwarded.status;
	*response.headers_mut() = forwarded.headers;
	response
}

//		f64_max
/// Clamps an `i64` to a non-negative value before the `f64` conversion in
/// [`handle_query`], since a malformed `start` could otherwise be in the
/// future.
#[expect(clippy::cast_precision_loss, reason = "query ages are far below f64's exact-integer range")]
fn f64_max(value: i64, floor: i64) -> f64 {
	value.max(floor) as f64
}
