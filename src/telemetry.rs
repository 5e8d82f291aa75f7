//! Operational metrics, exported through the Prometheus text exposition
//! format at `GET /metrics`.
//!
//! Recording goes through the process-global `metrics` facade;
//! [`Telemetry::install`] wires it to a [`PrometheusHandle`] once at startup,
//! via a single setup function building a handle threaded through
//! [`AppState`](crate::state::AppState).



//		Packages

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::errors::ProcessError;



//		Constants

/// The bucket boundaries, in days, for `tsdb_request_interval`: how far back
/// in time a query's `start` reaches.
const QUERY_INTERVAL_BUCKETS_DAYS: [f64; 3] = [1.0, 30.0, 90.0];



//		Structs

//		Telemetry
/// The application's metrics recorder handle.
///
/// Cheap to clone; wraps the [`PrometheusHandle`] needed to render the
/// `/metrics` response, plus typed recording methods for every metric in
/// so call sites never construct a metric name by hand.
#[derive(Clone, Debug)]
pub struct Telemetry {
	/// The handle used to render the current snapshot as Prometheus text.
	handle: PrometheusHandle,
}

impl Telemetry {
	//		install
	/// Installs the process-global Prometheus recorder and describes every
	/// metric this application emits.
	///
	/// # Errors
	///
	/// Returns [`ProcessError::ServerFailed`] if a recorder is already
	/// installed (this must only be called once, at startup).
	pub fn install() -> Result<Self, ProcessError> {
		let handle = PrometheusBuilder::new()
			.set_buckets_for_metric(
				metrics_exporter_prometheus::Matcher::Full("tsdb_request_interval".to_owned()),
				&QUERY_INTERVAL_BUCKETS_DAYS,
			)
			.map_err(|e| ProcessError::ServerFailed(std::io::Error::other(e.to_string())))?
			.install_recorder()
			.map_err(|e| ProcessError::ServerFailed(std::io::Error::other(e.to_string())))?;

		describe_counter!("requests_total", "Total requests handled, by method/path/return_code");
		describe_counter!("requests_blocked", "Requests denied by a rule, by safe_mode/rule");
		describe_counter!("requests_allowedlist_matched", "Requests that bypassed rule evaluation via the allowedlist");
		describe_counter!("requests_metrics", "Sub-queries seen per metric name");
		describe_counter!("datapoints_served_count", "Total datapoints returned to clients");
		describe_histogram!("tsdb_request_latency_seconds", "Backend exchange latency, by http_code/path/method");
		describe_histogram!("tsdb_request_interval", "Query start age, in days, by interval bucket");
		describe_gauge!("safe_mode", "Whether the proxy is running in safe mode (1) or not (0)");

		Ok(Self { handle })
	}

	//		record_request
	/// Increments `requests_total` for a completed request.
	pub fn record_request(&self, method: &str, path: &str, status: u16) {
		counter!(
			"requests_total",
			"method" => method.to_owned(),
			"path" => path.to_owned(),
			"return_code" => status.to_string(),
		).increment(1);
	}

	//		record_blocked
	/// Increments `requests_blocked` for a rule denial, whether or not it
	/// actually stopped forwarding (safe mode still meters it).
	pub fn record_blocked(&self, safe_mode: bool, rule: &str) {
		counter!(
			"requests_blocked",
			"safe_mode" => safe_mode.to_string(),
			"rule" => rule.to_owned(),
		).increment(1);
	}

	//		record_allowedlist_matched
	/// Increments `requests_allowedlist_matched`.
	pub fn record_allowedlist_matched(&self) {
		counter!("requests_allowedlist_matched").increment(1);
	}

	//		record_metric_queried
	/// Increments `requests_metrics` for each metric name in a query.
	pub fn record_metric_queried(&self, metric: &str) {
		counter!("requests_metrics", "metric" => metric.to_owned()).increment(1);
	}

	//		record_datapoints_served
	/// Adds to `datapoints_served_count`.
	pub fn record_datapoints_served(&self, count: i64) {
		counter!("datapoints_served_count").increment(count.max(0).unsigned_abs());
	}

	//		record_backend_latency
	/// Records a backend exchange's latency, in seconds.
	pub fn record_backend_latency(&self, seconds: f64, http_code: u16, path: &str, method: &str) {
		histogram!(
			"tsdb_request_latency_seconds",
			"http_code" => http_code.to_string(),
			"path" => path.to_owned(),
			"method" => method.to_owned(),
		).record(seconds);
	}

	//		record_query_interval_days
	/// Records a query's start age, in days, against the `1/30/90` buckets.
	pub fn record_query_interval_days(&self, days: f64) {
		histogram!("tsdb_request_interval").record(days);
	}

	//		set_safe_mode
	/// Sets the `safe_mode` gauge.
	pub fn set_safe_mode(&self, enabled: bool) {
		gauge!("safe_mode").set(if enabled { 1.0 } else { 0.0 });
	}

	//		render
	/// Renders the current snapshot in Prometheus text exposition format.
	#[must_use]
	pub fn render(&self) -> String {
		self.handle.render()
	}
}

#[cfg(test)]
static TEST_TELEMETRY: std::sync::OnceLock<Telemetry> = std::sync::OnceLock::new();

#[cfg(test)]
impl Telemetry {
	//		for_test
	/// Installs the global recorder at most once per test process, returning a
	/// shared handle. The Prometheus recorder can only be installed once, but
	/// many tests in this process each need a [`Telemetry`] to construct a
	/// [`Protector`](crate::protector::Protector), so they share this one.
	#[must_use]
	pub fn for_test() -> Self {
		TEST_TELEMETRY.get_or_init(|| Self::install().expect("the global recorder installs once per test process")).clone()
	}
}
