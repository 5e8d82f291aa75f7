//! Parsing, normalisation, and fingerprinting of OpenTSDB query payloads.



//		Modules

pub mod response;

pub use response::Response;



//		Packages

use chrono::Utc;
use md5::{Digest as _, Md5};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::LazyLock;

use crate::stats_store::IntervalStats;



//		Constants

/// The number of seconds in a day, used to convert the relative-time units
/// `n` (months) and `y` (years) into their day-based equivalents, and to
/// convert `query_old_data`'s day threshold into seconds.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// The JSON object keys that are stripped before computing a query's
/// [fingerprint](Query::fingerprint), because they vary with the requested
/// time window rather than the query's shape.
const FINGERPRINT_EXCLUDED_KEYS: [&str; 5] = ["start", "end", "timezone", "options", "padding"];



//		Statics

/// Matches the OpenTSDB relative-time grammar, e.g. `2h-ago` or `90d-ago`.
static RELATIVE_START: LazyLock<Regex> = LazyLock::new(|| {
	#[expect(clippy::unwrap_used, reason = "The pattern is a compile-time constant known to be valid")]
	Regex::new(r"^(\d+)(ms|s|m|h|d|w|n|y)-ago$").unwrap()
});



//		Enums

//		QueryError
/// Errors raised while parsing or interpreting a query payload.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryError {
	/// The request body was not valid JSON.
	#[error("Could not parse query body: {0}")]
	InvalidJson(#[from] serde_json::Error),

	/// The `queries` array was missing or empty.
	#[error("Invalid OpenTSDB query: 'queries' is missing or empty")]
	MissingQueries,

	/// The `start` field was missing, empty, or did not match any recognised
	/// grammar.
	#[error("Invalid OpenTSDB query: 'start' is missing or could not be parsed: {0}")]
	InvalidStart(String),
}



//		Structs

//		Query
/// A parsed, normalised OpenTSDB query document.
///
/// Constructed once from an inbound POST body, consulted by the rule engine,
/// and serialised back out (with the two reserved directives set) for
/// forwarding to the backend.
#[derive(Clone, Debug)]
pub struct Query {
	/// The parsed JSON document, mutated once on construction to add the
	/// `showStats`/`showQuery` directives.
	doc:   Map<String, JsonValue>,

	/// The query's fingerprint: hex MD5 of the canonical JSON with
	/// time-window keys removed.
	id:    String,

	/// Historical statistics for this query's interval bucket, attached
	/// after a [`StatsStore`](crate::stats_store::StatsStore) lookup. `None`
	/// until loaded, and still `None` if nothing was found.
	stats: Option<IntervalStats>,
}

impl Query {
	//		parse
	/// Parses an inbound query body.
	///
	/// # Errors
	///
	/// Returns [`QueryError`] if the body is not valid JSON, if `queries` is
	/// missing or empty, or if `start` is missing or does not match a
	/// recognised grammar.
	pub fn parse(body: &[u8]) -> Result<Self, QueryError> {
		let value: JsonValue    = serde_json::from_slice(body)?;
		let mut doc             = value.as_object().cloned().unwrap_or_default();
		let has_queries         = doc.get("queries").and_then(JsonValue::as_array).is_some_and(|q| !q.is_empty());
		if !has_queries {
			return Err(QueryError::MissingQueries);
		}
		let start_present = doc.get("start").is_some_and(|v| !matches!(v, JsonValue::Null));
		if !start_present {
			return Err(QueryError::InvalidStart("missing".to_owned()));
		}
		// Validate the start grammar eagerly so construction fails fast.
		let id = Self::fingerprint_of(&doc);
		let _  = Self::parse_start_ts(&doc)?;
		let _  = doc.insert("showStats".to_owned(), JsonValue::Bool(true));
		let _  = doc.insert("showQuery".to_owned(), JsonValue::Bool(true));
		Ok(Self { doc, id, stats: None })
	}

	//		id
	/// The query's fingerprint.
	#[must_use]
	pub fn id(&self) -> &str {
		&self.id
	}

	//		fingerprint
	/// The query's fingerprint: hex MD5 of the canonical JSON serialisation
	/// of the document, with `start`, `end`, `timezone`, `options`, and
	/// `padding` removed, and object keys sorted recursively.
	#[must_use]
	pub fn fingerprint(&self) -> String {
		self.id.clone()
	}

	//		fingerprint_of
	/// Computes the fingerprint for a raw document, before it is wrapped in
	/// a [`Query`]. Used both by [`parse()`](Self::parse) and by tests that
	/// need to assert fingerprint invariance directly.
	#[must_use]
	pub fn fingerprint_of(doc: &Map<String, JsonValue>) -> String {
		let mut trimmed = doc.clone();
		for key in FINGERPRINT_EXCLUDED_KEYS {
			let _ = trimmed.remove(key);
		}
		let canonical = canonicalize(&JsonValue::Object(trimmed));
		let mut hasher = Md5::new();
		hasher.update(canonical.as_bytes());
		hex_encode(&hasher.finalize())
	}

	//		start_ts
	/// The query's start time, in whole seconds since the epoch.
	///
	/// # Errors
	///
	/// Returns [`QueryError::InvalidStart`] if `start` cannot be interpreted.
	pub fn start_ts(&self) -> Result<i64, QueryError> {
		Self::parse_start_ts(&self.doc)
	}

	//		end_ts
	/// The query's end time, in whole seconds since the epoch, defaulting to
	/// the current time if `end` is absent.
	#[must_use]
	pub fn end_ts(&self) -> i64 {
		match self.doc.get("end") {
			Some(value) => parse_absolute_ts(value).unwrap_or_else(|| Utc::now().timestamp()),
			None        => Utc::now().timestamp(),
		}
	}

	//		interval_minutes
	/// The interval bucket size, in whole minutes: `floor((end - start) / 60)`.
	///
	/// # Errors
	///
	/// Returns [`QueryError::InvalidStart`] if `start` cannot be interpreted.
	pub fn interval_minutes(&self) -> Result<i64, QueryError> {
		let start = self.start_ts()?;
		let end   = self.end_ts();
		Ok((end.saturating_sub(start)).div_euclid(60))
	}

	//		bucket_key
	/// The interval-stats bucket key: `id + "_" + interval_minutes`.
	///
	/// # Errors
	///
	/// Returns [`QueryError::InvalidStart`] if `start` cannot be interpreted.
	pub fn bucket_key(&self) -> Result<String, QueryError> {
		Ok(format!("{}_{}", self.id, self.interval_minutes()?))
	}

	//		metric_names
	/// The `metric` field of each sub-query, in order.
	#[must_use]
	pub fn metric_names(&self) -> Vec<String> {
		self.doc
			.get("queries")
			.and_then(JsonValue::as_array)
			.map(|queries| {
				queries
					.iter()
					.filter_map(|q| q.get("metric").and_then(JsonValue::as_str).map(ToOwned::to_owned))
					.collect()
			})
			.unwrap_or_default()
	}

	//		sub_queries
	/// The raw `queries` array entries, for rules that need more than the
	/// metric name (aggregator, tags, filters).
	#[must_use]
	pub fn sub_queries(&self) -> &[JsonValue] {
		self.doc
			.get("queries")
			.and_then(JsonValue::as_array)
			.map_or(&[], Vec::as_slice)
	}

	//		stats
	/// The historical statistics attached to this query, if any were loaded.
	#[must_use]
	pub fn stats(&self) -> Option<&IntervalStats> {
		self.stats.as_ref()
	}

	//		attach_stats
	/// Attaches historical statistics loaded from the stats store.
	pub fn attach_stats(&mut self, stats: Option<IntervalStats>) {
		self.stats = stats;
	}

	//		to_outbound_json
	/// Serialises the query for forwarding to the backend. The `showStats`
	/// and `showQuery` directives are always present, since they are set
	/// once during [`parse()`](Self::parse) and never removed.
	///
	/// # Errors
	///
	/// Returns a [`serde_json::Error`] if serialisation somehow fails (this
	/// can only happen for non-finite floats smuggled into the document).
	pub fn to_outbound_json(&self) -> Result<Vec<u8>, serde_json::Error> {
		serde_json::to_vec(&JsonValue::Object(self.doc.clone()))
	}

	//		canonical_json
	/// The canonical JSON serialisation of the full document (including the
	/// time-window fields), used as the stored `id + "_query"` record.
	#[must_use]
	pub fn canonical_json(&self) -> String {
		canonicalize(&JsonValue::Object(self.doc.clone()))
	}

	//		parse_start_ts
	/// Shared implementation behind [`start_ts()`](Self::start_ts) and the
	/// eager validation in [`parse()`](Self::parse).
	fn parse_start_ts(doc: &Map<String, JsonValue>) -> Result<i64, QueryError> {
		let start = doc.get("start").ok_or_else(|| QueryError::InvalidStart("missing".to_owned()))?;
		if let Some(ts) = parse_absolute_ts(start) {
			return Ok(ts);
		}
		if let Some(text) = start.as_str() {
			if let Some(captures) = RELATIVE_START.captures(text) {
				#[expect(clippy::unwrap_used, reason = "The capture group is constrained to \\d+ by the regex")]
				let value: i64 = captures.get(1).unwrap().as_str().parse().unwrap_or(0);
				#[expect(clippy::unwrap_used, reason = "The capture group is required by the regex")]
				let unit = captures.get(2).unwrap().as_str();
				let seconds = relative_unit_seconds(unit, value);
				return Ok(Utc::now().timestamp().saturating_sub(seconds));
			}
		}
		Err(QueryError::InvalidStart(format!("{start}")))
	}
}



//		Functions

//		parse_absolute_ts
/// Interprets a JSON value as an absolute timestamp, in seconds, if it looks
/// like one (a bare integer, or a numeric string). Values with more than 12
/// digits are treated as milliseconds.
fn parse_absolute_ts(value: &JsonValue) -> Option<i64> {
	let digits = match value {
		JsonValue::Number(n) => n.to_string(),
		JsonValue::String(s) if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() => s.clone(),
		_ => return None,
	};
	let raw: i64 = digits.parse().ok()?;
	if digits.len() > 12 {
		Some(raw.div_euclid(1000))
	} else {
		Some(raw)
	}
}

//		relative_unit_seconds
/// Converts an OpenTSDB relative-time unit and magnitude into seconds.
/// `n` (months) expands to 30 days and `y` (years) to 365 days, per the
/// OpenTSDB date grammar; other units map literally.
fn relative_unit_seconds(unit: &str, value: i64) -> i64 {
	match unit {
		"ms" => value.div_euclid(1000),
		"s"  => value,
		"m"  => value.saturating_mul(60),
		"h"  => value.saturating_mul(3_600),
		"d"  => value.saturating_mul(SECONDS_PER_DAY),
		"w"  => value.saturating_mul(7).saturating_mul(SECONDS_PER_DAY),
		"n"  => value.saturating_mul(30).saturating_mul(SECONDS_PER_DAY),
		"y"  => value.saturating_mul(365).saturating_mul(SECONDS_PER_DAY),
		_    => 0,
	}
}

//		canonicalize
/// Serialises a JSON value deterministically: object keys are sorted
/// recursively and no insignificant whitespace is emitted.
#[must_use]
pub fn canonicalize(value: &JsonValue) -> String {
	let mut out = String::new();
	write_canonical(value, &mut out);
	out
}

//		write_canonical
/// Recursive helper for [`canonicalize()`].
fn write_canonical(value: &JsonValue, out: &mut String) {
	match value {
		JsonValue::Object(map) => {
			let mut keys: Vec<&String> = map.keys().collect();
			keys.sort_unstable();
			out.push('{');
			for (i, key) in keys.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				#[expect(clippy::unwrap_used, reason = "Serialising a String to JSON cannot fail")]
				out.push_str(&serde_json::to_string(key).unwrap());
				out.push(':');
				#[expect(clippy::indexing_slicing, reason = "key was just obtained from map.keys()")]
				write_canonical(&map[*key], out);
			}
			out.push('}');
		},
		JsonValue::Array(items) => {
			out.push('[');
			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				write_canonical(item, out);
			}
			out.push(']');
		},
		#[expect(clippy::unwrap_used, reason = "Serialising a scalar JSON value cannot fail")]
		other => out.push_str(&serde_json::to_string(other).unwrap()),
	}
}

//		hex_encode
/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
	use core::fmt::Write as _;
	let mut out = String::with_capacity(bytes.len().saturating_mul(2));
	for byte in bytes {
		#[expect(clippy::unwrap_used, reason = "Writing to a String cannot fail")]
		write!(out, "{byte:02x}").unwrap();
	}
	out
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	fn payload(start: &str) -> Vec<u8> {
		format!(
			r#"{{"start":"{start}","queries":[{{"metric":"mymetric","aggregator":"sum","tags":{{"host":"*"}}}}]}}"#,
		).into_bytes()
	}

	#[test]
	fn missing_queries_is_rejected() {
		let body = br#"{"start":"1h-ago","queries":[]}"#;
		assert!(matches!(Query::parse(body), Err(QueryError::MissingQueries)));
	}

	#[test]
	fn missing_start_is_rejected() {
		let body = br#"{"queries":[{"metric":"m"}]}"#;
		assert!(matches!(Query::parse(body), Err(QueryError::InvalidStart(_))));
	}

	#[test]
	fn invalid_start_grammar_is_rejected() {
		let body = payload("not-a-time");
		assert!(matches!(Query::parse(&body), Err(QueryError::InvalidStart(_))));
	}

	#[test]
	fn directives_are_set_on_parse() {
		let body  = payload("1h-ago");
		let query = Query::parse(&body).expect("valid query should parse");
		let out   = query.to_outbound_json().expect("serialisation should succeed");
		let value: JsonValue = serde_json::from_slice(&out).expect("output should be valid JSON");
		assert_eq!(value.get("showStats"), Some(&JsonValue::Bool(true)));
		assert_eq!(value.get("showQuery"), Some(&JsonValue::Bool(true)));
	}

	#[test]
	fn fingerprint_is_deterministic() {
		let a = Query::parse(&payload("1h-ago")).expect("valid");
		let b = Query::parse(&payload("1h-ago")).expect("valid");
		assert_eq!(a.fingerprint(), b.fingerprint(), "identical queries must fingerprint identically");
	}

	#[test]
	fn fingerprint_ignores_time_window_fields() {
		let a = Query::parse(&payload("1h-ago")).expect("valid");
		let b = Query::parse(&payload("2d-ago")).expect("valid");
		assert_eq!(a.fingerprint(), b.fingerprint(), "fingerprint must be stable across time-window shifts");
	}

	#[test]
	fn fingerprint_ignores_key_order() {
		let a = br#"{"start":"1h-ago","queries":[{"metric":"m","aggregator":"sum"}]}"#;
		let b = br#"{"queries":[{"aggregator":"sum","metric":"m"}],"start":"1h-ago"}"#;
		let qa = Query::parse(a).expect("valid");
		let qb = Query::parse(b).expect("valid");
		assert_eq!(qa.fingerprint(), qb.fingerprint(), "fingerprint must not depend on JSON key order");
	}

	#[test]
	fn milliseconds_start_is_detected_by_length() {
		let query = Query::parse(br#"{"start":1623619500123,"queries":[{"metric":"m"}]}"#).expect("valid");
		assert_eq!(query.start_ts().expect("start should parse"), 1_623_619_500, "values over 12 digits should be treated as milliseconds");
	}

	#[test]
	fn seconds_start_is_used_directly() {
		let query = Query::parse(br#"{"start":1623619500,"queries":[{"metric":"m"}]}"#).expect("valid");
		assert_eq!(query.start_ts().expect("start should parse"), 1_623_619_500);
	}

	#[test]
	fn metric_names_preserve_order() {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"a"},{"metric":"b"},{"metric":"c"}]}"#;
		let query = Query::parse(body).expect("valid");
		assert_eq!(query.metric_names(), vec!["a", "b", "c"]);
	}

	#[test]
	fn canonicalize_sorts_nested_keys() {
		let value: JsonValue = serde_json::from_str(r#"{"b":1,"a":{"d":1,"c":2}}"#).expect("valid json");
		assert_eq!(canonicalize(&value), r#"{"a":{"c":2,"d":1},"b":1}"#);
	}
}
