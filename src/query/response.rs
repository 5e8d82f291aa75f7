//! Decoding of OpenTSDB responses, including summary-statistics extraction.



//		Packages

use flate2::{
	Compression,
	read::{GzDecoder, ZlibDecoder},
	write::{GzEncoder, ZlibEncoder},
};
use serde_json::{Map, Value as JsonValue};
use std::io::{Read as _, Write as _};
use thiserror::Error as ThisError;



//		Enums

//		ResponseError
/// Errors raised while decoding a backend response body.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum ResponseError {
	/// The body was not a valid JSON array.
	#[error("Could not parse OpenTSDB response: {0}")]
	InvalidJson(#[from] serde_json::Error),

	/// The declared `Content-Encoding` was not one this proxy understands.
	#[error("Unknown Content-Encoding: {0}")]
	UnknownEncoding(String),

	/// Decompression of the body failed.
	#[error("Could not decode response body: {0}")]
	DecodeFailed(String),
}



//		Structs

//		Response
/// A parsed OpenTSDB query response.
///
/// Holds the per-series entries to re-emit to the client, plus a flattened
/// `summary` map extracted from the trailing `statsSummary` entry, if one was
/// present.
#[derive(Clone, Debug, Default)]
pub struct Response {
	/// The per-series entries, in order, with the `statsSummary` entry (if
	/// any) removed.
	series:  Vec<JsonValue>,

	/// Top-level scalar fields copied from the trailing `statsSummary`
	/// object. Nested `queryIdx_*` blocks are discarded. Empty if no
	/// `statsSummary` entry was present; this is not an error.
	summary: Map<String, JsonValue>,
}

impl Response {
	//		parse
	/// Parses a backend response body (already content-decoded).
	///
	/// # Errors
	///
	/// Returns [`ResponseError::InvalidJson`] if the body is not a JSON
	/// array.
	pub fn parse(body: &[u8]) -> Result<Self, ResponseError> {
		let value: JsonValue = serde_json::from_slice(body)?;
		let mut items         = value.as_array().cloned().unwrap_or_default();
		let mut summary       = Map::new();
		if let Some(last) = items.last() {
			if let Some(stats_summary) = last.get("statsSummary").and_then(JsonValue::as_object) {
				for (key, val) in stats_summary {
					if !matches!(val, JsonValue::Object(_)) {
						let _ = summary.insert(key.clone(), val.clone());
					}
				}
				let _ = items.pop();
			}
		}
		Ok(Self { series: items, summary })
	}

	//		summary
	/// The flattened summary fields extracted from `statsSummary`, if any.
	#[must_use]
	pub fn summary(&self) -> &Map<String, JsonValue> {
		&self.summary
	}

	//		emitted_dps
	/// The `emittedDPs` field from the summary, if present and numeric.
	#[must_use]
	pub fn emitted_dps(&self) -> Option<i64> {
		self.summary.get("emittedDPs").and_then(JsonValue::as_i64)
	}

	//		to_client_json
	/// Re-emits the retained series entries, with the `statsSummary` entry
	/// stripped.
	///
	/// # Errors
	///
	/// Returns a [`serde_json::Error`] if serialisation somehow fails.
	pub fn to_client_json(&self) -> Result<Vec<u8>, serde_json::Error> {
		serde_json::to_vec(&JsonValue::Array(self.series.clone()))
	}
}



//		Functions

//		decode_content_body
/// Decodes a response body according to its `Content-Encoding`.
///
/// # Errors
///
/// Returns [`ResponseError::UnknownEncoding`] for an encoding this proxy does
/// not recognise, or [`ResponseError::DecodeFailed`] if decompression fails.
pub fn decode_content_body(data: &[u8], encoding: Option<&str>) -> Result<Vec<u8>, ResponseError> {
	match encoding.unwrap_or("identity") {
		"identity"      => Ok(data.to_vec()),
		"gzip" | "x-gzip" => {
			let mut decoder = GzDecoder::new(data);
			let mut out     = Vec::new();
			decoder.read_to_end(&mut out).map_err(|e| ResponseError::DecodeFailed(e.to_string()))?;
			Ok(out)
		},
		"deflate"       => {
			let mut decoder = ZlibDecoder::new(data);
			let mut out     = Vec::new();
			decoder.read_to_end(&mut out).map_err(|e| ResponseError::DecodeFailed(e.to_string()))?;
			Ok(out)
		},
		other           => Err(ResponseError::UnknownEncoding(other.to_owned())),
	}
}

//		encode_content_body
/// Encodes a (re-packaged) body to match an original `Content-Encoding`, so
/// that a transformed body (e.g. the Grafana-style 400 re-package) preserves
/// the encoding the client would otherwise have received.
///
/// # Errors
///
/// Returns [`ResponseError::UnknownEncoding`] for an encoding this proxy does
/// not recognise, or [`ResponseError::DecodeFailed`] if compression fails.
pub fn encode_content_body(data: &[u8], encoding: Option<&str>) -> Result<Vec<u8>, ResponseError> {
	match encoding.unwrap_or("identity") {
		"identity"      => Ok(data.to_vec()),
		"gzip" | "x-gzip" => {
			let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
			encoder.write_all(data).map_err(|e| ResponseError::DecodeFailed(e.to_string()))?;
			encoder.finish().map_err(|e| ResponseError::DecodeFailed(e.to_string()))
		},
		"deflate"       => {
			let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
			encoder.write_all(data).map_err(|e| ResponseError::DecodeFailed(e.to_string()))?;
			encoder.finish().map_err(|e| ResponseError::DecodeFailed(e.to_string()))
		},
		other           => Err(ResponseError::UnknownEncoding(other.to_owned())),
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_array_parses_with_empty_summary() {
		let response = Response::parse(b"[]").expect("empty array should parse");
		assert!(response.summary().is_empty(), "no statsSummary entry is not an error");
	}

	#[test]
	fn stats_summary_is_extracted_and_stripped() {
		let body = br#"[
			{"metric":"m","dps":{}},
			{"statsSummary":{"emittedDPs":42,"avgHBaseTime":1.5,"queryIdx_0":{"emittedDPs":42}}}
		]"#;
		let response = Response::parse(body).expect("should parse");
		assert_eq!(response.emitted_dps(), Some(42));
		assert_eq!(response.summary().get("avgHBaseTime").and_then(JsonValue::as_f64), Some(1.5));
		assert!(!response.summary().contains_key("queryIdx_0"), "nested queryIdx_* blocks must be discarded");

		let client_json: JsonValue = serde_json::from_slice(&response.to_client_json().expect("should serialise")).expect("valid json");
		assert_eq!(client_json.as_array().expect("array").len(), 1, "statsSummary entry must be stripped from the client response");
	}

	#[test]
	fn roundtrip_is_idempotent() {
		let body      = br#"[{"metric":"m"},{"statsSummary":{"emittedDPs":1}}]"#;
		let first     = Response::parse(body).expect("should parse");
		let reemitted = first.to_client_json().expect("should serialise");
		let second    = Response::parse(&reemitted).expect("should re-parse");
		assert!(second.summary().is_empty(), "re-parsing the stripped body should find no further statsSummary");
		assert_eq!(first.to_client_json().expect("ok"), second.to_client_json().expect("ok"));
	}

	#[test]
	fn identity_encoding_is_passthrough() {
		let data    = b"hello world";
		let decoded = decode_content_body(data, Some("identity")).expect("should decode");
		assert_eq!(decoded, data);
	}

	#[test]
	fn gzip_roundtrips() {
		let data     = b"some response body";
		let encoded  = encode_content_body(data, Some("gzip")).expect("should encode");
		let decoded  = decode_content_body(&encoded, Some("gzip")).expect("should decode");
		assert_eq!(decoded, data);
	}

	#[test]
	fn unknown_encoding_is_rejected() {
		let err = decode_content_body(b"data", Some("br"));
		assert!(matches!(err, Err(ResponseError::UnknownEncoding(_))));
	}
}
