//! The abstract persistent statistics store, and the historical data shapes
//! it holds.
//!
//! A key/value store offering strings, lists, hashes, sorted sets, TTLs, and
//! atomic hash-field increments. Two implementations are provided: [`memory`]
//! (an in-process store for tests and safe-mode dry runs) and [`redis`] (the
//! production backend, built on `fred`).



//		Modules

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;



//		Packages

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use thiserror::Error as ThisError;



//		Enums

//		StoreError
/// Errors raised by a [`StatsStore`] operation.
///
/// Every caller treats these as "stats unavailable" rather than surfacing
/// them to the client; this type exists so each backend can report what went
/// wrong to the logs.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum StoreError {
	/// The backend could not be reached or returned a transport-level error.
	#[error("Statistics store unavailable: {0}")]
	Unavailable(String),

	/// A stored value could not be decoded into the expected shape.
	#[error("Malformed statistics record: {0}")]
	Malformed(String),
}



//		Structs

//		IntervalStats
/// Per-query-identity, per-interval-bucket historical statistics, stored as
/// a hash under the bucket key `id + "_" + interval_minutes`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct IntervalStats {
	/// The duration, in seconds, of the most recent attempt (success or
	/// timeout).
	pub duration:         f64,

	/// The timestamp, in seconds, of the most recent attempt.
	pub timestamp:        i64,

	/// The number of datapoints emitted by the most recent *successful*
	/// (non-timeout) attempt.
	pub emitted_dps:      Option<i64>,

	/// The timestamp, in seconds, of the first-ever attempt for this
	/// bucket. Set once and never overwritten.
	pub first_occurrence: i64,

	/// The total number of `save_stats` calls for this bucket.
	pub total_counter:    u64,

	/// The number of `save_stats` calls that recorded a timeout.
	pub timeout_counter:  u64,

	/// The timestamp, in seconds, of the most recent timeout, if any.
	pub timeout_last:     Option<i64>,
}

//		StatsRecord
/// A single entry in a query identity's `_stats` log list.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StatsRecord {
	/// The timestamp, in seconds, the record was saved at.
	pub timestamp: i64,

	/// The query's start time, in seconds.
	pub start:     i64,

	/// The query's end time, in seconds.
	pub end:       i64,

	/// The duration, in seconds, of the attempt.
	pub duration:  f64,

	/// The flattened `statsSummary` fields, empty on timeout.
	pub summary:   Map<String, JsonValue>,

	/// Whether this attempt timed out.
	pub timeout:   bool,
}



//		Traits

//§		StatsStore
/// The abstract persistence interface backing all historical data.
///
/// All operations are best-effort from the caller's perspective: a failure
/// never propagates to the client, only to the logs.
#[async_trait]
pub trait StatsStore: Send + Sync {
	//		ping
	/// Checks connectivity to the backing store.
	async fn ping(&self) -> Result<(), StoreError>;

	//		get
	/// Reads a string value.
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	//		set
	/// Writes a string value, optionally with a TTL in seconds. Implementations
	/// set the key only if it does not already exist (`SETNX`-like), matching
	/// the set-once semantics the `id + "_query"` record requires.
	async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), StoreError>;

	//		exists
	/// Checks whether a key exists (of any type).
	async fn exists(&self, key: &str) -> Result<bool, StoreError>;

	//		rpush
	/// Appends a value to a list, creating it if absent.
	async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError>;

	//		ttl
	/// Returns the remaining TTL for a key, in seconds, or `None` if the key
	/// has no expiry (or does not exist).
	async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

	//		expire
	/// Sets a key's TTL, in seconds.
	async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError>;

	//		hexists
	/// Checks whether a hash field exists.
	async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError>;

	//		hset
	/// Writes (and overwrites) one or more hash fields.
	async fn hset(&self, key: &str, fields: &HashMap<String, String>) -> Result<(), StoreError>;

	//		hgetall
	/// Reads every field of a hash.
	async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

	//		hincrby
	/// Atomically increments an integer hash field, creating it (starting
	/// from zero) if absent.
	async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

	//		zscore
	/// Reads a sorted-set member's score.
	async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError>;

	//		zadd
	/// Sets a sorted-set member's score (creating the set if absent).
	async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

	//		zrange_withscores_desc
	/// Reads every member of a sorted set, ordered by descending score.
	async fn zrange_withscores_desc(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError>;
}



//		Functions

//		interval_stats_from_hash
/// Decodes a hash's fields into an [`IntervalStats`] record. Missing fields
/// default to their zero value, matching a freshly-`hincrby`'d but
/// otherwise-unwritten hash.
#[must_use]
pub fn interval_stats_from_hash(fields: &HashMap<String, String>) -> IntervalStats {
	IntervalStats {
		duration:         fields.get("duration").and_then(|v| v.parse().ok()).unwrap_or_default(),
		timestamp:        fields.get("timestamp").and_then(|v| v.parse().ok()).unwrap_or_default(),
		emitted_dps:      fields.get("emittedDPs").and_then(|v| v.parse().ok()),
		first_occurrence: fields.get("first_occurrence").and_then(|v| v.parse().ok()).unwrap_or_default(),
		total_counter:    fields.get("total_counter").and_then(|v| v.parse().ok()).unwrap_or_default(),
		timeout_counter:  fields.get("timeout_counter").and_then(|v| v.parse().ok()).unwrap_or_default(),
		timeout_last:     fields.get("timeout_last").and_then(|v| v.parse().ok()),
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn interval_stats_from_empty_hash_is_default() {
		let stats = interval_stats_from_hash(&HashMap::new());
		assert_eq!(stats, IntervalStats::default());
	}

	#[test]
	fn interval_stats_parses_known_fields() {
		let mut fields = HashMap::new();
		let _ = fields.insert("duration".to_owned(), "1.5".to_owned());
		let _ = fields.insert("timestamp".to_owned(), "100".to_owned());
		let _ = fields.insert("emittedDPs".to_owned(), "42".to_owned());
		let stats = interval_stats_from_hash(&fields);
		assert!((stats.duration - 1.5).abs() < f64::EPSILON);
		assert_eq!(stats.timestamp, 100);
		assert_eq!(stats.emitted_dps, Some(42));
	}
}
