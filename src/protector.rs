//! Orchestrates the per-request admission decision and the historical-stats
//! feedback loop that informs it.



//		Packages

use chrono::{Datelike, Timelike, Utc};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

use crate::config::Config;
use crate::errors::ProcessError;
use crate::guard::{Guard, Verdict};
use crate::query::{Query, Response};
use crate::stats_store::{StatsRecord, StatsStore, interval_stats_from_hash};
use crate::telemetry::Telemetry;



//		Enums

//		TopKind
/// Which leaderboard to query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TopKind {
	/// The `top_duration_{day}_{hour}` leaderboards.
	Duration,

	/// The `top_dps_{day}_{hour}` leaderboards.
	Dps,
}

impl TopKind {
	/// The leaderboard key prefix for this kind.
	const fn prefix(self) -> &'static str {
		match self {
			Self::Duration => "top_duration",
			Self::Dps      => "top_dps",
		}
	}
}



//		Structs

//		Protector
/// Owns the block/allow lists, the [`Guard`], and the [`StatsStore`]
/// connection, and orchestrates the decision and stats-recording lifecycle.
///
/// Constructed once at startup and shared (via `Arc`, see [`crate::state::AppState`])
/// across every request-handling task: heavy shared state constructed once
/// and injected as a value.
pub struct Protector {
	/// Compiled `blockedlist` patterns.
	blockedlist: Vec<Regex>,

	/// Compiled `allowedlist` patterns.
	allowedlist: Vec<Regex>,

	/// The ordered rule set.
	guard:       Guard,

	/// The persistent statistics store.
	store:       Arc<dyn StatsStore>,

	/// The TTL, in seconds, applied to newly-created statistics keys. Zero
	/// disables expiration.
	expire:      u64,

	/// The metrics recorder.
	telemetry:   Telemetry,
}

impl Protector {
	//		new
	/// Builds a [`Protector`] from the loaded configuration.
	///
	/// # Errors
	///
	/// Returns [`ProcessError::InvalidPattern`] if any `blockedlist` or
	/// `allowedlist` entry fails to compile — this is a fail-fast startup
	/// error, unlike per-rule load failures.
	pub fn new(config: &Config, store: Arc<dyn StatsStore>, telemetry: Telemetry) -> Result<Self, ProcessError> {
		let blockedlist = config.blockedlist.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?;
		let allowedlist = config.allowedlist.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?;
		Ok(Self {
			blockedlist,
			allowedlist,
			guard: Guard::new(&config.rules),
			store,
			expire: config.db.expire,
			telemetry,
		})
	}

	//		check
	/// Decides whether `query` may proceed: per-metric metering, blocklist,
	/// allowlist, stats loading, then [`Guard`] evaluation.
	pub async fn check(&self, query: &mut Query) -> Verdict {
		let metric_names = query.metric_names();
		for metric in &metric_names {
			self.telemetry.record_metric_queried(metric);
		}

		if !self.blockedlist.is_empty() {
			for pattern in &self.blockedlist {
				if metric_names.iter().any(|metric| left_anchored_match(pattern, metric)) {
					return Verdict::Deny { rule: "blockedlist".to_owned(), msg: format!("Metric matches blocked pattern '{pattern}'") };
				}
			}
		}

		if !self.allowedlist.is_empty() && metric_names.iter().all(|metric| self.allowedlist.iter().any(|pattern| left_anchored_match(pattern, metric))) {
			self.telemetry.record_allowedlist_matched();
			return Verdict::Allow;
		}

		match query.bucket_key() {
			Ok(bucket) => {
				match self.load_stats(&bucket).await {
					Ok(stats) => query.attach_stats(stats),
					Err(error) => warn!("Could not load stats for bucket '{bucket}': {error}"),
				}
			},
			Err(error) => warn!("Could not compute bucket key: {error}"),
		}

		self.guard.is_allowed(query)
	}

	//		load_stats
	/// Reads the [`IntervalStats`](crate::stats_store::IntervalStats) hash for
	/// a bucket key, if the store is reachable and the hash exists.
	async fn load_stats(&self, bucket: &str) -> Result<Option<crate::stats_store::IntervalStats>, crate::stats_store::StoreError> {
		self.store.ping().await?;
		if !self.store.exists(bucket).await? {
			return Ok(None);
		}
		let fields = self.store.hgetall(bucket).await?;
		Ok(Some(interval_stats_from_hash(&fields)))
	}

	//		save_stats
	/// Records the outcome of a completed (or timed-out) backend exchange.
	///
	/// Best-effort throughout: a `ping` failure aborts the save silently
	/// (logged).
	pub async fn save_stats(&self, query: &Query, response: Option<&Response>, duration: f64, timeout: bool) {
		if let Err(error) = self.store.ping().await {
			error!("Statistics store unreachable, dropping save_stats: {error}");
			return;
		}

		let Ok(bucket) = query.bucket_key() else {
			warn!("Could not compute bucket key for save_stats; skipping");
			return;
		};
		let now = Utc::now().timestamp();

		if let Err(error) = self.save_query_document(query).await {
			warn!("Could not save query document for '{}': {error}", query.id());
		}

		if let Err(error) = self.append_stats_record(query, response, duration, timeout, now).await {
			warn!("Could not append stats record for '{}': {error}", query.id());
		}

		if let Err(error) = self.upsert_interval_stats(&bucket, response, duration, timeout, now).await {
			warn!("Could not update interval stats for bucket '{bucket}': {error}");
		}

		let (day, hour) = local_day_hour();
		if let Err(error) = self.update_leaderboard(TopKind::Duration, day, hour, &bucket, duration).await {
			warn!("Could not update duration leaderboard: {error}");
		}
		if !timeout {
			if let Some(dps) = response.and_then(Response::emitted_dps) {
				if let Err(error) = self.update_leaderboard(TopKind::Dps, day, hour, &bucket, dps_as_f64(dps)).await {
					warn!("Could not update datapoints leaderboard: {error}");
				}
			}
		}
	}

	//		save_query_document
	/// Sets the `id + "_query"` record, once.
	async fn save_query_document(&self, query: &Query) -> Result<(), crate::stats_store::StoreError> {
		let key = format!("{}_query", query.id());
		self.store.set(&key, &query.canonical_json(), self.ttl()).await
	}

	//		append_stats_record
	/// Appends to the `id + "_stats"` list, applying the TTL only if the list
	/// did not already exist.
	async fn append_stats_record(&self, query: &Query, response: Option<&Response>, duration: f64, timeout: bool, now: i64) -> Result<(), crate::stats_store::StoreError> {
		let key           = format!("{}_stats", query.id());
		let already_exists = self.store.exists(&key).await?;
		let record = StatsRecord {
			timestamp: now,
			start:     query.start_ts().unwrap_or(now),
			end:       query.end_ts(),
			duration,
			summary:   response.map_or_else(Map::new, |r| r.summary().clone()),
			timeout,
		};
		let serialised = serde_json::to_string(&record).unwrap_or_default();
		self.store.rpush(&key, &serialised).await?;
		if !already_exists {
			if let Some(ttl) = self.ttl() {
				self.store.expire(&key, ttl).await?;
			}
		}
		Ok(())
	}

	//		upsert_interval_stats
	/// Updates the bucket's [`IntervalStats`](crate::stats_store::IntervalStats)
	/// hash in place, preserving `first_occurrence` and accumulating the
	/// counters.
	async fn upsert_interval_stats(&self, bucket: &str, response: Option<&Response>, duration: f64, timeout: bool, now: i64) -> Result<(), crate::stats_store::StoreError> {
		let already_exists = self.store.exists(bucket).await?;
		let mut fields = HashMap::from([
			("duration".to_owned(), duration.to_string()),
			("timestamp".to_owned(), now.to_string()),
		]);
		if timeout {
			let _ = fields.insert("timeout_last".to_owned(), now.to_string());
		} else if let Some(dps) = response.and_then(Response::emitted_dps) {
			let _ = fields.insert("emittedDPs".to_owned(), dps.to_string());
		}
		if !self.store.hexists(bucket, "first_occurrence").await? {
			let _ = fields.insert("first_occurrence".to_owned(), now.to_string());
		}
		self.store.hset(bucket, &fields).await?;
		let _ = self.store.hincrby(bucket, "total_counter", 1).await?;
		if timeout {
			let _ = self.store.hincrby(bucket, "timeout_counter", 1).await?;
		}
		if !already_exists {
			if let Some(ttl) = self.ttl() {
				self.store.expire(bucket, ttl).await?;
			}
		}
		Ok(())
	}

	//		update_leaderboard
	/// Applies the monotonic-max update rule to a leaderboard sorted set.
	async fn update_leaderboard(&self, kind: TopKind, day: String, hour: u32, member: &str, score: f64) -> Result<(), crate::stats_store::StoreError> {
		let key            = leaderboard_key(kind, &day, hour);
		let already_exists = self.store.exists(&key).await?;
		let current        = self.store.zscore(&key, member).await?;
		if current.is_none_or(|existing| score > existing) {
			self.store.zadd(&key, member, score).await?;
		}
		if !already_exists {
			if let Some(ttl) = self.ttl() {
				self.store.expire(&key, ttl).await?;
			}
		}
		Ok(())
	}

	//		get_top
	/// Reads the `kind` leaderboard for every hour from `0` to the current
	/// hour of the current (local) day, returning `{hour: [[member, score], ...]}`.
	pub async fn get_top(&self, kind: TopKind) -> JsonValue {
		let (day, current_hour) = local_day_hour();
		let mut out = Map::new();
		for hour in 0..=current_hour {
			let key     = leaderboard_key(kind, &day, hour);
			let ranking = self.store.zrange_withscores_desc(&key).await.unwrap_or_default();
			let entries: Vec<JsonValue> = ranking
				.into_iter()
				.map(|(member, score)| JsonValue::Array(vec![JsonValue::from(member), JsonValue::from(score)]))
				.collect();
			let _ = out.insert(hour.to_string(), JsonValue::Array(entries));
		}
		JsonValue::Object(out)
	}

	//		ttl
	/// The configured TTL, or `None` if expiration is disabled.
	const fn ttl(&self) -> Option<u64> {
		if self.expire == 0 { None } else { Some(self.expire) }
	}
}



//		Functions

//		left_anchored_match
/// Whether `pattern` matches `text` starting at position zero, mirroring
/// Python's `re.match()` semantics rather than Rust regex's default
/// anywhere-in-string `is_match()`.
fn left_anchored_match(pattern: &Regex, text: &str) -> bool {
	pattern.find(text).is_some_and(|m| m.start() == 0)
}

//		local_day_hour
/// The current local calendar day (as `YYYYMMDD`) and hour, used to key the
/// leaderboard sorted sets.
fn local_day_hour() -> (String, u32) {
	let now = chrono::Local::now();
	(format!("{:04}{:02}{:02}", now.year(), now.month(), now.day()), now.hour())
}

//		leaderboard_key
/// Builds a leaderboard sorted-set key.
fn leaderboard_key(kind: TopKind, day: &str, hour: u32) -> String {
	format!("{}_{day}_{hour}", kind.prefix())
}

//		dps_as_f64
/// Converts an emitted-datapoints count to the `f64` score type leaderboards
/// use.
#[expect(clippy::cast_precision_loss, reason = "datapoint counts are far below f64's exact-integer range")]
const fn dps_as_f64(dps: i64) -> f64 {
	dps as f64
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stats_store::MemoryStore;

	fn config_with(blockedlist: Vec<String>, allowedlist: Vec<String>) -> Config {
		Config { blockedlist, allowedlist, ..Config::default() }
	}

	fn protector(config: &Config) -> Protector {
		Protector::new(config, Arc::new(MemoryStore::new()), Telemetry::for_test()).expect("valid patterns")
	}

	#[tokio::test]
	async fn blockedlist_match_denies() {
		let config    = config_with(vec!["^mymetric\\.".to_owned()], vec![]);
		let protector = protector(&config);
		let mut query = Query::parse(br#"{"start":"1h-ago","queries":[{"metric":"mymetric.received.P95"}]}"#).expect("valid");
		let verdict   = protector.check(&mut query).await;
		assert_eq!(verdict, Verdict::Deny { rule: "blockedlist".to_owned(), msg: "Metric matches blocked pattern '^mymetric\\.'".to_owned() });
	}

	#[tokio::test]
	async fn allowedlist_full_cover_bypasses_rules() {
		let config    = config_with(vec![], vec!["^mymetric.*".to_owned()]);
		let protector = protector(&config);
		let mut query = Query::parse(br#"{"start":"1h-ago","queries":[{"metric":"mymetric","aggregator":"none"}]}"#).expect("valid");
		let verdict   = protector.check(&mut query).await;
		assert_eq!(verdict, Verdict::Allow, "a fully-matched allowedlist bypasses rule evaluation entirely");
	}

	#[tokio::test]
	async fn save_and_load_stats_round_trips_through_guard() {
		let config    = Config::default();
		let protector = protector(&config);
		let query = Query::parse(br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#).expect("valid");
		protector.save_stats(&query, None, 20.0, false).await;

		let mut second = Query::parse(br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#).expect("valid");
		let _          = protector.check(&mut second).await;
		assert!(second.stats().is_some(), "a previously-saved bucket should be loaded on the next check");
	}
}
