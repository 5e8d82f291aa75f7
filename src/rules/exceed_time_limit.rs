//! Denies queries that recently took too long to execute, either against a
//! static duration/throttle pair or an adaptive multiplier of the last
//! observed duration.



//		Packages

use chrono::Utc;
use serde_json::Value as JsonValue;

use super::{Decision, Rule};
use crate::query::Query;



//		Enums

//		ExceedTimeLimit
/// The two configuration shapes this rule accepts. Adaptive mode preempts
/// static mode when both are present in the configuration object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExceedTimeLimit {
	/// Deny if the last duration reached `limit` seconds and less than
	/// `throttle` seconds have passed since the last attempt.
	Static {
		/// The duration threshold, in seconds.
		limit:    f64,

		/// The cool-down window, in seconds, after a slow query.
		throttle: i64,
	},

	/// Deny if less than `duration * multiplier` seconds have passed since
	/// the last attempt.
	Adaptive {
		/// The multiplier applied to the last observed duration.
		multiplier: f64,
	},
}

impl ExceedTimeLimit {
	//		from_param
	/// Parses the rule's configuration object.
	///
	/// Returns `None` if `param` is not an object, or is an object with
	/// neither a valid `adaptive` field nor a valid `limit`+`throttle` pair.
	#[must_use]
	pub fn from_param(param: &JsonValue) -> Option<Self> {
		let obj = param.as_object()?;
		if let Some(multiplier) = obj.get("adaptive").and_then(JsonValue::as_f64) {
			return Some(Self::Adaptive { multiplier });
		}
		let limit    = obj.get("limit").and_then(JsonValue::as_f64)?;
		let throttle = obj.get("throttle").and_then(JsonValue::as_i64)?;
		Some(Self::Static { limit, throttle })
	}
}

impl Rule for ExceedTimeLimit {
	fn name(&self) -> &'static str {
		"exceed_time_limit"
	}

	fn check(&self, query: &Query) -> Decision {
		let Some(stats) = query.stats() else { return Decision::Allow };
		let elapsed = Utc::now().timestamp().saturating_sub(stats.timestamp);
		match *self {
			Self::Static { limit, throttle } => {
				if stats.duration >= limit && elapsed < throttle {
					return Decision::Deny(format!(
						"Query duration exceeded: {}s Limit: {limit}s, retry after {}s",
						stats.duration,
						throttle.saturating_sub(elapsed),
					));
				}
			},
			Self::Adaptive { multiplier } => {
				#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "durations are always small positive magnitudes")]
				let cooldown = (stats.duration * multiplier) as i64;
				if elapsed < cooldown {
					return Decision::Deny(format!(
						"Query duration exceeded adaptive cooldown: {}s elapsed, {cooldown}s required",
						elapsed,
					));
				}
			},
		}
		Decision::Allow
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stats_store::IntervalStats;

	fn query_with(duration: f64, seconds_ago: i64) -> Query {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#;
		let mut q = Query::parse(body).expect("valid query");
		q.attach_stats(Some(IntervalStats {
			duration,
			timestamp: Utc::now().timestamp().saturating_sub(seconds_ago),
			..IntervalStats::default()
		}));
		q
	}

	#[test]
	fn parses_static_param() {
		let param = serde_json::json!({"limit": 20, "throttle": 300});
		assert_eq!(ExceedTimeLimit::from_param(&param), Some(ExceedTimeLimit::Static { limit: 20.0, throttle: 300 }));
	}

	#[test]
	fn parses_adaptive_param() {
		let param = serde_json::json!({"adaptive": 1.6});
		assert_eq!(ExceedTimeLimit::from_param(&param), Some(ExceedTimeLimit::Adaptive { multiplier: 1.6 }));
	}

	#[test]
	fn adaptive_preempts_static_when_both_present() {
		let param = serde_json::json!({"adaptive": 1.6, "limit": 20, "throttle": 300});
		assert_eq!(ExceedTimeLimit::from_param(&param), Some(ExceedTimeLimit::Adaptive { multiplier: 1.6 }));
	}

	#[test]
	fn static_denies_within_throttle() {
		let rule  = ExceedTimeLimit::Static { limit: 20.0, throttle: 300 };
		let query = query_with(20.0, 210);
		assert!(!rule.check(&query).is_allowed());
	}

	#[test]
	fn static_allows_after_throttle() {
		let rule  = ExceedTimeLimit::Static { limit: 20.0, throttle: 300 };
		let query = query_with(20.0, 310);
		assert!(rule.check(&query).is_allowed());
	}

	#[test]
	fn adaptive_denies_within_cooldown() {
		let rule  = ExceedTimeLimit::Adaptive { multiplier: 1.6 };
		let query = query_with(10.0, 15);
		assert!(!rule.check(&query).is_allowed());
	}

	#[test]
	fn adaptive_allows_after_cooldown() {
		let rule  = ExceedTimeLimit::Adaptive { multiplier: 1.6 };
		let query = query_with(10.0, 16);
		assert!(rule.check(&query).is_allowed());
	}
}
