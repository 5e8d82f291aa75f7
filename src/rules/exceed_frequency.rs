//! Denies queries repeated more often than a configured minimum interval,
//! preventing query flooding.



//		Packages

use chrono::Utc;

use super::{Decision, Rule};
use crate::query::Query;



//		Structs

//		ExceedFrequency
/// See the module documentation.
#[derive(Debug)]
pub struct ExceedFrequency {
	/// The minimum number of seconds that must elapse between two
	/// executions of the same query shape.
	min_frequency_secs: i64,
}

impl ExceedFrequency {
	//		new
	/// Builds the rule with its configured threshold.
	#[must_use]
	pub const fn new(min_frequency_secs: i64) -> Self {
		Self { min_frequency_secs }
	}
}

impl Rule for ExceedFrequency {
	fn name(&self) -> &'static str {
		"exceed_frequency"
	}

	fn check(&self, query: &Query) -> Decision {
		let Some(stats) = query.stats() else { return Decision::Allow };
		let elapsed = Utc::now().timestamp().saturating_sub(stats.timestamp);
		if elapsed <= self.min_frequency_secs {
			return Decision::Deny(format!(
				"Query frequency exceeded: {elapsed}s Limit: {}s",
				self.min_frequency_secs,
			));
		}
		Decision::Allow
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stats_store::IntervalStats;

	fn query_with_last_seen(seconds_ago: i64) -> Query {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#;
		let mut q = Query::parse(body).expect("valid query");
		q.attach_stats(Some(IntervalStats { timestamp: Utc::now().timestamp().saturating_sub(seconds_ago), ..IntervalStats::default() }));
		q
	}

	#[test]
	fn allows_when_no_stats() {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(ExceedFrequency::new(30).check(&query).is_allowed());
	}

	#[test]
	fn denies_within_window() {
		let query = query_with_last_seen(10);
		assert!(!ExceedFrequency::new(30).check(&query).is_allowed());
	}

	#[test]
	fn allows_outside_window() {
		let query = query_with_last_seen(31);
		assert!(ExceedFrequency::new(30).check(&query).is_allowed());
	}
}
