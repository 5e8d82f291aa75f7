//! Denies queries whose last successful attempt emitted more than a
//! configured number of datapoints.



//		Packages

use super::{Decision, Rule};
use crate::query::Query;



//		Structs

//		TooManyDatapoints
/// Such queries can bring down the time series database or overload the
/// client with too much data transferred over the wire.
#[derive(Debug)]
pub struct TooManyDatapoints {
	/// The maximum number of datapoints permitted.
	max_datapoints: i64,
}

impl TooManyDatapoints {
	//		new
	/// Builds the rule with its configured threshold.
	#[must_use]
	pub const fn new(max_datapoints: i64) -> Self {
		Self { max_datapoints }
	}
}

impl Rule for TooManyDatapoints {
	fn name(&self) -> &'static str {
		"too_many_datapoints"
	}

	fn check(&self, query: &Query) -> Decision {
		let Some(stats) = query.stats() else { return Decision::Allow };
		let Some(dps)   = stats.emitted_dps else { return Decision::Allow };
		if dps > self.max_datapoints {
			return Decision::Deny(format!(
				"{dps} data points from that query, which is above the threshold! Limit the number of data points({}) or decrease the interval",
				self.max_datapoints,
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

	fn query_with_dps(dps: i64) -> Query {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#;
		let mut q = Query::parse(body).expect("valid query");
		q.attach_stats(Some(IntervalStats { emitted_dps: Some(dps), ..IntervalStats::default() }));
		q
	}

	#[test]
	fn allows_when_no_stats() {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(TooManyDatapoints::new(10).check(&query).is_allowed());
	}

	#[test]
	fn denies_above_threshold() {
		let query = query_with_dps(11);
		assert!(!TooManyDatapoints::new(10).check(&query).is_allowed());
	}

	#[test]
	fn allows_at_or_below_threshold() {
		let query = query_with_dps(10);
		assert!(TooManyDatapoints::new(10).check(&query).is_allowed());
	}
}
