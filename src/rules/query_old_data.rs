//! Denies queries whose requested start date is older than a configured
//! number of days, since very old shards are expensive to open and parse.



//		Packages

use chrono::Utc;

use super::{Decision, Rule};
use crate::query::{Query, SECONDS_PER_DAY};



//		Structs

//		QueryOldData
/// See the module documentation.
#[derive(Debug)]
pub struct QueryOldData {
	/// The maximum age, in days, a query's `start` may reach back to.
	max_age_days: i64,
}

impl QueryOldData {
	//		new
	/// Builds the rule with its configured threshold.
	#[must_use]
	pub const fn new(max_age_days: i64) -> Self {
		Self { max_age_days }
	}
}

impl Rule for QueryOldData {
	fn name(&self) -> &'static str {
		"query_old_data"
	}

	fn check(&self, query: &Query) -> Decision {
		let Ok(start) = query.start_ts() else { return Decision::Allow };
		let cutoff    = Utc::now().timestamp().saturating_sub(self.max_age_days.saturating_mul(SECONDS_PER_DAY));
		if start < cutoff {
			return Decision::Deny(format!(
				"Querying for data before {} days ago is prohibited",
				self.max_age_days,
			));
		}
		Decision::Allow
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allows_recent_start() {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(QueryOldData::new(90).check(&query).is_allowed());
	}

	#[test]
	fn denies_start_older_than_threshold() {
		let body  = br#"{"start":"100d-ago","queries":[{"metric":"m"}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(!QueryOldData::new(90).check(&query).is_allowed());
	}

	#[test]
	fn allows_start_exactly_at_threshold_boundary() {
		let body  = br#"{"start":"89d-ago","queries":[{"metric":"m"}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(QueryOldData::new(90).check(&query).is_allowed());
	}
}
