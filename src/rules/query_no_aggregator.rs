//! Denies queries containing a sub-query with `aggregator: "none"`.



//		Packages

use super::{Decision, Rule};
use crate::query::Query;



//		Structs

//		QueryNoAggregator
/// Such series usually indicate that the query is unfinished and was
/// executed by accident.
#[derive(Debug)]
pub struct QueryNoAggregator;

impl Rule for QueryNoAggregator {
	fn name(&self) -> &'static str {
		"query_no_aggregator"
	}

	fn check(&self, query: &Query) -> Decision {
		for sub_query in query.sub_queries() {
			if sub_query.get("aggregator").and_then(serde_json::Value::as_str) == Some("none") {
				return Decision::Deny("No aggregator specified".to_owned());
			}
		}
		Decision::Allow
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn denies_aggregator_none() {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m","aggregator":"none"}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(!QueryNoAggregator.check(&query).is_allowed());
	}

	#[test]
	fn allows_real_aggregator() {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m","aggregator":"sum"}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(QueryNoAggregator.check(&query).is_allowed());
	}
}
