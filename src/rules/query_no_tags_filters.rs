//! Denies queries whose sub-queries have neither `tags` nor `filters` set,
//! encouraging clients to restrict the potential data set.



//		Packages

use serde_json::Value as JsonValue;

use super::{Decision, Rule};
use crate::query::Query;



//		Structs

//		QueryNoTagsFilters
/// See the module documentation.
#[derive(Debug)]
pub struct QueryNoTagsFilters;

impl Rule for QueryNoTagsFilters {
	fn name(&self) -> &'static str {
		"query_no_tags_filters"
	}

	fn check(&self, query: &Query) -> Decision {
		for sub_query in query.sub_queries() {
			if is_empty(sub_query.get("tags")) && is_empty(sub_query.get("filters")) {
				return Decision::Deny("Both tags and filters are empty".to_owned());
			}
		}
		Decision::Allow
	}
}



//		Functions

//		is_empty
/// Whether a `tags`/`filters` value is absent, `null`, an empty array, or an
/// empty object.
fn is_empty(value: Option<&JsonValue>) -> bool {
	match value {
		None                       => true,
		Some(JsonValue::Null)      => true,
		Some(JsonValue::Array(a))  => a.is_empty(),
		Some(JsonValue::Object(o)) => o.is_empty(),
		Some(_)                    => false,
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn denies_when_both_absent() {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m","aggregator":"sum"}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(!QueryNoTagsFilters.check(&query).is_allowed());
	}

	#[test]
	fn allows_with_tags() {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m","tags":{"host":"*"}}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(QueryNoTagsFilters.check(&query).is_allowed());
	}

	#[test]
	fn allows_with_filters() {
		let body  = br#"{"start":"1h-ago","queries":[{"metric":"m","filters":[{"tagk":"host"}]}]}"#;
		let query = Query::parse(body).expect("valid query");
		assert!(QueryNoTagsFilters.check(&query).is_allowed());
	}
}
