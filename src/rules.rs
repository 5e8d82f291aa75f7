//! The individual admission rules, and the registry that builds them from
//! configuration.
//!
//! Rule construction is a compile-time registry (name → constructor). Each
//! rule is immutable once built and is pure: it reads only the
//! [`Query`](crate::query::Query) and its attached historical stats.



//		Modules

mod exceed_frequency;
mod exceed_time_limit;
mod query_no_aggregator;
mod query_no_tags_filters;
mod query_old_data;
mod too_many_datapoints;

pub use exceed_frequency::ExceedFrequency;
pub use exceed_time_limit::ExceedTimeLimit;
pub use query_no_aggregator::QueryNoAggregator;
pub use query_no_tags_filters::QueryNoTagsFilters;
pub use query_old_data::QueryOldData;
pub use too_many_datapoints::TooManyDatapoints;



//		Packages

use serde_json::Value as JsonValue;
use tracing::error;

use crate::query::Query;



//		Enums

//		Decision
/// The outcome of evaluating a single rule (or the whole [`Guard`](crate::guard::Guard))
/// against a query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Decision {
	/// The query may proceed.
	Allow,

	/// The query is denied, with a human-readable reason.
	Deny(String),
}

impl Decision {
	//		is_allowed
	/// Whether this decision permits the query.
	#[must_use]
	pub const fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}



//		Traits

//§		Rule
/// The common contract implemented by every admission rule.
pub trait Rule: Send + Sync {
	//		name
	/// The rule's configuration name, as used in the `rules` configuration
	/// map.
	fn name(&self) -> &'static str;

	//		check
	/// Evaluates the rule against a query. Implementations must return
	/// [`Decision::Allow`] when the query carries no historical stats (first
	/// sighting).
	fn check(&self, query: &Query) -> Decision;
}



//		Functions

//		build
/// Builds the named rule from its untyped configuration parameter.
///
/// Returns `None` (after logging) if the name is unrecognised or the
/// parameter does not match the shape the rule expects — a single rule's
/// load failure is skipped rather than aborting
/// [`Guard`](crate::guard::Guard) construction.
#[must_use]
pub fn build(name: &str, param: &JsonValue) -> Option<Box<dyn Rule>> {
	match name {
		"query_no_aggregator"   => Some(Box::new(QueryNoAggregator)),
		"query_no_tags_filters" => Some(Box::new(QueryNoTagsFilters)),
		"too_many_datapoints"   => param.as_i64().map(|max| Box::new(TooManyDatapoints::new(max)) as Box<dyn Rule>),
		"query_old_data"        => param.as_i64().map(|days| Box::new(QueryOldData::new(days)) as Box<dyn Rule>),
		"exceed_frequency"      => param.as_i64().map(|secs| Box::new(ExceedFrequency::new(secs)) as Box<dyn Rule>),
		"exceed_time_limit"     => ExceedTimeLimit::from_param(param).map(|rule| Box::new(rule) as Box<dyn Rule>),
		other                   => {
			error!("Unknown rule name in configuration: {other}");
			None
		},
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_rule_name_is_skipped() {
		assert!(build("not_a_real_rule", &JsonValue::Null).is_none());
	}

	#[test]
	fn too_many_datapoints_requires_integer_param() {
		assert!(build("too_many_datapoints", &JsonValue::Null).is_none());
		assert!(build("too_many_datapoints", &JsonValue::from(100)).is_some());
	}

	#[test]
	fn parameterless_rules_ignore_their_param() {
		assert!(build("query_no_aggregator", &JsonValue::from(123)).is_some());
		assert!(build("query_no_tags_filters", &JsonValue::Null).is_some());
	}
}
