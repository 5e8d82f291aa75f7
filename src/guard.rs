//! Composes the configured rule set into a single ordered admission check.



//		Packages

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::warn;

use crate::query::Query;
use crate::rules::{self, Rule};



//		Enums

//		Verdict
/// The outcome of a full admission check, carrying the denying rule's name
/// alongside its message — unlike [`Decision`](crate::rules::Decision), which
/// is scoped to a single rule and so has no name to carry.
///
/// Shared by [`Guard::is_allowed`] and [`Protector`](crate::protector::Protector),
/// whose block/allow-list checks are themselves named "pseudo-rules"
/// (`blockedlist`, `allowedlist`) for the purposes of this type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
	/// The query may proceed.
	Allow,

	/// The query is denied by the named rule, with a human-readable reason.
	Deny {
		/// The name of the rule (or pseudo-rule) that produced the denial.
		rule: String,

		/// The human-readable reason for the denial.
		msg:  String,
	},
}

impl Verdict {
	//		is_allowed
	/// Whether this verdict permits the query.
	#[must_use]
	pub const fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}



//		Structs

//		Guard
/// An ordered, immutable collection of admission rules built once from
/// configuration and shared read-only by every request-handling task.
///
/// Rules whose configuration fails to build a valid rule are logged and
/// skipped rather than aborting construction.
pub struct Guard {
	/// The rules to evaluate, in the order they were configured.
	rules: Vec<Box<dyn Rule>>,
}

impl Guard {
	//		new
	/// Builds a [`Guard`] from the configured `rules` map.
	///
	/// Rule names are sorted alphabetically before construction, since a
	/// `HashMap`'s iteration order is not stable across process runs; this
	/// gives a deterministic, stable evaluation order for the lifetime of the
	/// resulting [`Guard`], without depending on map iteration order.
	#[must_use]
	pub fn new(configured: &HashMap<String, JsonValue>) -> Self {
		let mut names: Vec<&String> = configured.keys().collect();
		names.sort_unstable();
		let rules = names
			.into_iter()
			.filter_map(|name| {
				#[expect(clippy::indexing_slicing, reason = "name was just obtained from configured.keys()")]
				let param = &configured[name];
				rules::build(name, param).or_else(|| {
					warn!("Skipping rule '{name}': configuration could not be converted to the rule's expected shape");
					None
				})
			})
			.collect();
		Self { rules }
	}

	//		is_allowed
	/// Evaluates every configured rule against `query`, in order, returning
	/// the first denial. An empty query (no sub-queries) is itself a denial.
	#[must_use]
	pub fn is_allowed(&self, query: &Query) -> Verdict {
		if query.sub_queries().is_empty() {
			return Verdict::Deny { rule: "guard".to_owned(), msg: "Empty query".to_owned() };
		}
		for rule in &self.rules {
			let decision = rule.check(query);
			if !decision.is_allowed() {
				let crate::rules::Decision::Deny(msg) = decision else { unreachable!("is_allowed() just confirmed this is a Deny") };
				return Verdict::Deny { rule: rule.name().to_owned(), msg };
			}
		}
		Verdict::Allow
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	fn query(body: &[u8]) -> Query {
		Query::parse(body).expect("valid query")
	}

	#[test]
	fn non_empty_query_with_no_rules_is_allowed() {
		let guard    = Guard::new(&HashMap::new());
		let document = query(br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#);
		assert!(guard.is_allowed(&document).is_allowed());
	}

	#[test]
	fn unknown_rule_is_skipped_not_fatal() {
		let mut configured = HashMap::new();
		let _ = configured.insert("not_a_real_rule".to_owned(), JsonValue::Null);
		let guard = Guard::new(&configured);
		let document = query(br#"{"start":"1h-ago","queries":[{"metric":"m"}]}"#);
		assert!(guard.is_allowed(&document).is_allowed());
	}

	#[test]
	fn first_denial_short_circuits_and_names_the_rule() {
		let mut configured = HashMap::new();
		let _ = configured.insert("query_no_aggregator".to_owned(), JsonValue::Null);
		let _ = configured.insert("query_no_tags_filters".to_owned(), JsonValue::Null);
		let guard    = Guard::new(&configured);
		let document = query(br#"{"start":"1h-ago","queries":[{"metric":"m","aggregator":"none"}]}"#);
		let verdict  = guard.is_allowed(&document);
		assert_eq!(verdict, Verdict::Deny { rule: "query_no_aggregator".to_owned(), msg: "No aggregator specified".to_owned() });
	}
}
