#![allow(clippy::exhaustive_structs, reason = "Configuration structs")]

//! Configuration for the protector application.



//		Packages

use core::net::IpAddr;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use smart_default::SmartDefault;
use std::collections::HashMap;



//		Structs

//		Config
/// The main configuration options for the application.
///
/// Loaded via layered [`figment`] sources in [`crate::init::load_config()`]:
/// struct defaults, then `Config.toml`, then `PROTECTOR_`-prefixed
/// environment variables (double-underscore nesting for the [`db`](Config::db)
/// and [`log`](Config::log) groups).
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
pub struct Config {
	//		Public properties
	/// The host to listen on.
	#[default(IpAddr::from([127, 0, 0, 1]))]
	pub host:          IpAddr,

	/// The port to listen on.
	#[default = 8888]
	pub port:          u16,

	/// The hostname of the backend time-series database.
	#[default = "localhost"]
	pub backend_host:  String,

	/// The port of the backend time-series database.
	#[default = 4242]
	pub backend_port:  u16,

	/// The timeout, in seconds, for the complete backend exchange (connect,
	/// send, and receive) of a single forwarded request.
	#[default = 30]
	pub timeout:       u64,

	/// Whether the proxy is running in safe mode. Under safe mode, rule
	/// denials are still evaluated and metered, but every query is forwarded
	/// to the backend regardless of the verdict.
	#[default = false]
	pub safe_mode:     bool,

	/// The configured rule set, as a map of rule name to its untyped
	/// parameter. A `null` parameter means the rule takes no argument.
	#[default(default_rules())]
	pub rules:         HashMap<String, JsonValue>,

	/// Regex patterns (left-anchored) for metric names that must never be
	/// queried. Any match denies the request outright.
	#[default(Vec::new())]
	pub blockedlist:   Vec<String>,

	/// Regex patterns for metric names that bypass rule evaluation entirely
	/// when every metric in the query matches at least one pattern.
	#[default(Vec::new())]
	pub allowedlist:   Vec<String>,

	/// The statistics store configuration.
	pub db:            DbConfig,

	/// The logging configuration.
	pub log:           LogConfig,

	/// Whether to run in the foreground (as opposed to being supervised by an
	/// external process manager). This implementation always runs in the
	/// foreground and does not fork or manage a PID file.
	#[default = true]
	pub foreground:    bool,
}

//		DbConfig
/// Configuration for the persistent statistics store.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
pub struct DbConfig {
	//		Public properties
	/// The Redis connection settings.
	pub redis:  RedisConfig,

	/// The TTL, in seconds, applied to newly-created statistics keys. Zero
	/// disables expiration entirely.
	#[default = 0]
	pub expire: u64,
}

//		RedisConfig
/// Connection settings for the Redis-backed statistics store.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
pub struct RedisConfig {
	//		Public properties
	/// The Redis server hostname.
	#[default = "localhost"]
	pub host:      String,

	/// The Redis server port.
	#[default = 6379]
	pub port:      u16,

	/// The Redis server password, if authentication is required.
	#[default(None)]
	pub password:  Option<String>,

	/// The maximum number of pooled connections to maintain.
	#[default = 8]
	pub pool_size: usize,
}

//		LogConfig
/// Configuration for structured logging output.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
pub struct LogConfig {
	//		Public properties
	/// The directory to write rotated log files to.
	#[default = "log"]
	pub directory: String,

	/// The minimum level to emit (`trace`, `debug`, `info`, `warn`, `error`).
	#[default = "info"]
	pub level:     String,

	/// Whether to rotate log files daily.
	#[default = true]
	pub rotate:    bool,

	/// The maximum number of rotated log files to retain. A value of `0`
	/// means no limit is enforced.
	#[default = 0]
	pub max_files: usize,
}



//		Functions

//		default_rules
/// The default rule set.
fn default_rules() -> HashMap<String, JsonValue> {
	HashMap::from([
		("query_no_tags_filters".to_owned(), JsonValue::Null),
		("query_no_aggregator".to_owned(),   JsonValue::Null),
		("too_many_datapoints".to_owned(),   JsonValue::from(10_000)),
		("query_old_data".to_owned(),        JsonValue::from(90)),
		("exceed_time_limit".to_owned(),     serde_json::json!({"limit": 20, "throttle": 300})),
		("exceed_frequency".to_owned(),      JsonValue::from(30)),
	])
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_has_expected_shape() {
		let config = Config::default();
		assert_eq!(config.port, 8888, "default listen port should be 8888");
		assert_eq!(config.backend_port, 4242, "default backend port should be 4242");
		assert!(!config.safe_mode, "safe mode should default to off");
		assert_eq!(config.rules.len(), 6, "all six default rules should be present");
	}
}
