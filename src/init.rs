//! Configuration loading and logging setup, run once at startup.
//!
//! Configuration is layered (struct defaults, then `Config.toml`, then
//! environment variables) over this service's own flat configuration
//! surface, with logging set up the same way at process start.



//		Packages

use figment::{
	Figment,
	providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Serialize, de::DeserializeOwned};
use std::io::stdout;
use tracing::Level;
use tracing_appender::{
	non_blocking,
	non_blocking::WorkerGuard,
	rolling::{Builder as RollingBuilder, Rotation},
};
use tracing_subscriber::{
	EnvFilter,
	fmt::{layer, writer::MakeWriterExt as _},
	layer::SubscriberExt as _,
	registry,
	util::SubscriberInitExt as _,
};

use crate::config::LogConfig;
use crate::errors::ProcessError;



//		Functions

//		load_config
/// Loads the application configuration from layered sources: struct defaults,
/// then `Config.toml`, then `PROTECTOR_`-prefixed environment variables
/// (double-underscore nesting for `db`/`log`).
///
/// # Errors
///
/// Returns [`ProcessError::ConfigError`] if the merged configuration cannot
/// be extracted into `T` (e.g. a malformed `Config.toml` or an environment
/// variable of the wrong type).
pub fn load_config<T>() -> Result<T, ProcessError>
where
	T: Default + DeserializeOwned + Serialize,
{
	Ok(Figment::from(Serialized::defaults(T::default()))
		.merge(Toml::file("Config.toml"))
		.merge(Env::prefixed("PROTECTOR_").split("__"))
		.extract()?)
}

//		setup_logging
/// Initialises the global `tracing` subscriber: a stdout layer at `DEBUG`
/// and a non-blocking, optionally-rotating file layer at `INFO`.
///
/// The returned [`WorkerGuard`] must be kept alive for the lifetime of the
/// process; dropping it early silently stops the file writer from flushing.
///
/// # Errors
///
/// Returns [`ProcessError::LoggingSetupFailed`] if the log directory cannot
/// be created or opened for writing.
pub fn setup_logging(config: &LogConfig) -> Result<WorkerGuard, ProcessError> {
	let rotation = if config.rotate { Rotation::DAILY } else { Rotation::NEVER };
	let mut builder = RollingBuilder::new()
		.rotation(rotation)
		.filename_prefix("general")
		.filename_suffix("log");
	if config.max_files > 0 {
		builder = builder.max_log_files(config.max_files);
	}
	let appender = builder
		.build(&config.directory)
		.map_err(|e| ProcessError::LoggingSetupFailed(std::io::Error::other(e.to_string())))?;
	let (non_blocking_appender, guard) = non_blocking(appender);

	registry()
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| format!("{}={},tower_http={}", env!("CARGO_PKG_NAME"), config.level, config.level).into()),
		)
		.with(layer().with_writer(stdout.with_max_level(Level::DEBUG)))
		.with(layer().with_writer(non_blocking_appender.with_max_level(Level::INFO)))
		.init();

	Ok(guard)
}
