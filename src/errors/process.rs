//! Fatal, process-level errors.



//		Packages

use figment::Error as FigmentError;
use regex::Error as RegexError;
use std::io::Error as IoError;
use thiserror::Error as ThisError;



//		Enums

//		ProcessError
/// Errors that can occur while starting up the application.
///
/// These never reach an HTTP response; they are fatal and the process exits
/// after logging them.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum ProcessError {
	/// Error loading or validating the configuration.
	#[error("Configuration error: {0}")]
	ConfigError(#[from] FigmentError),

	/// A `blockedlist` or `allowedlist` pattern failed to compile.
	#[error("Invalid regex pattern in block/allow list: {0}")]
	InvalidPattern(#[from] RegexError),

	/// The configured listen address could not be bound.
	#[error("Could not bind to the configured address: {0}")]
	BindFailed(IoError),

	/// The log directory could not be created or opened for writing.
	#[error("Could not set up logging: {0}")]
	LoggingSetupFailed(IoError),

	/// The server failed while running.
	#[error("Server error: {0}")]
	ServerFailed(IoError),

	/// The statistics store could not be reached at startup.
	#[error("Could not connect to the statistics store: {0}")]
	StatsStoreUnreachable(String),
}
