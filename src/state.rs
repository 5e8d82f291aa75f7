//! Application state functionality.



//		Packages

use crate::config::Config;
use crate::protector::Protector;
use crate::telemetry::Telemetry;
use core::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;



//		Structs

//		AppState
/// The application state, shared (behind an `Arc`) across every
/// request-handling task.
///
/// A single struct holding the loaded configuration plus whatever heavy,
/// once-built resources the handlers need, constructed in `main()` and
/// injected via Axum's `State` extractor.
pub struct AppState {
	//		Public properties
	/// The application configuration.
	pub config:      Config,

	/// The admission-decision and stats-recording orchestrator.
	pub protector:   Arc<Protector>,

	/// The metrics recorder.
	pub telemetry:   Telemetry,

	/// The HTTP client used to forward requests to the backend.
	pub http_client: reqwest::Client,
}

//󰭅		Debug
impl Debug for AppState {
	//		fmt
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("AppState")
			.field("config", &self.config)
			.field("telemetry", &self.telemetry)
			.finish_non_exhaustive()
	}
}
