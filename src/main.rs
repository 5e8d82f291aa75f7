//! tsdb-protector
//!
//! A protective reverse proxy in front of an OpenTSDB-speaking time-series
//! database.



//		Global configuration

//	Customisations of the standard linting configuration
#![allow(unreachable_pub,                 reason = "Not useful in a binary crate")]
#![allow(clippy::doc_markdown,            reason = "Too many false positives")]
#![allow(clippy::expect_used,             reason = "Acceptable in a binary crate")]
#![allow(clippy::multiple_crate_versions, reason = "Cannot resolve all these")]



//		Packages

use ::core::net::SocketAddr;
use std::process::exit;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tsdb_protector::{
	config::Config,
	errors::ProcessError,
	init::{load_config, setup_logging},
	protector::Protector,
	proxy::build_router,
	state::AppState,
	stats_store::{MemoryStore, RedisStore, StatsStore},
	telemetry::Telemetry,
};



//		Functions

//		main
#[tokio::main]
async fn main() {
	if let Err(error) = run().await {
		eprintln!("{error}");
		exit(1);
	}
}

//		run
/// Loads configuration, wires up the application state, and serves requests
/// until the process is terminated.
async fn run() -> Result<(), ProcessError> {
	let config = load_config::<Config>()?;
	let _guard = setup_logging(&config.log)?;

	let address = SocketAddr::from((config.host, config.port));
	let store   = connect_store(&config).await?;
	let telemetry = Telemetry::install()?;
	telemetry.set_safe_mode(config.safe_mode);

	let protector = Arc::new(Protector::new(&config, store, telemetry.clone())?);
	let state     = Arc::new(AppState {
		http_client: reqwest::Client::new(),
		config,
		protector,
		telemetry,
	});

	let router   = build_router(state);
	let listener = TcpListener::bind(address).await.map_err(ProcessError::BindFailed)?;
	let allocated_address = listener.local_addr().map_err(ProcessError::BindFailed)?;
	info!("Listening on {allocated_address}");
	axum::serve(listener, router).await.map_err(ProcessError::ServerFailed)?;
	Ok(())
}

//		connect_store
/// Connects to the configured Redis-backed statistics store. In safe mode, a
/// failed connection is logged and an in-memory store is used instead, so
/// that a dry-run deployment can still observe rule decisions without a
/// reachable database; outside safe mode, the same failure is fatal.
async fn connect_store(config: &Config) -> Result<Arc<dyn StatsStore>, ProcessError> {
	match RedisStore::connect(&config.db).await {
		Ok(store) => Ok(Arc::new(store)),
		Err(error) if config.safe_mode => {
			warn!("Statistics store unreachable in safe mode, falling back to an in-memory store: {error}");
			Ok(Arc::new(MemoryStore::new()))
		},
		Err(error) => {
			error!("Could not connect to the statistics store: {error}");
			Err(ProcessError::StatsStoreUnreachable(error.to_string()))
		},
	}
}
