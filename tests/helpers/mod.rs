//! Shared scaffolding for the HTTP-layer integration tests: a router built
//! from real application state, and a hand-rolled fake backend speaking just
//! enough HTTP/1.1 to stand in for the time-series database.

#![allow(dead_code, reason = "Not every helper is used by every test binary")]
#![allow(missing_docs, clippy::missing_docs_in_private_items, clippy::expect_used, reason = "Not useful in an integration test binary")]

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use axum::Router;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;
use tsdb_protector::config::Config;
use tsdb_protector::protector::Protector;
use tsdb_protector::proxy::build_router;
use tsdb_protector::state::AppState;
use tsdb_protector::stats_store::{MemoryStore, StatsStore};
use tsdb_protector::telemetry::Telemetry;

static TELEMETRY: OnceLock<Telemetry> = OnceLock::new();

/// Returns a [`Telemetry`] backed by the one Prometheus recorder this process
/// may install, shared across every test in this binary.
pub fn telemetry() -> Telemetry {
	TELEMETRY.get_or_init(|| Telemetry::install().expect("the global recorder installs once per test binary")).clone()
}

/// Builds a router wired to a fresh [`MemoryStore`] and the given
/// configuration, returning both so a test can inspect stats after the
/// request completes.
#[must_use]
pub fn test_app(config: Config) -> (Router, Arc<MemoryStore>) {
	let store     = Arc::new(MemoryStore::new());
	let protector = Protector::new(&config, Arc::clone(&store) as Arc<dyn StatsStore>, telemetry()).expect("valid patterns");
	let state     = Arc::new(AppState {
		http_client: reqwest::Client::new(),
		config,
		protector: Arc::new(protector),
		telemetry: telemetry(),
	});
	(build_router(state), store)
}

/// Spawns a fake backend that accepts one connection, reads the request, and
/// replies with `status_line` and `body`. Returns the address it is
/// listening on.
pub async fn spawn_canned_backend(status_line: &'static str, content_type: &'static str, body: &'static [u8]) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("fake backend should bind");
	let address  = listener.local_addr().expect("fake backend should have a local address");

	let _ = tokio::spawn(async move {
		if let Ok((mut socket, _)) = listener.accept().await {
			let _ = read_request(&mut socket).await;
			let response = format!(
				"{status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
				body.len(),
			);
			let _ = socket.write_all(response.as_bytes()).await;
			let _ = socket.write_all(body).await;
			let _ = socket.shutdown().await;
		}
	});

	address
}

/// Spawns a fake backend that accepts a connection and never replies,
/// forcing the client's timeout to fire.
pub async fn spawn_hanging_backend() -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("fake backend should bind");
	let address  = listener.local_addr().expect("fake backend should have a local address");

	let _ = tokio::spawn(async move {
		if let Ok((mut socket, _)) = listener.accept().await {
			let _ = read_request(&mut socket).await;
			tokio::time::sleep(std::time::Duration::from_secs(60)).await;
			drop(socket);
		}
	});

	address
}

/// Reads a complete HTTP/1.1 request (headers plus `Content-Length` body, if
/// any) off `socket`, ignoring its contents beyond that.
async fn read_request(socket: &mut tokio::net::TcpStream) -> std::io::Result<()> {
	let mut buffer = Vec::new();
	let mut chunk  = [0_u8; 1024];
	let header_end = loop {
		let read = socket.read(&mut chunk).await?;
		if read == 0 {
			return Ok(());
		}
		buffer.extend_from_slice(&chunk[..read]);
		if let Some(position) = find_header_end(&buffer) {
			break position;
		}
	};

	let headers       = String::from_utf8_lossy(&buffer[..header_end]);
	let content_length = headers
		.lines()
		.find_map(|line| line.to_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_owned()))
		.and_then(|v| v.parse::<usize>().ok())
		.unwrap_or(0);

	let already_read = buffer.len().saturating_sub(header_end + 4);
	let mut remaining = content_length.saturating_sub(already_read);
	while remaining > 0 {
		let read = socket.read(&mut chunk).await?;
		if read == 0 {
			break;
		}
		remaining = remaining.saturating_sub(read);
	}
	Ok(())
}

/// Finds the index of the start of the `\r\n\r\n` header terminator, if
/// present.
fn find_header_end(buffer: &[u8]) -> Option<usize> {
	buffer.windows(4).position(|window| window == b"\r\n\r\n")
}
