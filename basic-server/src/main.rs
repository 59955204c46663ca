//! Minimal runnable mdvault server: SQLite store adapter, environment-driven
//! configuration.
//!
//! Environment:
//! - `MDVAULT_DATA_DIR`        where the SQLite database lives (default ./data)
//! - `MDVAULT_LISTEN`          bind address (default 127.0.0.1:8080)
//! - `MDVAULT_BASE_URL`        public base URL for capability links
//! - `MDVAULT_SESSION_SECRET`  enables the HMAC session adapter for /claim

use std::sync::Arc;

use mdvault::AppBuilder;
use mdvault_store_adapter_sqlite::StoreAdapterSqlite;

mod session;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let data_dir = std::env::var("MDVAULT_DATA_DIR").unwrap_or_else(|_| "./data".into());
	std::fs::create_dir_all(&data_dir)?;
	let listen = std::env::var("MDVAULT_LISTEN").unwrap_or_else(|_| "127.0.0.1:8080".into());
	let base_url =
		std::env::var("MDVAULT_BASE_URL").unwrap_or_else(|_| format!("http://{}", listen));

	let store = Arc::new(StoreAdapterSqlite::new(&data_dir).await?);

	let mut builder = AppBuilder::new();
	builder.listen(listen).base_url(base_url).store_adapter(store);
	if let Ok(secret) = std::env::var("MDVAULT_SESSION_SECRET") {
		builder.session_adapter(Arc::new(session::HmacSessionAdapter::new(secret)));
	}

	tracing::info!("starting mdvault basic server (data dir: {})", data_dir);
	builder.run().await?;
	Ok(())
}

// vim: ts=4
