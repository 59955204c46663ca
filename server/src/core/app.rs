//! App state type

use std::sync::Arc;

use crate::append::claim::ClaimCache;
use crate::core::rate_limit::{RateLimitConfig, RateLimitManager};
use crate::core::{scheduler, webserver, worker};
use crate::prelude::*;
use crate::session_adapter::{DenySessions, SessionAdapter};
use crate::store_adapter::StoreAdapter;
use crate::webhook::dispatch::{Dispatcher, DispatcherConfig};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Built-in claim duration when neither file nor workspace settings set one
pub const DEFAULT_CLAIM_DURATION_SECS: i64 = 3600;
/// Minimum configurable claim duration
pub const MIN_CLAIM_DURATION_SECS: i64 = 60;
/// Soft-deleted files stay recoverable this long
pub const DEFAULT_RETENTION_SECS: i64 = 30 * 24 * 3600;
/// Idempotency records are replayable this long
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 24 * 3600;

#[derive(Debug)]
pub struct AppOptions {
	pub listen: Box<str>,
	/// Base URL used when rendering capability links (no trailing slash)
	pub base_url: Box<str>,
	pub retention_secs: i64,
	pub claim_duration_secs: i64,
	pub idempotency_ttl_secs: i64,
}

pub struct AppState {
	pub opts: AppOptions,
	pub store: Arc<dyn StoreAdapter>,
	pub sessions: Arc<dyn SessionAdapter>,
	pub worker: Arc<worker::WorkerPool>,
	pub scheduler: Arc<scheduler::Scheduler<App>>,
	pub rate_limiter: Arc<RateLimitManager>,
	pub dispatcher: Arc<Dispatcher>,
	pub claim_cache: ClaimCache,
}

impl std::fmt::Debug for AppState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppState").field("opts", &self.opts).finish()
	}
}

pub type App = Arc<AppState>;

pub struct AppBuilder {
	opts: AppOptions,
	store: Option<Arc<dyn StoreAdapter>>,
	sessions: Option<Arc<dyn SessionAdapter>>,
	worker: Option<Arc<worker::WorkerPool>>,
	rate_limit: RateLimitConfig,
	dispatcher: DispatcherConfig,
}

impl AppBuilder {
	pub fn new() -> Self {
		let _ignore = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		AppBuilder {
			opts: AppOptions {
				listen: "127.0.0.1:8080".into(),
				base_url: "http://127.0.0.1:8080".into(),
				retention_secs: DEFAULT_RETENTION_SECS,
				claim_duration_secs: DEFAULT_CLAIM_DURATION_SECS,
				idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
			},
			store: None,
			sessions: None,
			worker: None,
			rate_limit: RateLimitConfig::default(),
			dispatcher: DispatcherConfig::default(),
		}
	}

	pub fn listen(&mut self, listen: impl Into<Box<str>>) -> &mut Self {
		self.opts.listen = listen.into();
		self
	}

	pub fn base_url(&mut self, base_url: impl Into<Box<str>>) -> &mut Self {
		let url: Box<str> = base_url.into();
		self.opts.base_url = url.trim_end_matches('/').into();
		self
	}

	pub fn retention_secs(&mut self, secs: i64) -> &mut Self {
		self.opts.retention_secs = secs;
		self
	}

	pub fn claim_duration_secs(&mut self, secs: i64) -> &mut Self {
		self.opts.claim_duration_secs = secs.max(MIN_CLAIM_DURATION_SECS);
		self
	}

	pub fn rate_limit(&mut self, config: RateLimitConfig) -> &mut Self {
		self.rate_limit = config;
		self
	}

	pub fn dispatcher_config(&mut self, config: DispatcherConfig) -> &mut Self {
		self.dispatcher = config;
		self
	}

	pub fn store_adapter(&mut self, adapter: Arc<dyn StoreAdapter>) -> &mut Self {
		self.store = Some(adapter);
		self
	}

	pub fn session_adapter(&mut self, adapter: Arc<dyn SessionAdapter>) -> &mut Self {
		self.sessions = Some(adapter);
		self
	}

	pub fn worker(&mut self, worker: Arc<worker::WorkerPool>) -> &mut Self {
		self.worker = Some(worker);
		self
	}

	/// Assemble the application state and start the background machinery
	/// (webhook workers, maintenance scheduler). Must run inside a tokio
	/// runtime.
	pub async fn build(&mut self) -> ApiResult<App> {
		let store = self
			.store
			.take()
			.ok_or_else(|| Error::Internal("no store adapter configured".into()))?;
		let sessions = self.sessions.take().unwrap_or_else(|| Arc::new(DenySessions));
		let worker = self.worker.take().unwrap_or_else(|| Arc::new(worker::WorkerPool::new(1, 2, 1)));

		let dispatcher = Dispatcher::start(self.dispatcher.clone())?;

		let mut scheduler = scheduler::Scheduler::new();
		// Off the top of the hour on purpose; keeps maintenance away from
		// whatever else fires at :00
		scheduler.add_task("soft-delete-reaper", "7 * * * *", |app: App| async move {
			let purged = app.store.purge_expired_files(Timestamp::now()).await?;
			if purged > 0 {
				info!("reaper: purged {} expired files", purged);
			}
			Ok(())
		})?;
		scheduler.add_task("idempotency-expiry", "23 * * * *", |app: App| async move {
			let cutoff = Timestamp::now().add_seconds(-app.opts.idempotency_ttl_secs);
			let purged = app.store.purge_idempotency_records(cutoff).await?;
			if purged > 0 {
				info!("expired {} idempotency records", purged);
			}
			Ok(())
		})?;

		let app: App = Arc::new(AppState {
			opts: std::mem::replace(
				&mut self.opts,
				AppOptions {
					listen: "".into(),
					base_url: "".into(),
					retention_secs: DEFAULT_RETENTION_SECS,
					claim_duration_secs: DEFAULT_CLAIM_DURATION_SECS,
					idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
				},
			),
			store,
			sessions,
			worker,
			scheduler: Arc::new(scheduler),
			rate_limiter: Arc::new(RateLimitManager::new(self.rate_limit.clone())),
			dispatcher,
			claim_cache: ClaimCache::new(),
		});

		Arc::clone(&app.scheduler).start(app.clone());
		info!("mdvault {} initialized", VERSION);

		Ok(app)
	}

	/// Build and serve until the listener closes
	pub async fn run(&mut self) -> ApiResult<()> {
		let app = self.build().await?;
		webserver::run(app).await
	}
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}

// vim: ts=4
