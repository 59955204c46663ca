//! Webhook delivery pipeline.
//!
//! A bounded queue feeds a fixed pool of worker tasks. Delivery is decoupled
//! from the mutating request: enqueueing never blocks, and a saturated queue
//! drops (with a warning) rather than failing the mutation. Each POST is
//! signed with HMAC-SHA256 over `{timestamp}.{body}` and retried with
//! exponential backoff on connect errors and 5xx responses.

use hmac::{Hmac, Mac};
use http_body_util::Full;
use hyper::{body::Bytes, Method};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use sha2::Sha256;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

use crate::prelude::*;

type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
	pub queue_capacity: usize,
	pub workers: usize,
	pub request_timeout: Duration,
	pub max_attempts: u32,
	pub backoff_base: Duration,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			queue_capacity: 1024,
			workers: 4,
			request_timeout: Duration::from_secs(10),
			max_attempts: 5,
			backoff_base: Duration::from_secs(1),
		}
	}
}

#[derive(Debug)]
pub struct DeliveryJob {
	pub webhook_id: Box<str>,
	pub url: Box<str>,
	pub secret: Box<str>,
	pub body: String,
}

/// Signature value for the `X-Signature` header: `t=<ts>, v1=<hex>`
pub fn signature_header(secret: &str, timestamp_secs: i64, body: &str) -> String {
	let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
		Ok(mac) => mac,
		Err(_) => return String::new(), // HMAC accepts any key length
	};
	mac.update(format!("{}.{}", timestamp_secs, body).as_bytes());
	let digest = mac.finalize().into_bytes();
	let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
	format!("t={}, v1={}", timestamp_secs, hex)
}

pub struct Dispatcher {
	tx: flume::Sender<DeliveryJob>,
	shutdown: tokio::sync::watch::Sender<bool>,
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher").field("queued", &self.tx.len()).finish()
	}
}

impl Dispatcher {
	/// Spawn the worker pool. Must run inside a tokio runtime.
	pub fn start(config: DispatcherConfig) -> ApiResult<Arc<Self>> {
		let (tx, rx) = flume::bounded(config.queue_capacity);
		let (shutdown, _) = tokio::sync::watch::channel(false);

		let connector = HttpsConnectorBuilder::new()
			.with_native_roots()
			.map_err(|_| Error::Internal("no native root CA certificates found".into()))?
			.https_or_http()
			.enable_http1()
			.build();
		let client: HttpClient = Client::builder(TokioExecutor::new()).build(connector);

		for _ in 0..config.workers.max(1) {
			let rx = rx.clone();
			let client = client.clone();
			let config = config.clone();
			let mut shutdown_rx = shutdown.subscribe();
			tokio::spawn(async move {
				loop {
					let job = tokio::select! {
						job = rx.recv_async() => match job {
							Ok(job) => job,
							Err(_) => return,
						},
						_ = shutdown_rx.changed() => return,
					};
					deliver(&client, &config, &job).await;
				}
			});
		}

		Ok(Arc::new(Self { tx, shutdown }))
	}

	/// Best-effort enqueue; the mutating request has already committed
	pub fn enqueue(&self, job: DeliveryJob) {
		if let Err(flume::TrySendError::Full(job)) = self.tx.try_send(job) {
			warn!("webhook queue saturated; dropping delivery to {}", job.url);
		}
	}

	pub fn shutdown(&self) {
		let _ignore = self.shutdown.send(true);
	}
}

async fn deliver(client: &HttpClient, config: &DispatcherConfig, job: &DeliveryJob) {
	let mut backoff = config.backoff_base;

	for attempt in 1..=config.max_attempts {
		match attempt_delivery(client, config, job).await {
			Ok(status) if status < 500 => {
				if status >= 400 {
					// 4xx is the subscriber's problem; retrying won't help
					warn!(
						"webhook {} delivery returned {} (not retrying)",
						job.webhook_id, status
					);
				} else {
					debug!("webhook {} delivered ({})", job.webhook_id, status);
				}
				return;
			}
			Ok(status) => {
				debug!(
					"webhook {} attempt {}/{} got {}",
					job.webhook_id, attempt, config.max_attempts, status
				);
			}
			Err(err) => {
				debug!(
					"webhook {} attempt {}/{} failed: {:?}",
					job.webhook_id, attempt, config.max_attempts, err
				);
			}
		}

		if attempt < config.max_attempts {
			tokio::time::sleep(backoff).await;
			backoff *= 2;
		}
	}

	warn!("webhook {} delivery gave up after {} attempts", job.webhook_id, config.max_attempts);
}

async fn attempt_delivery(
	client: &HttpClient,
	config: &DispatcherConfig,
	job: &DeliveryJob,
) -> ApiResult<u16> {
	let now_secs = Timestamp::now().0 / 1000;
	let req = hyper::Request::builder()
		.method(Method::POST)
		.uri(job.url.as_ref())
		.header("Content-Type", "application/json")
		.header("X-Signature", signature_header(&job.secret, now_secs, &job.body))
		.header("X-Webhook-Id", job.webhook_id.as_ref())
		.body(Full::new(Bytes::from(job.body.clone())))
		.map_err(|_| Error::Internal("webhook request build failed".into()))?;

	let res = timeout(config.request_timeout, client.request(req))
		.await
		.map_err(|_| Error::Internal("webhook delivery timed out".into()))?
		.map_err(|err| Error::Internal(format!("webhook connect error: {}", err)))?;

	Ok(res.status().as_u16())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signature_is_stable_and_keyed() {
		let a = signature_header("whsec_abc", 1700000000, r#"{"x":1}"#);
		let b = signature_header("whsec_abc", 1700000000, r#"{"x":1}"#);
		let c = signature_header("whsec_other", 1700000000, r#"{"x":1}"#);
		assert_eq!(a, b);
		assert_ne!(a, c);
		assert!(a.starts_with("t=1700000000, v1="));
		let hex = a.rsplit("v1=").next().unwrap_or_default();
		assert_eq!(hex.len(), 64);
	}

	#[tokio::test]
	async fn saturated_queue_drops_instead_of_blocking() {
		let dispatcher = Dispatcher::start(DispatcherConfig {
			queue_capacity: 1,
			workers: 0, // max(1) applies, but the worker blocks on an unroutable host
			..Default::default()
		})
		.unwrap();

		for _ in 0..10 {
			dispatcher.enqueue(DeliveryJob {
				webhook_id: "wh_test".into(),
				url: "http://192.0.2.1:9/drop".into(),
				secret: "whsec_x".into(),
				body: "{}".into(),
			});
		}
		// enqueue returned despite the tiny queue
		dispatcher.shutdown();
	}
}

// vim: ts=4
