//! Worker pool for synchronous CPU-bound jobs (archive assembly, digests of
//! large payloads). Three priority lanes, configurable thread counts.

use flume::{Receiver, Sender};
use futures::channel::oneshot;
use std::{sync::Arc, thread};

use crate::prelude::*;

#[derive(Clone, Copy, Debug)]
pub enum Priority {
	High,
	Medium,
	Low,
}

type Job = Box<dyn FnOnce() + Send>;

#[derive(Debug)]
pub struct WorkerPool {
	tx_high: Sender<Job>,
	tx_med: Sender<Job>,
	tx_low: Sender<Job>,
}

impl WorkerPool {
	/// `n1` threads serve High only, `n2` serve High+Medium, `n3` serve all
	/// three lanes, so low-priority jobs can never starve interactive work.
	pub fn new(n1: usize, n2: usize, n3: usize) -> Self {
		let (tx_high, rx_high) = flume::unbounded();
		let (tx_med, rx_med) = flume::unbounded();
		let (tx_low, rx_low) = flume::unbounded();

		let rx_high = Arc::new(rx_high);
		let rx_med = Arc::new(rx_med);
		let rx_low = Arc::new(rx_low);

		for _ in 0..n1 {
			let rx_high = Arc::clone(&rx_high);
			thread::spawn(move || worker_loop(vec![rx_high]));
		}
		for _ in 0..n2 {
			let rx_high = Arc::clone(&rx_high);
			let rx_med = Arc::clone(&rx_med);
			thread::spawn(move || worker_loop(vec![rx_high, rx_med]));
		}
		for _ in 0..n3 {
			let rx_high = Arc::clone(&rx_high);
			let rx_med = Arc::clone(&rx_med);
			let rx_low = Arc::clone(&rx_low);
			thread::spawn(move || worker_loop(vec![rx_high, rx_med, rx_low]));
		}

		Self { tx_high, tx_med, tx_low }
	}

	/// Submit a closure to a lane, awaiting its result
	pub fn spawn<F, T>(&self, priority: Priority, f: F) -> impl std::future::Future<Output = ApiResult<T>>
	where
		F: FnOnce() -> T + Send + 'static,
		T: Send + 'static,
	{
		let (res_tx, res_rx) = oneshot::channel();

		let job: Job = Box::new(move || {
			let result = f();
			let _ignore = res_tx.send(result);
		});

		let tx = match priority {
			Priority::High => &self.tx_high,
			Priority::Medium => &self.tx_med,
			Priority::Low => &self.tx_low,
		};
		if tx.send(job).is_err() {
			error!("worker pool queue closed; job dropped");
		}

		async move {
			res_rx.await.map_err(|_| Error::Internal("worker pool lost a job result".into()))
		}
	}
}

fn worker_loop(receivers: Vec<Arc<Receiver<Job>>>) {
	loop {
		// Drain higher-priority lanes first
		let mut ran = false;
		for rx in &receivers {
			if let Ok(job) = rx.try_recv() {
				job();
				ran = true;
				break;
			}
		}
		if ran {
			continue;
		}

		// All lanes empty: block on the last (widest) lane
		match receivers.last() {
			Some(rx) => match rx.recv() {
				Ok(job) => job(),
				Err(_) => return, // pool dropped
			},
			None => return,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn runs_jobs_and_returns_results() {
		let pool = WorkerPool::new(1, 1, 1);
		let res = pool.spawn(Priority::High, || 2 + 2).await.unwrap();
		assert_eq!(res, 4);
	}

	#[tokio::test]
	async fn all_lanes_accept_work() {
		let pool = WorkerPool::new(1, 1, 1);
		for priority in [Priority::High, Priority::Medium, Priority::Low] {
			let res = pool.spawn(priority, || "ok").await.unwrap();
			assert_eq!(res, "ok");
		}
	}
}

// vim: ts=4
