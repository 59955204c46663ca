//! Claim state reduction.
//!
//! The claim state of a file is never a row updated in place; it is a pure
//! reduction over the append log, ordered by sequence number. Activity
//! (expiry) is evaluated against "now" at read time, so the reduced board is
//! cacheable per `(file, max_seq)`.

use lru::LruCache;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::prelude::*;
use crate::store_adapter::{AppendRow, AppendType};

#[derive(Debug, Clone)]
pub struct ClaimState {
	pub seq: i64,
	pub task_seq: i64,
	pub author: Box<str>,
	pub expires_at: Timestamp,
	pub cancelled: bool,
}

impl ClaimState {
	pub fn is_active(&self, task_done: bool, now: Timestamp) -> bool {
		!self.cancelled && !task_done && self.expires_at > now
	}
}

#[derive(Debug, Clone)]
pub struct TaskState {
	pub seq: i64,
	pub done: bool,
	pub completed_by: Option<Box<str>>,
	/// Claims targeting this task, in log order
	pub claims: Vec<ClaimState>,
}

impl TaskState {
	/// The claim currently holding the task, if any
	pub fn active_claim(&self, now: Timestamp) -> Option<&ClaimState> {
		if self.done {
			return None;
		}
		self.claims.iter().rev().find(|c| c.is_active(false, now))
	}
}

/// Aggregate task statistics for the meta endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TaskStats {
	pub pending: u32,
	pub claimed: u32,
	pub completed: u32,
}

/// Derived task/claim state of one file's append log
#[derive(Debug, Default)]
pub struct Board {
	pub tasks: BTreeMap<i64, TaskState>,
}

impl Board {
	pub fn task(&self, seq: i64) -> Option<&TaskState> {
		self.tasks.get(&seq)
	}

	pub fn stats(&self, now: Timestamp) -> TaskStats {
		let mut stats = TaskStats::default();
		for task in self.tasks.values() {
			if task.done {
				stats.completed += 1;
			} else if task.active_claim(now).is_some() {
				stats.claimed += 1;
			} else {
				stats.pending += 1;
			}
		}
		stats
	}

	/// Current status string of a task, for the parsed read surface
	pub fn task_status(&self, seq: i64, now: Timestamp) -> Option<&'static str> {
		let task = self.tasks.get(&seq)?;
		Some(if task.done {
			"done"
		} else if task.active_claim(now).is_some() {
			"claimed"
		} else {
			"open"
		})
	}
}

/// Pure reducer over a log in sequence order
pub fn reduce(appends: &[AppendRow]) -> Board {
	let mut board = Board::default();
	// claim seq -> task seq, for renew/cancel resolution
	let mut claim_to_task: BTreeMap<i64, i64> = BTreeMap::new();

	for row in appends {
		match row.typ {
			AppendType::Task => {
				board.tasks.insert(
					row.seq,
					TaskState { seq: row.seq, done: false, completed_by: None, claims: Vec::new() },
				);
			}
			AppendType::Claim => {
				let Some(task_seq) = row.parent_ref else { continue };
				let Some(task) = board.tasks.get_mut(&task_seq) else { continue };
				claim_to_task.insert(row.seq, task_seq);
				task.claims.push(ClaimState {
					seq: row.seq,
					task_seq,
					author: row.author.clone(),
					expires_at: row.expires_at.unwrap_or_default(),
					cancelled: false,
				});
			}
			AppendType::Renew => {
				let Some(claim_seq) = row.parent_ref else { continue };
				let Some(task_seq) = claim_to_task.get(&claim_seq) else { continue };
				let Some(task) = board.tasks.get_mut(task_seq) else { continue };
				if let Some(claim) = task.claims.iter_mut().find(|c| c.seq == claim_seq) {
					if let Some(expires_at) = row.expires_at {
						claim.expires_at = claim.expires_at.max(expires_at);
					}
				}
			}
			AppendType::Cancel => {
				let Some(claim_seq) = row.parent_ref else { continue };
				let Some(task_seq) = claim_to_task.get(&claim_seq) else { continue };
				let Some(task) = board.tasks.get_mut(task_seq) else { continue };
				if let Some(claim) = task.claims.iter_mut().find(|c| c.seq == claim_seq) {
					claim.cancelled = true;
				}
			}
			AppendType::Response => {
				let Some(task_seq) = row.parent_ref else { continue };
				let Some(task) = board.tasks.get_mut(&task_seq) else { continue };
				if !task.done {
					task.done = true;
					task.completed_by = Some(row.author.clone());
				}
			}
			AppendType::Comment => {}
		}
	}

	board
}

// Cache //
//*******//

/// Reduced boards cached per `(file, max_seq)`: any new append changes the
/// max sequence number, which is the invalidation key.
pub struct ClaimCache {
	boards: Mutex<LruCache<(i64, i64), Arc<Board>>>,
}

impl ClaimCache {
	pub fn new() -> Self {
		let capacity = NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN);
		Self { boards: Mutex::new(LruCache::new(capacity)) }
	}

	pub fn get_or_reduce(&self, file_rid: i64, max_seq: i64, appends: &[AppendRow]) -> Arc<Board> {
		let cache_key = (file_rid, max_seq);
		if let Some(board) = self.boards.lock().get(&cache_key) {
			return Arc::clone(board);
		}
		let board = Arc::new(reduce(appends));
		self.boards.lock().put(cache_key, Arc::clone(&board));
		board
	}
}

impl Default for ClaimCache {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(seq: i64, typ: AppendType, parent_ref: Option<i64>, author: &str) -> AppendRow {
		AppendRow {
			seq,
			parent_ref,
			author: author.into(),
			typ,
			status: None,
			priority: None,
			labels: None,
			content: Some("x".into()),
			expires_at: None,
			created_at: Timestamp(0),
		}
	}

	fn claim_row(seq: i64, task: i64, author: &str, expires_at: Timestamp) -> AppendRow {
		let mut r = row(seq, AppendType::Claim, Some(task), author);
		r.expires_at = Some(expires_at);
		r
	}

	#[test]
	fn open_task_has_no_active_claim() {
		let board = reduce(&[row(1, AppendType::Task, None, "pm")]);
		let now = Timestamp(1000);
		assert!(board.task(1).unwrap().active_claim(now).is_none());
		assert_eq!(board.stats(now).pending, 1);
	}

	#[test]
	fn claim_holds_until_expiry() {
		let board = reduce(&[
			row(1, AppendType::Task, None, "pm"),
			claim_row(2, 1, "worker", Timestamp(5000)),
		]);
		assert_eq!(
			board.task(1).unwrap().active_claim(Timestamp(1000)).map(|c| c.author.as_ref()),
			Some("worker")
		);
		// expired claim re-opens the task without an explicit cancel
		assert!(board.task(1).unwrap().active_claim(Timestamp(6000)).is_none());
		assert_eq!(board.stats(Timestamp(6000)).pending, 1);
	}

	#[test]
	fn renew_extends_expiry() {
		let mut renew = row(3, AppendType::Renew, Some(2), "worker");
		renew.expires_at = Some(Timestamp(9000));
		let board = reduce(&[
			row(1, AppendType::Task, None, "pm"),
			claim_row(2, 1, "worker", Timestamp(5000)),
			renew,
		]);
		assert!(board.task(1).unwrap().active_claim(Timestamp(8000)).is_some());
	}

	#[test]
	fn cancel_releases_the_claim() {
		let board = reduce(&[
			row(1, AppendType::Task, None, "pm"),
			claim_row(2, 1, "worker", Timestamp(5000)),
			row(3, AppendType::Cancel, Some(2), "worker"),
		]);
		assert!(board.task(1).unwrap().active_claim(Timestamp(1000)).is_none());
	}

	#[test]
	fn response_completes_the_task() {
		let board = reduce(&[
			row(1, AppendType::Task, None, "pm"),
			claim_row(2, 1, "worker", Timestamp(5000)),
			row(3, AppendType::Response, Some(1), "worker"),
		]);
		let now = Timestamp(1000);
		let task = board.task(1).unwrap();
		assert!(task.done);
		assert!(task.active_claim(now).is_none());
		assert_eq!(board.stats(now).completed, 1);
		assert_eq!(board.task_status(1, now), Some("done"));
	}

	#[test]
	fn later_claim_wins_after_cancel() {
		let board = reduce(&[
			row(1, AppendType::Task, None, "pm"),
			claim_row(2, 1, "a", Timestamp(5000)),
			row(3, AppendType::Cancel, Some(2), "a"),
			claim_row(4, 1, "b", Timestamp(5000)),
		]);
		assert_eq!(
			board.task(1).unwrap().active_claim(Timestamp(1000)).map(|c| c.author.as_ref()),
			Some("b")
		);
	}

	#[test]
	fn cache_invalidates_on_new_max_seq() {
		let cache = ClaimCache::new();
		let log1 = vec![row(1, AppendType::Task, None, "pm")];
		let board1 = cache.get_or_reduce(7, 1, &log1);
		assert_eq!(board1.tasks.len(), 1);

		let mut log2 = log1.clone();
		log2.push(row(2, AppendType::Task, None, "pm"));
		let board2 = cache.get_or_reduce(7, 2, &log2);
		assert_eq!(board2.tasks.len(), 2);
	}
}

// vim: ts=4
