//! Append planner: the task state machine.
//!
//! `plan` is a pure function from (current log, batch, constraints) to either
//! an error or the exact set of inserts and materialized-status rewrites.
//! The storage adapter calls it inside the append transaction, after taking
//! the file's write lock, so the whole batch validates against a stable view
//! and commits atomically.

use std::collections::BTreeMap;

use crate::append::claim::{self, ClaimState, TaskState};
use crate::prelude::*;
use crate::store_adapter::{
	append_status, AppendContext, AppendEvent, AppendInput, AppendPlan, AppendRow, AppendType,
	PlannedAppend, AppendUpdate,
};

/// Validate a batch against the current log and produce the plan.
///
/// * `next_seq` - first sequence number to assign (counter already bumped)
/// * `active_claims` - per-author active-claim counts within the key's
///   scope, counted in-store under the same transaction. WIP enforcement is
///   per claiming author: a batch may carry claims by several authors, and
///   each is gated only against their own count.
pub fn plan(
	existing: &[AppendRow],
	inputs: &[AppendInput],
	ctx: &AppendContext,
	next_seq: i64,
	active_claims: &BTreeMap<Box<str>, u32>,
) -> ApiResult<AppendPlan> {
	let mut board = claim::reduce(existing);
	let mut claim_task: BTreeMap<i64, i64> = BTreeMap::new();
	for task in board.tasks.values() {
		for c in &task.claims {
			claim_task.insert(c.seq, task.seq);
		}
	}
	let mut existing_seqs: Vec<i64> = existing.iter().map(|r| r.seq).collect();

	let mut out = AppendPlan::default();
	let mut wip: BTreeMap<&str, u32> =
		active_claims.iter().map(|(author, count)| (author.as_ref(), *count)).collect();
	let now = ctx.now;

	for (i, input) in inputs.iter().enumerate() {
		let seq = next_seq + i as i64;
		check_type_allowed(ctx, input.typ)?;

		match input.typ {
			AppendType::Task => {
				if input.content.as_deref().is_none_or(str::is_empty) {
					return Err(Error::InvalidRequest("a task requires content".into()));
				}
				board.tasks.insert(
					seq,
					TaskState { seq, done: false, completed_by: None, claims: Vec::new() },
				);
				out.items.push(item(seq, input, Some(append_status::OPEN), None));
				out.events.push(AppendEvent::TaskCreated);
			}

			AppendType::Comment => {
				out.items.push(item(seq, input, None, None));
			}

			AppendType::Claim => {
				let task_seq = require_ref(input, "a claim")?;
				let task = match board.tasks.get(&task_seq) {
					Some(task) => task,
					None => return Err(ref_error(&existing_seqs, task_seq, "task")),
				};
				if task.done {
					return Err(Error::TaskAlreadyComplete);
				}
				if let Some(active) = task.active_claim(now) {
					return Err(Error::AlreadyClaimed {
						claimed_by: active.author.clone(),
						expires_at: active.expires_at,
						retry_after_ms: (active.expires_at.0 - now.0).max(0),
					});
				}
				if let Some(limit) = ctx.wip_limit {
					let current = wip.get(input.author.as_ref()).copied().unwrap_or(0);
					if current >= limit {
						return Err(Error::WipLimitExceeded { current_count: current, limit });
					}
				}

				let expires_at = now.add_seconds(ctx.claim_duration_secs);
				if let Some(task) = board.tasks.get_mut(&task_seq) {
					task.claims.push(ClaimState {
						seq,
						task_seq,
						author: input.author.clone(),
						expires_at,
						cancelled: false,
					});
				}
				claim_task.insert(seq, task_seq);
				*wip.entry(input.author.as_ref()).or_insert(0) += 1;
				out.items.push(item(seq, input, Some(append_status::ACTIVE), Some(expires_at)));
				out.events.push(AppendEvent::TaskClaimed);
			}

			AppendType::Renew => {
				let claim_seq = require_ref(input, "a renew")?;
				let (task_done, holder, cancelled, expires_at) =
					match lookup_claim(&board, &claim_task, claim_seq) {
						Some(info) => info,
						None => return Err(ref_error(&existing_seqs, claim_seq, "claim")),
					};
				if holder.as_ref() != input.author.as_ref() {
					return Err(Error::InvalidRequest(
						"only the claim holder can renew it".into(),
					));
				}
				if task_done || cancelled || expires_at <= now {
					return Err(Error::Conflict("claim is no longer active".into()));
				}

				let new_expiry = now.add_seconds(ctx.claim_duration_secs).max(expires_at);
				set_claim_expiry(&mut board, &claim_task, claim_seq, new_expiry);
				out.items.push(item(seq, input, None, Some(new_expiry)));
				out.updates.push(AppendUpdate {
					seq: claim_seq,
					set_status: None,
					set_expires_at: Some(new_expiry),
				});
			}

			AppendType::Cancel => {
				let claim_seq = require_ref(input, "a cancel")?;
				let (task_done, holder, cancelled, expires_at) =
					match lookup_claim(&board, &claim_task, claim_seq) {
						Some(info) => info,
						None => return Err(ref_error(&existing_seqs, claim_seq, "claim")),
					};
				if holder.as_ref() != input.author.as_ref() {
					return Err(Error::InvalidRequest(
						"only the claim holder can cancel it".into(),
					));
				}

				// Cancelling a dead claim is an accepted no-op
				if !task_done && !cancelled && expires_at > now {
					mark_claim_cancelled(&mut board, &claim_task, claim_seq);
					out.updates.push(AppendUpdate {
						seq: claim_seq,
						set_status: Some(append_status::CANCELLED),
						set_expires_at: None,
					});
					out.events.push(AppendEvent::TaskCancelled);
				}
				out.items.push(item(seq, input, None, None));
			}

			AppendType::Response => {
				let task_seq = require_ref(input, "a response")?;
				let task = match board.tasks.get(&task_seq) {
					Some(task) => task,
					None => return Err(ref_error(&existing_seqs, task_seq, "task")),
				};

				if task.done {
					// Repeating a completion is an accepted no-op for the
					// original completer; anyone else gets the conflict
					if task.completed_by.as_deref() == Some(input.author.as_ref()) {
						out.items.push(item(seq, input, None, None));
						out.events.push(AppendEvent::AppendCreated);
						existing_seqs.push(seq);
						continue;
					}
					return Err(Error::TaskAlreadyComplete);
				}

				if let Some(active) = task.active_claim(now) {
					if active.author.as_ref() != input.author.as_ref() {
						return Err(Error::AlreadyClaimed {
							claimed_by: active.author.clone(),
							expires_at: active.expires_at,
							retry_after_ms: (active.expires_at.0 - now.0).max(0),
						});
					}
					out.updates.push(AppendUpdate {
						seq: active.seq,
						set_status: Some(append_status::RELEASED),
						set_expires_at: None,
					});
				}

				if let Some(task) = board.tasks.get_mut(&task_seq) {
					task.done = true;
					task.completed_by = Some(input.author.clone());
				}
				out.updates.push(AppendUpdate {
					seq: task_seq,
					set_status: Some(append_status::DONE),
					set_expires_at: None,
				});
				out.items.push(item(seq, input, None, None));
				out.events.push(AppendEvent::TaskCompleted);
			}
		}

		out.events.push(AppendEvent::AppendCreated);
		existing_seqs.push(seq);
	}

	Ok(out)
}

fn item(
	seq: i64,
	input: &AppendInput,
	status: Option<&'static str>,
	expires_at: Option<Timestamp>,
) -> PlannedAppend {
	PlannedAppend {
		seq,
		typ: input.typ,
		parent_ref: input.parent_ref,
		author: input.author.clone(),
		status,
		priority: input.priority.clone(),
		labels: input.labels.clone(),
		content: input.content.clone(),
		expires_at,
	}
}

fn check_type_allowed(ctx: &AppendContext, typ: AppendType) -> ApiResult<()> {
	if let Some(allowed) = &ctx.key_allowed_types {
		if !allowed.contains(&typ) {
			return Err(Error::TypeNotAllowed(typ.as_str().into()));
		}
	}
	if let Some(allowed) = &ctx.file_allowed_types {
		if !allowed.contains(&typ) {
			return Err(Error::TypeNotAllowed(typ.as_str().into()));
		}
	}
	Ok(())
}

fn require_ref(input: &AppendInput, what: &str) -> ApiResult<i64> {
	input
		.parent_ref
		.ok_or_else(|| Error::InvalidRequest(format!("{} requires a ref", what)))
}

/// Missing target vs. target of the wrong type
fn ref_error(existing_seqs: &[i64], seq: i64, expected: &str) -> Error {
	if existing_seqs.contains(&seq) {
		Error::InvalidRequest(format!("ref a{} does not reference a {}", seq, expected))
	} else {
		Error::AppendNotFound
	}
}

fn lookup_claim(
	board: &claim::Board,
	claim_task: &BTreeMap<i64, i64>,
	claim_seq: i64,
) -> Option<(bool, Box<str>, bool, Timestamp)> {
	let task_seq = claim_task.get(&claim_seq)?;
	let task = board.tasks.get(task_seq)?;
	let c = task.claims.iter().find(|c| c.seq == claim_seq)?;
	Some((task.done, c.author.clone(), c.cancelled, c.expires_at))
}

fn set_claim_expiry(
	board: &mut claim::Board,
	claim_task: &BTreeMap<i64, i64>,
	claim_seq: i64,
	expires_at: Timestamp,
) {
	if let Some(task_seq) = claim_task.get(&claim_seq) {
		if let Some(task) = board.tasks.get_mut(task_seq) {
			if let Some(c) = task.claims.iter_mut().find(|c| c.seq == claim_seq) {
				c.expires_at = expires_at;
			}
		}
	}
}

fn mark_claim_cancelled(
	board: &mut claim::Board,
	claim_task: &BTreeMap<i64, i64>,
	claim_seq: i64,
) {
	if let Some(task_seq) = claim_task.get(&claim_seq) {
		if let Some(task) = board.tasks.get_mut(task_seq) {
			if let Some(c) = task.claims.iter_mut().find(|c| c.seq == claim_seq) {
				c.cancelled = true;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ctx(now: Timestamp) -> AppendContext {
		AppendContext {
			key_allowed_types: None,
			file_allowed_types: None,
			wip_limit: None,
			wip_scope: "/".into(),
			claim_duration_secs: 600,
			now,
		}
	}

	fn no_claims() -> BTreeMap<Box<str>, u32> {
		BTreeMap::new()
	}

	fn claims_of(author: &str, count: u32) -> BTreeMap<Box<str>, u32> {
		BTreeMap::from([(Box::from(author), count)])
	}

	fn input(typ: AppendType, parent_ref: Option<i64>, author: &str) -> AppendInput {
		AppendInput {
			typ,
			parent_ref,
			author: author.into(),
			content: Some("content".into()),
			priority: None,
			labels: None,
		}
	}

	fn task_row(seq: i64) -> AppendRow {
		AppendRow {
			seq,
			parent_ref: None,
			author: "pm".into(),
			typ: AppendType::Task,
			status: Some("open".into()),
			priority: None,
			labels: None,
			content: Some("do it".into()),
			expires_at: None,
			created_at: Timestamp(0),
		}
	}

	fn claim_row(seq: i64, task: i64, author: &str, expires_at: Timestamp) -> AppendRow {
		AppendRow {
			seq,
			parent_ref: Some(task),
			author: author.into(),
			typ: AppendType::Claim,
			status: Some("active".into()),
			priority: None,
			labels: None,
			content: None,
			expires_at: Some(expires_at),
			created_at: Timestamp(0),
		}
	}

	#[test]
	fn task_gets_open_status_and_events() {
		let now = Timestamp(1000);
		let plan =
			plan(&[], &[input(AppendType::Task, None, "pm")], &ctx(now), 1, &no_claims()).unwrap();
		assert_eq!(plan.items.len(), 1);
		assert_eq!(plan.items[0].seq, 1);
		assert_eq!(plan.items[0].status, Some(append_status::OPEN));
		assert!(plan.events.contains(&AppendEvent::TaskCreated));
		assert!(plan.events.contains(&AppendEvent::AppendCreated));
	}

	#[test]
	fn claim_of_claimed_task_conflicts() {
		let now = Timestamp(1000);
		let existing = vec![task_row(1), claim_row(2, 1, "a", Timestamp(600_000))];
		let err = plan(&existing, &[input(AppendType::Claim, Some(1), "b")], &ctx(now), 3, &no_claims())
			.unwrap_err();
		match err {
			Error::AlreadyClaimed { claimed_by, retry_after_ms, .. } => {
				assert_eq!(claimed_by.as_ref(), "a");
				assert!(retry_after_ms >= 0);
			}
			other => panic!("unexpected: {:?}", other),
		}
	}

	#[test]
	fn claim_of_expired_claim_succeeds() {
		let now = Timestamp(1_000_000);
		let existing = vec![task_row(1), claim_row(2, 1, "a", Timestamp(500))];
		let plan =
			plan(&existing, &[input(AppendType::Claim, Some(1), "b")], &ctx(now), 3, &no_claims()).unwrap();
		assert_eq!(plan.items[0].status, Some(append_status::ACTIVE));
	}

	#[test]
	fn wip_limit_rejects_with_counts() {
		let now = Timestamp(1000);
		let mut c = ctx(now);
		c.wip_limit = Some(1);
		let existing = vec![task_row(1)];
		let err = plan(
			&existing,
			&[input(AppendType::Claim, Some(1), "x")],
			&c,
			2,
			&claims_of("x", 1),
		)
		.unwrap_err();
		match err {
			Error::WipLimitExceeded { current_count, limit } => {
				assert_eq!((current_count, limit), (1, 1));
			}
			other => panic!("unexpected: {:?}", other),
		}
	}

	#[test]
	fn wip_limit_counts_claims_within_the_batch() {
		let now = Timestamp(1000);
		let mut c = ctx(now);
		c.wip_limit = Some(1);
		let existing = vec![task_row(1), task_row(2)];
		let batch = vec![
			input(AppendType::Claim, Some(1), "x"),
			input(AppendType::Claim, Some(2), "x"),
		];
		assert!(matches!(
			plan(&existing, &batch, &c, 3, &no_claims()),
			Err(Error::WipLimitExceeded { .. })
		));
	}

	#[test]
	fn wip_limit_is_tracked_per_author() {
		let now = Timestamp(1000);
		let mut c = ctx(now);
		c.wip_limit = Some(1);
		let existing = vec![task_row(1), task_row(2)];

		// two authors claiming side by side in one batch each stay under
		// their own limit
		let batch = vec![
			input(AppendType::Claim, Some(1), "x"),
			input(AppendType::Claim, Some(2), "y"),
		];
		let planned = plan(&existing, &batch, &c, 3, &no_claims()).unwrap();
		assert_eq!(planned.items.len(), 2);

		// a count held by one author does not gate another
		let batch = vec![input(AppendType::Claim, Some(1), "y")];
		assert!(plan(&existing, &batch, &c, 3, &claims_of("x", 1)).is_ok());

		// but it does gate that author
		let batch = vec![input(AppendType::Claim, Some(1), "x")];
		match plan(&existing, &batch, &c, 3, &claims_of("x", 1)) {
			Err(Error::WipLimitExceeded { current_count, limit }) => {
				assert_eq!((current_count, limit), (1, 1));
			}
			other => panic!("expected WIP limit, got {:?}", other),
		}
	}

	#[test]
	fn response_completes_and_releases() {
		let now = Timestamp(1000);
		let existing = vec![task_row(1), claim_row(2, 1, "a", Timestamp(600_000))];
		let plan =
			plan(&existing, &[input(AppendType::Response, Some(1), "a")], &ctx(now), 3, &no_claims())
				.unwrap();
		assert!(plan.updates.iter().any(|u| u.seq == 1 && u.set_status == Some("done")));
		assert!(plan.updates.iter().any(|u| u.seq == 2 && u.set_status == Some("released")));
		assert!(plan.events.contains(&AppendEvent::TaskCompleted));
	}

	#[test]
	fn response_by_non_holder_conflicts() {
		let now = Timestamp(1000);
		let existing = vec![task_row(1), claim_row(2, 1, "a", Timestamp(600_000))];
		assert!(matches!(
			plan(&existing, &[input(AppendType::Response, Some(1), "b")], &ctx(now), 3, &no_claims()),
			Err(Error::AlreadyClaimed { .. })
		));
	}

	#[test]
	fn repeated_completion_by_holder_is_a_noop() {
		let now = Timestamp(1000);
		let mut response = task_row(3);
		response.typ = AppendType::Response;
		response.parent_ref = Some(1);
		response.author = "a".into();
		let existing = vec![task_row(1), claim_row(2, 1, "a", Timestamp(600_000)), response];
		let plan =
			plan(&existing, &[input(AppendType::Response, Some(1), "a")], &ctx(now), 4, &no_claims())
				.unwrap();
		assert!(plan.updates.is_empty());
		assert_eq!(plan.items.len(), 1);
	}

	#[test]
	fn claim_of_done_task_is_rejected() {
		let now = Timestamp(1000);
		let mut response = task_row(2);
		response.typ = AppendType::Response;
		response.parent_ref = Some(1);
		let existing = vec![task_row(1), response];
		assert!(matches!(
			plan(&existing, &[input(AppendType::Claim, Some(1), "b")], &ctx(now), 3, &no_claims()),
			Err(Error::TaskAlreadyComplete)
		));
	}

	#[test]
	fn batch_can_create_and_claim_in_one_go() {
		let now = Timestamp(1000);
		let batch = vec![
			input(AppendType::Task, None, "pm"),
			input(AppendType::Claim, Some(1), "pm"),
		];
		let plan = plan(&[], &batch, &ctx(now), 1, &no_claims()).unwrap();
		assert_eq!(plan.items.len(), 2);
		assert_eq!(plan.items[1].parent_ref, Some(1));
	}

	#[test]
	fn type_restrictions_reject_the_whole_batch() {
		let now = Timestamp(1000);
		let mut c = ctx(now);
		c.key_allowed_types = Some(Box::new([AppendType::Comment]));
		let batch = vec![
			input(AppendType::Comment, None, "pm"),
			input(AppendType::Task, None, "pm"),
		];
		assert!(matches!(
			plan(&[], &batch, &c, 1, &no_claims()),
			Err(Error::TypeNotAllowed(_))
		));
	}

	#[test]
	fn missing_ref_is_append_not_found_wrong_type_is_invalid() {
		let now = Timestamp(1000);
		let existing = vec![task_row(1)];
		assert!(matches!(
			plan(&existing, &[input(AppendType::Claim, Some(99), "a")], &ctx(now), 2, &no_claims()),
			Err(Error::AppendNotFound)
		));
		// ref exists but is a task, not a claim
		assert!(matches!(
			plan(&existing, &[input(AppendType::Cancel, Some(1), "a")], &ctx(now), 2, &no_claims()),
			Err(Error::InvalidRequest(_))
		));
	}

	#[test]
	fn renew_extends_only_for_the_holder() {
		let now = Timestamp(1000);
		let existing = vec![task_row(1), claim_row(2, 1, "a", Timestamp(600_000))];
		let plan_ok =
			plan(&existing, &[input(AppendType::Renew, Some(2), "a")], &ctx(now), 3, &no_claims()).unwrap();
		assert!(plan_ok.updates.iter().any(|u| u.seq == 2 && u.set_expires_at.is_some()));

		assert!(matches!(
			plan(&existing, &[input(AppendType::Renew, Some(2), "b")], &ctx(now), 3, &no_claims()),
			Err(Error::InvalidRequest(_))
		));
	}
}

// vim: ts=4
