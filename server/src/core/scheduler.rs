//! Background scheduler. Runs maintenance jobs (soft-delete reaping,
//! idempotency record expiry) on cron-style schedules.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::prelude::*;

/// Cron schedule for recurring tasks: minute hour day month weekday
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
	/// Minute: 0-59, or 60 to indicate "any"
	pub minute: u8,
	/// Hour: 0-23, or 24 to indicate "any"
	pub hour: u8,
	/// Day of month: 1-31, or 0 to indicate "any"
	pub day: u8,
	/// Month: 1-12, or 0 to indicate "any"
	pub month: u8,
	/// Day of week: 0-6 (Sunday=0), or 7 to indicate "any"
	pub weekday: u8,
}

impl CronSchedule {
	/// Parse a 5-field cron expression
	pub fn parse(expr: &str) -> ApiResult<Self> {
		let parts: Vec<&str> = expr.split_whitespace().collect();
		if parts.len() != 5 {
			return Err(Error::Internal(format!("invalid cron expression: {}", expr)));
		}

		Ok(Self {
			minute: Self::parse_field(parts[0], 0, 59)?,
			hour: Self::parse_field(parts[1], 0, 23)?,
			day: Self::parse_field(parts[2], 1, 31)?,
			month: Self::parse_field(parts[3], 1, 12)?,
			weekday: Self::parse_field(parts[4], 0, 6)?,
		})
	}

	/// `*` maps to max_value + 1, meaning "any"
	fn parse_field(field: &str, min: u8, max: u8) -> ApiResult<u8> {
		if field == "*" {
			return Ok(max + 1);
		}
		let val: u8 = field
			.parse()
			.map_err(|_| Error::Internal(format!("invalid cron field: {}", field)))?;
		if val >= min && val <= max {
			Ok(val)
		} else {
			Err(Error::Internal(format!("cron field out of range: {}", field)))
		}
	}

	/// Check whether a timestamp (UTC) matches this schedule
	pub fn matches(&self, ts: Timestamp) -> bool {
		use chrono::{Datelike, Timelike};
		let Some(dt) = chrono::DateTime::from_timestamp_millis(ts.0) else {
			return false;
		};

		if self.minute <= 59 && dt.minute() as u8 != self.minute {
			return false;
		}
		if self.hour <= 23 && dt.hour() as u8 != self.hour {
			return false;
		}
		if self.day >= 1 && self.day <= 31 && dt.day() as u8 != self.day {
			return false;
		}
		if self.month >= 1 && self.month <= 12 && dt.month() as u8 != self.month {
			return false;
		}
		if self.weekday <= 6 && dt.weekday().num_days_from_sunday() as u8 != self.weekday {
			return false;
		}
		true
	}
}

type TaskFn<S> = Arc<dyn Fn(S) -> Pin<Box<dyn Future<Output = ApiResult<()>> + Send>> + Send + Sync>;

struct ScheduledTask<S> {
	name: &'static str,
	schedule: CronSchedule,
	run: TaskFn<S>,
}

/// Owns the registered maintenance jobs and the ticking loop.
/// Started once by the server lifecycle; stopped via the shutdown channel.
pub struct Scheduler<S> {
	tasks: Vec<ScheduledTask<S>>,
	shutdown: tokio::sync::watch::Sender<bool>,
}

impl<S: Clone + Send + Sync + 'static> Scheduler<S> {
	pub fn new() -> Self {
		let (shutdown, _) = tokio::sync::watch::channel(false);
		Self { tasks: Vec::new(), shutdown }
	}

	pub fn add_task<F, Fut>(&mut self, name: &'static str, cron: &str, f: F) -> ApiResult<()>
	where
		F: Fn(S) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ApiResult<()>> + Send + 'static,
	{
		let schedule = CronSchedule::parse(cron)?;
		self.tasks.push(ScheduledTask {
			name,
			schedule,
			run: Arc::new(move |state| Box::pin(f(state))),
		});
		Ok(())
	}

	/// Spawn the tick loop. Each minute, every matching task runs once.
	pub fn start(self: Arc<Self>, state: S) {
		let mut shutdown_rx = self.shutdown.subscribe();
		let scheduler = Arc::clone(&self);
		tokio::spawn(async move {
			let mut last_minute: i64 = Timestamp::now().0 / 60_000;
			loop {
				tokio::select! {
					_ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
					_ = shutdown_rx.changed() => {
						info!("scheduler shutting down");
						return;
					}
				}

				let now = Timestamp::now();
				let minute = now.0 / 60_000;
				if minute == last_minute {
					continue;
				}
				last_minute = minute;

				for task in &scheduler.tasks {
					if task.schedule.matches(now) {
						debug!("scheduler: running task '{}'", task.name);
						let run = Arc::clone(&task.run);
						let state = state.clone();
						let name = task.name;
						tokio::spawn(async move {
							if let Err(err) = run(state).await {
								warn!("scheduled task '{}' failed: {:?}", name, err);
							}
						});
					}
				}
			}
		});
	}

	pub fn shutdown(&self) {
		let _ignore = self.shutdown.send(true);
	}
}

impl<S: Clone + Send + Sync + 'static> Default for Scheduler<S> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_wildcards_and_values() {
		let s = CronSchedule::parse("15 3 * * *").unwrap();
		assert_eq!(s.minute, 15);
		assert_eq!(s.hour, 3);
		assert_eq!(s.day, 0);
		assert_eq!(s.month, 0);
		assert_eq!(s.weekday, 7);
	}

	#[test]
	fn rejects_malformed_expressions() {
		assert!(CronSchedule::parse("a b c").is_err());
		assert!(CronSchedule::parse("61 * * * *").is_err());
	}

	#[test]
	fn matches_utc_components() {
		// 2023-11-14T22:13:20Z
		let ts = Timestamp(1_700_000_000_000);
		assert!(CronSchedule::parse("13 22 * * *").unwrap().matches(ts));
		assert!(CronSchedule::parse("* * * * *").unwrap().matches(ts));
		assert!(!CronSchedule::parse("14 22 * * *").unwrap().matches(ts));
		assert!(CronSchedule::parse("13 22 14 11 *").unwrap().matches(ts));
		// 2023-11-14 is a Tuesday
		assert!(CronSchedule::parse("* * * * 2").unwrap().matches(ts));
		assert!(!CronSchedule::parse("* * * * 3").unwrap().matches(ts));
	}
}

// vim: ts=4
