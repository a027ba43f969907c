//! Interval scheduler (C9): per-collection periodic sync timer heap
//! (§4.9).
//!
//! Grounded in the teacher's `tokio::time`-driven background task
//! pattern (`sync.rs`'s periodic-sync loop), generalized from a single
//! global interval to a per-collection heap.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::sleep_until;

use crate::types::EntityId;

#[derive(Debug)]
pub enum SchedulerError {
	UnknownCollection(EntityId),
}

impl fmt::Display for SchedulerError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SchedulerError::UnknownCollection(id) => write!(f, "no scheduled entry for collection {}", id),
		}
	}
}

impl std::error::Error for SchedulerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
	when: Instant,
	collection_id: EntityId,
	/// Incremented on every reschedule of this id; a popped entry whose
	/// generation doesn't match the live map entry is stale and ignored
	/// (lazy deletion, avoids rebuilding the heap on every reschedule).
	generation: u64,
}

impl Ord for HeapEntry {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.when.cmp(&other.when).then(self.collection_id.cmp(&other.collection_id))
	}
}
impl PartialOrd for HeapEntry {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

struct LiveEntry {
	when: Instant,
	interval: Duration,
	generation: u64,
}

/// Per-collection next-scheduled-time map plus a lazy-deletion min-heap
/// timer. `minimum_interval` clamps every effective interval from below
/// (default 5 minutes, §4.9).
pub struct Scheduler {
	heap: BinaryHeap<Reverse<HeapEntry>>,
	live: HashMap<EntityId, LiveEntry>,
	minimum_interval: Duration,
	fired_tx: mpsc::Sender<EntityId>,
}

pub struct SchedulerHandle {
	pub fired_rx: mpsc::Receiver<EntityId>,
}

/// Out-of-band control messages a command handler sends to the running
/// scheduler task (the scheduler itself is moved into its own task by
/// `run`, so handlers can't call its methods directly; §4.7
/// CreateCollection/DeleteCollection/ModifyCollection drive these).
pub enum SchedulerCommand {
	Added { collection_id: EntityId, default_interval: Duration, prior_removal: Option<(Instant, Duration)>, reuse_window: Duration },
	Removed { collection_id: EntityId, reply: mpsc::Sender<Option<(Instant, Duration)>> },
	Changed { collection_id: EntityId, new_interval: Duration },
}

pub struct SchedulerControl {
	tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerControl {
	pub async fn collection_added(
		&self,
		collection_id: EntityId,
		default_interval: Duration,
		prior_removal: Option<(Instant, Duration)>,
		reuse_window: Duration,
	) {
		let _ = self.tx.send(SchedulerCommand::Added { collection_id, default_interval, prior_removal, reuse_window }).await;
	}

	pub async fn collection_removed(&self, collection_id: EntityId) -> Option<(Instant, Duration)> {
		let (reply, mut rx) = mpsc::channel(1);
		if self.tx.send(SchedulerCommand::Removed { collection_id, reply }).await.is_err() {
			return None;
		}
		rx.recv().await.flatten()
	}

	pub async fn collection_changed(&self, collection_id: EntityId, new_interval: Duration) {
		let _ = self.tx.send(SchedulerCommand::Changed { collection_id, new_interval }).await;
	}
}

impl Scheduler {
	pub fn new(minimum_interval: Duration) -> (Scheduler, SchedulerHandle, SchedulerControl, mpsc::Receiver<SchedulerCommand>) {
		let (fired_tx, fired_rx) = mpsc::channel(256);
		let (command_tx, command_rx) = mpsc::channel(256);
		(
			Scheduler { heap: BinaryHeap::new(), live: HashMap::new(), minimum_interval, fired_tx },
			SchedulerHandle { fired_rx },
			SchedulerControl { tx: command_tx },
			command_rx,
		)
	}

	fn clamp(&self, interval: Duration) -> Duration {
		interval.max(self.minimum_interval)
	}

	/// Loads a collection at startup, scheduling it at `now + interval`.
	pub fn load(&mut self, collection_id: EntityId, interval: Duration) {
		self.schedule_at(collection_id, Instant::now() + self.clamp(interval), self.clamp(interval));
	}

	fn schedule_at(&mut self, collection_id: EntityId, when: Instant, interval: Duration) {
		let generation = self.live.get(&collection_id).map_or(0, |e| e.generation + 1);
		self.live.insert(collection_id, LiveEntry { when, interval, generation });
		self.heap.push(Reverse(HeapEntry { when, collection_id, generation }));
	}

	/// `collectionAdded`: if re-adding within `reuse_window` of a prior
	/// removal, reuses the prior next-scheduled-time instead of resetting
	/// the clock (§4.9 "minor optimisation").
	pub fn collection_added(
		&mut self,
		collection_id: EntityId,
		default_interval: Duration,
		prior_removal: Option<(Instant, Duration)>,
		reuse_window: Duration,
	) {
		let interval = self.clamp(default_interval);
		match prior_removal {
			Some((removed_when, removed_interval)) if removed_when.elapsed() <= reuse_window => {
				self.schedule_at(collection_id, removed_when, removed_interval);
			}
			_ => {
				self.schedule_at(collection_id, Instant::now() + interval, interval);
			}
		}
	}

	/// `collectionRemoved`: drops the entry; other entries and the
	/// timer's overall cadence are unaffected (lazy deletion via
	/// generation bump handles the stale heap entry).
	pub fn collection_removed(&mut self, collection_id: EntityId) -> Option<(Instant, Duration)> {
		self.live.remove(&collection_id).map(|e| (e.when, e.interval))
	}

	/// `collectionChanged`: re-reads the interval; if it changed,
	/// reschedules at `previous_time + (new - old)`.
	pub fn collection_changed(
		&mut self,
		collection_id: EntityId,
		new_interval: Duration,
	) -> Result<(), SchedulerError> {
		let new_interval = self.clamp(new_interval);
		let entry = self.live.get(&collection_id).ok_or(SchedulerError::UnknownCollection(collection_id))?;
		if entry.interval == new_interval {
			return Ok(());
		}
		let delta = if new_interval > entry.interval {
			new_interval - entry.interval
		} else {
			Duration::ZERO
		};
		let shrink = if entry.interval > new_interval { entry.interval - new_interval } else { Duration::ZERO };
		let new_when = if delta > Duration::ZERO { entry.when + delta } else { entry.when - shrink };
		self.schedule_at(collection_id, new_when, new_interval);
		Ok(())
	}

	pub fn next_scheduled_time(&self, collection_id: EntityId) -> Option<Instant> {
		self.live.get(&collection_id).map(|e| e.when)
	}

	/// Runs the timer loop: pops the earliest live entry, sleeps until
	/// it's due, fires it on `fired_tx`, and reschedules at
	/// `now + interval`, while concurrently applying `SchedulerCommand`s
	/// from command handlers. Intended to run as its own task.
	pub async fn run(mut self, mut commands: mpsc::Receiver<SchedulerCommand>) {
		loop {
			let next_due = self.heap.peek().map(|Reverse(e)| e.when);
			let sleep = async {
				match next_due {
					Some(when) => sleep_until(when.into()).await,
					None => std::future::pending::<()>().await,
				}
			};

			tokio::select! {
				_ = sleep => {
					let Some(Reverse(entry)) = self.heap.pop() else { continue };
					let is_live = self.live.get(&entry.collection_id).is_some_and(|e| e.generation == entry.generation);
					if !is_live {
						continue;
					}
					if self.fired_tx.send(entry.collection_id).await.is_err() {
						return;
					}
					if let Some(live) = self.live.get(&entry.collection_id) {
						let interval = live.interval;
						self.schedule_at(entry.collection_id, Instant::now() + interval, interval);
					}
				}
				command = commands.recv() => {
					match command {
						Some(SchedulerCommand::Added { collection_id, default_interval, prior_removal, reuse_window }) => {
							self.collection_added(collection_id, default_interval, prior_removal, reuse_window);
						}
						Some(SchedulerCommand::Removed { collection_id, reply }) => {
							let removed = self.collection_removed(collection_id);
							let _ = reply.send(removed).await;
						}
						Some(SchedulerCommand::Changed { collection_id, new_interval }) => {
							let _ = self.collection_changed(collection_id, new_interval);
						}
						None => return,
					}
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clamp_enforces_minimum_interval() {
		let (scheduler, _handle, _control, _commands) = Scheduler::new(Duration::from_secs(300));
		assert_eq!(scheduler.clamp(Duration::from_secs(60)), Duration::from_secs(300));
		assert_eq!(scheduler.clamp(Duration::from_secs(600)), Duration::from_secs(600));
	}

	#[test]
	fn collection_changed_shifts_by_delta() {
		let (mut scheduler, _handle, _control, _commands) = Scheduler::new(Duration::from_secs(60));
		scheduler.load(2, Duration::from_secs(300));
		let before = scheduler.next_scheduled_time(2).unwrap();
		scheduler.collection_changed(2, Duration::from_secs(1200)).unwrap();
		let after = scheduler.next_scheduled_time(2).unwrap();
		let delta = after.duration_since(before);
		assert!(delta >= Duration::from_secs(890) && delta <= Duration::from_secs(910));
	}

	#[test]
	fn collection_removed_then_readded_within_window_reuses_time() {
		let (mut scheduler, _handle, _control, _commands) = Scheduler::new(Duration::from_secs(60));
		scheduler.load(5, Duration::from_secs(300));
		let when_before = scheduler.next_scheduled_time(5).unwrap();
		let removal = scheduler.collection_removed(5);
		assert!(scheduler.next_scheduled_time(5).is_none());
		scheduler.collection_added(5, Duration::from_secs(300), removal, Duration::from_secs(30));
		assert_eq!(scheduler.next_scheduled_time(5).unwrap(), when_before);
	}
}

// vim: ts=4
