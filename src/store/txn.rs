//! Transaction scope (§4.3): release-on-all-exit-paths, nested
//! transactions as savepoints, single shared backing store accessed by
//! one write lock at a time — grounded in the teacher's single-
//! `RwLock`-guarded metadata pattern (`metadata/mod.rs`).

use tokio::sync::OwnedRwLockWriteGuard;

use crate::notify::{Collector, MutationRecord};
use crate::types::SessionId;

use super::error::StoreError;
use super::stats::StatsCache;
use super::tables::Tables;

/// A handle to one mutation scope against the shared store. Holds the
/// write lock for its entire lifetime (§5: "commands on different
/// sessions may execute concurrently" refers to store I/O suspension
/// points, not table-level sharding — this crate keeps one shared table
/// set, consistent with spec.md's "single shared backing store").
///
/// Holds an *owned* lock guard (cloned from the store's `Arc<RwLock<_>>`)
/// rather than borrowing `&Store`, so a `TransactionCommand::Begin` can
/// keep a transaction open across several separate client commands
/// without tying its lifetime to a single handler call (§4.7
/// TransactionCommand).
pub struct Transaction {
	pub(super) tables: OwnedRwLockWriteGuard<Tables>,
	pub(super) stats: OwnedRwLockWriteGuard<StatsCache>,
	root_snapshot: Tables,
	stats_root_snapshot: StatsCache,
	savepoints: Vec<(Tables, StatsCache, usize)>,
	pub(super) collector: Collector,
	pub(super) session_id: SessionId,
	completed: bool,
}

impl Transaction {
	pub(super) fn new(tables: OwnedRwLockWriteGuard<Tables>, stats: OwnedRwLockWriteGuard<StatsCache>, session_id: SessionId) -> Self {
		let root_snapshot = tables.clone();
		let stats_root_snapshot = stats.clone();
		Transaction {
			tables,
			stats,
			root_snapshot,
			stats_root_snapshot,
			savepoints: Vec::new(),
			collector: Collector::new(),
			session_id,
			completed: false,
		}
	}

	/// `TransactionCommand::Begin` inside an already-open transaction:
	/// pushes a savepoint.
	pub fn begin_savepoint(&mut self) {
		self.savepoints.push((self.tables.clone(), self.stats.clone(), self.collector.mark()));
	}

	/// `TransactionCommand::Commit` of the innermost savepoint: keeps its
	/// writes, just drops the ability to roll back to it.
	pub fn commit_savepoint(&mut self) -> Result<(), StoreError> {
		self.savepoints.pop().map(|_| ()).ok_or(StoreError::NoActiveTransaction)
	}

	/// `TransactionCommand::Rollback` of the innermost savepoint: restores
	/// the table state and discards mutation records recorded since.
	pub fn rollback_savepoint(&mut self) -> Result<(), StoreError> {
		let (tables_snapshot, stats_snapshot, mark) = self.savepoints.pop().ok_or(StoreError::NoActiveTransaction)?;
		*self.tables = tables_snapshot;
		*self.stats = stats_snapshot;
		self.collector.truncate_to(mark);
		Ok(())
	}

	pub fn has_open_savepoint(&self) -> bool {
		!self.savepoints.is_empty()
	}

	/// Commits the whole transaction, returning the finished mutation
	/// batch in commit order for the caller to hand to the notification
	/// router (§4.5 "on commit() the collector hands the batch to the
	/// router").
	pub fn commit(mut self) -> Vec<MutationRecord> {
		self.completed = true;
		std::mem::take(&mut self.collector).finish()
	}

	/// Rolls back every write made under this transaction (including any
	/// still-open savepoints) and discards all recorded mutations.
	pub fn rollback(mut self) {
		*self.tables = std::mem::take(&mut self.root_snapshot);
		*self.stats = std::mem::take(&mut self.stats_root_snapshot);
		self.completed = true;
	}
}

impl Drop for Transaction {
	fn drop(&mut self) {
		if !self.completed {
			*self.tables = std::mem::take(&mut self.root_snapshot);
			*self.stats = std::mem::take(&mut self.stats_root_snapshot);
		}
	}
}

// vim: ts=4
