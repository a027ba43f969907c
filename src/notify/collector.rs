//! Notification collector (C5): accumulates mutations within a
//! transaction, coalesces them, and hands the batch to the router on
//! commit or discards it on rollback (§4.5).
//!
//! Grounded in the `DataStore::self()->notificationCollector()->
//! itemChanged(...)` call sites visible throughout
//! `original_source/server/src/handler/merge.cpp` and `akappend.cpp`.

use std::collections::BTreeMap;

use crate::types::EntityId;

use super::types::{CollectionChange, ItemChange, ItemOp, MutationRecord, RelationChange, TagChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EntityKey {
	Item(EntityId),
	Collection(EntityId),
	Tag(EntityId),
}

/// Accumulates the mutation batch for one transaction (including its
/// nested savepoints, which simply keep writing into the same
/// collector — a rolled-back savepoint must remove its own records,
/// handled by `truncate_to`).
#[derive(Debug, Default)]
pub struct Collector {
	records: Vec<Option<MutationRecord>>,
	last_index: BTreeMap<EntityKey, usize>,
}

impl Collector {
	pub fn new() -> Self {
		Collector::default()
	}

	/// Number of live (non-cancelled) records currently queued; used by
	/// savepoint rollback to know what to discard.
	pub fn mark(&self) -> usize {
		self.records.len()
	}

	/// Discards every record appended since `mark` (savepoint rollback).
	pub fn truncate_to(&mut self, mark: usize) {
		self.records.truncate(mark);
		self.last_index.retain(|_, idx| *idx < mark);
	}

	pub fn record_item_change(&mut self, change: ItemChange) {
		if matches!(change.op, ItemOp::Move | ItemOp::Link | ItemOp::Unlink) || change.item_ids.len() != 1 {
			self.records.push(Some(MutationRecord::Item(change)));
			return;
		}
		let id = change.item_ids[0];
		let key = EntityKey::Item(id);
		if let Some(&idx) = self.last_index.get(&key) {
			if let Some(MutationRecord::Item(prev)) = &mut self.records[idx] {
				if Self::coalesce_item(prev, &change) {
					if matches!(prev.op, ItemOp::Add) && matches!(change.op, ItemOp::Remove) {
						self.records[idx] = None;
						self.last_index.remove(&key);
					}
					return;
				}
			}
		}
		let idx = self.records.len();
		self.last_index.insert(key, idx);
		self.records.push(Some(MutationRecord::Item(change)));
	}

	/// Applies the coalescing rule for a (previous, incoming) item-change
	/// pair; returns `true` if the incoming change was absorbed (either
	/// merged into `prev` or cancelled it) and should not be queued
	/// separately.
	fn coalesce_item(prev: &mut ItemChange, change: &ItemChange) -> bool {
		use ItemOp::*;
		match (prev.op, change.op) {
			(Add, Modify) | (Add, ModifyFlags) | (Add, ModifyTags) | (Add, ModifyRelations) => {
				prev.changed_parts.extend(change.changed_parts.iter().cloned());
				true
			}
			(Add, Remove) => true,
			(a, b) if a == b && matches!(a, Modify | ModifyFlags | ModifyTags | ModifyRelations) => {
				prev.changed_parts.extend(change.changed_parts.iter().cloned());
				true
			}
			_ => false,
		}
	}

	pub fn record_collection_change(&mut self, change: CollectionChange) {
		use super::types::CollectionOp::*;
		let key = EntityKey::Collection(change.collection_id);
		if matches!(change.op, Modify) {
			if let Some(&idx) = self.last_index.get(&key) {
				if let Some(MutationRecord::Collection(prev)) = &mut self.records[idx] {
					if matches!(prev.op, Modify) {
						prev.changed_parts.extend(change.changed_parts.iter().cloned());
						return;
					}
				}
			}
		}
		let idx = self.records.len();
		if matches!(change.op, Add | Modify) {
			self.last_index.insert(key, idx);
		}
		self.records.push(Some(MutationRecord::Collection(change)));
	}

	pub fn record_tag_change(&mut self, change: TagChange) {
		self.records.push(Some(MutationRecord::Tag(change)));
	}

	pub fn record_relation_change(&mut self, change: RelationChange) {
		self.records.push(Some(MutationRecord::Relation(change)));
	}

	/// Consumes the collector, returning the finished batch in commit
	/// (append) order, cancelled records omitted.
	pub fn finish(self) -> Vec<MutationRecord> {
		self.records.into_iter().flatten().collect()
	}

	pub fn is_empty(&self) -> bool {
		self.records.iter().all(|r| r.is_none())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::SessionId;
	use std::collections::BTreeSet;

	fn item_change(op: ItemOp, id: EntityId, parts: &[&str]) -> ItemChange {
		ItemChange {
			op,
			item_ids: vec![id],
			mime_type_id: None,
			source_parent: None,
			dest_parent: None,
			source_resource: None,
			dest_resource: None,
			session_id: 1 as SessionId,
			changed_parts: parts.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
		}
	}

	#[test]
	fn add_then_modify_collapses_to_single_add() {
		let mut c = Collector::new();
		c.record_item_change(item_change(ItemOp::Add, 1, &[]));
		c.record_item_change(item_change(ItemOp::Modify, 1, &["FLAGS"]));
		let batch = c.finish();
		assert_eq!(batch.len(), 1);
		match &batch[0] {
			MutationRecord::Item(change) => {
				assert_eq!(change.op, ItemOp::Add);
				assert!(change.changed_parts.contains("FLAGS"));
			}
			_ => panic!("expected item change"),
		}
	}

	#[test]
	fn add_then_remove_cancels_both() {
		let mut c = Collector::new();
		c.record_item_change(item_change(ItemOp::Add, 1, &[]));
		c.record_item_change(item_change(ItemOp::Remove, 1, &[]));
		assert!(c.finish().is_empty());
	}

	#[test]
	fn consecutive_modify_merges_changed_parts() {
		let mut c = Collector::new();
		c.record_item_change(item_change(ItemOp::Modify, 1, &["FLAGS"]));
		c.record_item_change(item_change(ItemOp::Modify, 1, &["GID"]));
		let batch = c.finish();
		assert_eq!(batch.len(), 1);
		match &batch[0] {
			MutationRecord::Item(change) => {
				assert!(change.changed_parts.contains("FLAGS"));
				assert!(change.changed_parts.contains("GID"));
			}
			_ => panic!("expected item change"),
		}
	}

	#[test]
	fn move_never_coalesces_with_modify() {
		let mut c = Collector::new();
		c.record_item_change(item_change(ItemOp::Modify, 1, &["FLAGS"]));
		c.record_item_change(ItemChange {
			op: ItemOp::Move,
			item_ids: vec![1],
			mime_type_id: None,
			source_parent: Some(1),
			dest_parent: Some(2),
			source_resource: None,
			dest_resource: None,
			session_id: 1,
			changed_parts: BTreeSet::new(),
		});
		assert_eq!(c.finish().len(), 2);
	}

	#[test]
	fn savepoint_rollback_discards_only_its_own_records() {
		let mut c = Collector::new();
		c.record_item_change(item_change(ItemOp::Add, 1, &[]));
		let mark = c.mark();
		c.record_item_change(item_change(ItemOp::Add, 2, &[]));
		c.truncate_to(mark);
		let batch = c.finish();
		assert_eq!(batch.len(), 1);
	}
}

// vim: ts=4
