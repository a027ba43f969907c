//! Relation CRUD (§3, §4.7 RelationStore/RelationRemove/RelationFetch):
//! a typed directed edge between two items.

use crate::notify::{RelationChange, RelationOp};
use crate::types::{EntityId, SessionId};

use super::entities::Relation;
use super::txn::Transaction;

impl Transaction {
	pub fn store_relation(
		&mut self,
		left_item_id: EntityId,
		right_item_id: EntityId,
		type_id: EntityId,
		remote_id: Option<String>,
		session_id: SessionId,
	) -> bool {
		let relation = Relation { left_item_id, right_item_id, type_id, remote_id };
		let inserted = self.tables.relations.insert(relation);
		if inserted {
			self.collector.record_relation_change(RelationChange {
				op: RelationOp::Add,
				left_item_id,
				right_item_id,
				type_id,
				session_id,
			});
		}
		inserted
	}

	pub fn remove_relation(
		&mut self,
		left_item_id: EntityId,
		right_item_id: EntityId,
		type_id: EntityId,
		session_id: SessionId,
	) -> bool {
		let removed = self
			.tables
			.relations
			.iter()
			.find(|r| r.left_item_id == left_item_id && r.right_item_id == right_item_id && r.type_id == type_id)
			.cloned();
		let Some(relation) = removed else {
			return false;
		};
		self.tables.relations.remove(&relation);
		self.collector.record_relation_change(RelationChange {
			op: RelationOp::Remove,
			left_item_id,
			right_item_id,
			type_id,
			session_id,
		});
		true
	}

	/// Filters relations by optional left id, right id, and/or type
	/// (§4.7 RelationFetch).
	pub fn fetch_relations(
		&self,
		left_item_id: Option<EntityId>,
		right_item_id: Option<EntityId>,
		type_id: Option<EntityId>,
	) -> Vec<&Relation> {
		self
			.tables
			.relations
			.iter()
			.filter(|r| {
				left_item_id.map_or(true, |id| r.left_item_id == id)
					&& right_item_id.map_or(true, |id| r.right_item_id == id)
					&& type_id.map_or(true, |id| r.type_id == id)
			})
			.collect()
	}
}

// vim: ts=4
