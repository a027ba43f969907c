//! Typed mutation records (§4.5): the vocabulary the collector
//! accumulates within a transaction and hands to the router on commit.

use std::collections::BTreeSet;

use crate::types::{EntityId, ResourceId, SessionId};

/// Named "changed parts" a Modify notification can carry, as enumerated
/// in §4.5 (`NAME`, `FLAGS`, per-part names, etc). Kept as owned strings
/// since the per-part variants (`PLD:...`) are open-ended.
pub type ChangedPart = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemOp {
	Add,
	Modify,
	ModifyFlags,
	ModifyTags,
	ModifyRelations,
	Move,
	Remove,
	Link,
	Unlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CollectionOp {
	Add,
	Modify,
	Move,
	Remove,
	Subscribe,
	Unsubscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TagOp {
	Add,
	Modify,
	Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelationOp {
	Add,
	Remove,
}

/// One mutation record, as recorded by the collector and delivered by
/// the router. Fields follow §4.5 exactly: operation, affected entities,
/// source/dest parent and resource, the originating session (for echo
/// suppression), and the changed-parts set.
#[derive(Debug, Clone)]
pub struct ItemChange {
	pub op: ItemOp,
	pub item_ids: Vec<EntityId>,
	pub mime_type_id: Option<EntityId>,
	pub source_parent: Option<EntityId>,
	pub dest_parent: Option<EntityId>,
	pub source_resource: Option<ResourceId>,
	pub dest_resource: Option<ResourceId>,
	pub session_id: SessionId,
	pub changed_parts: BTreeSet<ChangedPart>,
}

#[derive(Debug, Clone)]
pub struct CollectionChange {
	pub op: CollectionOp,
	pub collection_id: EntityId,
	pub source_parent: Option<EntityId>,
	pub dest_parent: Option<EntityId>,
	pub resource_id: Option<ResourceId>,
	pub session_id: SessionId,
	pub changed_parts: BTreeSet<ChangedPart>,
}

#[derive(Debug, Clone)]
pub struct TagChange {
	pub op: TagOp,
	pub tag_id: EntityId,
	pub session_id: SessionId,
	/// For a targeted `Remove`, the resource that previously claimed the
	/// tag and its resource-local remote-id (§4.7 DeleteTag).
	pub resource_local: Option<(ResourceId, String)>,
}

#[derive(Debug, Clone)]
pub struct RelationChange {
	pub op: RelationOp,
	pub left_item_id: EntityId,
	pub right_item_id: EntityId,
	pub type_id: EntityId,
	pub session_id: SessionId,
}

/// One entry in a transaction's mutation batch.
#[derive(Debug, Clone)]
pub enum MutationRecord {
	Item(ItemChange),
	Collection(CollectionChange),
	Tag(TagChange),
	Relation(RelationChange),
}

impl MutationRecord {
	pub fn session_id(&self) -> SessionId {
		match self {
			MutationRecord::Item(c) => c.session_id,
			MutationRecord::Collection(c) => c.session_id,
			MutationRecord::Tag(c) => c.session_id,
			MutationRecord::Relation(c) => c.session_id,
		}
	}
}

// vim: ts=4
