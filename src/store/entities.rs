//! Entity definitions (§3): Collection, Item, Part, Flag, Tag,
//! TagRemoteIdResourceRelation, Relation, and their small value types.
//!
//! Grounded in `original_source/autotests/server/fakeentities.h`'s
//! attribute lists; ids are `i64` throughout, matching the source's
//! `qint64`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, FlagId, MimeTypeId, ResourceId, SessionId, TagTypeId, Timestamp, TriState};

/// Cache policy, either inherited from the parent collection or local.
/// Corresponds to the `CACHEPOLICY` nested parameter list (§6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
	pub inherit: bool,
	pub check_interval_minutes: i64,
	pub cache_timeout_minutes: i64,
	pub sync_on_demand: bool,
	pub local_parts: BTreeSet<String>,
}

impl Default for CachePolicy {
	fn default() -> Self {
		CachePolicy {
			inherit: true,
			check_interval_minutes: 5,
			cache_timeout_minutes: -1,
			sync_on_demand: false,
			local_parts: BTreeSet::new(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
	pub id: EntityId,
	/// 0 = root.
	pub parent_id: EntityId,
	pub name: String,
	pub resource_id: ResourceId,
	pub remote_id: Option<String>,
	pub remote_revision: Option<String>,
	pub mime_types: BTreeSet<MimeTypeId>,
	pub cache_policy: CachePolicy,
	pub enabled: bool,
	pub sync_pref: TriState,
	pub display_pref: TriState,
	pub index_pref: TriState,
	pub is_virtual: bool,
	pub attributes: BTreeMap<String, Vec<u8>>,
}

impl Collection {
	/// Effective check interval honoring `cache_policy.inherit`; callers
	/// resolve inheritance by walking to the parent when `inherit` is set
	/// (the store does this; see `collection::effective_check_interval`).
	pub fn own_check_interval(&self) -> i64 {
		self.cache_policy.check_interval_minutes
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
	pub id: EntityId,
	pub collection_id: EntityId,
	pub mime_type_id: MimeTypeId,
	pub remote_id: Option<String>,
	pub remote_revision: Option<String>,
	pub gid: Option<String>,
	pub size: i64,
	pub datetime: Timestamp,
	pub mtime: Timestamp,
	pub revision: i64,
	pub dirty: bool,
}

/// Where a part's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartStorage {
	Internal(Vec<u8>),
	External(String),
}

impl PartStorage {
	pub fn len(&self) -> i64 {
		match self {
			PartStorage::Internal(bytes) => bytes.len() as i64,
			PartStorage::External(_) => 0,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
	pub item_id: EntityId,
	/// Fully-qualified `NAMESPACE:NAME`, e.g. `PLD:DATA`.
	pub part_name: String,
	pub storage: PartStorage,
	pub version: i64,
	pub datasize: i64,
}

impl Part {
	pub fn is_payload(&self) -> bool {
		self.part_name.starts_with("PLD:")
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
	pub id: EntityId,
	pub gid: String,
	pub type_id: TagTypeId,
	pub parent_id: Option<EntityId>,
	pub attributes: BTreeMap<String, Vec<u8>>,
	/// Sessions that currently "own" this tag; used to decide destruction
	/// once the last remote-id relation is removed (§3).
	pub owners: BTreeSet<SessionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagRemoteIdResourceRelation {
	pub tag_id: EntityId,
	pub resource_id: ResourceId,
	pub remote_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
	pub left_item_id: EntityId,
	pub right_item_id: EntityId,
	pub type_id: EntityId,
	pub remote_id: Option<String>,
}

// vim: ts=4
