//! The in-memory table set backing the store, guarded by a single
//! `tokio::sync::RwLock` per §4.3's "single shared backing store"
//! (grounded in the teacher's `metadata/mod.rs` single-lock pattern).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, FlagId, SessionId};

use super::entities::{Collection, Item, Part, Relation, Tag, TagRemoteIdResourceRelation};

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Tables {
	pub collections: BTreeMap<EntityId, Collection>,
	pub items: BTreeMap<EntityId, Item>,
	pub parts: BTreeMap<(EntityId, String), Part>,
	pub flag_names: BTreeMap<FlagId, String>,
	pub flag_ids: BTreeMap<String, FlagId>,
	pub item_flags: BTreeMap<EntityId, BTreeSet<FlagId>>,
	pub tags: BTreeMap<EntityId, Tag>,
	pub tag_rid_relations: BTreeSet<TagRemoteIdResourceRelation>,
	pub item_tags: BTreeMap<EntityId, BTreeSet<EntityId>>,
	pub relations: BTreeSet<Relation>,
	/// item-id -> set of virtual collection ids it's linked into (§3
	/// invariant 1).
	pub virtual_links: BTreeMap<EntityId, BTreeSet<EntityId>>,
	pub collection_references: BTreeMap<EntityId, BTreeSet<SessionId>>,
	pub mime_types: InternTableSnapshot,
	pub tag_types: InternTableSnapshot,
	pub next_entity_id: EntityId,
	pub next_flag_id: FlagId,
}

/// `InternTable` isn't `Clone`-derivable as written (it holds closures
/// nowhere, but to keep `Tables` trivially snapshot-able for savepoints
/// we store its contents in a plain, clonable shape and rebuild the
/// live `InternTable` lazily where needed).
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct InternTableSnapshot {
	pub by_name: BTreeMap<String, i64>,
	pub by_id: BTreeMap<i64, String>,
	pub next_id: i64,
}

impl InternTableSnapshot {
	pub fn new() -> Self {
		InternTableSnapshot { by_name: BTreeMap::new(), by_id: BTreeMap::new(), next_id: 1 }
	}

	pub fn intern(&mut self, name: &str) -> i64 {
		if let Some(id) = self.by_name.get(name) {
			return *id;
		}
		let id = self.next_id;
		self.next_id += 1;
		self.by_name.insert(name.to_string(), id);
		self.by_id.insert(id, name.to_string());
		id
	}

	pub fn name_of(&self, id: i64) -> Option<&str> {
		self.by_id.get(&id).map(String::as_str)
	}

	pub fn id_of(&self, name: &str) -> Option<i64> {
		self.by_name.get(name).copied()
	}
}

impl Tables {
	pub fn new() -> Self {
		Tables {
			next_entity_id: 1,
			next_flag_id: 1,
			mime_types: InternTableSnapshot::new(),
			tag_types: InternTableSnapshot::new(),
			..Default::default()
		}
	}

	pub fn allocate_entity_id(&mut self) -> EntityId {
		let id = self.next_entity_id;
		self.next_entity_id += 1;
		id
	}

	pub fn intern_flag(&mut self, name: &str) -> FlagId {
		if let Some(id) = self.flag_ids.get(name) {
			return *id;
		}
		let id = self.next_flag_id;
		self.next_flag_id += 1;
		self.flag_ids.insert(name.to_string(), id);
		self.flag_names.insert(id, name.to_string());
		id
	}
}

// vim: ts=4
