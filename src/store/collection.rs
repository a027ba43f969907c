//! Collection CRUD (§3, §4.7 CreateCollection/ModifyCollection/
//! MoveCollection/DeleteCollection/ColCopy), as methods on
//! [`Transaction`].

use std::collections::{BTreeMap, BTreeSet};

use crate::notify::{CollectionChange, CollectionOp};
use crate::types::{EntityId, MimeTypeId, ResourceId, SessionId, TriState};

use super::entities::{CachePolicy, Collection};
use super::error::StoreError;
use super::txn::Transaction;

/// Input for `CreateCollection`; fields default the way `ModifyCollection`
/// treats an absent parameter key as "leave unset".
pub struct NewCollection {
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

/// A sparse patch for `ModifyCollection`; `None` fields are left
/// untouched.
#[derive(Default)]
pub struct CollectionPatch {
	pub name: Option<String>,
	pub parent_id: Option<EntityId>,
	pub mime_types: Option<BTreeSet<MimeTypeId>>,
	pub cache_policy: Option<CachePolicy>,
	pub enabled: Option<bool>,
	pub sync_pref: Option<TriState>,
	pub display_pref: Option<TriState>,
	pub index_pref: Option<TriState>,
	pub remote_id: Option<String>,
	pub remote_revision: Option<String>,
	pub attributes: Option<BTreeMap<String, Vec<u8>>>,
}

impl Transaction {
	pub fn create_collection(&mut self, new: NewCollection, session_id: SessionId) -> EntityId {
		let id = self.tables.allocate_entity_id();
		let collection = Collection {
			id,
			parent_id: new.parent_id,
			name: new.name,
			resource_id: new.resource_id,
			remote_id: new.remote_id,
			remote_revision: new.remote_revision,
			mime_types: new.mime_types,
			cache_policy: new.cache_policy,
			enabled: new.enabled,
			sync_pref: new.sync_pref,
			display_pref: new.display_pref,
			index_pref: new.index_pref,
			is_virtual: new.is_virtual,
			attributes: new.attributes,
		};
		self.tables.collections.insert(id, collection);
		self.collector.record_collection_change(CollectionChange {
			op: CollectionOp::Add,
			collection_id: id,
			source_parent: None,
			dest_parent: Some(new.parent_id),
			resource_id: Some(new.resource_id),
			session_id,
			changed_parts: BTreeSet::new(),
		});
		id
	}

	pub fn get_collection(&self, id: EntityId) -> Result<&Collection, StoreError> {
		self.tables.collections.get(&id).ok_or(StoreError::NotFound { kind: "collection", id })
	}

	pub fn children_of(&self, parent_id: EntityId) -> Vec<&Collection> {
		self.tables.collections.values().filter(|c| c.parent_id == parent_id).collect()
	}

	pub fn descendants_of(&self, parent_id: EntityId) -> Vec<EntityId> {
		let mut out = Vec::new();
		let mut frontier = vec![parent_id];
		while let Some(id) = frontier.pop() {
			for child in self.children_of(id) {
				out.push(child.id);
				frontier.push(child.id);
			}
		}
		out
	}

	/// Resolves `cache_policy.check_interval_minutes`, walking up to the
	/// first ancestor with `inherit = false` or reaching the root
	/// default when every ancestor inherits (§4.9).
	pub fn effective_check_interval(&self, id: EntityId, default_minutes: i64) -> i64 {
		let mut current = id;
		loop {
			let Some(collection) = self.tables.collections.get(&current) else {
				return default_minutes;
			};
			if !collection.cache_policy.inherit {
				return collection.cache_policy.check_interval_minutes;
			}
			if collection.parent_id == 0 {
				return default_minutes;
			}
			current = collection.parent_id;
		}
	}

	/// Applies `patch` to collection `id`; returns the set of changed
	/// parameter names (§4.5's changed-parts vocabulary) and whether an
	/// `enabled` transition requires a Subscribe/Unsubscribe follow-up.
	pub fn modify_collection(
		&mut self,
		id: EntityId,
		patch: CollectionPatch,
		session_id: SessionId,
	) -> Result<Option<bool>, StoreError> {
		let collection =
			self.tables.collections.get_mut(&id).ok_or(StoreError::NotFound { kind: "collection", id })?;
		let mut changed_parts = BTreeSet::new();
		let mut enabled_transition = None;

		if let Some(name) = patch.name {
			if collection.name != name {
				collection.name = name;
				changed_parts.insert("NAME".to_string());
			}
		}
		if let Some(parent_id) = patch.parent_id {
			if collection.parent_id != parent_id {
				collection.parent_id = parent_id;
				changed_parts.insert("PARENT".to_string());
			}
		}
		if let Some(mime_types) = patch.mime_types {
			collection.mime_types = mime_types;
			changed_parts.insert("MIMETYPE".to_string());
		}
		if let Some(cache_policy) = patch.cache_policy {
			collection.cache_policy = cache_policy;
			changed_parts.insert("CACHEPOLICY".to_string());
		}
		if let Some(enabled) = patch.enabled {
			if collection.enabled != enabled {
				enabled_transition = Some(enabled);
				collection.enabled = enabled;
				changed_parts.insert("ENABLED".to_string());
			}
		}
		if let Some(sync_pref) = patch.sync_pref {
			collection.sync_pref = sync_pref;
			changed_parts.insert("SYNC".to_string());
		}
		if let Some(display_pref) = patch.display_pref {
			collection.display_pref = display_pref;
			changed_parts.insert("DISPLAY".to_string());
		}
		if let Some(index_pref) = patch.index_pref {
			collection.index_pref = index_pref;
			changed_parts.insert("INDEX".to_string());
		}
		if let Some(remote_id) = patch.remote_id {
			collection.remote_id = Some(remote_id);
			changed_parts.insert("REMOTEID".to_string());
		}
		if let Some(remote_revision) = patch.remote_revision {
			collection.remote_revision = Some(remote_revision);
			changed_parts.insert("REMOTEREVISION".to_string());
		}
		if let Some(attributes) = patch.attributes {
			for (key, value) in attributes {
				collection.attributes.insert(key, value);
			}
		}

		if !changed_parts.is_empty() {
			self.collector.record_collection_change(CollectionChange {
				op: CollectionOp::Modify,
				collection_id: id,
				source_parent: None,
				dest_parent: None,
				resource_id: None,
				session_id,
				changed_parts,
			});
		}
		if let Some(now_enabled) = enabled_transition {
			self.collector.record_collection_change(CollectionChange {
				op: if now_enabled { CollectionOp::Subscribe } else { CollectionOp::Unsubscribe },
				collection_id: id,
				source_parent: None,
				dest_parent: None,
				resource_id: None,
				session_id,
				changed_parts: BTreeSet::new(),
			});
		}
		Ok(enabled_transition)
	}

	pub fn move_collection(
		&mut self,
		id: EntityId,
		new_parent_id: EntityId,
		session_id: SessionId,
	) -> Result<(), StoreError> {
		let collection =
			self.tables.collections.get_mut(&id).ok_or(StoreError::NotFound { kind: "collection", id })?;
		let source_parent = collection.parent_id;
		collection.parent_id = new_parent_id;
		self.collector.record_collection_change(CollectionChange {
			op: CollectionOp::Move,
			collection_id: id,
			source_parent: Some(source_parent),
			dest_parent: Some(new_parent_id),
			resource_id: None,
			session_id,
			changed_parts: BTreeSet::new(),
		});
		Ok(())
	}

	/// Deletes a collection and cascades to every item it directly
	/// parents (and their parts/flags/tags/relations), all inside this
	/// transaction (§4.7 DeleteCollection).
	pub fn delete_collection(&mut self, id: EntityId, session_id: SessionId) -> Result<(), StoreError> {
		if !self.tables.collections.contains_key(&id) {
			return Err(StoreError::NotFound { kind: "collection", id });
		}
		let item_ids: Vec<EntityId> =
			self.tables.items.values().filter(|item| item.collection_id == id).map(|item| item.id).collect();
		for item_id in item_ids {
			self.delete_item(item_id, session_id)?;
		}
		self.tables.collections.remove(&id);
		self.collector.record_collection_change(CollectionChange {
			op: CollectionOp::Remove,
			collection_id: id,
			source_parent: None,
			dest_parent: None,
			resource_id: None,
			session_id,
			changed_parts: BTreeSet::new(),
		});
		Ok(())
	}

	pub fn set_reference(&mut self, collection_id: EntityId, session_id: SessionId, referenced: bool) {
		let entry = self.tables.collection_references.entry(collection_id).or_default();
		if referenced {
			entry.insert(session_id);
		} else {
			entry.remove(&session_id);
		}
	}

	/// Drops every reference held by `session_id`, e.g. on disconnect.
	pub fn drop_session_references(&mut self, session_id: SessionId) {
		for refs in self.tables.collection_references.values_mut() {
			refs.remove(&session_id);
		}
	}

	pub fn is_globally_referenced(&self, collection_id: EntityId) -> bool {
		self.tables.collection_references.get(&collection_id).is_some_and(|s| !s.is_empty())
	}
}

// vim: ts=4
