//! Item CRUD (§3, §4.7 CreateItem/MergeItem/ModifyItem/MoveItems/
//! LinkItems/UnlinkItems/Expunge), as methods on [`Transaction`].
//!
//! Domain validation (virtual-target checks, size-mismatch rules,
//! merge-candidate counting) lives in the handler layer, which classifies
//! failures as `HandlerError::Validation`; this module stays a thin,
//! always-succeeding CRUD layer so storage-level failures stay distinct
//! from domain ones (§7 kinds 3 vs 4).

use std::collections::BTreeSet;

use crate::notify::{ItemChange, ItemOp};
use crate::types::{EntityId, MimeTypeId, ResourceId, SessionId, Timestamp};

use super::entities::Item;
use super::error::StoreError;
use super::txn::Transaction;

pub struct NewItem {
	pub collection_id: EntityId,
	pub mime_type_id: MimeTypeId,
	pub remote_id: Option<String>,
	pub remote_revision: Option<String>,
	pub gid: Option<String>,
	pub declared_size: i64,
	pub datetime: Timestamp,
}

#[derive(Default)]
pub struct ItemPatch {
	pub remote_id: Option<String>,
	pub remote_revision: Option<String>,
	pub gid: Option<String>,
	pub size: Option<i64>,
	pub dirty: Option<bool>,
}

impl Transaction {
	pub fn intern_mime_type(&mut self, name: &str) -> MimeTypeId {
		self.tables.mime_types.intern(name)
	}

	pub fn mime_type_name(&self, id: MimeTypeId) -> Option<&str> {
		self.tables.mime_types.name_of(id)
	}

	pub fn create_item(&mut self, new: NewItem, resource_id: ResourceId, session_id: SessionId) -> EntityId {
		let id = self.tables.allocate_entity_id();
		let item = Item {
			id,
			collection_id: new.collection_id,
			mime_type_id: new.mime_type_id,
			remote_id: new.remote_id,
			remote_revision: new.remote_revision,
			gid: new.gid,
			size: new.declared_size,
			datetime: new.datetime,
			mtime: new.datetime,
			revision: 0,
			dirty: false,
		};
		self.tables.items.insert(id, item);
		self.collector.record_item_change(ItemChange {
			op: ItemOp::Add,
			item_ids: vec![id],
			mime_type_id: Some(new.mime_type_id),
			source_parent: Some(new.collection_id),
			dest_parent: None,
			source_resource: Some(resource_id),
			dest_resource: None,
			session_id,
			changed_parts: BTreeSet::new(),
		});
		id
	}

	pub fn get_item(&self, id: EntityId) -> Result<&Item, StoreError> {
		self.tables.items.get(&id).ok_or(StoreError::NotFound { kind: "item", id })
	}

	pub fn items_in_collection(&self, collection_id: EntityId) -> Vec<EntityId> {
		self.tables.items.values().filter(|i| i.collection_id == collection_id).map(|i| i.id).collect()
	}

	/// Merge-candidate lookup: items in `collection_id` with matching
	/// mime-type, and whose rid and/or gid matches the supplied ones,
	/// per whichever are `Some` (§4.7 CreateItem merge modes).
	pub fn find_merge_candidates(
		&self,
		collection_id: EntityId,
		mime_type_id: MimeTypeId,
		rid: Option<&str>,
		gid: Option<&str>,
	) -> Vec<EntityId> {
		self.tables
			.items
			.values()
			.filter(|item| {
				item.collection_id == collection_id
					&& item.mime_type_id == mime_type_id
					&& rid.map_or(true, |rid| item.remote_id.as_deref() == Some(rid))
					&& gid.map_or(true, |gid| item.gid.as_deref() == Some(gid))
			})
			.map(|item| item.id)
			.collect()
	}

	/// Applies a patch to an existing item, bumping its revision and
	/// recording an `ItemChange::Modify` with the observed changed-parts
	/// set. Returns the changed-parts set so the caller (e.g. MergeItem)
	/// can report it.
	pub fn modify_item(
		&mut self,
		id: EntityId,
		patch: ItemPatch,
		session_id: SessionId,
	) -> Result<BTreeSet<String>, StoreError> {
		let item = self.tables.items.get_mut(&id).ok_or(StoreError::NotFound { kind: "item", id })?;
		let mut changed_parts = BTreeSet::new();
		if let Some(remote_id) = patch.remote_id {
			item.remote_id = Some(remote_id);
			changed_parts.insert("REMOTEID".to_string());
		}
		if let Some(remote_revision) = patch.remote_revision {
			item.remote_revision = Some(remote_revision);
			changed_parts.insert("REMOTEREVISION".to_string());
		}
		if let Some(gid) = patch.gid {
			item.gid = Some(gid);
			changed_parts.insert("GID".to_string());
		}
		if let Some(size) = patch.size {
			if item.size != size {
				item.size = size;
				changed_parts.insert("SIZE".to_string());
			}
		}
		if let Some(dirty) = patch.dirty {
			item.dirty = dirty;
		}
		if !changed_parts.is_empty() {
			item.revision += 1;
			self.collector.record_item_change(ItemChange {
				op: ItemOp::Modify,
				item_ids: vec![id],
				mime_type_id: Some(item.mime_type_id),
				source_parent: Some(item.collection_id),
				dest_parent: None,
				source_resource: None,
				dest_resource: None,
				session_id,
				changed_parts: changed_parts.clone(),
			});
		}
		Ok(changed_parts)
	}

	/// Raises the item's size to `summed_part_size` when it exceeds the
	/// currently recorded size (§3 invariant 4: "when the summed part
	/// sizes exceed the declared item size, the item size is raised to
	/// the summed value").
	pub fn reconcile_size_from_parts(&mut self, id: EntityId, summed_part_size: i64) -> Result<(), StoreError> {
		let item = self.tables.items.get_mut(&id).ok_or(StoreError::NotFound { kind: "item", id })?;
		if summed_part_size > item.size {
			item.size = summed_part_size;
		}
		Ok(())
	}

	/// Moves every id in `ids` to `dest_parent`, recording a single
	/// `ItemChange::Move` (§4.7 MoveItems never merges).
	pub fn move_items(
		&mut self,
		ids: &[EntityId],
		dest_parent: EntityId,
		session_id: SessionId,
	) -> Result<(), StoreError> {
		if ids.is_empty() {
			return Ok(());
		}
		let mut source_parent = None;
		for &id in ids {
			let item = self.tables.items.get_mut(&id).ok_or(StoreError::NotFound { kind: "item", id })?;
			source_parent.get_or_insert(item.collection_id);
			item.collection_id = dest_parent;
		}
		self.collector.record_item_change(ItemChange {
			op: ItemOp::Move,
			item_ids: ids.to_vec(),
			mime_type_id: None,
			source_parent,
			dest_parent: Some(dest_parent),
			source_resource: None,
			dest_resource: None,
			session_id,
			changed_parts: BTreeSet::new(),
		});
		Ok(())
	}

	/// Links `ids` into virtual collection `collection_id`; non-existent
	/// items are silently skipped (§4.7 LinkItems). Emits one
	/// `ItemChange::Link` with the actually-linked ids.
	pub fn link_items(&mut self, ids: &[EntityId], collection_id: EntityId, session_id: SessionId) {
		let mut linked = Vec::new();
		for &id in ids {
			if !self.tables.items.contains_key(&id) {
				continue;
			}
			self.tables.virtual_links.entry(id).or_default().insert(collection_id);
			linked.push(id);
		}
		if linked.is_empty() {
			return;
		}
		self.collector.record_item_change(ItemChange {
			op: ItemOp::Link,
			item_ids: linked,
			mime_type_id: None,
			source_parent: None,
			dest_parent: Some(collection_id),
			source_resource: None,
			dest_resource: None,
			session_id,
			changed_parts: BTreeSet::new(),
		});
	}

	pub fn unlink_items(&mut self, ids: &[EntityId], collection_id: EntityId, session_id: SessionId) {
		let mut unlinked = Vec::new();
		for &id in ids {
			if let Some(links) = self.tables.virtual_links.get_mut(&id) {
				if links.remove(&collection_id) {
					unlinked.push(id);
				}
			}
		}
		if unlinked.is_empty() {
			return;
		}
		self.collector.record_item_change(ItemChange {
			op: ItemOp::Unlink,
			item_ids: unlinked,
			mime_type_id: None,
			source_parent: None,
			dest_parent: Some(collection_id),
			source_resource: None,
			dest_resource: None,
			session_id,
			changed_parts: BTreeSet::new(),
		});
	}

	pub fn relates_to_pim_item(&self, collection_id: EntityId, item_id: EntityId) -> bool {
		self.tables.virtual_links.get(&item_id).is_some_and(|links| links.contains(&collection_id))
	}

	/// Deletes an item and everything that hangs off it: parts,
	/// flag/tag associations, relations, virtual links. Emits one
	/// `ItemChange::Remove`.
	pub fn delete_item(&mut self, id: EntityId, session_id: SessionId) -> Result<(), StoreError> {
		let item = self.tables.items.remove(&id).ok_or(StoreError::NotFound { kind: "item", id })?;
		self.tables.parts.retain(|(item_id, _), _| *item_id != id);
		self.tables.item_flags.remove(&id);
		self.tables.item_tags.remove(&id);
		self.tables.virtual_links.remove(&id);
		self.tables.relations.retain(|r| r.left_item_id != id && r.right_item_id != id);
		self.collector.record_item_change(ItemChange {
			op: ItemOp::Remove,
			item_ids: vec![id],
			mime_type_id: Some(item.mime_type_id),
			source_parent: Some(item.collection_id),
			dest_parent: None,
			source_resource: None,
			dest_resource: None,
			session_id,
			changed_parts: BTreeSet::new(),
		});
		Ok(())
	}
}

// vim: ts=4
