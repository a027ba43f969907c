//! Tag CRUD (§3, §4.7 TagAppend/TagStore/TagFetch/TagRemove): tag
//! uniqueness by gid is enforced only on merge (§3 invariant 5); a tag
//! is destroyed when its last remote-id relation is removed and no
//! client owns it.

use std::collections::BTreeSet;

use crate::notify::{TagChange, TagOp};
use crate::types::{EntityId, ResourceId, SessionId, TagTypeId};

use super::entities::{Tag, TagRemoteIdResourceRelation};
use super::error::StoreError;
use super::txn::Transaction;

impl Transaction {
	pub fn intern_tag_type(&mut self, name: &str) -> TagTypeId {
		self.tables.tag_types.intern(name)
	}

	/// Finds an existing tag with the given gid (merge target), used by
	/// `TagAppend` to enforce gid-uniqueness only on merge.
	pub fn find_tag_by_gid(&self, gid: &str) -> Option<EntityId> {
		self.tables.tags.values().find(|t| t.gid == gid).map(|t| t.id)
	}

	pub fn create_tag(
		&mut self,
		gid: String,
		type_id: TagTypeId,
		parent_id: Option<EntityId>,
		session_id: SessionId,
	) -> EntityId {
		let id = self.tables.allocate_entity_id();
		self.tables.tags.insert(
			id,
			Tag {
				id,
				gid,
				type_id,
				parent_id,
				attributes: std::collections::BTreeMap::new(),
				owners: BTreeSet::from([session_id]),
			},
		);
		self.collector.record_tag_change(TagChange {
			op: TagOp::Add,
			tag_id: id,
			session_id,
			resource_local: None,
		});
		id
	}

	pub fn get_tag(&self, id: EntityId) -> Result<&Tag, StoreError> {
		self.tables.tags.get(&id).ok_or(StoreError::NotFound { kind: "tag", id })
	}

	pub fn all_tags(&self) -> Vec<Tag> {
		self.tables.tags.values().cloned().collect()
	}

	/// Overwrites an existing tag wholesale (used by `TagStore`'s
	/// attribute merge, which reads-modifies-writes the full `Tag` rather
	/// than going through a sparse patch type like collections/items do).
	pub fn replace_tag(&mut self, tag: Tag) {
		self.tables.tags.insert(tag.id, tag);
	}

	pub fn set_tag_remote_id(&mut self, tag_id: EntityId, resource_id: ResourceId, remote_id: String) {
		self.tables.tag_rid_relations.insert(TagRemoteIdResourceRelation { tag_id, resource_id, remote_id });
	}

	pub fn tag_remote_id(&self, tag_id: EntityId, resource_id: ResourceId) -> Option<&str> {
		self
			.tables
			.tag_rid_relations
			.iter()
			.find(|r| r.tag_id == tag_id && r.resource_id == resource_id)
			.map(|r| r.remote_id.as_str())
	}

	pub fn tags_of_item(&self, item_id: EntityId) -> BTreeSet<EntityId> {
		self.tables.item_tags.get(&item_id).cloned().unwrap_or_default()
	}

	pub fn append_tags(&mut self, item_id: EntityId, tag_ids: &[EntityId], session_id: SessionId) {
		let entry = self.tables.item_tags.entry(item_id).or_default();
		let mut changed = false;
		for &id in tag_ids {
			if entry.insert(id) {
				changed = true;
			}
		}
		if changed {
			let mut changed_parts = BTreeSet::new();
			changed_parts.insert("TAGS".to_string());
			let mime_type_id = self.tables.items.get(&item_id).map(|i| i.mime_type_id);
			self.collector.record_item_change(crate::notify::ItemChange {
				op: crate::notify::ItemOp::ModifyTags,
				item_ids: vec![item_id],
				mime_type_id,
				source_parent: None,
				dest_parent: None,
				source_resource: None,
				dest_resource: None,
				session_id,
				changed_parts,
			});
		}
	}

	pub fn remove_tags(&mut self, item_id: EntityId, tag_ids: &[EntityId], session_id: SessionId) {
		let mut changed = false;
		if let Some(entry) = self.tables.item_tags.get_mut(&item_id) {
			for id in tag_ids {
				if entry.remove(id) {
					changed = true;
				}
			}
		}
		if changed {
			let mut changed_parts = BTreeSet::new();
			changed_parts.insert("TAGS".to_string());
			let mime_type_id = self.tables.items.get(&item_id).map(|i| i.mime_type_id);
			self.collector.record_item_change(crate::notify::ItemChange {
				op: crate::notify::ItemOp::ModifyTags,
				item_ids: vec![item_id],
				mime_type_id,
				source_parent: None,
				dest_parent: None,
				source_resource: None,
				dest_resource: None,
				session_id,
				changed_parts,
			});
		}
	}

	/// Removes the remote-id relation a resource holds on a tag; if no
	/// relation and no owning session remain, destroys the tag and
	/// notifies once per resource that previously claimed it plus once
	/// generically (§4.7 DeleteTag).
	pub fn remove_tag_remote_id(&mut self, tag_id: EntityId, resource_id: ResourceId, session_id: SessionId) {
		let removed_remote_id = self
			.tables
			.tag_rid_relations
			.iter()
			.find(|r| r.tag_id == tag_id && r.resource_id == resource_id)
			.cloned();
		if let Some(relation) = &removed_remote_id {
			self.tables.tag_rid_relations.remove(relation);
			self.collector.record_tag_change(TagChange {
				op: TagOp::Remove,
				tag_id,
				session_id,
				resource_local: Some((resource_id, relation.remote_id.clone())),
			});
		}
		self.destroy_tag_if_unclaimed(tag_id, session_id);
	}

	/// Destroys `tag_id` once no remote-id relation and no owning session
	/// remain (§3's tag-lifecycle invariant).
	fn destroy_tag_if_unclaimed(&mut self, tag_id: EntityId, session_id: SessionId) {
		let still_claimed = self.tables.tag_rid_relations.iter().any(|r| r.tag_id == tag_id);
		let still_owned = self.tables.tags.get(&tag_id).is_some_and(|t| !t.owners.is_empty());
		if !still_claimed && !still_owned {
			self.tables.tags.remove(&tag_id);
			self.collector.record_tag_change(TagChange { op: TagOp::Remove, tag_id, session_id, resource_local: None });
		}
	}

	/// Releases every tag-ownership claim `session_id` holds, destroying
	/// any tag left with no relation and no other owner; called on
	/// disconnect (§3's tag-lifecycle invariant — nothing else in the
	/// protocol ever releases a session's ownership claim).
	pub fn drop_session_tag_ownership(&mut self, session_id: SessionId) {
		let owned: Vec<EntityId> =
			self.tables.tags.values().filter(|t| t.owners.contains(&session_id)).map(|t| t.id).collect();
		for tag_id in owned {
			if let Some(tag) = self.tables.tags.get_mut(&tag_id) {
				tag.owners.remove(&session_id);
			}
			self.destroy_tag_if_unclaimed(tag_id, session_id);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::Store;

	#[tokio::test]
	async fn drop_session_tag_ownership_destroys_tags_with_no_remaining_claim() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let type_id = txn.intern_tag_type("CATEGORY");
		let tag_id = txn.create_tag("gid-1".to_string(), type_id, None, 1);

		txn.drop_session_tag_ownership(1);

		assert!(txn.get_tag(tag_id).is_err());
	}

	#[tokio::test]
	async fn drop_session_tag_ownership_leaves_tags_another_session_still_owns() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let type_id = txn.intern_tag_type("CATEGORY");
		let tag_id = txn.create_tag("gid-1".to_string(), type_id, None, 1);
		txn.get_tag(tag_id).unwrap();
		if let Some(tag) = txn.tables.tags.get_mut(&tag_id) {
			tag.owners.insert(2);
		}

		txn.drop_session_tag_ownership(1);

		assert!(txn.get_tag(tag_id).is_ok());
	}
}

// vim: ts=4
