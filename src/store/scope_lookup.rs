//! `ScopeLookup` for the entity store (§4.2): lets the store-agnostic
//! scope resolver run against live table data without the resolver
//! itself depending on `store`.

use crate::scope::{ScopeContext, ScopeLookup};
use crate::types::{EntityId, ResourceId};

use super::txn::Transaction;

impl ScopeLookup for Transaction {
	fn max_known_id(&self) -> EntityId {
		let allocated = self.tables.next_entity_id - 1;
		allocated.max(0)
	}

	fn resolve_rid(&self, resource: ResourceId, rid: &str, context: &ScopeContext) -> Vec<EntityId> {
		let ids: Vec<EntityId> = self
			.tables
			.items
			.values()
			.filter(|item| {
				item.remote_id.as_deref() == Some(rid)
					&& self.tables.collections.get(&item.collection_id).is_some_and(|c| c.resource_id == resource)
			})
			.map(|item| item.id)
			.collect();
		self.filter_by_context(ids, context)
	}

	fn resolve_gid(&self, gid: &str, context: &ScopeContext) -> Vec<EntityId> {
		let ids: Vec<EntityId> =
			self.tables.items.values().filter(|item| item.gid.as_deref() == Some(gid)).map(|item| item.id).collect();
		self.filter_by_context(ids, context)
	}

	/// Walks `chain` (target-to-root order) over collections belonging to
	/// `resource`, starting from the resource's root collection (the one
	/// with `parent_id == 0`) and descending via `remote_id` matches. If
	/// the chain's final (closest-to-target) segment doesn't match a
	/// child collection, it's tried against an item's remote-id inside
	/// the last resolved collection, since an HRID chain's target is
	/// often an item rather than a collection (§4.2).
	fn resolve_hrid_chain(&self, resource: ResourceId, chain: &[String]) -> Option<EntityId> {
		if chain.is_empty() {
			return None;
		}
		let root_name = chain.last()?;
		let mut current = self
			.tables
			.collections
			.values()
			.find(|c| c.resource_id == resource && c.parent_id == 0 && c.remote_id.as_deref() == Some(root_name))?
			.id;
		let mut idx = chain.len() - 1;
		while idx > 0 {
			idx -= 1;
			let name = &chain[idx];
			if let Some(child) =
				self.tables.collections.values().find(|c| c.parent_id == current && c.remote_id.as_deref() == Some(name))
			{
				current = child.id;
				continue;
			}
			if idx == 0 {
				return self
					.tables
					.items
					.values()
					.find(|i| i.collection_id == current && i.remote_id.as_deref() == Some(name))
					.map(|i| i.id);
			}
			return None;
		}
		Some(current)
	}

	fn filter_by_context(&self, ids: Vec<EntityId>, context: &ScopeContext) -> Vec<EntityId> {
		ids.into_iter()
			.filter(|id| {
				let collection_ok = context.collection_id.map_or(true, |cid| {
					self.tables.items.get(id).is_some_and(|item| item.collection_id == cid)
						|| self.tables.collections.get(id).is_some_and(|c| c.id == cid)
				});
				let tag_ok = context
					.tag_id
					.map_or(true, |tid| self.tables.item_tags.get(id).is_some_and(|tags| tags.contains(&tid)));
				collection_ok && tag_ok
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::collection::NewCollection;
	use crate::store::item::NewItem;
	use crate::store::{CachePolicy, Store};
	use crate::types::TriState;
	use std::collections::{BTreeMap, BTreeSet};

	fn new_collection(parent_id: EntityId, remote_id: &str, resource_id: ResourceId) -> NewCollection {
		NewCollection {
			parent_id,
			name: remote_id.to_string(),
			resource_id,
			remote_id: Some(remote_id.to_string()),
			remote_revision: None,
			mime_types: BTreeSet::new(),
			cache_policy: CachePolicy::default(),
			enabled: true,
			sync_pref: TriState::Undefined,
			display_pref: TriState::Undefined,
			index_pref: TriState::Undefined,
			is_virtual: false,
			attributes: BTreeMap::new(),
		}
	}

	#[tokio::test]
	async fn resolve_rid_matches_within_resource() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = txn.create_collection(new_collection(0, "root", 1), 1);
		let item_id = txn.create_item(
			NewItem {
				collection_id,
				mime_type_id: 1,
				remote_id: Some("ITEM-1".to_string()),
				remote_revision: None,
				gid: None,
				declared_size: 0,
				datetime: 0,
			},
			1,
			1,
		);
		let ids = txn.resolve_rid(1, "ITEM-1", &ScopeContext::none());
		assert_eq!(ids, vec![item_id]);
		assert!(txn.resolve_rid(2, "ITEM-1", &ScopeContext::none()).is_empty());
	}

	#[tokio::test]
	async fn resolve_hrid_chain_walks_collections_to_item() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let root_id = txn.create_collection(new_collection(0, "root", 1), 1);
		let sub_id = txn.create_collection(new_collection(root_id, "sub", 1), 1);
		let item_id = txn.create_item(
			NewItem {
				collection_id: sub_id,
				mime_type_id: 1,
				remote_id: Some("leaf".to_string()),
				remote_revision: None,
				gid: None,
				declared_size: 0,
				datetime: 0,
			},
			1,
			1,
		);
		let chain = vec!["leaf".to_string(), "sub".to_string(), "root".to_string()];
		assert_eq!(txn.resolve_hrid_chain(1, &chain), Some(item_id));
	}

	#[tokio::test]
	async fn filter_by_context_narrows_to_collection_and_tag() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = txn.create_collection(new_collection(0, "root", 1), 1);
		let item_id = txn.create_item(
			NewItem {
				collection_id,
				mime_type_id: 1,
				remote_id: None,
				remote_revision: None,
				gid: Some("dup".to_string()),
				declared_size: 0,
				datetime: 0,
			},
			1,
			1,
		);
		let other_collection = txn.create_collection(new_collection(0, "other", 1), 1);
		let other_item = txn.create_item(
			NewItem {
				collection_id: other_collection,
				mime_type_id: 1,
				remote_id: None,
				remote_revision: None,
				gid: Some("dup".to_string()),
				declared_size: 0,
				datetime: 0,
			},
			1,
			1,
		);
		let ids = txn.resolve_gid("dup", &ScopeContext::in_collection(collection_id));
		assert_eq!(ids, vec![item_id]);
		assert_ne!(ids, vec![other_item]);
	}
}

// vim: ts=4
