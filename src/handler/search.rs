//! Search / SearchPersistent / SearchPersistentModify (§4.7), modeled
//! as "search materialisation" (spec.md §2 C7): a typed `SearchQuery`
//! evaluated against the entity store's `Query` primitives, either
//! returned directly (`Search`) or persisted as a virtual collection
//! whose membership this same predicate refreshes on demand
//! (`SearchPersistent`/`SearchPersistentModify`).
//!
//! Grounded in `server/src/handler/search.cpp` /
//! `searchpersistentmodify.cpp`; the concrete Nepomuk-style full-text
//! backend is out of scope, so matching is a small set of typed filters
//! rather than a query language.

use std::collections::BTreeSet;

use crate::store::collection::NewCollection;
use crate::store::query::{Predicate, Query};
use crate::store::{CachePolicy, Item, Transaction};
use crate::types::{EntityId, MimeTypeId, ResourceId, SessionId, TriState};
use crate::PimError;

use super::Response;

/// Filters a `Search` combines with AND; `None` means "don't filter on
/// this dimension".
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
	pub root_collection_id: EntityId,
	pub mime_type_id: Option<MimeTypeId>,
	pub remote_id_equals: Option<String>,
	pub gid_equals: Option<String>,
	pub flag_name: Option<String>,
	pub modified_since: Option<i64>,
}

impl SearchQuery {
	/// The portion of the query expressible as a plain predicate over an
	/// `Item`, without consulting the flag table.
	fn field_predicate(&self) -> Predicate<Item> {
		let mime_type_id = self.mime_type_id;
		let remote_id_equals = self.remote_id_equals.clone();
		let gid_equals = self.gid_equals.clone();
		let modified_since = self.modified_since;
		Predicate::Eq(Box::new(move |item: &Item| {
			mime_type_id.map_or(true, |m| item.mime_type_id == m)
				&& remote_id_equals.as_deref().map_or(true, |rid| item.remote_id.as_deref() == Some(rid))
				&& gid_equals.as_deref().map_or(true, |gid| item.gid.as_deref() == Some(gid))
				&& modified_since.map_or(true, |since| item.mtime >= since)
		}))
	}
}

/// Collects every item under `root_collection_id`'s subtree matching
/// `query`, the field-level predicate evaluated through the `Query`
/// combinators (§4.3), the flag filter applied afterward since it needs
/// the transaction's flag table.
fn evaluate(txn: &Transaction, query: &SearchQuery) -> Vec<Item> {
	let mut roots = vec![query.root_collection_id];
	roots.extend(txn.descendants_of(query.root_collection_id));

	let candidates: Vec<Item> = roots.into_iter().flat_map(|id| txn.items_in_collection(id)).filter_map(|id| txn.get_item(id).ok().cloned()).collect();

	Query::new()
		.filter(query.field_predicate())
		.evaluate(candidates.iter())
		.into_iter()
		.filter(|item| query.flag_name.as_deref().map_or(true, |flag| txn.has_flag(item.id, flag)))
		.collect()
}

pub fn search(txn: &Transaction, _resource: Option<ResourceId>, query: &SearchQuery) -> Result<Response, PimError> {
	Ok(Response::Items(evaluate(txn, query)))
}

/// Materialises `query` as a new virtual collection under `parent_id`,
/// populated with the current match set (§4.7 SearchPersistent).
pub fn search_persistent(
	txn: &mut Transaction,
	session_id: SessionId,
	parent_id: EntityId,
	name: String,
	query: SearchQuery,
) -> Result<Response, PimError> {
	let resource_id = txn.get_collection(query.root_collection_id).map_err(PimError::Store)?.resource_id;
	let matches = evaluate(txn, &query);
	let collection_id = txn.create_collection(
		NewCollection {
			parent_id,
			name,
			resource_id,
			remote_id: None,
			remote_revision: None,
			mime_types: BTreeSet::new(),
			cache_policy: CachePolicy::default(),
			enabled: true,
			sync_pref: TriState::Undefined,
			display_pref: TriState::Undefined,
			index_pref: TriState::Undefined,
			is_virtual: true,
			attributes: Default::default(),
		},
		session_id,
	);
	let item_ids: Vec<EntityId> = matches.iter().map(|item| item.id).collect();
	txn.link_items(&item_ids, collection_id, session_id);
	Ok(Response::Id(collection_id))
}

/// Re-runs a persistent search's query and reconciles the virtual
/// collection's membership: links new matches, unlinks items that no
/// longer match (§4.7 SearchPersistentModify).
pub fn search_persistent_modify(txn: &mut Transaction, collection_id: EntityId, query: SearchQuery) -> Result<Response, PimError> {
	let current: BTreeSet<EntityId> = txn.items_in_collection(collection_id).into_iter().collect();
	let matches: BTreeSet<EntityId> = evaluate(txn, &query).into_iter().map(|item| item.id).collect();

	let to_link: Vec<EntityId> = matches.difference(&current).copied().collect();
	let to_unlink: Vec<EntityId> = current.difference(&matches).copied().collect();

	// Session 0: no single session authored this automated reconciliation.
	txn.link_items(&to_link, collection_id, 0);
	txn.unlink_items(&to_unlink, collection_id, 0);
	Ok(Response::Id(collection_id))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::item::NewItem;
	use crate::store::Store;

	fn seeded_collection(txn: &mut Transaction) -> EntityId {
		let collection_id = txn.create_collection(
			NewCollection {
				parent_id: 0,
				name: "Inbox".to_string(),
				resource_id: 1,
				remote_id: None,
				remote_revision: None,
				mime_types: BTreeSet::new(),
				cache_policy: CachePolicy::default(),
				enabled: true,
				sync_pref: TriState::Undefined,
				display_pref: TriState::Undefined,
				index_pref: TriState::Undefined,
				is_virtual: false,
				attributes: Default::default(),
			},
			1,
		);
		for rid in ["MSG-1", "MSG-2"] {
			txn.create_item(
				NewItem { collection_id, mime_type_id: 1, remote_id: Some(rid.to_string()), remote_revision: None, gid: None, declared_size: 0, datetime: 0 },
				1,
				1,
			);
		}
		collection_id
	}

	#[tokio::test]
	async fn search_filters_by_remote_id() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = seeded_collection(&mut txn);

		let query = SearchQuery { root_collection_id: collection_id, remote_id_equals: Some("MSG-1".to_string()), ..Default::default() };
		let Response::Items(items) = search(&txn, None, &query).unwrap() else { panic!("expected Items response") };
		assert_eq!(items.len(), 1);
		assert_eq!(items[0].remote_id.as_deref(), Some("MSG-1"));
	}

	#[tokio::test]
	async fn search_persistent_materialises_a_virtual_collection_with_current_matches() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = seeded_collection(&mut txn);

		let query = SearchQuery { root_collection_id: collection_id, ..Default::default() };
		let Response::Id(search_id) = search_persistent(&mut txn, 1, 0, "All mail".to_string(), query).unwrap() else {
			panic!("expected Id response")
		};

		let found = txn.get_collection(search_id).unwrap();
		assert!(found.is_virtual);
		assert_eq!(txn.items_in_collection(search_id).len(), 2);
	}

	#[tokio::test]
	async fn search_persistent_modify_unlinks_items_that_no_longer_match() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = seeded_collection(&mut txn);

		let everything = SearchQuery { root_collection_id: collection_id, ..Default::default() };
		let Response::Id(search_id) = search_persistent(&mut txn, 1, 0, "All mail".to_string(), everything).unwrap() else {
			panic!("expected Id response")
		};
		assert_eq!(txn.items_in_collection(search_id).len(), 2);

		let narrowed = SearchQuery { root_collection_id: collection_id, remote_id_equals: Some("MSG-1".to_string()), ..Default::default() };
		search_persistent_modify(&mut txn, search_id, narrowed).unwrap();
		assert_eq!(txn.items_in_collection(search_id).len(), 1);
	}
}

// vim: ts=4
