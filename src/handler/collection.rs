//! Collection handlers: CreateCollection/ModifyCollection/
//! MoveCollection/DeleteCollection/ColCopy/Subscribe/Unsubscribe (§4.7).
//!
//! Grounded in `autotests/server/collectioncreatehandlertest.cpp` and
//! `collectionreferencetest.cpp`'s reference-counting tests.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::scheduler::SchedulerControl;
use crate::store::collection::CollectionPatch;
use crate::store::collection::NewCollection;
use crate::store::entities::CachePolicy;
use crate::store::Transaction;
use crate::types::{EntityId, MimeTypeId, ResourceId, SessionId, TriState};
use crate::{HandlerError, PimError};

use super::Response;

pub struct NewCollectionRequest {
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

#[derive(Default)]
pub struct CollectionPatchRequest {
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

/// What `ColCopy` deep-copies: either a single item or a whole
/// collection subtree (§4.7 "ColCopy deep-copies an item or collection
/// subtree to a new parent").
pub enum ColCopyTarget {
	Item(EntityId),
	Collection(EntityId),
}

/// How far `FetchCollections` walks from `parent_id` (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDepth {
	/// Only `parent_id` itself.
	BaseCollection,
	/// `parent_id`'s immediate children.
	ParentCollection,
	/// Every descendant of `parent_id`.
	AllCollections,
}

/// The six filter categories `FetchCollections` supports (§4.7); an empty
/// or `None` field means "no restriction", matching the empty-means-
/// match-all convention `notify::router::category_matches` uses.
#[derive(Debug, Clone, Default)]
pub struct CollectionFilter {
	pub mime_types: BTreeSet<MimeTypeId>,
	pub resource_id: Option<ResourceId>,
	pub enabled: Option<bool>,
	pub sync_pref: Option<TriState>,
	pub display_pref: Option<TriState>,
	pub index_pref: Option<TriState>,
}

impl CollectionFilter {
	pub fn matches(&self, c: &crate::store::Collection) -> bool {
		if !self.mime_types.is_empty() && self.mime_types.is_disjoint(&c.mime_types) {
			return false;
		}
		if let Some(resource_id) = self.resource_id {
			if c.resource_id != resource_id {
				return false;
			}
		}
		if let Some(enabled) = self.enabled {
			if c.enabled != enabled {
				return false;
			}
		}
		if let Some(sync_pref) = self.sync_pref {
			if c.sync_pref != sync_pref {
				return false;
			}
		}
		if let Some(display_pref) = self.display_pref {
			if c.display_pref != display_pref {
				return false;
			}
		}
		if let Some(index_pref) = self.index_pref {
			if c.index_pref != index_pref {
				return false;
			}
		}
		true
	}
}

pub fn create_collection(txn: &mut Transaction, session_id: SessionId, req: NewCollectionRequest) -> Result<Response, PimError> {
	let id = txn.create_collection(
		NewCollection {
			parent_id: req.parent_id,
			name: req.name,
			resource_id: req.resource_id,
			remote_id: req.remote_id,
			remote_revision: req.remote_revision,
			mime_types: req.mime_types,
			cache_policy: req.cache_policy,
			enabled: req.enabled,
			sync_pref: req.sync_pref,
			display_pref: req.display_pref,
			index_pref: req.index_pref,
			is_virtual: req.is_virtual,
			attributes: req.attributes,
		},
		session_id,
	);
	Ok(Response::Id(id))
}

pub async fn modify_collection(
	txn: &mut Transaction,
	session_id: SessionId,
	scheduler: &SchedulerControl,
	id: EntityId,
	patch: CollectionPatchRequest,
) -> Result<Response, PimError> {
	let new_interval = patch.cache_policy.as_ref().filter(|p| !p.inherit).map(|p| p.check_interval_minutes);
	txn.modify_collection(
		id,
		CollectionPatch {
			name: patch.name,
			parent_id: patch.parent_id,
			mime_types: patch.mime_types,
			cache_policy: patch.cache_policy,
			enabled: patch.enabled,
			sync_pref: patch.sync_pref,
			display_pref: patch.display_pref,
			index_pref: patch.index_pref,
			remote_id: patch.remote_id,
			remote_revision: patch.remote_revision,
			attributes: patch.attributes,
		},
		session_id,
	)
	.map_err(PimError::Store)?;
	if let Some(minutes) = new_interval {
		scheduler.collection_changed(id, Duration::from_secs((minutes.max(0) as u64) * 60)).await;
	}
	Ok(Response::Id(id))
}

pub fn move_collection(txn: &mut Transaction, session_id: SessionId, id: EntityId, new_parent_id: EntityId) -> Result<Response, PimError> {
	txn.move_collection(id, new_parent_id, session_id).map_err(PimError::Store)?;
	Ok(Response::Id(id))
}

pub async fn delete_collection(
	txn: &mut Transaction,
	session_id: SessionId,
	scheduler: &SchedulerControl,
	id: EntityId,
) -> Result<Response, PimError> {
	txn.delete_collection(id, session_id).map_err(PimError::Store)?;
	scheduler.collection_removed(id).await;
	Ok(Response::Id(id))
}

/// Deep-copies an item or a collection subtree under `dest_parent_id`,
/// re-emitting `Add` notifications for every copy rather than `Move`
/// (§4.7 ColCopy).
pub fn col_copy(txn: &mut Transaction, session_id: SessionId, source: ColCopyTarget, dest_parent_id: EntityId) -> Result<Response, PimError> {
	match source {
		ColCopyTarget::Item(item_id) => {
			let item = txn.get_item(item_id).map_err(PimError::Store)?.clone();
			let new_id = txn.create_item(
				crate::store::item::NewItem {
					collection_id: dest_parent_id,
					mime_type_id: item.mime_type_id,
					remote_id: item.remote_id.clone(),
					remote_revision: item.remote_revision.clone(),
					gid: item.gid.clone(),
					declared_size: item.size,
					datetime: item.datetime,
				},
				0,
				session_id,
			);
			for part in txn.parts_of(item_id).into_iter().cloned().collect::<Vec<_>>() {
				let name = crate::protocol::PartName::parse(&part.part_name).map_err(|e| HandlerError::logic(e.to_string()))?;
				let payload = match part.storage {
					crate::store::entities::PartStorage::Internal(bytes) => crate::protocol::PartPayload::Inline(bytes),
					crate::store::entities::PartStorage::External(token) => crate::protocol::PartPayload::External(token),
				};
				txn.put_part(new_id, &name, payload, part.version);
			}
			Ok(Response::Id(new_id))
		}
		ColCopyTarget::Collection(collection_id) => {
			let collection = txn.get_collection(collection_id).map_err(PimError::Store)?.clone();
			let new_collection_id = txn.create_collection(
				NewCollection {
					parent_id: dest_parent_id,
					name: collection.name.clone(),
					resource_id: collection.resource_id,
					remote_id: None,
					remote_revision: None,
					mime_types: collection.mime_types.clone(),
					cache_policy: collection.cache_policy.clone(),
					enabled: collection.enabled,
					sync_pref: collection.sync_pref,
					display_pref: collection.display_pref,
					index_pref: collection.index_pref,
					is_virtual: collection.is_virtual,
					attributes: collection.attributes.clone(),
				},
				session_id,
			);
			for item_id in txn.items_in_collection(collection_id) {
				col_copy(txn, session_id, ColCopyTarget::Item(item_id), new_collection_id)?;
			}
			Ok(Response::Id(new_collection_id))
		}
	}
}

/// Walks upward from `start`'s parent, collecting ancestor ids needed to
/// reconstruct the tree down to a matched node (§4.7's "scaffold"
/// requirement: intermediate nodes a filter excluded, but whose
/// descendants still matched, are still returned). For `AllCollections`
/// the walk is unconditional up to `root`; for the other depths it is
/// bounded by `ancestor_depth` extra levels.
fn collect_ancestors(txn: &Transaction, start: EntityId, root: EntityId, depth: FetchDepth, ancestor_depth: u32, out: &mut BTreeSet<EntityId>) {
	let mut current = start;
	let mut steps = 0u32;
	while current != root {
		let Ok(collection) = txn.get_collection(current) else { return };
		let parent_id = collection.parent_id;
		if parent_id == current || parent_id == root {
			return;
		}
		let unconditional = depth == FetchDepth::AllCollections;
		if !unconditional && steps >= ancestor_depth {
			return;
		}
		if !out.insert(parent_id) {
			return;
		}
		current = parent_id;
		steps += 1;
	}
}

/// `FetchCollections` (§4.7): walks `depth` levels from `parent_id`,
/// keeps only collections `filter` matches, then adds back whatever
/// ancestor scaffold is needed to reconstruct the tree down to each match
/// (plus `ancestor_depth` extra levels above that for shallower depths).
pub fn fetch_collections(
	txn: &mut Transaction,
	parent_id: Option<EntityId>,
	depth: FetchDepth,
	filter: CollectionFilter,
	ancestor_depth: u32,
) -> Result<Response, PimError> {
	let root = parent_id.unwrap_or(0);
	let candidates: Vec<EntityId> = match depth {
		FetchDepth::BaseCollection => vec![root],
		FetchDepth::ParentCollection => txn.children_of(root).into_iter().map(|c| c.id).collect(),
		FetchDepth::AllCollections => txn.descendants_of(root),
	};

	let mut result_ids: BTreeSet<EntityId> = BTreeSet::new();
	for id in candidates {
		let Ok(collection) = txn.get_collection(id) else { continue };
		if !filter.matches(collection) {
			continue;
		}
		result_ids.insert(id);
		collect_ancestors(txn, id, root, depth, ancestor_depth, &mut result_ids);
	}

	let collections: Vec<crate::store::Collection> =
		result_ids.into_iter().filter_map(|id| txn.get_collection(id).ok().cloned()).collect();
	Ok(Response::Collections(collections))
}

/// `FetchStats`: exposes C8's `(count, unread, size)` cache for a single
/// collection (§4.8).
pub fn fetch_stats(txn: &mut Transaction, collection_id: EntityId) -> Result<Response, PimError> {
	Ok(Response::Stats(txn.collection_stats(collection_id)))
}

/// `Subscribe`/`Unsubscribe`: directly invokable counterpart of
/// `ModifyCollection`'s `ENABLED` transition, plus the session-scoped
/// `REFERENCED` reference count (§4.7, `collectionreferencetest.cpp`).
pub fn subscribe(txn: &mut Transaction, session_id: SessionId, collection_id: EntityId) -> Result<Response, PimError> {
	txn.set_reference(collection_id, session_id, true);
	txn.modify_collection(collection_id, CollectionPatch { enabled: Some(true), ..CollectionPatch::default() }, session_id)
		.map_err(PimError::Store)?;
	Ok(Response::Id(collection_id))
}

pub fn unsubscribe(txn: &mut Transaction, session_id: SessionId, collection_id: EntityId) -> Result<Response, PimError> {
	txn.set_reference(collection_id, session_id, false);
	if !txn.is_globally_referenced(collection_id) {
		txn.modify_collection(collection_id, CollectionPatch { enabled: Some(false), ..CollectionPatch::default() }, session_id)
			.map_err(PimError::Store)?;
	}
	Ok(Response::Id(collection_id))
}


// vim: ts=4
