//! Item handlers: CreateItem (+ merge modes), ModifyItem/AppendFlag/
//! RemoveFlag/ModifyTags, MoveItems, LinkItems/UnlinkItems, Expunge,
//! FetchItems (§4.7).
//!
//! Grounded in `original_source/server/src/handler/itemcreatehandler.cpp`
//! / `merge.cpp` for the merge-candidate rules, `fetchhelper.cpp` /
//! `fetchscope.cpp` for `FetchItems`' scope flags.

use crate::protocol::{PartName, PartNamespace, PartPayload};
use crate::retrieval::ResourcePeer;
use crate::scope::{Scope, ScopeContext};
use crate::store::item::ItemPatch;
use crate::store::item::NewItem;
use crate::store::{Item, Transaction};
use crate::types::{EntityId, ResourceId, SessionId, Timestamp};
use crate::{HandlerError, PimError};

use super::{resolve_scope, HandlerContext, Response};

/// Which of rid/gid (or both) a `CreateItem` should try to merge against
/// before falling back to plain creation (§4.7 "CreateItem with merge
/// modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
	None,
	Rid,
	Gid,
	RidOrGid,
}

pub struct CreateItemRequest {
	pub collection_id: EntityId,
	pub resource_id: ResourceId,
	pub mime_type: String,
	pub remote_id: Option<String>,
	pub remote_revision: Option<String>,
	pub gid: Option<String>,
	pub datetime: Timestamp,
	pub declared_size: i64,
	pub flags: Vec<String>,
	pub tags: Vec<EntityId>,
	pub parts: Vec<(PartName, PartPayload, i64)>,
	pub merge_mode: MergeMode,
	/// Set when the target is a virtual collection and the client asked
	/// for a `Link` rather than a plain append (§3 invariant 1).
	pub link_into_virtual: bool,
}

#[derive(Default)]
pub struct ItemPatchRequest {
	pub remote_id: Option<String>,
	pub remote_revision: Option<String>,
	pub gid: Option<String>,
	pub size: Option<i64>,
}

/// Fetch-scope flags driving `FetchItems` (§4.7, grounded in
/// `fetchscope.cpp`); `cache_only` skips C10 retrieval entirely.
pub struct FetchScope {
	pub full_payload: bool,
	pub all_attributes: bool,
	pub cache_only: bool,
	pub external_payload: bool,
	pub check_cached_parts_only: bool,
	pub changed_since: Option<i64>,
	pub ignore_errors: bool,
	pub ancestor_depth: u32,
	/// Explicitly named `PLD:<name>` parts from the request's parameter
	/// list (§4.7), on top of whatever `full_payload`/`all_attributes`
	/// pull in.
	pub requested_parts: Vec<String>,
}

impl Default for FetchScope {
	fn default() -> Self {
		FetchScope {
			full_payload: false,
			all_attributes: false,
			cache_only: false,
			external_payload: false,
			check_cached_parts_only: false,
			changed_since: None,
			ignore_errors: false,
			ancestor_depth: 0,
			requested_parts: Vec::new(),
		}
	}
}

fn summed_payload_size(parts: &[(PartName, PartPayload, i64)]) -> i64 {
	parts.iter().filter(|(name, _, _)| name.namespace == PartNamespace::Payload).map(|(_, p, _)| p.len() as i64).sum()
}

fn pick_single(candidates: Vec<EntityId>) -> Result<Option<EntityId>, HandlerError> {
	match candidates.len() {
		0 => Ok(None),
		1 => Ok(Some(candidates[0])),
		_ => Err(HandlerError::validation("Multiple merge candidates")),
	}
}

/// Locates the single merge target for `mode`, applying the GID-merge-
/// into-empty-GID-RID-match asymmetry exactly (spec.md §9: "GID-merge
/// into an empty-GID RID match is allowed").
fn find_merge_target(
	txn: &Transaction,
	collection_id: EntityId,
	mime_type_id: i64,
	mode: MergeMode,
	rid: Option<&str>,
	gid: Option<&str>,
) -> Result<Option<EntityId>, HandlerError> {
	match mode {
		MergeMode::None => Ok(None),
		MergeMode::Rid => pick_single(txn.find_merge_candidates(collection_id, mime_type_id, rid, None)),
		MergeMode::Gid => {
			let by_gid = txn.find_merge_candidates(collection_id, mime_type_id, None, gid);
			if !by_gid.is_empty() {
				return pick_single(by_gid);
			}
			let Some(rid) = rid else { return Ok(None) };
			let candidates: Vec<EntityId> = txn
				.find_merge_candidates(collection_id, mime_type_id, Some(rid), None)
				.into_iter()
				.filter(|id| txn.get_item(*id).is_ok_and(|item| item.gid.is_none()))
				.collect();
			pick_single(candidates)
		}
		MergeMode::RidOrGid => {
			let mut candidates = txn.find_merge_candidates(collection_id, mime_type_id, rid, None);
			for id in txn.find_merge_candidates(collection_id, mime_type_id, None, gid) {
				if !candidates.contains(&id) {
					candidates.push(id);
				}
			}
			pick_single(candidates)
		}
	}
}

pub async fn create_item(txn: &mut Transaction, session_id: SessionId, req: CreateItemRequest) -> Result<Response, PimError> {
	let collection = txn.get_collection(req.collection_id).map_err(PimError::Store)?;
	let resource_id = collection.resource_id;
	if collection.is_virtual && !req.link_into_virtual {
		return Err(HandlerError::validation("Cannot append item into virtual collection").into());
	}
	// An item-declared size that disagrees with the summed part size is not
	// an error (§4.4, §8 scenario 2 "mismatch item sizes"): `create_item`
	// always reconciles below via `reconcile_size_from_parts`. Only a
	// per-part declared-size-vs-streamed-bytes mismatch is fatal, and that
	// is enforced at stream time in `stream_part`.
	let summed = summed_payload_size(&req.parts);
	let mime_type_id = txn.intern_mime_type(&req.mime_type);

	let target = find_merge_target(txn, req.collection_id, mime_type_id, req.merge_mode, req.remote_id.as_deref(), req.gid.as_deref())?;

	let item_id = match target {
		Some(item_id) => {
			let fill_in_gid = req.merge_mode == MergeMode::Gid
				&& req.gid.is_some()
				&& txn.get_item(item_id).map_err(PimError::Store)?.gid.is_none();
			let patch = ItemPatch {
				remote_id: req.remote_id.clone(),
				remote_revision: req.remote_revision.clone(),
				gid: if fill_in_gid { req.gid.clone() } else { None },
				size: Some(req.declared_size),
				dirty: None,
			};
			txn.modify_item(item_id, patch, session_id).map_err(PimError::Store)?;
			item_id
		}
		None => txn.create_item(
			NewItem {
				collection_id: req.collection_id,
				mime_type_id,
				remote_id: req.remote_id.clone(),
				remote_revision: req.remote_revision.clone(),
				gid: req.gid.clone(),
				declared_size: req.declared_size,
				datetime: req.datetime,
			},
			resource_id,
			session_id,
		),
	};

	txn.append_flags(item_id, &req.flags, target.is_some(), session_id);
	txn.append_tags(item_id, &req.tags, session_id);
	for (name, payload, version) in req.parts {
		txn.put_part(item_id, &name, payload, version);
	}
	txn.reconcile_size_from_parts(item_id, summed).map_err(PimError::Store)?;
	if target.is_none() {
		txn.note_item_added(item_id);
	}
	Ok(Response::Id(item_id))
}

pub fn modify_item(
	txn: &mut Transaction,
	session_id: SessionId,
	resource: Option<ResourceId>,
	scope: Scope,
	context: ScopeContext,
	patch: ItemPatchRequest,
) -> Result<Response, PimError> {
	let ids = resolve_scope(txn, &scope, resource, &context)?;
	for id in &ids {
		txn.modify_item(
			*id,
			ItemPatch { remote_id: patch.remote_id.clone(), remote_revision: patch.remote_revision.clone(), gid: patch.gid.clone(), size: patch.size, dirty: None },
			session_id,
		)
		.map_err(PimError::Store)?;
	}
	Ok(Response::Ids(ids))
}

pub fn append_flag(
	txn: &mut Transaction,
	session_id: SessionId,
	resource: Option<ResourceId>,
	scope: Scope,
	context: ScopeContext,
	flag_names: Vec<String>,
	observable: bool,
) -> Result<Response, PimError> {
	let ids = resolve_scope(txn, &scope, resource, &context)?;
	for id in &ids {
		let was_seen = txn.has_flag(*id, "\\Seen");
		txn.append_flags(*id, &flag_names, observable, session_id);
		let is_seen = txn.has_flag(*id, "\\Seen");
		txn.note_seen_changed(*id, was_seen, is_seen);
	}
	Ok(Response::Ids(ids))
}

pub fn remove_flag(
	txn: &mut Transaction,
	session_id: SessionId,
	resource: Option<ResourceId>,
	scope: Scope,
	context: ScopeContext,
	flag_names: Vec<String>,
	observable: bool,
) -> Result<Response, PimError> {
	let ids = resolve_scope(txn, &scope, resource, &context)?;
	for id in &ids {
		let was_seen = txn.has_flag(*id, "\\Seen");
		txn.remove_flags(*id, &flag_names, observable, session_id);
		let is_seen = txn.has_flag(*id, "\\Seen");
		txn.note_seen_changed(*id, was_seen, is_seen);
	}
	Ok(Response::Ids(ids))
}

pub fn modify_tags(
	txn: &mut Transaction,
	session_id: SessionId,
	resource: Option<ResourceId>,
	scope: Scope,
	context: ScopeContext,
	add: Vec<EntityId>,
	remove: Vec<EntityId>,
) -> Result<Response, PimError> {
	let ids = resolve_scope(txn, &scope, resource, &context)?;
	for id in &ids {
		if !add.is_empty() {
			txn.append_tags(*id, &add, session_id);
		}
		if !remove.is_empty() {
			txn.remove_tags(*id, &remove, session_id);
		}
	}
	Ok(Response::Ids(ids))
}

pub fn move_items(
	txn: &mut Transaction,
	session_id: SessionId,
	resource: Option<ResourceId>,
	scope: Scope,
	context: ScopeContext,
	dest_parent: EntityId,
) -> Result<Response, PimError> {
	let ids = resolve_scope(txn, &scope, resource, &context)?;
	let mut by_source: std::collections::BTreeMap<EntityId, Vec<(i64, bool)>> = std::collections::BTreeMap::new();
	for &id in &ids {
		if let Ok(item) = txn.get_item(id) {
			let (source, size) = (item.collection_id, item.size);
			let seen = txn.has_flag(id, "\\Seen");
			by_source.entry(source).or_default().push((size, seen));
		}
	}
	txn.move_items(&ids, dest_parent, session_id).map_err(PimError::Store)?;
	for (source, items) in by_source {
		txn.note_items_moved(source, dest_parent, &items);
	}
	Ok(Response::Ids(ids))
}

pub fn link_items(
	txn: &mut Transaction,
	session_id: SessionId,
	resource: Option<ResourceId>,
	scope: Scope,
	context: ScopeContext,
	collection_id: EntityId,
) -> Result<Response, PimError> {
	let ids = resolve_scope(txn, &scope, resource, &context)?;
	txn.link_items(&ids, collection_id, session_id);
	Ok(Response::Ids(ids))
}

pub fn unlink_items(
	txn: &mut Transaction,
	session_id: SessionId,
	resource: Option<ResourceId>,
	scope: Scope,
	context: ScopeContext,
	collection_id: EntityId,
) -> Result<Response, PimError> {
	let ids = resolve_scope(txn, &scope, resource, &context)?;
	txn.unlink_items(&ids, collection_id, session_id);
	Ok(Response::Ids(ids))
}

pub fn expunge(
	txn: &mut Transaction,
	session_id: SessionId,
	resource: Option<ResourceId>,
	scope: Scope,
	context: ScopeContext,
) -> Result<Response, PimError> {
	let ids = resolve_scope(txn, &scope, resource, &context)?;
	for id in &ids {
		txn.note_item_removed(*id);
		txn.delete_item(*id, session_id).map_err(PimError::Store)?;
	}
	Ok(Response::Ids(ids))
}

/// Fetches items in scope, driving C10 retrieval for payload parts the
/// store doesn't already have unless `cache_only`/`check_cached_parts_only`
/// suppress it (§4.7, grounded in `fetchhelper.cpp`/`fetchscope.cpp`).
///
/// `wanted` is derived from the item's own part set plus whatever the
/// request named explicitly, rather than assuming a single canonical
/// payload name, so a missing non-`PLD:DATA` part (e.g. an attachment
/// the resource created the item row for but hasn't synced yet) is
/// still detected.
///
/// `ancestor_depth` has no carrier in `Response::Items` (an `Item` has
/// no ancestor field, unlike `FetchCollections`' scaffold list) — see
/// DESIGN.md. It's still honored to the extent it can be: each
/// ancestor collection up to that depth is resolved so a broken chain
/// surfaces as an error here rather than silently later.
pub async fn fetch_items<P: ResourcePeer>(
	txn: &mut Transaction,
	resource: Option<ResourceId>,
	scope: Scope,
	context: ScopeContext,
	fetch_scope: FetchScope,
	ctx: &HandlerContext<P>,
) -> Result<Response, PimError> {
	let ids = resolve_scope(txn, &scope, resource, &context)?;
	let mut items: Vec<Item> = Vec::with_capacity(ids.len());
	for id in ids {
		let item = txn.get_item(id).map_err(PimError::Store)?.clone();

		if let Some(changed_since) = fetch_scope.changed_since {
			if item.mtime < changed_since {
				continue;
			}
		}

		let parts: Vec<crate::store::Part> = txn.parts_of(id).into_iter().cloned().collect();
		let have: Vec<String> = parts.iter().map(|p| p.part_name.clone()).collect();

		let mut wanted: Vec<String> = fetch_scope.requested_parts.clone();
		if fetch_scope.full_payload {
			let payload_names: Vec<String> = parts.iter().filter(|p| p.is_payload()).map(|p| p.part_name.clone()).collect();
			if payload_names.is_empty() {
				wanted.push("PLD:DATA".to_string());
			} else {
				wanted.extend(payload_names);
			}
		}
		if fetch_scope.all_attributes {
			wanted.extend(parts.iter().filter(|p| !p.is_payload()).map(|p| p.part_name.clone()));
		}
		wanted.sort();
		wanted.dedup();

		// A part stored externally still counts as present unless the
		// client can't accept an external reference, in which case it
		// must be re-resolved through the resource (§4.7 `externalPayload`).
		let have_resolvable: Vec<&String> = if fetch_scope.external_payload {
			have.iter().collect()
		} else {
			parts.iter().filter(|p| matches!(p.storage, crate::store::PartStorage::Internal(_))).map(|p| &p.part_name).collect()
		};
		let missing: Vec<String> = wanted.into_iter().filter(|name| !have_resolvable.iter().any(|h| *h == name)).collect();

		if !missing.is_empty() && !fetch_scope.cache_only && !fetch_scope.check_cached_parts_only {
			let collection = txn.get_collection(item.collection_id).map_err(PimError::Store)?;
			ctx.retrieval
				.fetch(collection.resource_id, item.collection_id, id, missing, fetch_scope.ignore_errors)
				.await
				.map_err(PimError::Retrieval)?;
		}

		let mut ancestor_id = item.collection_id;
		for _ in 0..fetch_scope.ancestor_depth {
			let ancestor = txn.get_collection(ancestor_id).map_err(PimError::Store)?;
			if ancestor.parent_id == 0 {
				break;
			}
			ancestor_id = ancestor.parent_id;
		}

		items.push(item);
	}
	Ok(Response::Items(items))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::SequenceSet;
	use crate::store::collection::NewCollection;
	use crate::store::{CachePolicy, Store};
	use crate::types::TriState;
	use std::collections::{BTreeMap, BTreeSet};

	fn seeded_collection(txn: &mut Transaction, is_virtual: bool) -> EntityId {
		txn.create_collection(
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
				is_virtual,
				attributes: BTreeMap::new(),
			},
			1,
		)
	}

	fn base_request(collection_id: EntityId, remote_id: &str) -> CreateItemRequest {
		CreateItemRequest {
			collection_id,
			resource_id: 1,
			mime_type: "message/rfc822".to_string(),
			remote_id: Some(remote_id.to_string()),
			remote_revision: None,
			gid: None,
			datetime: 0,
			declared_size: 0,
			flags: Vec::new(),
			tags: Vec::new(),
			parts: Vec::new(),
			merge_mode: MergeMode::None,
			link_into_virtual: false,
		}
	}

	/// Ground truth (`akappendhandlertest.cpp` "mismatch item sizes
	/// (bigger)"): item-declared size 10, part-declared+streamed size 5 —
	/// this must succeed, and the item's size stays at the larger declared
	/// value since `reconcile_size_from_parts` only ever raises it (§8
	/// scenario 2).
	#[tokio::test]
	async fn create_item_with_summed_size_smaller_than_declared_keeps_declared_size() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = seeded_collection(&mut txn, false);

		let mut req = base_request(collection_id, "MSG-1");
		req.declared_size = 10;
		req.parts = vec![(PartName::parse("PLD:DATA").unwrap(), PartPayload::Inline(b"12345".to_vec()), 0)];
		let Response::Id(item_id) = create_item(&mut txn, 1, req).await.unwrap() else { panic!("expected Id response") };

		assert_eq!(txn.get_item(item_id).unwrap().size, 10);
	}

	/// The converse of the above: a summed part size bigger than the
	/// item's declared size raises the item's size to match (§8 scenario
	/// 2), and is likewise never fatal.
	#[tokio::test]
	async fn create_item_with_summed_size_larger_than_declared_raises_item_size() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = seeded_collection(&mut txn, false);

		let mut req = base_request(collection_id, "MSG-1");
		req.declared_size = 5;
		req.parts = vec![(PartName::parse("PLD:DATA").unwrap(), PartPayload::Inline(b"0123456789".to_vec()), 0)];
		let Response::Id(item_id) = create_item(&mut txn, 1, req).await.unwrap() else { panic!("expected Id response") };

		assert_eq!(txn.get_item(item_id).unwrap().size, 10);
	}

	#[tokio::test]
	async fn create_item_with_rid_merge_mode_updates_the_existing_item() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = seeded_collection(&mut txn, false);

		let Response::Id(first_id) = create_item(&mut txn, 1, base_request(collection_id, "MSG-1")).await.unwrap() else {
			panic!("expected Id response")
		};
		let mut second = base_request(collection_id, "MSG-1");
		second.merge_mode = MergeMode::Rid;
		second.remote_revision = Some("rev-2".to_string());
		let Response::Id(second_id) = create_item(&mut txn, 1, second).await.unwrap() else { panic!("expected Id response") };

		assert_eq!(first_id, second_id);
		assert_eq!(txn.get_item(first_id).unwrap().remote_revision.as_deref(), Some("rev-2"));
	}

	#[tokio::test]
	async fn create_item_into_virtual_collection_requires_link_flag() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = seeded_collection(&mut txn, true);

		let err = create_item(&mut txn, 1, base_request(collection_id, "MSG-1")).await.unwrap_err();
		assert!(err.to_string().to_lowercase().contains("virtual"));

		let mut linked = base_request(collection_id, "MSG-1");
		linked.link_into_virtual = true;
		assert!(create_item(&mut txn, 1, linked).await.is_ok());
	}

	#[tokio::test]
	async fn modify_item_patches_every_id_in_scope() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = seeded_collection(&mut txn, false);
		let Response::Id(item_id) = create_item(&mut txn, 1, base_request(collection_id, "MSG-1")).await.unwrap() else {
			panic!("expected Id response")
		};

		let scope = Scope::Uid(SequenceSet::single(item_id));
		let patch = ItemPatchRequest { remote_revision: Some("rev-new".to_string()), ..Default::default() };
		modify_item(&mut txn, 1, None, scope, ScopeContext::none(), patch).unwrap();

		assert_eq!(txn.get_item(item_id).unwrap().remote_revision.as_deref(), Some("rev-new"));
	}

	#[tokio::test]
	async fn expunge_removes_items_in_scope() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let collection_id = seeded_collection(&mut txn, false);
		let Response::Id(item_id) = create_item(&mut txn, 1, base_request(collection_id, "MSG-1")).await.unwrap() else {
			panic!("expected Id response")
		};

		let scope = Scope::Uid(SequenceSet::single(item_id));
		expunge(&mut txn, 1, None, scope, ScopeContext::none()).unwrap();

		assert!(txn.get_item(item_id).is_err());
	}
}

// vim: ts=4
