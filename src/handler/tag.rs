//! Tag handlers: TagAppend/TagStore/TagFetch/TagRemove (§4.7), grounded
//! in `autotests/server/taghandlertest.cpp`. Tag uniqueness by gid is
//! enforced only on merge (§3 invariant 5); `TagRemove` destroys a tag
//! once its last remote-id relation is gone and no session owns it.

use std::collections::BTreeMap;

use crate::store::Transaction;
use crate::types::{EntityId, ResourceId, SessionId};
use crate::PimError;

use super::Response;

/// `TagAppend`: merges into an existing tag with the same gid if one
/// exists, otherwise creates a new one, then records the resource's
/// remote-id claim on it.
pub fn tag_append(
	txn: &mut Transaction,
	session_id: SessionId,
	gid: String,
	type_name: String,
	parent_id: Option<EntityId>,
	resource_id: ResourceId,
	remote_id: String,
) -> Result<Response, PimError> {
	let type_id = txn.intern_tag_type(&type_name);
	let tag_id = match txn.find_tag_by_gid(&gid) {
		Some(id) => id,
		None => txn.create_tag(gid, type_id, parent_id, session_id),
	};
	txn.set_tag_remote_id(tag_id, resource_id, remote_id);
	let tag = txn.get_tag(tag_id).map_err(PimError::Store)?.clone();
	Ok(Response::Tag(tag))
}

pub fn tag_store(txn: &mut Transaction, tag_id: EntityId, attributes: BTreeMap<String, Vec<u8>>) -> Result<Response, PimError> {
	// `get_tag` only exposes a shared reference; attribute updates go
	// through the owning transaction's table directly since tag.rs has
	// no dedicated patch helper (attributes are a flat merge, unlike
	// collection/item patches which track changed-parts).
	let tag = txn.get_tag(tag_id).map_err(PimError::Store)?.clone();
	let mut updated = tag;
	updated.attributes.extend(attributes);
	txn.replace_tag(updated.clone());
	Ok(Response::Tag(updated))
}

pub fn tag_fetch(txn: &mut Transaction, item_id: Option<EntityId>) -> Result<Response, PimError> {
	let tags = match item_id {
		Some(item_id) => txn.tags_of_item(item_id).into_iter().filter_map(|id| txn.get_tag(id).ok().cloned()).collect(),
		None => txn.all_tags(),
	};
	Ok(Response::Tags(tags))
}

pub fn tag_remove(txn: &mut Transaction, session_id: SessionId, tag_id: EntityId, resource_id: ResourceId) -> Result<Response, PimError> {
	txn.remove_tag_remote_id(tag_id, resource_id, session_id);
	Ok(Response::Id(tag_id))
}


// vim: ts=4
