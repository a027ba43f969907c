//! Relation handlers: RelationStore/RelationRemove/RelationFetch (§4.7),
//! grounded in `autotests/server/relationhandlertest.cpp`.

use crate::store::Transaction;
use crate::types::EntityId;
use crate::{HandlerError, PimError};

use super::Response;
use crate::types::SessionId;

pub fn relation_store(
	txn: &mut Transaction,
	session_id: SessionId,
	left_item_id: EntityId,
	right_item_id: EntityId,
	type_id: EntityId,
	remote_id: Option<String>,
) -> Result<Response, PimError> {
	txn.get_item(left_item_id).map_err(PimError::Store)?;
	txn.get_item(right_item_id).map_err(PimError::Store)?;
	txn.store_relation(left_item_id, right_item_id, type_id, remote_id, session_id);
	Ok(Response::Ok)
}

pub fn relation_remove(
	txn: &mut Transaction,
	session_id: SessionId,
	left_item_id: EntityId,
	right_item_id: EntityId,
	type_id: EntityId,
) -> Result<Response, PimError> {
	let removed = txn.remove_relation(left_item_id, right_item_id, type_id, session_id);
	if !removed {
		return Err(HandlerError::validation("no such relation").into());
	}
	Ok(Response::Ok)
}

pub fn relation_fetch(
	txn: &mut Transaction,
	left_item_id: Option<EntityId>,
	right_item_id: Option<EntityId>,
	type_id: Option<EntityId>,
) -> Result<Response, PimError> {
	let relations = txn.fetch_relations(left_item_id, right_item_id, type_id).into_iter().cloned().collect();
	Ok(Response::Relations(relations))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::collection::NewCollection;
	use crate::store::item::NewItem;
	use crate::store::{CachePolicy, Store};
	use crate::types::TriState;
	use std::collections::{BTreeMap, BTreeSet};

	fn two_items(txn: &mut Transaction) -> (EntityId, EntityId) {
		let collection_id = txn.create_collection(
			NewCollection {
				parent_id: 0,
				name: "Contacts".to_string(),
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
				attributes: BTreeMap::new(),
			},
			1,
		);
		let new_item = |remote_id: &str| NewItem {
			collection_id,
			mime_type_id: 1,
			remote_id: Some(remote_id.to_string()),
			remote_revision: None,
			gid: None,
			declared_size: 0,
			datetime: 0,
		};
		let left = txn.create_item(new_item("left"), 1, 1);
		let right = txn.create_item(new_item("right"), 1, 1);
		(left, right)
	}

	#[tokio::test]
	async fn store_then_fetch_relation_by_either_endpoint() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let (left, right) = two_items(&mut txn);

		relation_store(&mut txn, 1, left, right, 7, Some("REL-1".to_string())).unwrap();

		let Response::Relations(by_left) = relation_fetch(&mut txn, Some(left), None, None).unwrap() else {
			panic!("expected Relations response")
		};
		assert_eq!(by_left.len(), 1);
		assert_eq!(by_left[0].right_item_id, right);

		let Response::Relations(by_right) = relation_fetch(&mut txn, None, Some(right), None).unwrap() else {
			panic!("expected Relations response")
		};
		assert_eq!(by_right.len(), 1);
		assert_eq!(by_right[0].left_item_id, left);
	}

	#[tokio::test]
	async fn removing_an_absent_relation_is_an_error() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let (left, right) = two_items(&mut txn);

		let err = relation_remove(&mut txn, 1, left, right, 7).unwrap_err();
		assert!(err.to_string().to_lowercase().contains("relation"));
	}

	#[tokio::test]
	async fn storing_a_relation_against_a_missing_item_fails() {
		let store = Store::open_in_memory(500).unwrap();
		let mut txn = store.begin(1).await;
		let (left, _right) = two_items(&mut txn);

		let err = relation_store(&mut txn, 1, left, 9999, 7, None).unwrap_err();
		assert!(matches!(err, PimError::Store(_)));
	}
}

// vim: ts=4
