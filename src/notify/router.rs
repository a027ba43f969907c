//! Notification router (C6): per-session filters, freeze/record/replay
//! state machine, fan-out (§4.6).
//!
//! Grounded in `original_source/server/src/idlemanager.cpp`
//! (`IdleManager`) and `idleclient.cpp`/`.h`; the record/replay-across-
//! disconnect behavior maps to `IdleClient`'s buffered-notification list.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::types::{EntityId, MimeTypeId, ResourceId, SessionId, TagTypeId};

use super::types::{CollectionChange, ItemChange, MutationRecord, RelationChange, TagChange};

/// A single category of the filter; empty means "match everything".
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
	pub item_ids: BTreeSet<EntityId>,
	pub collection_ids: BTreeSet<EntityId>,
	pub mime_types: BTreeSet<MimeTypeId>,
	pub resources: BTreeSet<ResourceId>,
	pub tag_ids: BTreeSet<TagTypeId>,
	/// Operation names (`ADD`, `MODIFY`, `MODIFYFLAGS`, `MOVE`, `REMOVE`,
	/// ...), matched case-insensitively against each op's `Debug` rendering
	/// uppercased (§4.6: "monitored item ids, collection ids, mime-types,
	/// resources, tag ids, operations").
	pub operations: BTreeSet<String>,
	pub ignored_sessions: BTreeSet<SessionId>,
}

fn op_name<T: std::fmt::Debug>(op: &T) -> String {
	format!("{:?}", op).to_ascii_uppercase()
}

impl NotificationFilter {
	pub fn everything() -> Self {
		NotificationFilter::default()
	}

	fn category_matches<T: Ord>(set: &BTreeSet<T>, present: impl Iterator<Item = T>) -> bool {
		set.is_empty() || present.into_iter().any(|v| set.contains(&v))
	}

	fn operation_matches(&self, name: String) -> bool {
		self.operations.is_empty() || self.operations.contains(&name)
	}

	pub fn matches(&self, record: &MutationRecord) -> bool {
		if self.ignored_sessions.contains(&record.session_id()) {
			return false;
		}
		match record {
			MutationRecord::Item(change) => self.matches_item(change),
			MutationRecord::Collection(change) => self.matches_collection(change),
			MutationRecord::Tag(change) => self.matches_tag(change),
			MutationRecord::Relation(change) => self.matches_relation(change),
		}
	}

	fn matches_item(&self, change: &ItemChange) -> bool {
		let item_ok = Self::category_matches(&self.item_ids, change.item_ids.iter().copied());
		let collection_ok = {
			let mut parents = Vec::new();
			parents.extend(change.source_parent);
			parents.extend(change.dest_parent);
			Self::category_matches(&self.collection_ids, parents.into_iter())
		};
		let mime_ok = match change.mime_type_id {
			Some(mt) => Self::category_matches(&self.mime_types, std::iter::once(mt)),
			None => true,
		};
		let resource_ok = {
			let mut resources = Vec::new();
			resources.extend(change.source_resource);
			resources.extend(change.dest_resource);
			Self::category_matches(&self.resources, resources.into_iter())
		};
		item_ok && collection_ok && mime_ok && resource_ok && self.operation_matches(op_name(&change.op))
	}

	fn matches_collection(&self, change: &CollectionChange) -> bool {
		let mut parents = vec![change.collection_id];
		parents.extend(change.source_parent);
		parents.extend(change.dest_parent);
		let collection_ok = Self::category_matches(&self.collection_ids, parents.into_iter());
		let resource_ok = match change.resource_id {
			Some(r) => Self::category_matches(&self.resources, std::iter::once(r)),
			None => true,
		};
		collection_ok && resource_ok && self.operation_matches(op_name(&change.op))
	}

	fn matches_tag(&self, change: &TagChange) -> bool {
		Self::category_matches(&self.tag_ids, std::iter::once(change.tag_id)) && self.operation_matches(op_name(&change.op))
	}

	fn matches_relation(&self, change: &RelationChange) -> bool {
		Self::category_matches(&self.item_ids, [change.left_item_id, change.right_item_id].into_iter())
			&& self.operation_matches(op_name(&change.op))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriberState {
	Active,
	Frozen,
}

struct Subscriber {
	filter: NotificationFilter,
	state: SubscriberState,
	/// Buffered while frozen; drained on thaw.
	buffer: Vec<MutationRecord>,
	/// Entity ids retained for replay across disconnect (§4.6).
	recording: BTreeSet<EntityId>,
	/// Entity ids the client has already acknowledged.
	replayed: BTreeSet<EntityId>,
	outbound: mpsc::Sender<MutationRecord>,
}

/// Process-wide notification router, one instance per server (§9 "Global
/// singletons" — model as an explicit handle rather than ambient state).
#[derive(Clone)]
pub struct Router {
	subscribers: Arc<RwLock<std::collections::BTreeMap<SessionId, Subscriber>>>,
}

impl Router {
	pub fn new() -> Self {
		Router { subscribers: Arc::new(RwLock::new(std::collections::BTreeMap::new())) }
	}

	pub async fn subscribe(
		&self,
		session_id: SessionId,
		filter: NotificationFilter,
	) -> mpsc::Receiver<MutationRecord> {
		let (tx, rx) = mpsc::channel(256);
		let mut subs = self.subscribers.write().await;
		subs.insert(
			session_id,
			Subscriber {
				filter,
				state: SubscriberState::Active,
				buffer: Vec::new(),
				recording: BTreeSet::new(),
				replayed: BTreeSet::new(),
				outbound: tx,
			},
		);
		rx
	}

	pub async fn unsubscribe(&self, session_id: SessionId) {
		self.subscribers.write().await.remove(&session_id);
	}

	pub async fn set_filter(&self, session_id: SessionId, filter: NotificationFilter) {
		if let Some(sub) = self.subscribers.write().await.get_mut(&session_id) {
			sub.filter = filter;
		}
	}

	pub async fn freeze(&self, session_id: SessionId) {
		if let Some(sub) = self.subscribers.write().await.get_mut(&session_id) {
			sub.state = SubscriberState::Frozen;
		}
	}

	/// Thaws a subscriber, draining whatever was buffered while frozen in
	/// original commit order.
	pub async fn thaw(&self, session_id: SessionId) {
		let mut subs = self.subscribers.write().await;
		if let Some(sub) = subs.get_mut(&session_id) {
			sub.state = SubscriberState::Active;
			let buffered = std::mem::take(&mut sub.buffer);
			for record in buffered {
				let _ = sub.outbound.try_send(record);
			}
		}
	}

	pub async fn record(&self, session_id: SessionId, ids: BTreeSet<EntityId>) {
		if let Some(sub) = self.subscribers.write().await.get_mut(&session_id) {
			sub.recording.extend(ids);
		}
	}

	pub async fn replayed(&self, session_id: SessionId, ids: BTreeSet<EntityId>) {
		if let Some(sub) = self.subscribers.write().await.get_mut(&session_id) {
			for id in &ids {
				sub.recording.remove(id);
			}
			sub.replayed.extend(ids);
		}
	}

	/// Delivers one committed transaction's mutation batch (§4.5/§4.6);
	/// the whole batch is handed to eligible subscribers as one
	/// indivisible group, matching "only one notify call" (§5).
	pub async fn dispatch(&self, batch: &[MutationRecord]) {
		let mut subs = self.subscribers.write().await;
		for sub in subs.values_mut() {
			let matching: Vec<MutationRecord> =
				batch.iter().filter(|record| sub.filter.matches(record)).cloned().collect();
			if matching.is_empty() {
				continue;
			}
			match sub.state {
				SubscriberState::Frozen => sub.buffer.extend(matching),
				SubscriberState::Active => {
					for record in matching {
						let _ = sub.outbound.try_send(record);
					}
				}
			}
		}
	}
}

impl Default for Router {
	fn default() -> Self {
		Router::new()
	}
}


// vim: ts=4
