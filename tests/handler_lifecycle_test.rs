//! End-to-end coverage of the command handlers against a real in-memory
//! store: session login, collection/item lifecycle, tagging, and
//! transaction semantics (spec.md §8 scenarios), driven through
//! `pimd::handler::execute` exactly as `serve.rs` drives it per
//! connection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

use pimd::config::Config;
use pimd::handler::{
	self, Command, CollectionFilter, CreateItemRequest, FetchDepth, FetchScope, HandlerContext, MergeMode, NewCollectionRequest, Response,
};
use pimd::notify::Router;
use pimd::scheduler::Scheduler;
use pimd::scope::{Scope, ScopeContext};
use pimd::session::{ClientCapabilities, Session};
use pimd::store::{CachePolicy, Store};
use pimd::types::{EntityId, ResourceId, TriState};
use pimd::{ResourcePeer, RetrievalCoordinator, RetrievalError};

struct FailingPeer;

#[async_trait]
impl ResourcePeer for FailingPeer {
	async fn retrieve_parts(&self, resource_id: ResourceId, _item_id: EntityId, _part_names: Vec<String>) -> Result<(), RetrievalError> {
		Err(RetrievalError::ResourceFailure { collection_id: 0, resource_id, message: "no peer in tests".to_string() })
	}
}

async fn test_context() -> HandlerContext<FailingPeer> {
	let store = Arc::new(Store::open_in_memory(500).unwrap());
	let (_scheduler, _handle, scheduler_control, _commands) = Scheduler::new(std::time::Duration::from_secs(60));
	HandlerContext {
		store,
		router: Router::new(),
		scheduler: scheduler_control,
		retrieval: Arc::new(RetrievalCoordinator::new(Arc::new(FailingPeer))),
		config: Config { size_threshold_bytes: i64::MAX, ..Config::default() },
	}
}

/// Records every `retrieve_parts` call's part-name list instead of
/// actually fetching anything, so tests can assert on what `fetch_items`
/// decided was missing without standing up a real resource.
struct RecordingPeer {
	calls: std::sync::Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl ResourcePeer for RecordingPeer {
	async fn retrieve_parts(&self, _resource_id: ResourceId, _item_id: EntityId, part_names: Vec<String>) -> Result<(), RetrievalError> {
		self.calls.lock().unwrap().push(part_names);
		Ok(())
	}
}

async fn recording_context() -> (Arc<RecordingPeer>, HandlerContext<RecordingPeer>) {
	let peer = Arc::new(RecordingPeer { calls: std::sync::Mutex::new(Vec::new()) });
	let store = Arc::new(Store::open_in_memory(500).unwrap());
	let (_scheduler, _handle, scheduler_control, _commands) = Scheduler::new(std::time::Duration::from_secs(60));
	let ctx = HandlerContext {
		store,
		router: Router::new(),
		scheduler: scheduler_control,
		retrieval: Arc::new(RetrievalCoordinator::new(peer.clone())),
		config: Config { size_threshold_bytes: i64::MAX, ..Config::default() },
	};
	(peer, ctx)
}

fn authenticated_session() -> Session {
	let mut session = Session::new(1);
	session.login(ClientCapabilities::none());
	session
}

fn new_collection_request(name: &str, resource_id: ResourceId) -> NewCollectionRequest {
	NewCollectionRequest {
		parent_id: 0,
		name: name.to_string(),
		resource_id,
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
	}
}

#[tokio::test]
async fn commands_before_login_are_rejected_except_session_commands() {
	let ctx = test_context().await;
	let mut session = Session::new(1);

	let err = handler::execute(
		Command::FetchCollections { parent_id: None, depth: FetchDepth::AllCollections, filter: CollectionFilter::default(), ancestor_depth: 0 },
		&mut session,
		&ctx,
	)
	.await
	.unwrap_err();
	assert!(err.to_string().to_lowercase().contains("authenticat"));

	// Login, Capability and Idle never require authentication.
	let response = handler::execute(Command::Login { capabilities: ClientCapabilities::none() }, &mut session, &ctx).await.unwrap();
	assert!(matches!(response, Response::Ok));
	assert!(session.is_authenticated());
}

#[tokio::test]
async fn create_collection_then_create_and_fetch_item() {
	let ctx = test_context().await;
	let mut session = authenticated_session();

	let response = handler::execute(Command::CreateCollection(new_collection_request("Inbox", 1)), &mut session, &ctx).await.unwrap();
	let Response::Id(collection_id) = response else { panic!("expected Id response") };

	let create = CreateItemRequest {
		collection_id,
		resource_id: 1,
		mime_type: "message/rfc822".to_string(),
		remote_id: Some("MSG-1".to_string()),
		remote_revision: None,
		gid: None,
		datetime: 0,
		declared_size: 0,
		flags: vec!["\\Seen".to_string()],
		tags: Vec::new(),
		parts: Vec::new(),
		merge_mode: MergeMode::None,
		link_into_virtual: false,
	};
	let response = handler::execute(Command::CreateItem(create), &mut session, &ctx).await.unwrap();
	let Response::Id(item_id) = response else { panic!("expected Id response") };

	let fetch = Command::FetchItems {
		scope: Scope::Uid(pimd::protocol::SequenceSet::single(item_id)),
		context: ScopeContext::none(),
		fetch_scope: FetchScope::default(),
	};
	let response = handler::execute(fetch, &mut session, &ctx).await.unwrap();
	let Response::Items(items) = response else { panic!("expected Items response") };
	assert_eq!(items.len(), 1);
	assert_eq!(items[0].id, item_id);
	assert_eq!(items[0].remote_id.as_deref(), Some("MSG-1"));
}

#[tokio::test]
async fn create_item_with_matching_merge_mode_updates_instead_of_duplicating() {
	let ctx = test_context().await;
	let mut session = authenticated_session();

	let Response::Id(collection_id) =
		handler::execute(Command::CreateCollection(new_collection_request("Inbox", 1)), &mut session, &ctx).await.unwrap()
	else {
		panic!("expected Id response")
	};

	let base = CreateItemRequest {
		collection_id,
		resource_id: 1,
		mime_type: "message/rfc822".to_string(),
		remote_id: Some("MSG-1".to_string()),
		remote_revision: Some("rev-1".to_string()),
		gid: None,
		datetime: 0,
		declared_size: 0,
		flags: Vec::new(),
		tags: Vec::new(),
		parts: Vec::new(),
		merge_mode: MergeMode::None,
		link_into_virtual: false,
	};
	let Response::Id(first_id) = handler::execute(Command::CreateItem(base), &mut session, &ctx).await.unwrap() else {
		panic!("expected Id response")
	};

	let merged = CreateItemRequest {
		collection_id,
		resource_id: 1,
		mime_type: "message/rfc822".to_string(),
		remote_id: Some("MSG-1".to_string()),
		remote_revision: Some("rev-2".to_string()),
		gid: None,
		datetime: 0,
		declared_size: 0,
		flags: Vec::new(),
		tags: Vec::new(),
		parts: Vec::new(),
		merge_mode: MergeMode::Rid,
		link_into_virtual: false,
	};
	let Response::Id(second_id) = handler::execute(Command::CreateItem(merged), &mut session, &ctx).await.unwrap() else {
		panic!("expected Id response")
	};

	assert_eq!(first_id, second_id, "matching RID merge mode should update the existing item rather than create a new one");
}

#[tokio::test]
async fn appending_to_virtual_collection_without_link_flag_fails() {
	let ctx = test_context().await;
	let mut session = authenticated_session();

	let mut req = new_collection_request("Flagged", 1);
	req.is_virtual = true;
	let Response::Id(collection_id) = handler::execute(Command::CreateCollection(req), &mut session, &ctx).await.unwrap() else {
		panic!("expected Id response")
	};

	let create = CreateItemRequest {
		collection_id,
		resource_id: 1,
		mime_type: "message/rfc822".to_string(),
		remote_id: None,
		remote_revision: None,
		gid: None,
		datetime: 0,
		declared_size: 0,
		flags: Vec::new(),
		tags: Vec::new(),
		parts: Vec::new(),
		merge_mode: MergeMode::None,
		link_into_virtual: false,
	};
	let err = handler::execute(Command::CreateItem(create), &mut session, &ctx).await.unwrap_err();
	assert!(err.to_string().to_lowercase().contains("virtual"));
}

#[tokio::test]
async fn explicit_transaction_spans_multiple_commands_and_rolls_back_cleanly() {
	let ctx = test_context().await;
	let mut session = authenticated_session();

	handler::execute(Command::Transaction(pimd::handler::TransactionCommand::Begin), &mut session, &ctx).await.unwrap();
	assert!(session.open_txn.is_some());

	let Response::Id(collection_id) =
		handler::execute(Command::CreateCollection(new_collection_request("Drafts", 1)), &mut session, &ctx).await.unwrap()
	else {
		panic!("expected Id response")
	};

	handler::execute(Command::Transaction(pimd::handler::TransactionCommand::Rollback), &mut session, &ctx).await.unwrap();
	assert!(session.open_txn.is_none());

	let response = handler::execute(
		Command::FetchCollections { parent_id: Some(0), depth: FetchDepth::ParentCollection, filter: CollectionFilter::default(), ancestor_depth: 0 },
		&mut session,
		&ctx,
	)
	.await
	.unwrap();
	let Response::Collections(collections) = response else { panic!("expected Collections response") };
	assert!(
		!collections.iter().any(|c| c.id == collection_id),
		"rolled back transaction must not leave the collection visible"
	);
}

#[tokio::test]
async fn notify_filter_update_does_not_require_an_open_transaction() {
	let ctx = test_context().await;
	let mut session = authenticated_session();

	let response = handler::execute(Command::Notify { filter: pimd::notify::NotificationFilter::everything() }, &mut session, &ctx)
		.await
		.unwrap();
	assert!(matches!(response, Response::Ok));
}

#[tokio::test]
async fn committed_mutation_is_pushed_to_a_subscribed_session() {
	let ctx = test_context().await;
	let mut session = authenticated_session();

	let mut subscriber = ctx.router.subscribe(99, pimd::notify::NotificationFilter::everything()).await;

	let Response::Id(collection_id) =
		handler::execute(Command::CreateCollection(new_collection_request("Inbox", 1)), &mut session, &ctx).await.unwrap()
	else {
		panic!("expected Id response")
	};

	let record = subscriber.recv().await.expect("subscriber should observe the commit");
	let pimd::notify::MutationRecord::Collection(change) = record else { panic!("expected a collection mutation") };
	assert_eq!(change.collection_id, collection_id);
}

/// An item whose resource announced it (declared size, no parts streamed
/// yet — the real on-demand case `reconcile_size_from_parts` exists for)
/// must drive a retrieval for `PLD:DATA` under `FULLPAYLOAD`, not just
/// no-op the way a hardcoded wanted-parts list would once the item
/// already happened to have something named `PLD:DATA`.
#[tokio::test]
async fn fetch_items_full_payload_retrieves_missing_default_payload_part() {
	let (peer, ctx) = recording_context().await;
	let mut session = authenticated_session();

	let Response::Id(collection_id) =
		handler::execute(Command::CreateCollection(new_collection_request("Inbox", 1)), &mut session, &ctx).await.unwrap()
	else {
		panic!("expected Id response")
	};
	let create = CreateItemRequest {
		collection_id,
		resource_id: 1,
		mime_type: "message/rfc822".to_string(),
		remote_id: Some("MSG-1".to_string()),
		remote_revision: None,
		gid: None,
		datetime: 0,
		declared_size: 10,
		flags: Vec::new(),
		tags: Vec::new(),
		parts: Vec::new(),
		merge_mode: MergeMode::None,
		link_into_virtual: false,
	};
	let Response::Id(item_id) = handler::execute(Command::CreateItem(create), &mut session, &ctx).await.unwrap() else {
		panic!("expected Id response")
	};

	let fetch_scope = FetchScope { full_payload: true, ..FetchScope::default() };
	let fetch = Command::FetchItems { scope: Scope::Uid(pimd::protocol::SequenceSet::single(item_id)), context: ScopeContext::none(), fetch_scope };
	handler::execute(fetch, &mut session, &ctx).await.unwrap();

	let calls = peer.calls.lock().unwrap();
	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0], vec!["PLD:DATA".to_string()]);
}

/// `CHECKCACHEDPARTSONLY` must report without ever calling out to the
/// resource, same as `CACHEONLY`.
#[tokio::test]
async fn fetch_items_check_cached_parts_only_never_triggers_retrieval() {
	let (peer, ctx) = recording_context().await;
	let mut session = authenticated_session();

	let Response::Id(collection_id) =
		handler::execute(Command::CreateCollection(new_collection_request("Inbox", 1)), &mut session, &ctx).await.unwrap()
	else {
		panic!("expected Id response")
	};
	let create = CreateItemRequest {
		collection_id,
		resource_id: 1,
		mime_type: "message/rfc822".to_string(),
		remote_id: Some("MSG-1".to_string()),
		remote_revision: None,
		gid: None,
		datetime: 0,
		declared_size: 10,
		flags: Vec::new(),
		tags: Vec::new(),
		parts: Vec::new(),
		merge_mode: MergeMode::None,
		link_into_virtual: false,
	};
	let Response::Id(item_id) = handler::execute(Command::CreateItem(create), &mut session, &ctx).await.unwrap() else {
		panic!("expected Id response")
	};

	let fetch_scope = FetchScope { full_payload: true, check_cached_parts_only: true, ..FetchScope::default() };
	let fetch = Command::FetchItems { scope: Scope::Uid(pimd::protocol::SequenceSet::single(item_id)), context: ScopeContext::none(), fetch_scope };
	handler::execute(fetch, &mut session, &ctx).await.unwrap();

	assert!(peer.calls.lock().unwrap().is_empty());
}

/// A `PLD:<name>` key in the request's parameter list names a specific
/// part to fetch, independent of `FULLPAYLOAD`.
#[tokio::test]
async fn fetch_items_honors_explicitly_requested_part_names() {
	let (peer, ctx) = recording_context().await;
	let mut session = authenticated_session();

	let Response::Id(collection_id) =
		handler::execute(Command::CreateCollection(new_collection_request("Inbox", 1)), &mut session, &ctx).await.unwrap()
	else {
		panic!("expected Id response")
	};
	let create = CreateItemRequest {
		collection_id,
		resource_id: 1,
		mime_type: "message/rfc822".to_string(),
		remote_id: Some("MSG-1".to_string()),
		remote_revision: None,
		gid: None,
		datetime: 0,
		declared_size: 0,
		flags: Vec::new(),
		tags: Vec::new(),
		parts: Vec::new(),
		merge_mode: MergeMode::None,
		link_into_virtual: false,
	};
	let Response::Id(item_id) = handler::execute(Command::CreateItem(create), &mut session, &ctx).await.unwrap() else {
		panic!("expected Id response")
	};

	let fetch_scope = FetchScope { requested_parts: vec!["PLD:ATTACHMENT1".to_string()], ..FetchScope::default() };
	let fetch = Command::FetchItems { scope: Scope::Uid(pimd::protocol::SequenceSet::single(item_id)), context: ScopeContext::none(), fetch_scope };
	handler::execute(fetch, &mut session, &ctx).await.unwrap();

	let calls = peer.calls.lock().unwrap();
	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0], vec!["PLD:ATTACHMENT1".to_string()]);
}

/// `CHANGEDSINCE` excludes items whose `mtime` predates the threshold.
#[tokio::test]
async fn fetch_items_changed_since_filters_out_unchanged_items() {
	let ctx = test_context().await;
	let mut session = authenticated_session();

	let Response::Id(collection_id) =
		handler::execute(Command::CreateCollection(new_collection_request("Inbox", 1)), &mut session, &ctx).await.unwrap()
	else {
		panic!("expected Id response")
	};
	let create = CreateItemRequest {
		collection_id,
		resource_id: 1,
		mime_type: "message/rfc822".to_string(),
		remote_id: Some("MSG-1".to_string()),
		remote_revision: None,
		gid: None,
		datetime: 0,
		declared_size: 0,
		flags: Vec::new(),
		tags: Vec::new(),
		parts: Vec::new(),
		merge_mode: MergeMode::None,
		link_into_virtual: false,
	};
	let Response::Id(item_id) = handler::execute(Command::CreateItem(create), &mut session, &ctx).await.unwrap() else {
		panic!("expected Id response")
	};

	let fetch_scope = FetchScope { changed_since: Some(i64::MAX), ..FetchScope::default() };
	let fetch = Command::FetchItems { scope: Scope::Uid(pimd::protocol::SequenceSet::single(item_id)), context: ScopeContext::none(), fetch_scope };
	let Response::Items(items) = handler::execute(fetch, &mut session, &ctx).await.unwrap() else { panic!("expected Items response") };
	assert!(items.is_empty(), "item with mtime below the threshold must be excluded");
}

// vim: ts=4
