//! Command handlers (C7): a single tagged `Command` enum dispatched
//! through one `execute()` function, per spec.md §9 design note ("deep
//! handler hierarchies... model as a single execute function over a
//! tagged variant") rather than a per-command trait hierarchy.
//!
//! Grounded in the teacher's single `SyncCommand`/`apply_strategy`
//! dispatch shape (`strategies.rs`), generalized from sync strategies to
//! the full PIM command set.

mod collection;
mod item;
mod relation;
mod search;
mod session;
mod tag;
mod transaction;

pub use collection::{CollectionFilter, ColCopyTarget, CollectionPatchRequest, FetchDepth, NewCollectionRequest};
pub use item::{CreateItemRequest, FetchScope, ItemPatchRequest, MergeMode};
pub use search::SearchQuery;
pub use transaction::TransactionCommand;

use std::sync::Arc;

use crate::config::Config;
use crate::notify::{NotificationFilter, Router};
use crate::retrieval::{ResourcePeer, RetrievalCoordinator};
use crate::scheduler::SchedulerControl;
use crate::scope::{Scope, ScopeContext};
use crate::session::{ClientCapabilities, Session};
use crate::store::{Store, Transaction};
use crate::types::{EntityId, ResourceId, SessionId};
use crate::{HandlerError, PimError};

/// Everything a handler needs besides the session it's running against.
/// One instance is shared (behind an `Arc` at the call site) across every
/// session a server accepts (§9 "global singletons... an explicit
/// handle").
pub struct HandlerContext<P: ResourcePeer> {
	pub store: Arc<Store>,
	pub router: Router,
	pub scheduler: SchedulerControl,
	pub retrieval: Arc<RetrievalCoordinator<P>>,
	pub config: Config,
}

/// The full command vocabulary (§4.7), minus the wire parsing layer —
/// by the time a `Command` reaches `execute`, scopes, part streams, and
/// parameter lists have already been decoded from the wire frame.
pub enum Command {
	Login { capabilities: ClientCapabilities },
	Logout,
	ResSelect { resource_id: ResourceId },
	Capability,

	CreateItem(CreateItemRequest),
	ModifyItem { scope: Scope, context: ScopeContext, patch: ItemPatchRequest },
	AppendFlag { scope: Scope, context: ScopeContext, flag_names: Vec<String>, observable: bool },
	RemoveFlag { scope: Scope, context: ScopeContext, flag_names: Vec<String>, observable: bool },
	ModifyTags { scope: Scope, context: ScopeContext, add: Vec<EntityId>, remove: Vec<EntityId> },
	MoveItems { scope: Scope, context: ScopeContext, dest_parent: EntityId },
	LinkItems { scope: Scope, context: ScopeContext, collection_id: EntityId },
	UnlinkItems { scope: Scope, context: ScopeContext, collection_id: EntityId },
	Expunge { scope: Scope, context: ScopeContext },
	FetchItems { scope: Scope, context: ScopeContext, fetch_scope: FetchScope },

	CreateCollection(NewCollectionRequest),
	ModifyCollection { id: EntityId, patch: CollectionPatchRequest },
	MoveCollection { id: EntityId, new_parent_id: EntityId },
	DeleteCollection { id: EntityId },
	ColCopy { source: ColCopyTarget, dest_parent_id: EntityId },
	FetchCollections { parent_id: Option<EntityId>, depth: FetchDepth, filter: CollectionFilter, ancestor_depth: u32 },
	FetchStats { collection_id: EntityId },
	Subscribe { collection_id: EntityId },
	Unsubscribe { collection_id: EntityId },

	TagAppend { gid: String, type_name: String, parent_id: Option<EntityId>, resource_id: ResourceId, remote_id: String },
	TagStore { tag_id: EntityId, attributes: std::collections::BTreeMap<String, Vec<u8>> },
	TagFetch { item_id: Option<EntityId> },
	TagRemove { tag_id: EntityId, resource_id: ResourceId },

	RelationStore { left_item_id: EntityId, right_item_id: EntityId, type_id: EntityId, remote_id: Option<String> },
	RelationRemove { left_item_id: EntityId, right_item_id: EntityId, type_id: EntityId },
	RelationFetch { left_item_id: Option<EntityId>, right_item_id: Option<EntityId>, type_id: Option<EntityId> },

	Search { query: SearchQuery },
	SearchPersistent { parent_id: EntityId, name: String, query: SearchQuery },
	SearchPersistentModify { collection_id: EntityId, query: SearchQuery },

	Idle,
	Notify { filter: NotificationFilter },

	Transaction(transaction::TransactionCommand),
}

/// Handler responses, loosely typed per operation (§9: command handlers
/// don't need a deep response hierarchy either, just enough shape for
/// the wire encoder to render an untagged response).
#[derive(Debug, Clone)]
pub enum Response {
	Ok,
	Id(EntityId),
	Ids(Vec<EntityId>),
	Item(crate::store::Item),
	Items(Vec<crate::store::Item>),
	Collection(crate::store::Collection),
	Collections(Vec<crate::store::Collection>),
	Tag(crate::store::Tag),
	Tags(Vec<crate::store::Tag>),
	Relations(Vec<crate::store::Relation>),
	Capabilities(ClientCapabilities),
	Stats(crate::store::CollectionStats),
}

/// Dispatches one command against `session`, running it inside whatever
/// transaction is currently open on the session (§4.7 TransactionCommand)
/// or, absent one, a fresh one-shot transaction committed before
/// returning (§4.3, §5: "single indivisible notification group per
/// commit").
pub async fn execute<P: ResourcePeer>(
	cmd: Command,
	session: &mut Session,
	ctx: &HandlerContext<P>,
) -> Result<Response, PimError> {
	if let Command::Transaction(tc) = cmd {
		return transaction::handle(tc, session, ctx).await;
	}

	let was_idling = session.idle_state == crate::session::IdleState::Idling;
	session.exit_idle();
	if was_idling && !matches!(cmd, Command::Idle) {
		ctx.router.thaw(session.id).await;
	}

	// Pure session-state commands never touch the store, so they run
	// outside any transaction and mutate `session` directly rather than
	// going through `dispatch`'s `Transaction`-threading path.
	match cmd {
		Command::Login { capabilities } => return Ok(session::login(session, capabilities)),
		Command::Logout => return Ok(session::logout(session)),
		Command::ResSelect { resource_id } => return session::res_select(session, resource_id),
		Command::Capability => return Ok(session::capability(session)),
		Command::Idle => {
			ctx.router.freeze(session.id).await;
			return Ok(session::idle(session));
		}
		Command::Notify { filter } => {
			ctx.router.set_filter(session.id, filter).await;
			return Ok(Response::Ok);
		}
		_ => {}
	}

	if !session.is_authenticated() {
		return Err(HandlerError::validation("not authenticated").into());
	}

	if let Some(txn) = session.open_txn.as_mut() {
		return dispatch(cmd, session.id, session.resource_context, txn, ctx).await;
	}

	let mut txn = ctx.store.begin(session.id).await;
	match dispatch(cmd, session.id, session.resource_context, &mut txn, ctx).await {
		Ok(response) => {
			let batch = ctx.store.commit(txn).await?;
			ctx.router.dispatch(&batch).await;
			Ok(response)
		}
		Err(err) => {
			txn.rollback();
			Err(err)
		}
	}
}

async fn dispatch<P: ResourcePeer>(
	cmd: Command,
	session_id: SessionId,
	resource: Option<ResourceId>,
	txn: &mut Transaction,
	ctx: &HandlerContext<P>,
) -> Result<Response, PimError> {
	match cmd {
		Command::Login { .. } | Command::Logout | Command::ResSelect { .. } | Command::Capability | Command::Idle | Command::Notify { .. } => {
			unreachable!("session-state commands are handled in execute() before dispatch")
		}

		Command::CreateItem(req) => item::create_item(txn, session_id, req).await,
		Command::ModifyItem { scope, context, patch } => {
			item::modify_item(txn, session_id, resource, scope, context, patch)
		}
		Command::AppendFlag { scope, context, flag_names, observable } => {
			item::append_flag(txn, session_id, resource, scope, context, flag_names, observable)
		}
		Command::RemoveFlag { scope, context, flag_names, observable } => {
			item::remove_flag(txn, session_id, resource, scope, context, flag_names, observable)
		}
		Command::ModifyTags { scope, context, add, remove } => {
			item::modify_tags(txn, session_id, resource, scope, context, add, remove)
		}
		Command::MoveItems { scope, context, dest_parent } => {
			item::move_items(txn, session_id, resource, scope, context, dest_parent)
		}
		Command::LinkItems { scope, context, collection_id } => {
			item::link_items(txn, session_id, resource, scope, context, collection_id)
		}
		Command::UnlinkItems { scope, context, collection_id } => {
			item::unlink_items(txn, session_id, resource, scope, context, collection_id)
		}
		Command::Expunge { scope, context } => item::expunge(txn, session_id, resource, scope, context),
		Command::FetchItems { scope, context, fetch_scope } => {
			item::fetch_items(txn, resource, scope, context, fetch_scope, ctx).await
		}

		Command::CreateCollection(req) => collection::create_collection(txn, session_id, req),
		Command::ModifyCollection { id, patch } => collection::modify_collection(txn, session_id, &ctx.scheduler, id, patch).await,
		Command::MoveCollection { id, new_parent_id } => collection::move_collection(txn, session_id, id, new_parent_id),
		Command::DeleteCollection { id } => collection::delete_collection(txn, session_id, &ctx.scheduler, id).await,
		Command::ColCopy { source, dest_parent_id } => collection::col_copy(txn, session_id, source, dest_parent_id),
		Command::FetchCollections { parent_id, depth, filter, ancestor_depth } => {
			collection::fetch_collections(txn, parent_id, depth, filter, ancestor_depth)
		}
		Command::FetchStats { collection_id } => collection::fetch_stats(txn, collection_id),
		Command::Subscribe { collection_id } => collection::subscribe(txn, session_id, collection_id),
		Command::Unsubscribe { collection_id } => collection::unsubscribe(txn, session_id, collection_id),

		Command::TagAppend { gid, type_name, parent_id, resource_id, remote_id } => {
			tag::tag_append(txn, session_id, gid, type_name, parent_id, resource_id, remote_id)
		}
		Command::TagStore { tag_id, attributes } => tag::tag_store(txn, tag_id, attributes),
		Command::TagFetch { item_id } => tag::tag_fetch(txn, item_id),
		Command::TagRemove { tag_id, resource_id } => tag::tag_remove(txn, session_id, tag_id, resource_id),

		Command::RelationStore { left_item_id, right_item_id, type_id, remote_id } => {
			relation::relation_store(txn, session_id, left_item_id, right_item_id, type_id, remote_id)
		}
		Command::RelationRemove { left_item_id, right_item_id, type_id } => {
			relation::relation_remove(txn, session_id, left_item_id, right_item_id, type_id)
		}
		Command::RelationFetch { left_item_id, right_item_id, type_id } => {
			relation::relation_fetch(txn, left_item_id, right_item_id, type_id)
		}

		Command::Search { query } => search::search(txn, resource, &query),
		Command::SearchPersistent { parent_id, name, query } => {
			search::search_persistent(txn, session_id, parent_id, name, query)
		}
		Command::SearchPersistentModify { collection_id, query } => {
			search::search_persistent_modify(txn, collection_id, query)
		}

		Command::Transaction(_) => unreachable!("handled in execute() before dispatch"),
	}
}

/// Resolves a scope to entity ids against the transaction's `ScopeLookup`
/// impl, mapping `ScopeError` into `PimError` (§4.2).
pub(super) fn resolve_scope(
	txn: &Transaction,
	scope: &Scope,
	resource: Option<ResourceId>,
	context: &ScopeContext,
) -> Result<Vec<EntityId>, PimError> {
	Ok(scope.resolve(txn, resource, context)?)
}

// vim: ts=4
