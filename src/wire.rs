//! Bridges the wire codec (C1) to the command handler (C7): parses a
//! tagged client frame into a `handler::Command`, and renders a
//! `handler::Response` back out as untagged lines.
//!
//! This is deliberately the one place in the crate that imports both
//! `protocol` and `handler` — everything else keeps to the
//! one-directional module graph (§9), but the wire grammar itself is
//! server wiring, not part of either layer.

use std::collections::{BTreeMap, BTreeSet};

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::handler::{
	ColCopyTarget, CollectionFilter, Command, CollectionPatchRequest, CreateItemRequest, FetchDepth, FetchScope,
	ItemPatchRequest, MergeMode, NewCollectionRequest, Response, SearchQuery, TransactionCommand,
};
use crate::notify::NotificationFilter;
use crate::protocol::{stream_part, FrameReader, FrameWriter, PartName, PartPayload, WireError};
use crate::scope::{Scope, ScopeContext};
use crate::session::ClientCapabilities;
use crate::store::entities::CachePolicy;
use crate::store::ExternalPayloadStore;
use crate::types::{EntityId, ResourceId, TriState};
use crate::PimError;

/// Reads one full tagged command frame and parses it into a `Command`.
/// `writer` is the connection's continuation sink (used for `{N}\n`
/// literal acknowledgements mid-frame); it is not the response writer.
pub async fn read_command<R, W>(
	reader: &mut FrameReader<R>,
	writer: &mut W,
	size_threshold_bytes: i64,
	external_store: &dyn ExternalPayloadStore,
) -> Result<(String, Command), PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let (tag, command) = reader.read_tag_and_command().await?;
	let cmd = match command.as_str() {
		"LOGIN" => Command::Login { capabilities: read_capabilities(reader).await? },
		"LOGOUT" => Command::Logout,
		"RESSELECT" => Command::ResSelect { resource_id: reader.read_number().await? },
		"CAPABILITY" => Command::Capability,
		"IDLE" => Command::Idle,
		"NOTIFY" => Command::Notify { filter: read_notification_filter(reader).await? },

		"BEGIN" => Command::Transaction(TransactionCommand::Begin),
		"COMMIT" => Command::Transaction(TransactionCommand::Commit),
		"ROLLBACK" => Command::Transaction(TransactionCommand::Rollback),

		"CREATEITEM" => {
			Command::CreateItem(read_create_item_request(reader, writer, size_threshold_bytes, external_store).await?)
		}
		"MODIFYITEM" => {
			let scope = read_scope(reader).await?;
			let context = read_context(reader).await?;
			let patch = read_item_patch(reader, writer).await?;
			Command::ModifyItem { scope, context, patch }
		}
		"APPENDFLAG" => {
			let scope = read_scope(reader).await?;
			let context = read_context(reader).await?;
			let flag_names = read_flag_list(reader).await?;
			let observable = read_bool(reader).await?;
			Command::AppendFlag { scope, context, flag_names, observable }
		}
		"REMOVEFLAG" => {
			let scope = read_scope(reader).await?;
			let context = read_context(reader).await?;
			let flag_names = read_flag_list(reader).await?;
			let observable = read_bool(reader).await?;
			Command::RemoveFlag { scope, context, flag_names, observable }
		}
		"MODIFYTAGS" => {
			let scope = read_scope(reader).await?;
			let context = read_context(reader).await?;
			let (add, remove) = read_tag_diff(reader).await?;
			Command::ModifyTags { scope, context, add, remove }
		}
		"MOVEITEMS" => {
			let scope = read_scope(reader).await?;
			let context = read_context(reader).await?;
			let dest_parent = reader.read_number().await?;
			Command::MoveItems { scope, context, dest_parent }
		}
		"LINKITEMS" => {
			let scope = read_scope(reader).await?;
			let context = read_context(reader).await?;
			let collection_id = reader.read_number().await?;
			Command::LinkItems { scope, context, collection_id }
		}
		"UNLINKITEMS" => {
			let scope = read_scope(reader).await?;
			let context = read_context(reader).await?;
			let collection_id = reader.read_number().await?;
			Command::UnlinkItems { scope, context, collection_id }
		}
		"EXPUNGE" => {
			let scope = read_scope(reader).await?;
			let context = read_context(reader).await?;
			Command::Expunge { scope, context }
		}
		"FETCHITEMS" => {
			let scope = read_scope(reader).await?;
			let context = read_context(reader).await?;
			let fetch_scope = read_fetch_scope(reader).await?;
			Command::FetchItems { scope, context, fetch_scope }
		}

		"CREATECOLLECTION" => Command::CreateCollection(read_new_collection_request(reader, writer).await?),
		"MODIFYCOLLECTION" => {
			let id = reader.read_number().await?;
			let patch = read_collection_patch(reader, writer).await?;
			Command::ModifyCollection { id, patch }
		}
		"MOVECOLLECTION" => {
			let id = reader.read_number().await?;
			let new_parent_id = reader.read_number().await?;
			Command::MoveCollection { id, new_parent_id }
		}
		"DELETECOLLECTION" => Command::DeleteCollection { id: reader.read_number().await? },
		"COLCOPY" => {
			let kind = reader.read_atom().await?.to_ascii_uppercase();
			let id = reader.read_number().await?;
			let dest_parent_id = reader.read_number().await?;
			let source = match kind.as_str() {
				"ITEM" => ColCopyTarget::Item(id),
				"COLLECTION" => ColCopyTarget::Collection(id),
				other => return Err(unexpected("COLCOPY target", other)),
			};
			Command::ColCopy { source, dest_parent_id }
		}
		"FETCHCOLLECTIONS" => {
			let parent_id = read_opt_number(reader, writer).await?;
			let depth = read_fetch_depth(reader).await?;
			let filter = read_collection_filter(reader).await?;
			let ancestor_depth = reader.read_number().await? as u32;
			Command::FetchCollections { parent_id, depth, filter, ancestor_depth }
		}
		"FETCHSTATS" => Command::FetchStats { collection_id: reader.read_number().await? },
		"SUBSCRIBE" => Command::Subscribe { collection_id: reader.read_number().await? },
		"UNSUBSCRIBE" => Command::Unsubscribe { collection_id: reader.read_number().await? },

		"TAGAPPEND" => {
			let gid = read_required_string(reader, writer).await?;
			let type_name = read_required_string(reader, writer).await?;
			let parent_id = read_opt_number(reader, writer).await?;
			let resource_id: ResourceId = reader.read_number().await?;
			let remote_id = read_required_string(reader, writer).await?;
			Command::TagAppend { gid, type_name, parent_id, resource_id, remote_id }
		}
		"TAGSTORE" => {
			let tag_id = reader.read_number().await?;
			let attributes = read_attributes(reader, writer).await?;
			Command::TagStore { tag_id, attributes }
		}
		"TAGFETCH" => Command::TagFetch { item_id: read_opt_number(reader, writer).await? },
		"TAGREMOVE" => {
			let tag_id = reader.read_number().await?;
			let resource_id = reader.read_number().await?;
			Command::TagRemove { tag_id, resource_id }
		}

		"RELATIONSTORE" => {
			let left_item_id = reader.read_number().await?;
			let right_item_id = reader.read_number().await?;
			let type_id = reader.read_number().await?;
			let remote_id = reader.read_string(writer).await?;
			Command::RelationStore { left_item_id, right_item_id, type_id, remote_id }
		}
		"RELATIONREMOVE" => {
			let left_item_id = reader.read_number().await?;
			let right_item_id = reader.read_number().await?;
			let type_id = reader.read_number().await?;
			Command::RelationRemove { left_item_id, right_item_id, type_id }
		}
		"RELATIONFETCH" => {
			let left_item_id = read_opt_number(reader, writer).await?;
			let right_item_id = read_opt_number(reader, writer).await?;
			let type_id = read_opt_number(reader, writer).await?;
			Command::RelationFetch { left_item_id, right_item_id, type_id }
		}

		"SEARCH" => Command::Search { query: read_search_query(reader, writer).await? },
		"SEARCHPERSISTENT" => {
			let parent_id = reader.read_number().await?;
			let name = read_required_string(reader, writer).await?;
			let query = read_search_query(reader, writer).await?;
			Command::SearchPersistent { parent_id, name, query }
		}
		"SEARCHPERSISTENTMODIFY" => {
			let collection_id = reader.read_number().await?;
			let query = read_search_query(reader, writer).await?;
			Command::SearchPersistentModify { collection_id, query }
		}

		other => return Err(unexpected("command", other)),
	};
	Ok((tag, cmd))
}

fn unexpected(what: &str, got: &str) -> PimError {
	WireError::MalformedFrame(format!("unknown {} '{}'", what, got)).into()
}

async fn read_bool<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<bool, PimError> {
	match reader.read_atom().await?.to_ascii_lowercase().as_str() {
		"true" => Ok(true),
		"false" => Ok(false),
		other => Err(WireError::MalformedFrame(format!("expected boolean, got '{}'", other)).into()),
	}
}

async fn read_tristate<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<TriState, PimError> {
	match reader.read_atom().await?.to_ascii_uppercase().as_str() {
		"TRUE" => Ok(TriState::True),
		"FALSE" => Ok(TriState::False),
		"UNDEFINED" => Ok(TriState::Undefined),
		other => Err(unexpected("tristate", other)),
	}
}

async fn read_required_string<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<String, PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	reader
		.read_string(writer)
		.await?
		.ok_or_else(|| WireError::MalformedFrame("expected string, got NIL".to_string()).into())
}

async fn read_opt_number<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<Option<EntityId>, PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	match reader.read_string(writer).await? {
		None => Ok(None),
		Some(s) => s.parse().map(Some).map_err(|_| WireError::MalformedFrame(format!("expected number, got '{}'", s)).into()),
	}
}

async fn read_atom_list<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<Vec<String>, PimError> {
	let mut out = Vec::new();
	while !reader.at_list_end().await? {
		out.push(reader.read_atom().await?);
	}
	Ok(out)
}

async fn read_flag_list<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<Vec<String>, PimError> {
	reader.begin_list().await?;
	let flags = read_atom_list(reader).await?;
	reader.end_list().await?;
	Ok(flags)
}

async fn read_id_list<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<Vec<EntityId>, PimError> {
	reader.begin_list().await?;
	let mut out = Vec::new();
	while !reader.at_list_end().await? {
		out.push(reader.read_number().await?);
	}
	reader.end_list().await?;
	Ok(out)
}

async fn read_tag_diff<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<(Vec<EntityId>, Vec<EntityId>), PimError> {
	reader.begin_list().await?;
	let mut add = Vec::new();
	let mut remove = Vec::new();
	while !reader.at_list_end().await? {
		match reader.read_atom().await?.to_ascii_uppercase().as_str() {
			"ADD" => add = read_id_list(reader).await?,
			"REMOVE" => remove = read_id_list(reader).await?,
			other => return Err(unexpected("MODIFYTAGS key", other)),
		}
	}
	reader.end_list().await?;
	Ok((add, remove))
}

async fn read_attributes<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<BTreeMap<String, Vec<u8>>, PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	reader.begin_list().await?;
	let mut attrs = BTreeMap::new();
	while !reader.at_list_end().await? {
		let name = reader.read_atom().await?;
		let value = reader.read_string(writer).await?.unwrap_or_default();
		attrs.insert(name, value.into_bytes());
	}
	reader.end_list().await?;
	Ok(attrs)
}

async fn read_capabilities<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<ClientCapabilities, PimError> {
	reader.begin_list().await?;
	let mut caps = ClientCapabilities::none();
	while !reader.at_list_end().await? {
		match reader.read_atom().await?.to_ascii_uppercase().as_str() {
			"NOTIFICATIONPROTOCOLV2" => caps.notification_protocol_v2 = true,
			"NOPAYLOADPATH" => caps.no_payload_path = true,
			"SERVERSIDESEARCH" => caps.server_side_search = true,
			"STREAMINGAPPEND" => caps.streaming_append = true,
			other => return Err(unexpected("capability", other)),
		}
	}
	reader.end_list().await?;
	Ok(caps)
}

async fn read_notification_filter<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<NotificationFilter, PimError> {
	reader.begin_list().await?;
	let mut filter = NotificationFilter::everything();
	while !reader.at_list_end().await? {
		let key = reader.read_atom().await?.to_ascii_uppercase();
		match key.as_str() {
			"ITEMS" => filter.item_ids.extend(read_id_list(reader).await?),
			"COLLECTIONS" => filter.collection_ids.extend(read_id_list(reader).await?),
			"MIMETYPES" => filter.mime_types.extend(read_id_list(reader).await?),
			"RESOURCES" => filter.resources.extend(read_id_list(reader).await?),
			"TAGS" => filter.tag_ids.extend(read_id_list(reader).await?),
			"IGNORESESSIONS" => filter.ignored_sessions.extend(read_id_list(reader).await?.into_iter().map(|id| id as u64)),
			"OPERATIONS" => {
				reader.begin_list().await?;
				filter.operations.extend(read_atom_list(reader).await?.into_iter().map(|op| op.to_ascii_uppercase()));
				reader.end_list().await?;
			}
			other => return Err(unexpected("NOTIFY key", other)),
		}
	}
	reader.end_list().await?;
	Ok(filter)
}

async fn read_scope<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<Scope, PimError> {
	reader.begin_list().await?;
	let kind = reader.read_atom().await?.to_ascii_uppercase();
	let scope = match kind.as_str() {
		"UID" => Scope::Uid(reader.read_sequence_set().await?),
		"RID" => Scope::Rid(read_atom_list(reader).await?),
		"HRID" => Scope::HierarchicalRid(read_atom_list(reader).await?),
		"GID" => Scope::Gid(read_atom_list(reader).await?),
		other => return Err(unexpected("scope kind", other)),
	};
	reader.end_list().await?;
	Ok(scope)
}

/// `()` means no restriction; `(IN n)` restricts to a collection, `(TAG n)`
/// to a tag (§4.2).
async fn read_context<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<ScopeContext, PimError> {
	reader.begin_list().await?;
	let mut context = ScopeContext::none();
	while !reader.at_list_end().await? {
		match reader.read_atom().await?.to_ascii_uppercase().as_str() {
			"IN" => context.collection_id = Some(reader.read_number().await?),
			"TAG" => context.tag_id = Some(reader.read_number().await?),
			other => return Err(unexpected("context key", other)),
		}
	}
	reader.end_list().await?;
	Ok(context)
}

async fn read_merge_mode<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<MergeMode, PimError> {
	match reader.read_atom().await?.to_ascii_uppercase().as_str() {
		"NONE" => Ok(MergeMode::None),
		"RID" => Ok(MergeMode::Rid),
		"GID" => Ok(MergeMode::Gid),
		"RIDORGID" => Ok(MergeMode::RidOrGid),
		other => Err(unexpected("merge mode", other)),
	}
}

async fn read_parts<R, W>(
	reader: &mut FrameReader<R>,
	writer: &mut W,
	size_threshold_bytes: i64,
	external_store: &dyn ExternalPayloadStore,
) -> Result<Vec<(PartName, PartPayload, i64)>, PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	reader.begin_list().await?;
	let mut parts = Vec::new();
	while !reader.at_list_end().await? {
		let streamed = stream_part(reader, writer, size_threshold_bytes, |name, bytes| async move {
			external_store.store(&name.full_name(), &bytes).await
		})
		.await?;
		parts.push((streamed.part_name, streamed.payload, streamed.version));
	}
	reader.end_list().await?;
	Ok(parts)
}

async fn read_create_item_request<R, W>(
	reader: &mut FrameReader<R>,
	writer: &mut W,
	size_threshold_bytes: i64,
	external_store: &dyn ExternalPayloadStore,
) -> Result<CreateItemRequest, PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let collection_id = reader.read_number().await?;
	let resource_id = reader.read_number().await?;
	let mime_type = read_required_string(reader, writer).await?;
	let remote_id = reader.read_string(writer).await?;
	let remote_revision = reader.read_string(writer).await?;
	let gid = reader.read_string(writer).await?;
	let datetime = reader.read_number().await?;
	let declared_size = reader.read_number().await?;
	let flags = read_flag_list(reader).await?;
	let tags = read_id_list(reader).await?;
	let parts = read_parts(reader, writer, size_threshold_bytes, external_store).await?;
	let merge_mode = read_merge_mode(reader).await?;
	let link_into_virtual = read_bool(reader).await?;
	Ok(CreateItemRequest {
		collection_id,
		resource_id,
		mime_type,
		remote_id,
		remote_revision,
		gid,
		datetime,
		declared_size,
		flags,
		tags,
		parts,
		merge_mode,
		link_into_virtual,
	})
}

async fn read_item_patch<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<ItemPatchRequest, PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	reader.begin_list().await?;
	let mut patch = ItemPatchRequest::default();
	while !reader.at_list_end().await? {
		match reader.read_atom().await?.to_ascii_uppercase().as_str() {
			"REMOTEID" => patch.remote_id = reader.read_string(writer).await?,
			"REMOTEREVISION" => patch.remote_revision = reader.read_string(writer).await?,
			"GID" => patch.gid = reader.read_string(writer).await?,
			"SIZE" => patch.size = Some(reader.read_number().await?),
			other => return Err(unexpected("MODIFYITEM key", other)),
		}
	}
	reader.end_list().await?;
	Ok(patch)
}

async fn read_cache_policy<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<CachePolicy, PimError> {
	reader.begin_list().await?;
	let mut policy = CachePolicy::default();
	while !reader.at_list_end().await? {
		match reader.read_atom().await?.to_ascii_uppercase().as_str() {
			"INHERIT" => policy.inherit = read_bool(reader).await?,
			"CHECKINTERVAL" => policy.check_interval_minutes = reader.read_number().await?,
			"CACHETIMEOUT" => policy.cache_timeout_minutes = reader.read_number().await?,
			"SYNCONDEMAND" => policy.sync_on_demand = read_bool(reader).await?,
			"LOCALPARTS" => {
				reader.begin_list().await?;
				policy.local_parts = read_atom_list(reader).await?.into_iter().collect::<BTreeSet<_>>();
				reader.end_list().await?;
			}
			other => return Err(unexpected("CACHEPOLICY key", other)),
		}
	}
	reader.end_list().await?;
	Ok(policy)
}

async fn read_new_collection_request<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<NewCollectionRequest, PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let parent_id = reader.read_number().await?;
	let name = read_required_string(reader, writer).await?;
	let resource_id = reader.read_number().await?;
	let remote_id = reader.read_string(writer).await?;
	let remote_revision = reader.read_string(writer).await?;
	let mime_types = read_id_list(reader).await?.into_iter().collect();
	let cache_policy = read_cache_policy(reader).await?;
	let enabled = read_bool(reader).await?;
	let sync_pref = read_tristate(reader).await?;
	let display_pref = read_tristate(reader).await?;
	let index_pref = read_tristate(reader).await?;
	let is_virtual = read_bool(reader).await?;
	let attributes = read_attributes(reader, writer).await?;
	Ok(NewCollectionRequest {
		parent_id,
		name,
		resource_id,
		remote_id,
		remote_revision,
		mime_types,
		cache_policy,
		enabled,
		sync_pref,
		display_pref,
		index_pref,
		is_virtual,
		attributes,
	})
}

async fn read_collection_patch<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<CollectionPatchRequest, PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	reader.begin_list().await?;
	let mut patch = CollectionPatchRequest::default();
	while !reader.at_list_end().await? {
		match reader.read_atom().await?.to_ascii_uppercase().as_str() {
			"NAME" => patch.name = Some(read_required_string(reader, writer).await?),
			"PARENT" => patch.parent_id = Some(reader.read_number().await?),
			"MIMETYPES" => patch.mime_types = Some(read_id_list(reader).await?.into_iter().collect()),
			"CACHEPOLICY" => patch.cache_policy = Some(read_cache_policy(reader).await?),
			"ENABLED" => patch.enabled = Some(read_bool(reader).await?),
			"SYNCPREF" => patch.sync_pref = Some(read_tristate(reader).await?),
			"DISPLAYPREF" => patch.display_pref = Some(read_tristate(reader).await?),
			"INDEXPREF" => patch.index_pref = Some(read_tristate(reader).await?),
			"REMOTEID" => patch.remote_id = reader.read_string(writer).await?,
			"REMOTEREVISION" => patch.remote_revision = reader.read_string(writer).await?,
			"ATTRIBUTES" => patch.attributes = Some(read_attributes(reader, writer).await?),
			other => return Err(unexpected("MODIFYCOLLECTION key", other)),
		}
	}
	reader.end_list().await?;
	Ok(patch)
}

/// `BASE` fetches only the named collection, `PARENT` its immediate
/// children, `ALL` its full descendant tree (§4.7).
async fn read_fetch_depth<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<FetchDepth, PimError> {
	match reader.read_atom().await?.to_ascii_uppercase().as_str() {
		"BASE" => Ok(FetchDepth::BaseCollection),
		"PARENT" => Ok(FetchDepth::ParentCollection),
		"ALL" => Ok(FetchDepth::AllCollections),
		other => Err(unexpected("FETCHCOLLECTIONS depth", other)),
	}
}

async fn read_collection_filter<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<CollectionFilter, PimError> {
	reader.begin_list().await?;
	let mut filter = CollectionFilter::default();
	while !reader.at_list_end().await? {
		match reader.read_atom().await?.to_ascii_uppercase().as_str() {
			"MIMETYPES" => filter.mime_types = read_id_list(reader).await?.into_iter().collect(),
			"RESOURCE" => filter.resource_id = Some(reader.read_number().await?),
			"ENABLED" => filter.enabled = Some(read_bool(reader).await?),
			"SYNCPREF" => filter.sync_pref = Some(read_tristate(reader).await?),
			"DISPLAYPREF" => filter.display_pref = Some(read_tristate(reader).await?),
			"INDEXPREF" => filter.index_pref = Some(read_tristate(reader).await?),
			other => return Err(unexpected("FETCHCOLLECTIONS filter key", other)),
		}
	}
	reader.end_list().await?;
	Ok(filter)
}

async fn read_fetch_scope<R: AsyncBufRead + Unpin>(reader: &mut FrameReader<R>) -> Result<FetchScope, PimError> {
	reader.begin_list().await?;
	let mut scope = FetchScope::default();
	while !reader.at_list_end().await? {
		match reader.read_atom().await?.to_ascii_uppercase().as_str() {
			"FULLPAYLOAD" => scope.full_payload = true,
			"ALLATTRIBUTES" => scope.all_attributes = true,
			"CACHEONLY" => scope.cache_only = true,
			"EXTERNALPAYLOAD" => scope.external_payload = true,
			"CHECKCACHEDPARTSONLY" => scope.check_cached_parts_only = true,
			"IGNOREERRORS" => scope.ignore_errors = true,
			"CHANGEDSINCE" => scope.changed_since = Some(reader.read_number().await?),
			"ANCESTORDEPTH" => scope.ancestor_depth = reader.read_number().await? as u32,
			other if other.starts_with("PLD:") => scope.requested_parts.push(other.to_string()),
			other => return Err(unexpected("FETCHITEMS key", other)),
		}
	}
	reader.end_list().await?;
	Ok(scope)
}

async fn read_search_query<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<SearchQuery, PimError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	reader.begin_list().await?;
	let mut query = SearchQuery::default();
	while !reader.at_list_end().await? {
		match reader.read_atom().await?.to_ascii_uppercase().as_str() {
			"ROOT" => query.root_collection_id = reader.read_number().await?,
			"MIMETYPE" => query.mime_type_id = Some(reader.read_number().await?),
			"REMOTEID" => query.remote_id_equals = reader.read_string(writer).await?,
			"GID" => query.gid_equals = reader.read_string(writer).await?,
			"FLAG" => query.flag_name = reader.read_string(writer).await?,
			"MODIFIEDSINCE" => query.modified_since = Some(reader.read_number().await?),
			other => return Err(unexpected("SEARCH key", other)),
		}
	}
	reader.end_list().await?;
	Ok(query)
}

/// Renders a handler response as zero or more untagged lines, written
/// before the caller sends the final tagged OK/NO/BAD (§4.1/§6).
pub async fn write_response<W: AsyncWrite + Unpin>(writer: &mut FrameWriter<W>, response: &Response) -> Result<(), WireError> {
	use crate::protocol::scalar::{format_datetime, quote};

	fn quote_opt(s: &Option<String>) -> String {
		s.as_deref().map(quote).unwrap_or_else(|| "NIL".to_string())
	}

	fn render_item(item: &crate::store::Item) -> String {
		format!(
			"ITEM {} ({} {} {} {} {} {} {})",
			item.id,
			item.collection_id,
			item.mime_type_id,
			quote_opt(&item.remote_id),
			quote_opt(&item.gid),
			item.size,
			format_datetime(item.datetime),
			item.revision,
		)
	}

	fn render_collection(col: &crate::store::Collection) -> String {
		format!(
			"COLLECTION {} ({} {} {} {})",
			col.id,
			col.parent_id,
			quote(&col.name),
			col.resource_id,
			col.enabled,
		)
	}

	fn render_tag(tag: &crate::store::Tag) -> String {
		format!("TAG {} ({} {})", tag.id, quote(&tag.gid), tag.type_id)
	}

	fn render_relation(rel: &crate::store::Relation) -> String {
		format!("RELATION {} {} {}", rel.left_item_id, rel.right_item_id, rel.type_id)
	}

	fn render_capabilities(caps: &ClientCapabilities) -> String {
		let mut flags = Vec::new();
		if caps.notification_protocol_v2 {
			flags.push("NOTIFICATIONPROTOCOLV2");
		}
		if caps.no_payload_path {
			flags.push("NOPAYLOADPATH");
		}
		if caps.server_side_search {
			flags.push("SERVERSIDESEARCH");
		}
		if caps.streaming_append {
			flags.push("STREAMINGAPPEND");
		}
		format!("CAPABILITY ({})", flags.join(" "))
	}

	match response {
		Response::Ok => {}
		Response::Id(id) => writer.write_untagged(&format!("ID {}", id)).await?,
		Response::Ids(ids) => {
			let rendered = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(" ");
			writer.write_untagged(&format!("IDS ({})", rendered)).await?;
		}
		Response::Item(item) => writer.write_untagged(&render_item(item)).await?,
		Response::Items(items) => {
			for item in items {
				writer.write_untagged(&render_item(item)).await?;
			}
		}
		Response::Collection(col) => writer.write_untagged(&render_collection(col)).await?,
		Response::Collections(cols) => {
			for col in cols {
				writer.write_untagged(&render_collection(col)).await?;
			}
		}
		Response::Tag(tag) => writer.write_untagged(&render_tag(tag)).await?,
		Response::Tags(tags) => {
			for tag in tags {
				writer.write_untagged(&render_tag(tag)).await?;
			}
		}
		Response::Relations(rels) => {
			for rel in rels {
				writer.write_untagged(&render_relation(rel)).await?;
			}
		}
		Response::Capabilities(caps) => writer.write_untagged(&render_capabilities(caps)).await?,
		Response::Stats(stats) => {
			writer.write_untagged(&format!("STATS ({} {} {})", stats.count, stats.unread, stats.size)).await?;
		}
	}
	Ok(())
}

/// Renders one delivered `MutationRecord` as a push notification (§4.5,
/// §4.6), independent of any tagged command/response exchange.
pub async fn write_notification<W: AsyncWrite + Unpin>(
	writer: &mut FrameWriter<W>,
	record: &crate::notify::MutationRecord,
) -> Result<(), WireError> {
	use crate::notify::MutationRecord;

	fn op_name<T: std::fmt::Debug>(op: &T) -> String {
		format!("{:?}", op).to_ascii_uppercase()
	}

	let line = match record {
		MutationRecord::Item(change) => {
			let ids = change.item_ids.iter().map(i64::to_string).collect::<Vec<_>>().join(" ");
			format!("NOTIFY ITEM {} ({})", op_name(&change.op), ids)
		}
		MutationRecord::Collection(change) => {
			format!("NOTIFY COLLECTION {} {}", op_name(&change.op), change.collection_id)
		}
		MutationRecord::Tag(change) => format!("NOTIFY TAG {} {}", op_name(&change.op), change.tag_id),
		MutationRecord::Relation(change) => {
			format!("NOTIFY RELATION {} {} {}", op_name(&change.op), change.left_item_id, change.right_item_id)
		}
	};
	writer.write_untagged(&line).await
}


// vim: ts=4
