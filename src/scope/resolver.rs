//! Scope resolver (C2): translate the four addressing modes to entity ids
//! given a session context (§4.2).

use crate::protocol::SequenceSet;
use crate::types::{EntityId, ResourceId};

use super::error::ScopeError;

/// Restricts a scope resolution to items inside a given collection, or
/// items carrying a given tag. Orthogonal to the scope kind (§4.2).
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
	pub collection_id: Option<EntityId>,
	pub tag_id: Option<EntityId>,
}

impl ScopeContext {
	pub fn none() -> Self {
		ScopeContext::default()
	}

	pub fn in_collection(collection_id: EntityId) -> Self {
		ScopeContext { collection_id: Some(collection_id), tag_id: None }
	}

	pub fn with_tag(tag_id: EntityId) -> Self {
		ScopeContext { collection_id: None, tag_id: Some(tag_id) }
	}
}

/// One of the four addressing modes, carrying its unresolved input.
#[derive(Debug, Clone)]
pub enum Scope {
	/// A sequence set of server-assigned ids.
	Uid(SequenceSet),
	/// One or more remote-ids, resolved within the session's resource
	/// context. Fails with `MissingResourceContext` when absent.
	Rid(Vec<String>),
	/// An ordered chain of remote-ids from the target up toward a root,
	/// resolved by walking parent links starting at the resource root.
	HierarchicalRid(Vec<String>),
	/// One or more gids; each resolves to zero-or-more ids.
	Gid(Vec<String>),
}

/// Anything that can resolve scope inputs against the entity store. The
/// entity store's transaction type implements this; the scope resolver
/// itself stays store-agnostic so it can be tested against a fake.
pub trait ScopeLookup {
	/// Upper bound used to resolve open-ended/`*` sequence-set intervals.
	fn max_known_id(&self) -> EntityId;

	/// Resolve a single remote-id within a resource, restricted by
	/// `context` if set.
	fn resolve_rid(&self, resource: ResourceId, rid: &str, context: &ScopeContext) -> Vec<EntityId>;

	/// Resolve a gid to zero-or-more ids, restricted by `context` if set.
	fn resolve_gid(&self, gid: &str, context: &ScopeContext) -> Vec<EntityId>;

	/// Walk an HRID chain (target-to-root order) starting at the given
	/// resource's root collection, returning the id of the final
	/// (target) entity.
	fn resolve_hrid_chain(&self, resource: ResourceId, chain: &[String]) -> Option<EntityId>;

	/// Narrow an already-resolved id set by collection/tag context (used
	/// for the Uid scope kind, which otherwise ignores `ScopeContext`).
	fn filter_by_context(&self, ids: Vec<EntityId>, context: &ScopeContext) -> Vec<EntityId>;
}

impl Scope {
	/// Resolve this scope to an ordered set of entity ids.
	///
	/// `resource` is the session's resource context, required for `Rid`
	/// and `HierarchicalRid` scopes (§4.2). Per the Open Question
	/// resolution in SPEC_FULL.md §4.2, HRID is supported uniformly for
	/// every command via this explicit argument rather than ambient
	/// per-connection state.
	pub fn resolve<L: ScopeLookup>(
		&self,
		lookup: &L,
		resource: Option<ResourceId>,
		context: &ScopeContext,
	) -> Result<Vec<EntityId>, ScopeError> {
		match self {
			Scope::Uid(set) => {
				let ids = set.enumerate(lookup.max_known_id());
				Ok(lookup.filter_by_context(ids, context))
			}
			Scope::Rid(rids) => {
				let resource = resource.ok_or(ScopeError::MissingResourceContext)?;
				let mut out = Vec::new();
				for rid in rids {
					out.extend(lookup.resolve_rid(resource, rid, context));
				}
				Ok(out)
			}
			Scope::HierarchicalRid(chain) => {
				let resource = resource.ok_or(ScopeError::MissingResourceContext)?;
				match lookup.resolve_hrid_chain(resource, chain) {
					Some(id) => Ok(lookup.filter_by_context(vec![id], context)),
					None => Err(ScopeError::HierarchicalRidNotFound { chain: chain.clone() }),
				}
			}
			Scope::Gid(gids) => {
				let mut out = Vec::new();
				for gid in gids {
					out.extend(lookup.resolve_gid(gid, context));
				}
				Ok(out)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeMap;

	struct FakeLookup {
		max_id: EntityId,
		rid_index: BTreeMap<(ResourceId, String), Vec<EntityId>>,
		gid_index: BTreeMap<String, Vec<EntityId>>,
		hrid_roots: BTreeMap<ResourceId, BTreeMap<Vec<String>, EntityId>>,
	}

	impl ScopeLookup for FakeLookup {
		fn max_known_id(&self) -> EntityId {
			self.max_id
		}
		fn resolve_rid(&self, resource: ResourceId, rid: &str, _ctx: &ScopeContext) -> Vec<EntityId> {
			self.rid_index.get(&(resource, rid.to_string())).cloned().unwrap_or_default()
		}
		fn resolve_gid(&self, gid: &str, _ctx: &ScopeContext) -> Vec<EntityId> {
			self.gid_index.get(gid).cloned().unwrap_or_default()
		}
		fn resolve_hrid_chain(&self, resource: ResourceId, chain: &[String]) -> Option<EntityId> {
			self.hrid_roots.get(&resource)?.get(chain).copied()
		}
		fn filter_by_context(&self, ids: Vec<EntityId>, _ctx: &ScopeContext) -> Vec<EntityId> {
			ids
		}
	}

	#[test]
	fn uid_scope_enumerates_sequence_set() {
		let lookup = FakeLookup {
			max_id: 10,
			rid_index: BTreeMap::new(),
			gid_index: BTreeMap::new(),
			hrid_roots: BTreeMap::new(),
		};
		let scope = Scope::Uid(SequenceSet::parse("1,3:5").unwrap());
		let ids = scope.resolve(&lookup, None, &ScopeContext::none()).unwrap();
		assert_eq!(ids, vec![1, 3, 4, 5]);
	}

	#[test]
	fn rid_scope_without_resource_context_fails() {
		let lookup = FakeLookup {
			max_id: 10,
			rid_index: BTreeMap::new(),
			gid_index: BTreeMap::new(),
			hrid_roots: BTreeMap::new(),
		};
		let scope = Scope::Rid(vec!["TEST-1".to_string()]);
		let err = scope.resolve(&lookup, None, &ScopeContext::none()).unwrap_err();
		assert!(matches!(err, ScopeError::MissingResourceContext));
	}

	#[test]
	fn rid_scope_resolves_within_resource() {
		let mut rid_index = BTreeMap::new();
		rid_index.insert((1, "TEST-1".to_string()), vec![42]);
		let lookup =
			FakeLookup { max_id: 100, rid_index, gid_index: BTreeMap::new(), hrid_roots: BTreeMap::new() };
		let scope = Scope::Rid(vec!["TEST-1".to_string()]);
		let ids = scope.resolve(&lookup, Some(1), &ScopeContext::none()).unwrap();
		assert_eq!(ids, vec![42]);
	}

	#[test]
	fn gid_scope_may_resolve_to_multiple_ids() {
		let mut gid_index = BTreeMap::new();
		gid_index.insert("dup-gid".to_string(), vec![1, 2]);
		let lookup =
			FakeLookup { max_id: 100, rid_index: BTreeMap::new(), gid_index, hrid_roots: BTreeMap::new() };
		let scope = Scope::Gid(vec!["dup-gid".to_string()]);
		let ids = scope.resolve(&lookup, None, &ScopeContext::none()).unwrap();
		assert_eq!(ids, vec![1, 2]);
	}

	#[test]
	fn hrid_scope_resolves_chain_to_target_id() {
		let mut roots = BTreeMap::new();
		let mut chains = BTreeMap::new();
		chains.insert(vec!["sub".to_string(), "root".to_string()], 7);
		roots.insert(1, chains);
		let lookup = FakeLookup {
			max_id: 100,
			rid_index: BTreeMap::new(),
			gid_index: BTreeMap::new(),
			hrid_roots: roots,
		};
		let scope = Scope::HierarchicalRid(vec!["sub".to_string(), "root".to_string()]);
		let ids = scope.resolve(&lookup, Some(1), &ScopeContext::none()).unwrap();
		assert_eq!(ids, vec![7]);
	}

	#[test]
	fn hrid_scope_without_resource_context_fails() {
		let lookup = FakeLookup {
			max_id: 100,
			rid_index: BTreeMap::new(),
			gid_index: BTreeMap::new(),
			hrid_roots: BTreeMap::new(),
		};
		let scope = Scope::HierarchicalRid(vec!["root".to_string()]);
		let err = scope.resolve(&lookup, None, &ScopeContext::none()).unwrap_err();
		assert!(matches!(err, ScopeError::MissingResourceContext));
	}
}

// vim: ts=4
