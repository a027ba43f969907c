//! Core identifiers and small shared value types for pimd.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique entity id (collection, item, tag, relation endpoint, ...).
///
/// The data model guarantees `id` uniqueness globally while `remote-id` is
/// only unique within a resource and `gid` is not unique at all (§3).
pub type EntityId = i64;

/// Interned mime-type id, resolved through the store's identity cache.
pub type MimeTypeId = i64;

/// Interned tag-type id.
pub type TagTypeId = i64;

/// Interned flag-name id.
pub type FlagId = i64;

/// Resource peer identifier (a resource is addressable on the wire like a
/// client and is identified by its name; §GLOSSARY).
pub type ResourceId = i64;

/// Per-connection session identifier, assigned on connect and used to
/// suppress notification echo (§4.6) and for session-scoped collection
/// references (§4.7 ModifyCollection/REFERENCED).
pub type SessionId = u64;

/// A tri-state preference: unset collection-level flags (sync/display/index,
/// §3) default to the parent's effective value when `Undefined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriState {
	True,
	False,
	Undefined,
}

impl Default for TriState {
	fn default() -> Self {
		TriState::Undefined
	}
}

impl fmt::Display for TriState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TriState::True => write!(f, "true"),
			TriState::False => write!(f, "false"),
			TriState::Undefined => write!(f, "undefined"),
		}
	}
}

impl TriState {
	/// Resolve against a parent's effective boolean, per the cache-policy
	/// `inherit` rule used throughout collection preferences.
	pub fn effective(self, parent_effective: bool) -> bool {
		match self {
			TriState::True => true,
			TriState::False => false,
			TriState::Undefined => parent_effective,
		}
	}
}

/// Server-stored timestamp: whole seconds since the Unix epoch, always UTC.
/// The wire codec renders these as `dd-MMM-yyyy hh:mm:ss +0000` (§4.1).
pub type Timestamp = i64;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tristate_effective_resolves_undefined_from_parent() {
		assert!(TriState::Undefined.effective(true));
		assert!(!TriState::Undefined.effective(false));
		assert!(TriState::True.effective(false));
		assert!(!TriState::False.effective(true));
	}

	#[test]
	fn tristate_default_is_undefined() {
		assert_eq!(TriState::default(), TriState::Undefined);
	}
}

// vim: ts=4
