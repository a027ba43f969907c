//! Scope resolution errors (§7 kind 2: tagged NO, session continues).

use std::fmt;

#[derive(Debug)]
pub enum ScopeError {
	/// Rid scope used outside of a resource context (§4.2).
	MissingResourceContext,
	/// An HRID chain didn't resolve: a link in the chain has no matching
	/// child with that remote-id.
	HierarchicalRidNotFound { chain: Vec<String> },
	/// HRID scope was used on a command that has declared it rejects it
	/// (§9 Open Question, resolved: see DESIGN.md — this repository
	/// instead supports HRID everywhere, so this variant is unused in
	/// normal operation and kept for completeness/tests).
	HierarchicalRidUnsupported { command: String },
	/// Malformed scope input (bad sequence set, empty rid/gid list, etc).
	Malformed(String),
}

impl fmt::Display for ScopeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScopeError::MissingResourceContext => {
				write!(f, "remote-id scope requires resource context")
			}
			ScopeError::HierarchicalRidNotFound { chain } => {
				write!(f, "hierarchical RID chain not found: {}", chain.join("/"))
			}
			ScopeError::HierarchicalRidUnsupported { command } => {
				write!(f, "HRID scope is not supported for {}", command)
			}
			ScopeError::Malformed(msg) => write!(f, "{}", msg),
		}
	}
}

impl std::error::Error for ScopeError {}

// vim: ts=4
