//! Entity store errors (§7 kind 4: tagged NO, enclosing transaction aborts).

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
	/// No such collection, item, tag, or relation.
	NotFound { kind: &'static str, id: i64 },
	/// A commit or rollback was requested with no active transaction.
	NoActiveTransaction,
	/// A write conflicted with an invariant enforced by the store itself
	/// (as opposed to a handler-level validation error).
	Conflict(String),
	/// The redb-backed persistence layer failed.
	Backend(String),
	/// (De)serialisation of a persisted row failed.
	Codec(String),
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::NotFound { kind, id } => write!(f, "no such {} with id {}", kind, id),
			StoreError::NoActiveTransaction => write!(f, "There is no transaction in progress."),
			StoreError::Conflict(msg) => write!(f, "{}", msg),
			StoreError::Backend(msg) => write!(f, "storage backend error: {}", msg),
			StoreError::Codec(msg) => write!(f, "storage codec error: {}", msg),
		}
	}
}

impl std::error::Error for StoreError {}

impl From<redb::DatabaseError> for StoreError {
	fn from(e: redb::DatabaseError) -> Self {
		StoreError::Backend(e.to_string())
	}
}

impl From<redb::TransactionError> for StoreError {
	fn from(e: redb::TransactionError) -> Self {
		StoreError::Backend(e.to_string())
	}
}

impl From<redb::TableError> for StoreError {
	fn from(e: redb::TableError) -> Self {
		StoreError::Backend(e.to_string())
	}
}

impl From<redb::StorageError> for StoreError {
	fn from(e: redb::StorageError) -> Self {
		StoreError::Backend(e.to_string())
	}
}

impl From<redb::CommitError> for StoreError {
	fn from(e: redb::CommitError) -> Self {
		StoreError::Backend(e.to_string())
	}
}

impl From<serde_json::Error> for StoreError {
	fn from(e: serde_json::Error) -> Self {
		StoreError::Codec(e.to_string())
	}
}

// vim: ts=4
