//! Error types for pimd operations
//!
//! Each layer of the server (wire codec, scope resolver, entity store,
//! command handlers, notification plumbing, scheduler, retrieval
//! coordinator) owns a narrow error enum. They all fold into [`PimError`]
//! via `From`, the way the teacher's `SyncError` aggregates
//! `ConnectionError`/`ChunkError`/`StateError`/`ConflictError`.

use std::error::Error;
use std::fmt;
use std::io;

use crate::notify::NotifyError;
use crate::protocol::WireError;
use crate::retrieval::RetrievalError;
use crate::scheduler::SchedulerError;
use crate::scope::ScopeError;
use crate::store::StoreError;

/// Helper to reduce `Box::new()` boilerplate when wrapping errors.
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Top-level error type, the union of every layer's error kind.
#[derive(Debug)]
pub enum PimError {
	/// Malformed frame or unexpected literal; fatal to the session (§7 kind 1).
	Wire(WireError),
	/// Scope-kind/context mismatch; tagged NO, session continues (§7 kind 2).
	Scope(ScopeError),
	/// Domain-invariant breach or internal invariant breach (§7 kinds 3 and 6).
	Handler(HandlerError),
	/// Lower-level storage failure; aborts the enclosing transaction (§7 kind 4).
	Store(StoreError),
	/// Notification plumbing failure.
	Notify(NotifyError),
	/// Resource peer failed to supply a payload part (§7 kind 5).
	Retrieval(RetrievalError),
	/// Scheduler bookkeeping failure.
	Scheduler(SchedulerError),
	/// I/O error.
	Io(io::Error),
	/// Generic error message.
	Other { message: String },
}

impl fmt::Display for PimError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PimError::Wire(e) => write!(f, "protocol error: {}", e),
			PimError::Scope(e) => write!(f, "scope error: {}", e),
			PimError::Handler(e) => write!(f, "handler error: {}", e),
			PimError::Store(e) => write!(f, "store error: {}", e),
			PimError::Notify(e) => write!(f, "notification error: {}", e),
			PimError::Retrieval(e) => write!(f, "retrieval error: {}", e),
			PimError::Scheduler(e) => write!(f, "scheduler error: {}", e),
			PimError::Io(e) => write!(f, "I/O error: {}", e),
			PimError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for PimError {}

impl From<io::Error> for PimError {
	fn from(e: io::Error) -> Self {
		PimError::Io(e)
	}
}

impl From<String> for PimError {
	fn from(e: String) -> Self {
		PimError::Other { message: e }
	}
}

impl From<WireError> for PimError {
	fn from(e: WireError) -> Self {
		PimError::Wire(e)
	}
}

impl From<ScopeError> for PimError {
	fn from(e: ScopeError) -> Self {
		PimError::Scope(e)
	}
}

impl From<HandlerError> for PimError {
	fn from(e: HandlerError) -> Self {
		PimError::Handler(e)
	}
}

impl From<StoreError> for PimError {
	fn from(e: StoreError) -> Self {
		PimError::Store(e)
	}
}

impl From<NotifyError> for PimError {
	fn from(e: NotifyError) -> Self {
		PimError::Notify(e)
	}
}

impl From<RetrievalError> for PimError {
	fn from(e: RetrievalError) -> Self {
		PimError::Retrieval(e)
	}
}

impl From<SchedulerError> for PimError {
	fn from(e: SchedulerError) -> Self {
		PimError::Scheduler(e)
	}
}

/// Error severity class per §7 of the specification, used by the session
/// loop to decide whether to keep serving or to close the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	/// Malformed frame: reply BAD, close the session.
	Protocol,
	/// Tagged NO, session continues.
	Recoverable,
	/// Tagged NO, enclosing transaction rolled back, session continues.
	TransactionAborting,
	/// Tagged BAD, logged, fatal to the handler only.
	Logic,
}

impl PimError {
	pub fn class(&self) -> ErrorClass {
		match self {
			PimError::Wire(_) => ErrorClass::Protocol,
			PimError::Scope(_) => ErrorClass::Recoverable,
			PimError::Handler(HandlerError::Validation { .. }) => ErrorClass::Recoverable,
			PimError::Handler(HandlerError::Logic { .. }) => ErrorClass::Logic,
			PimError::Store(_) => ErrorClass::TransactionAborting,
			PimError::Retrieval(_) => ErrorClass::TransactionAborting,
			PimError::Notify(_) => ErrorClass::Logic,
			PimError::Scheduler(_) => ErrorClass::Logic,
			PimError::Io(_) => ErrorClass::Protocol,
			PimError::Other { .. } => ErrorClass::Recoverable,
		}
	}

	/// Message sent back on the wire for a tagged NO/BAD response.
	pub fn wire_message(&self) -> String {
		self.to_string()
	}
}

/// Command-handler errors (§7 kinds 3 and 6).
///
/// `Validation` covers domain-invariant breaches: virtual target for a
/// non-link append, invalid parent collection, payload size mismatch,
/// multiple merge candidates, unknown flag, and similar. `Logic` covers
/// invariant breaches that should never happen; it is always a bug.
#[derive(Debug)]
pub enum HandlerError {
	Validation { message: String },
	Logic { message: String },
}

impl HandlerError {
	pub fn validation(message: impl Into<String>) -> Self {
		HandlerError::Validation { message: message.into() }
	}

	pub fn logic(message: impl Into<String>) -> Self {
		HandlerError::Logic { message: message.into() }
	}
}

impl fmt::Display for HandlerError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HandlerError::Validation { message } => write!(f, "{}", message),
			HandlerError::Logic { message } => write!(f, "internal error: {}", message),
		}
	}
}

impl Error for HandlerError {}

// vim: ts=4
