//! Per-connection session state (§4.1, §4.7 Login/Logout/ResSelect/
//! Capability, §4.6 Idle/Notify): the `NotAuthenticated` → `Authenticated`
//! state machine, optional resource context, capability negotiation, and
//! the bookkeeping a session must unwind on disconnect.
//!
//! Grounded in the teacher's per-connection `Node` struct (`connection.rs`)
//! generalized from an SSH/subprocess peer to a PIM client connection, and
//! in `original_source/server/src/clientcapabilities.{h,cpp}` for the
//! capability bitset.

use crate::store::Transaction;
use crate::types::{ResourceId, SessionId};

/// Capabilities a client may declare at `CAPABILITY`/`LOGIN` time,
/// matching `ClientCapability` in `original_source/server/src/
/// clientcapabilities.h`. A small field-per-flag struct rather than a
/// packed bitset, since nothing else in this codebase reaches for a
/// bitflags crate and four independent booleans read just as clearly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientCapabilities {
	/// Client understands the versioned notification protocol rather
	/// than the legacy single-item-per-notification form.
	pub notification_protocol_v2: bool,
	/// Client accepts `FSPATH:` external-payload references instead of
	/// requiring every part inline.
	pub no_payload_path: bool,
	/// Client can drive `SEARCH`/`SEARCHPERSISTENT` against the server's
	/// own query engine rather than fetching everything.
	pub server_side_search: bool,
	/// Client can stream an `APPEND`'s parts incrementally rather than
	/// buffering the whole command before sending it.
	pub streaming_append: bool,
}

impl ClientCapabilities {
	pub fn none() -> Self {
		ClientCapabilities::default()
	}
}

/// The session's place in the `NotAuthenticated` → `Authenticated` state
/// machine (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	NotAuthenticated,
	Authenticated,
}

/// Whether the session is in normal command/response mode or has entered
/// `IDLE`'s long-poll delivery mode (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
	Active,
	Idling,
}

/// All per-connection state a command handler needs to consult or
/// mutate. One `Session` exists per accepted connection (§5: "per-session
/// single-threaded handler execution").
pub struct Session {
	pub id: SessionId,
	pub state: SessionState,
	pub capabilities: ClientCapabilities,
	/// Set by `RESSELECT`; required for `Rid`/`HierarchicalRid` scope
	/// resolution on every subsequent command (§4.2).
	pub resource_context: Option<ResourceId>,
	pub idle_state: IdleState,
	/// The transaction kept open by an explicit `TransactionCommand::Begin`,
	/// spanning separate client commands until a matching `Commit`/
	/// `Rollback` arrives (§4.7 TransactionCommand). `None` means every
	/// command runs in its own one-shot transaction.
	pub open_txn: Option<Transaction>,
}

impl Session {
	pub fn new(id: SessionId) -> Self {
		Session {
			id,
			state: SessionState::NotAuthenticated,
			capabilities: ClientCapabilities::none(),
			resource_context: None,
			idle_state: IdleState::Active,
			open_txn: None,
		}
	}

	pub fn is_authenticated(&self) -> bool {
		self.state == SessionState::Authenticated
	}

	pub fn login(&mut self, capabilities: ClientCapabilities) {
		self.state = SessionState::Authenticated;
		self.capabilities = capabilities;
	}

	pub fn logout(&mut self) {
		self.state = SessionState::NotAuthenticated;
		self.resource_context = None;
	}

	pub fn select_resource(&mut self, resource_id: ResourceId) {
		self.resource_context = Some(resource_id);
	}

	pub fn enter_idle(&mut self) {
		self.idle_state = IdleState::Idling;
	}

	/// Any command arriving while idling ends idle mode (§4.6: "IDLE
	/// enters long-poll delivery mode until the client sends any further
	/// command").
	pub fn exit_idle(&mut self) {
		self.idle_state = IdleState::Active;
	}
}


// vim: ts=4
