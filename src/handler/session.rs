//! Session-state handlers: Login/Logout/ResSelect/Capability/Idle
//! (§4.1, §4.6, §4.7). None of these touch the store, so they run
//! outside any transaction and mutate `Session` directly rather than
//! going through `dispatch`'s `Transaction`-threading path.

use crate::session::{ClientCapabilities, Session};
use crate::types::ResourceId;
use crate::{HandlerError, PimError};

use super::Response;

pub fn login(session: &mut Session, capabilities: ClientCapabilities) -> Response {
	session.login(capabilities);
	Response::Capabilities(session.capabilities)
}

pub fn logout(session: &mut Session) -> Response {
	session.logout();
	Response::Ok
}

/// `RESSELECT`: binds the resource context that `Rid`/`HierarchicalRid`
/// scopes resolve against for every subsequent command (§4.2).
pub fn res_select(session: &mut Session, resource_id: ResourceId) -> Result<Response, PimError> {
	if !session.is_authenticated() {
		return Err(HandlerError::validation("not authenticated").into());
	}
	session.select_resource(resource_id);
	Ok(Response::Ok)
}

pub fn capability(session: &Session) -> Response {
	Response::Capabilities(session.capabilities)
}

pub fn idle(session: &mut Session) -> Response {
	session.enter_idle();
	Response::Ok
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn login_authenticates_and_records_capabilities() {
		let mut session = Session::new(1);
		assert!(!session.is_authenticated());

		let caps = ClientCapabilities { notification_protocol_v2: true, ..ClientCapabilities::none() };
		let Response::Capabilities(got) = login(&mut session, caps) else { panic!("expected Capabilities response") };

		assert!(session.is_authenticated());
		assert!(got.notification_protocol_v2);
	}

	#[test]
	fn res_select_is_rejected_before_login() {
		let mut session = Session::new(1);
		let err = res_select(&mut session, 1).unwrap_err();
		assert!(err.to_string().to_lowercase().contains("authenticat"));
	}

	#[test]
	fn logout_clears_authentication() {
		let mut session = Session::new(1);
		login(&mut session, ClientCapabilities::none());
		assert!(session.is_authenticated());

		logout(&mut session);
		assert!(!session.is_authenticated());
	}

	#[test]
	fn idle_enters_the_idling_state() {
		let mut session = Session::new(1);
		login(&mut session, ClientCapabilities::none());
		idle(&mut session);
		assert_eq!(session.idle_state, crate::session::IdleState::Idling);
	}
}

// vim: ts=4
