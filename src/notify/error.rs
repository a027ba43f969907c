//! Notification plumbing errors.

use std::fmt;

#[derive(Debug)]
pub enum NotifyError {
	/// A subscriber's outbound channel was closed; the router drops it.
	ChannelClosed { session_id: u64 },
	/// Malformed filter specification (e.g. NOTIFY command arguments).
	InvalidFilter(String),
}

impl fmt::Display for NotifyError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NotifyError::ChannelClosed { session_id } => {
				write!(f, "notification channel closed for session {}", session_id)
			}
			NotifyError::InvalidFilter(msg) => write!(f, "invalid notification filter: {}", msg),
		}
	}
}

impl std::error::Error for NotifyError {}

// vim: ts=4
