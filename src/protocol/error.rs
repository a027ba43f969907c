//! Wire codec error types (§7 kind 1 — protocol errors).
//!
//! A `WireError` always closes the session after a tagged `BAD` response
//! (§4.1 failure modes, §7): a malformed frame, a literal whose byte count
//! doesn't match what was announced, or a read timeout.

use std::fmt;
use std::io;

/// Wire-level error type.
#[derive(Debug)]
pub enum WireError {
	/// I/O error from the underlying socket.
	Io(io::Error),
	/// A literal's streamed bytes didn't match its announced size, in
	/// either direction (too many or too few).
	PayloadSizeMismatch,
	/// The frame could not be parsed: unbalanced lists, a literal `{N}`
	/// marker with non-numeric `N`, an unterminated quoted string, etc.
	MalformedFrame(String),
	/// No further bytes of an in-flight literal arrived within the
	/// configured read timeout (default 30s, §4.1).
	ReadTimeout,
	/// Generic error message.
	Other(String),
}

impl fmt::Display for WireError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			WireError::Io(e) => write!(f, "I/O error: {}", e),
			WireError::PayloadSizeMismatch => write!(f, "Payload size mismatch"),
			WireError::MalformedFrame(msg) => write!(f, "malformed frame: {}", msg),
			WireError::ReadTimeout => write!(f, "read timeout"),
			WireError::Other(msg) => write!(f, "{}", msg),
		}
	}
}

impl std::error::Error for WireError {}

impl From<io::Error> for WireError {
	fn from(e: io::Error) -> Self {
		WireError::Io(e)
	}
}

impl From<String> for WireError {
	fn from(e: String) -> Self {
		WireError::Other(e)
	}
}

impl From<&str> for WireError {
	fn from(e: &str) -> Self {
		WireError::Other(e.to_string())
	}
}

// vim: ts=4
