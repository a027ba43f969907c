//! Part streamer (C4): stream payload parts of arbitrary size in either
//! direction, with size-mismatch enforcement (§4.4).
//!
//! The wire shape for one part inside a command's parameter list is
//! `<PART-NAME> <DECLARED-SIZE> <VERSION> <value>` (§4.4's "Metadata"/
//! "Data" sub-phases: the sender first announces the part's declared size
//! and version, then writes exactly that many bytes). `<value>` is either
//! a literal (inline data) or an unquoted `FSPATH:<token>` atom (external
//! storage, used when the server is streaming a part back to the client
//! that already migrated to external storage) — `DECLARED-SIZE` is not
//! checked against an `FSPATH:` value since the bytes never cross the
//! wire. A part whose name begins `PLD:` is a payload part and may live
//! externally; `ATR:` is an attribute part and is always internal (§3).

use tokio::io::{AsyncBufRead, AsyncWrite};

use super::codec::FrameReader;
use super::error::WireError;

/// The two permitted part-name namespaces (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartNamespace {
	/// `PLD:` — payload part, may be migrated to external storage.
	Payload,
	/// `ATR:` — attribute part, always stored internally.
	Attribute,
}

/// A fully-qualified part name, `NAMESPACE:NAME`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartName {
	pub namespace: PartNamespace,
	pub name: String,
}

impl PartName {
	pub fn parse(full_name: &str) -> Result<PartName, WireError> {
		let (ns, name) = full_name
			.split_once(':')
			.ok_or_else(|| WireError::MalformedFrame(format!("part name '{}' missing namespace", full_name)))?;
		let namespace = match ns {
			"PLD" => PartNamespace::Payload,
			"ATR" => PartNamespace::Attribute,
			other => {
				return Err(WireError::MalformedFrame(format!(
					"unknown part namespace '{}', expected PLD or ATR",
					other
				)))
			}
		};
		if name.is_empty() {
			return Err(WireError::MalformedFrame("empty part name".to_string()));
		}
		Ok(PartName { namespace, name: name.to_string() })
	}

	pub fn full_name(&self) -> String {
		match self.namespace {
			PartNamespace::Payload => format!("PLD:{}", self.name),
			PartNamespace::Attribute => format!("ATR:{}", self.name),
		}
	}
}

impl std::fmt::Display for PartName {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.full_name())
	}
}

/// Where a streamed part's bytes ultimately land.
#[derive(Debug, Clone)]
pub enum PartPayload {
	/// Stored inline in the part table.
	Inline(Vec<u8>),
	/// Migrated to external storage; the token identifies the blob.
	External(String),
}

impl PartPayload {
	pub fn len(&self) -> usize {
		match self {
			PartPayload::Inline(bytes) => bytes.len(),
			PartPayload::External(_) => 0,
		}
	}
}

/// One streamed part: its name, declared version, and where its bytes
/// ended up.
#[derive(Debug, Clone)]
pub struct StreamedPart {
	pub part_name: PartName,
	pub version: i64,
	pub payload: PartPayload,
}

/// Reads one `<PART-NAME> <DECLARED-SIZE> <VERSION> <value>` group from the
/// parameter list and, for inline `PLD:` parts whose announced size exceeds
/// `size_threshold_bytes`, migrates them to external storage via
/// `store_external`.
///
/// A declared size that disagrees with the actual number of bytes streamed
/// for an inline value is fatal (§4.4, §8 scenario 3 "incomplete part
/// data") — this is the true per-part invariant; it is distinct from (and
/// must not be conflated with) an item's declared size disagreeing with
/// the sum of its parts, which is never fatal (§8 scenario 2).
///
/// `store_external` receives the part's full name and its bytes and
/// returns an opaque storage token; callers typically wire this to the
/// entity store's `ExternalPayloadStore` (§4.4, §4.10's out-of-scope blob
/// directory made concrete here as a trait seam).
pub async fn stream_part<R, W, F, Fut>(
	reader: &mut FrameReader<R>,
	continuation: &mut W,
	size_threshold_bytes: i64,
	store_external: F,
) -> Result<StreamedPart, WireError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
	F: FnOnce(&PartName, Vec<u8>) -> Fut,
	Fut: std::future::Future<Output = Result<String, WireError>>,
{
	let raw_name = reader.read_atom().await?;
	let part_name = PartName::parse(&raw_name)?;
	let declared_size = reader.read_number().await?;
	let version = reader.read_number().await?;

	let value = reader.read_string(continuation).await?;
	let bytes = match value {
		None => Vec::new(),
		Some(s) if s.starts_with("FSPATH:") => {
			return Ok(StreamedPart {
				part_name,
				version,
				payload: PartPayload::External(s["FSPATH:".len()..].to_string()),
			})
		}
		Some(s) => s.into_bytes(),
	};

	if bytes.len() as i64 != declared_size {
		return Err(WireError::PayloadSizeMismatch);
	}

	let should_externalize = part_name.namespace == PartNamespace::Payload
		&& (bytes.len() as i64) > size_threshold_bytes;

	if should_externalize {
		let token = store_external(&part_name, bytes).await?;
		Ok(StreamedPart { part_name, version, payload: PartPayload::External(token) })
	} else {
		Ok(StreamedPart { part_name, version, payload: PartPayload::Inline(bytes) })
	}
}


// vim: ts=4
