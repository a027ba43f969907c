//! Wire codec (C1): frame and parse command/response units, including
//! streamed literal payloads (§4.1).
//!
//! `FrameReader` tokenises an incoming byte stream the way
//! `ImapStreamParser` does in the source implementation: it holds no
//! notion of "lines" as the unit of parsing, because a literal's payload
//! bytes may themselves contain newlines. Instead it reads byte-by-byte
//! from an `AsyncBufRead`, peeking via `fill_buf`/`consume`.

use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::error::WireError;
use super::seqset::SequenceSet;

/// Maximum size of a single literal read as one chunk before looping.
const LITERAL_CHUNK: usize = 64 * 1024;

/// Async tokeniser over a client→server (or peer→peer) byte stream.
pub struct FrameReader<R> {
	inner: R,
	read_timeout: Duration,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
	pub fn new(inner: R) -> Self {
		FrameReader { inner, read_timeout: Duration::from_secs(30) }
	}

	pub fn with_timeout(inner: R, read_timeout: Duration) -> Self {
		FrameReader { inner, read_timeout }
	}

	async fn peek_u8(&mut self) -> Result<Option<u8>, WireError> {
		let buf = self.inner.fill_buf().await?;
		Ok(buf.first().copied())
	}

	async fn next_u8(&mut self) -> Result<Option<u8>, WireError> {
		match self.peek_u8().await? {
			None => Ok(None),
			Some(b) => {
				self.inner.consume(1);
				Ok(Some(b))
			}
		}
	}

	async fn skip_spaces(&mut self) -> Result<(), WireError> {
		loop {
			match self.peek_u8().await? {
				Some(b' ') | Some(b'\r') => {
					self.inner.consume(1);
				}
				_ => return Ok(()),
			}
		}
	}

	/// Read everything up to (and consuming) the next `\n`. Used to
	/// discard the remainder of a malformed frame before resuming parsing.
	pub async fn skip_to_eol(&mut self) -> Result<(), WireError> {
		loop {
			match self.next_u8().await? {
				None | Some(b'\n') => return Ok(()),
				_ => continue,
			}
		}
	}

	/// Read the session tag and command name that open every client frame:
	/// `<tag> <command> ...`.
	pub async fn read_tag_and_command(&mut self) -> Result<(String, String), WireError> {
		self.skip_spaces().await?;
		let tag = self.read_atom().await?;
		self.skip_spaces().await?;
		let command = self.read_atom().await?.to_ascii_uppercase();
		Ok((tag, command))
	}

	/// True if the next non-space token opens a parenthesised list.
	pub async fn has_list(&mut self) -> Result<bool, WireError> {
		self.skip_spaces().await?;
		Ok(self.peek_u8().await? == Some(b'('))
	}

	pub async fn begin_list(&mut self) -> Result<(), WireError> {
		self.skip_spaces().await?;
		match self.next_u8().await? {
			Some(b'(') => Ok(()),
			other => Err(WireError::MalformedFrame(format!(
				"expected '(' got {:?}",
				other.map(|b| b as char)
			))),
		}
	}

	pub async fn at_list_end(&mut self) -> Result<bool, WireError> {
		self.skip_spaces().await?;
		Ok(matches!(self.peek_u8().await?, Some(b')') | Some(b'\n') | None))
	}

	pub async fn end_list(&mut self) -> Result<(), WireError> {
		self.skip_spaces().await?;
		match self.next_u8().await? {
			Some(b')') => Ok(()),
			other => Err(WireError::MalformedFrame(format!(
				"expected ')' got {:?}",
				other.map(|b| b as char)
			))),
		}
	}

	/// Read an unquoted atom: bytes up to the next whitespace or list
	/// delimiter (`(`, `)`, `\n`, `"`).
	pub async fn read_atom(&mut self) -> Result<String, WireError> {
		let mut out = Vec::new();
		loop {
			match self.peek_u8().await? {
				None => break,
				Some(b) if b == b' ' || b == b'(' || b == b')' || b == b'\n' || b == b'"' || b == b'\r' => {
					break;
				}
				Some(b) => {
					out.push(b);
					self.inner.consume(1);
				}
			}
		}
		if out.is_empty() {
			return Err(WireError::MalformedFrame("expected atom, found none".to_string()));
		}
		Ok(String::from_utf8_lossy(&out).into_owned())
	}

	pub async fn read_number(&mut self) -> Result<i64, WireError> {
		self.skip_spaces().await?;
		let atom = self.read_atom().await?;
		atom.parse::<i64>()
			.map_err(|_| WireError::MalformedFrame(format!("expected number, got '{}'", atom)))
	}

	/// Read a quoted string body, honouring `\"` and `\\` escapes, up to
	/// (and consuming) the closing quote. Assumes the opening quote has
	/// already been consumed.
	async fn read_quoted_body(&mut self) -> Result<String, WireError> {
		let mut out = Vec::new();
		loop {
			match self.next_u8().await? {
				None => return Err(WireError::MalformedFrame("unterminated quoted string".to_string())),
				Some(b'"') => break,
				Some(b'\\') => match self.next_u8().await? {
					Some(b) => out.push(b),
					None => return Err(WireError::MalformedFrame("dangling escape".to_string())),
				},
				Some(b) => out.push(b),
			}
		}
		Ok(String::from_utf8_lossy(&out).into_owned())
	}

	/// Read a `{N}\n` literal marker, send the continuation frame, then
	/// read exactly `N` bytes. Enforces the exact-byte-count rule (§4.1,
	/// §4.4): a short read before EOF is still an exact read of N bytes
	/// since we loop until done or the stream closes early, in which case
	/// we report a payload size mismatch.
	pub async fn read_literal<W: AsyncWrite + Unpin>(
		&mut self,
		continuation: &mut W,
	) -> Result<Vec<u8>, WireError> {
		// Opening '{' already expected by caller via has_literal().
		match self.next_u8().await? {
			Some(b'{') => {}
			other => {
				return Err(WireError::MalformedFrame(format!(
					"expected literal marker '{{', got {:?}",
					other.map(|b| b as char)
				)))
			}
		}
		let mut digits = Vec::new();
		loop {
			match self.next_u8().await? {
				Some(b'}') => break,
				Some(b) if b.is_ascii_digit() => digits.push(b),
				other => {
					return Err(WireError::MalformedFrame(format!(
						"malformed literal size marker, got {:?}",
						other.map(|b| b as char)
					)))
				}
			}
		}
		let announced: usize = String::from_utf8_lossy(&digits)
			.parse()
			.map_err(|_| WireError::MalformedFrame("non-numeric literal size".to_string()))?;
		// Consume the trailing newline after `{N}`.
		if self.peek_u8().await? == Some(b'\n') {
			self.inner.consume(1);
		}

		continuation
			.write_all(
				format!("+ Ready for literal data (expecting {} bytes)\n", announced).as_bytes(),
			)
			.await?;
		continuation.flush().await?;

		self.read_exact_with_timeout(announced).await
	}

	/// Read exactly `n` bytes, applying the configured read timeout to
	/// each chunk read; a short stream (client closes early / sends fewer
	/// bytes than announced) surfaces as `PayloadSizeMismatch`.
	pub async fn read_exact_with_timeout(&mut self, n: usize) -> Result<Vec<u8>, WireError> {
		let mut out = Vec::with_capacity(n);
		while out.len() < n {
			let want = std::cmp::min(LITERAL_CHUNK, n - out.len());
			let chunk = tokio::time::timeout(self.read_timeout, self.read_up_to(want))
				.await
				.map_err(|_| WireError::ReadTimeout)??;
			if chunk.is_empty() {
				return Err(WireError::PayloadSizeMismatch);
			}
			out.extend_from_slice(&chunk);
		}
		Ok(out)
	}

	async fn read_up_to(&mut self, want: usize) -> Result<Vec<u8>, WireError> {
		let buf = self.inner.fill_buf().await?;
		let take = std::cmp::min(want, buf.len());
		let data = buf[..take].to_vec();
		self.inner.consume(take);
		Ok(data)
	}

	/// Read a wire string: `NIL`, a quoted string, an unquoted atom, or a
	/// literal. Returns `None` for `NIL` (§4.1).
	pub async fn read_string<W: AsyncWrite + Unpin>(
		&mut self,
		continuation: &mut W,
	) -> Result<Option<String>, WireError> {
		self.skip_spaces().await?;
		match self.peek_u8().await? {
			Some(b'{') => {
				let bytes = self.read_literal(continuation).await?;
				Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
			}
			Some(b'"') => {
				self.inner.consume(1);
				Ok(Some(self.read_quoted_body().await?))
			}
			_ => {
				let atom = self.read_atom().await?;
				if atom == "NIL" {
					Ok(None)
				} else {
					Ok(Some(atom))
				}
			}
		}
	}

	/// Read a sequence set token (§4.1).
	pub async fn read_sequence_set(&mut self) -> Result<SequenceSet, WireError> {
		self.skip_spaces().await?;
		let atom = self.read_atom().await?;
		SequenceSet::parse(&atom).map_err(WireError::MalformedFrame)
	}
}

/// Async writer of server→client frames: untagged (`*`), tagged
/// (`<tag> OK|NO|BAD <text>`), and continuation (`+`) responses.
pub struct FrameWriter<W> {
	inner: W,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Ok,
	No,
	Bad,
}

impl Status {
	fn as_str(self) -> &'static str {
		match self {
			Status::Ok => "OK",
			Status::No => "NO",
			Status::Bad => "BAD",
		}
	}
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
	pub fn new(inner: W) -> Self {
		FrameWriter { inner }
	}

	pub async fn write_tagged(&mut self, tag: &str, status: Status, text: &str) -> Result<(), WireError> {
		let line = format!("{} {} {}\n", tag, status.as_str(), text);
		self.inner.write_all(line.as_bytes()).await?;
		self.inner.flush().await?;
		Ok(())
	}

	pub async fn write_untagged(&mut self, text: &str) -> Result<(), WireError> {
		let line = format!("* {}\n", text);
		self.inner.write_all(line.as_bytes()).await?;
		self.inner.flush().await?;
		Ok(())
	}

	/// Emit `+ Ready for literal data (expecting N bytes)` directly; used
	/// when the caller already owns the continuation text rather than
	/// going through `FrameReader::read_literal`.
	pub async fn write_continuation(&mut self, expecting: usize) -> Result<(), WireError> {
		let line = format!("+ Ready for literal data (expecting {} bytes)\n", expecting);
		self.inner.write_all(line.as_bytes()).await?;
		self.inner.flush().await?;
		Ok(())
	}

	pub fn into_inner(self) -> W {
		self.inner
	}

	pub fn inner_mut(&mut self) -> &mut W {
		&mut self.inner
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::BufReader;

	#[tokio::test]
	async fn reads_tag_and_command() {
		let input = b"A001 CREATE (NAME \"inbox\")\n".to_vec();
		let mut reader = FrameReader::new(BufReader::new(&input[..]));
		let (tag, cmd) = reader.read_tag_and_command().await.unwrap();
		assert_eq!(tag, "A001");
		assert_eq!(cmd, "CREATE");
	}

	#[tokio::test]
	async fn reads_quoted_string_with_escapes() {
		let input = b"\"hello \\\"world\\\"\"".to_vec();
		let mut reader = FrameReader::new(BufReader::new(&input[..]));
		let mut sink: Vec<u8> = Vec::new();
		let s = reader.read_string(&mut sink).await.unwrap();
		assert_eq!(s, Some("hello \"world\"".to_string()));
	}

	#[tokio::test]
	async fn nil_atom_parses_to_none() {
		let input = b"NIL".to_vec();
		let mut reader = FrameReader::new(BufReader::new(&input[..]));
		let mut sink: Vec<u8> = Vec::new();
		let s = reader.read_string(&mut sink).await.unwrap();
		assert_eq!(s, None);
	}

	#[tokio::test]
	async fn reads_literal_with_continuation() {
		let input = b"{5}\nhello".to_vec();
		let mut reader = FrameReader::new(BufReader::new(&input[..]));
		let mut sink: Vec<u8> = Vec::new();
		let bytes = reader.read_literal(&mut sink).await.unwrap();
		assert_eq!(bytes, b"hello");
		assert_eq!(
			String::from_utf8(sink).unwrap(),
			"+ Ready for literal data (expecting 5 bytes)\n"
		);
	}

	#[tokio::test]
	async fn short_literal_is_payload_size_mismatch() {
		let input = b"{5}\n123".to_vec();
		let mut reader = FrameReader::new(BufReader::new(&input[..]));
		let mut sink: Vec<u8> = Vec::new();
		let err = reader.read_literal(&mut sink).await.unwrap_err();
		assert!(matches!(err, WireError::PayloadSizeMismatch));
	}

	#[tokio::test]
	async fn parses_nested_list() {
		let input = b"(NAME \"inbox\" CACHEPOLICY (INHERIT true))\n".to_vec();
		let mut reader = FrameReader::new(BufReader::new(&input[..]));
		reader.begin_list().await.unwrap();
		assert_eq!(reader.read_atom().await.unwrap(), "NAME");
		let mut sink: Vec<u8> = Vec::new();
		assert_eq!(reader.read_string(&mut sink).await.unwrap(), Some("inbox".to_string()));
		assert_eq!(reader.read_atom().await.unwrap(), "CACHEPOLICY");
		reader.begin_list().await.unwrap();
		assert_eq!(reader.read_atom().await.unwrap(), "INHERIT");
		assert_eq!(reader.read_atom().await.unwrap(), "true");
		assert!(reader.at_list_end().await.unwrap());
		reader.end_list().await.unwrap();
		assert!(reader.at_list_end().await.unwrap());
		reader.end_list().await.unwrap();
	}

	#[tokio::test]
	async fn write_tagged_and_untagged_frames() {
		let mut buf: Vec<u8> = Vec::new();
		{
			let mut writer = FrameWriter::new(&mut buf);
			writer.write_untagged("1 EXISTS").await.unwrap();
			writer.write_tagged("A001", Status::Ok, "CREATE completed").await.unwrap();
		}
		assert_eq!(
			String::from_utf8(buf).unwrap(),
			"* 1 EXISTS\nA001 OK CREATE completed\n"
		);
	}
}

// vim: ts=4
