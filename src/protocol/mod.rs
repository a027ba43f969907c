//! Wire codec (C1)
//!
//! Frames and parses the client/server command-response dialogue described
//! in §4.1/§6 of the specification: tagged commands, untagged responses,
//! continuation frames, and literal payloads of arbitrary size.

pub mod codec;
pub mod error;
pub mod scalar;
pub mod seqset;
pub mod streaming;

pub use codec::{FrameReader, FrameWriter, Status};
pub use error::WireError;
pub use seqset::{Interval, SequenceSet};
pub use streaming::{stream_part, PartName, PartNamespace, PartPayload, StreamedPart};

// vim: ts=4
