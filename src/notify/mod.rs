//! Change-notification fan-out (C5/C6): per-transaction mutation
//! collection and coalescing (§4.5), per-session filtered delivery with
//! freeze/record/replay semantics (§4.6).

pub mod collector;
pub mod error;
pub mod router;
pub mod types;

pub use collector::Collector;
pub use error::NotifyError;
pub use router::{NotificationFilter, Router};
pub use types::{
	ChangedPart, CollectionChange, CollectionOp, ItemChange, ItemOp, MutationRecord, RelationChange,
	RelationOp, TagChange, TagOp,
};

// vim: ts=4
