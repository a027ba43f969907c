//! Scope resolution (C2): translate the four entity-addressing modes
//! (uid, rid, hierarchical rid, gid) into concrete entity ids (§4.2).

pub mod error;
pub mod resolver;

pub use error::ScopeError;
pub use resolver::{Scope, ScopeContext, ScopeLookup};

// vim: ts=4
