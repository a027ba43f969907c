//! # pimd - Personal Information Management storage daemon
//!
//! pimd is a single-process server that stores hierarchical collections
//! of PIM items (mail, contacts, calendar entries, and similar) behind a
//! line-oriented, tagged wire protocol, and that fans out mutation
//! notifications to every interested client session.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use pimd::config::Config;
//! use pimd::serve::run;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     run(config).await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod notify;
pub mod protocol;
pub mod retrieval;
pub mod scheduler;
pub mod scope;
pub mod serve;
pub mod session;
pub mod store;
pub mod types;
pub mod wire;

pub use error::{ErrorClass, HandlerError, PimError};
pub use retrieval::{ResourcePeer, RetrievalCoordinator, RetrievalError};
pub use scheduler::{Scheduler, SchedulerCommand, SchedulerControl, SchedulerHandle};
pub use scope::{Scope, ScopeContext, ScopeError, ScopeLookup};
pub use session::{Session, SessionState};
pub use store::Store;

// vim: ts=4
