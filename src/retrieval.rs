//! Retrieval coordinator (C10): on-demand fetch of missing payload
//! bytes from the owning resource, with per-(item, parts) dedup (§4.10).
//!
//! Grounded in the teacher's request-dedup pattern for in-flight chunk
//! fetches (`chunk_tracker.rs`), generalized from content-hash keys to
//! (item id, part name set) keys, and the "coroutine/callback control
//! flow... model as tasks communicating through bounded channels" design
//! note (§9) for the wait-group of pending listeners.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::types::{EntityId, ResourceId};

#[derive(Debug, Clone)]
pub enum RetrievalError {
	/// The resource peer returned an error for a retrieval request; the
	/// message embeds collection id, resource id, and the resource's own
	/// error text (§4.10).
	ResourceFailure { collection_id: EntityId, resource_id: ResourceId, message: String },
}

impl fmt::Display for RetrievalError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RetrievalError::ResourceFailure { collection_id, resource_id, message } => write!(
				f,
				"retrieval failed for collection {} from resource {}: {}",
				collection_id, resource_id, message
			),
		}
	}
}

impl std::error::Error for RetrievalError {}

/// Seam to the owning resource peer; the retrieval coordinator calls
/// this to actually fetch bytes. A production server wires this to the
/// same wire protocol used for client sessions (§4.10: "talks to
/// resource peers over the same wire protocol").
#[async_trait]
pub trait ResourcePeer: Send + Sync {
	async fn retrieve_parts(
		&self,
		resource_id: ResourceId,
		item_id: EntityId,
		part_names: Vec<String>,
	) -> Result<(), RetrievalError>;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct RequestKey {
	item_id: EntityId,
	parts: Vec<String>,
}

enum InFlight {
	Pending(broadcast::Sender<Result<(), RetrievalError>>),
}

/// Deduplicates concurrent retrieval requests for the same (item, parts)
/// key: at most one in-flight request per key, with waiters attaching to
/// the existing request (§4.10).
pub struct RetrievalCoordinator<P: ResourcePeer> {
	peer: Arc<P>,
	in_flight: Mutex<HashMap<RequestKey, InFlight>>,
}

impl<P: ResourcePeer> RetrievalCoordinator<P> {
	pub fn new(peer: Arc<P>) -> Self {
		RetrievalCoordinator { peer, in_flight: Mutex::new(HashMap::new()) }
	}

	/// Fetches `part_names` of `item_id` from `resource_id`, deduplicating
	/// against any already-in-flight request for the same key. Once the
	/// request completes, results have already landed in the part table
	/// by the time this returns (the peer implementation is responsible
	/// for writing through the store before replying).
	///
	/// `ignore_errors = true` maps a resource failure to `Ok(())` so the
	/// caller silently omits the item from its response instead of
	/// failing the whole fetch (§4.10).
	pub async fn fetch(
		&self,
		resource_id: ResourceId,
		collection_id: EntityId,
		item_id: EntityId,
		mut part_names: Vec<String>,
		ignore_errors: bool,
	) -> Result<(), RetrievalError> {
		part_names.sort();
		part_names.dedup();
		let key = RequestKey { item_id, parts: part_names.clone() };

		let mut rx = {
			let mut in_flight = self.in_flight.lock().await;
			match in_flight.get(&key) {
				Some(InFlight::Pending(tx)) => tx.subscribe(),
				None => {
					let (tx, rx) = broadcast::channel(1);
					in_flight.insert(key.clone(), InFlight::Pending(tx.clone()));
					drop(in_flight);

					let result = self.peer.retrieve_parts(resource_id, item_id, part_names).await.map_err(
						|e| match e {
							RetrievalError::ResourceFailure { message, .. } => {
								RetrievalError::ResourceFailure { collection_id, resource_id, message }
							}
						},
					);
					self.in_flight.lock().await.remove(&key);
					let _ = tx.send(result.clone());
					return Self::apply_ignore_errors(result, ignore_errors);
				}
			}
		};

		let result = rx.recv().await.unwrap_or_else(|_| {
			Err(RetrievalError::ResourceFailure {
				collection_id,
				resource_id,
				message: "retrieval request dropped".to_string(),
			})
		});
		Self::apply_ignore_errors(result, ignore_errors)
	}

	fn apply_ignore_errors(
		result: Result<(), RetrievalError>,
		ignore_errors: bool,
	) -> Result<(), RetrievalError> {
		match result {
			Err(_) if ignore_errors => Ok(()),
			other => other,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct CountingPeer {
		calls: AtomicUsize,
		fail: bool,
	}

	#[async_trait]
	impl ResourcePeer for CountingPeer {
		async fn retrieve_parts(
			&self,
			_resource_id: ResourceId,
			_item_id: EntityId,
			_part_names: Vec<String>,
		) -> Result<(), RetrievalError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
			if self.fail {
				Err(RetrievalError::ResourceFailure { collection_id: 0, resource_id: 0, message: "boom".to_string() })
			} else {
				Ok(())
			}
		}
	}

	#[tokio::test]
	async fn concurrent_fetches_for_same_key_dedup_to_one_call() {
		let peer = Arc::new(CountingPeer { calls: AtomicUsize::new(0), fail: false });
		let coordinator = Arc::new(RetrievalCoordinator::new(peer.clone()));

		let a = {
			let c = coordinator.clone();
			tokio::spawn(async move { c.fetch(1, 4, 13, vec!["PLD:DATA".to_string()], false).await })
		};
		let b = {
			let c = coordinator.clone();
			tokio::spawn(async move { c.fetch(1, 4, 13, vec!["PLD:DATA".to_string()], false).await })
		};
		a.await.unwrap().unwrap();
		b.await.unwrap().unwrap();
		assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn ignore_errors_suppresses_failure() {
		let peer = Arc::new(CountingPeer { calls: AtomicUsize::new(0), fail: true });
		let coordinator = RetrievalCoordinator::new(peer);
		let result = coordinator.fetch(1, 4, 13, vec!["PLD:DATA".to_string()], true).await;
		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn errors_propagate_with_collection_and_resource_context() {
		let peer = Arc::new(CountingPeer { calls: AtomicUsize::new(0), fail: true });
		let coordinator = RetrievalCoordinator::new(peer);
		let err = coordinator.fetch(7, 4, 13, vec!["PLD:DATA".to_string()], false).await.unwrap_err();
		let message = err.to_string();
		assert!(message.contains("collection 4"));
		assert!(message.contains("resource 7"));
	}
}

// vim: ts=4
