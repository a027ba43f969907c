//! Part CRUD (§3, §4.4) and the external-payload-store seam that stands
//! in for spec.md §1's out-of-scope "on-disk external-payload blob
//! storage".

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::protocol::{PartName, PartPayload, WireError};
use crate::types::EntityId;

use super::entities::{Part, PartStorage};
use super::error::StoreError;
use super::txn::Transaction;

impl Transaction {
	pub fn put_part(&mut self, item_id: EntityId, name: &PartName, payload: PartPayload, version: i64) {
		let storage = match payload {
			PartPayload::Inline(bytes) => PartStorage::Internal(bytes),
			PartPayload::External(token) => PartStorage::External(token),
		};
		let datasize = storage.len();
		self.tables.parts.insert(
			(item_id, name.full_name()),
			Part { item_id, part_name: name.full_name(), storage, version, datasize },
		);
	}

	pub fn get_part(&self, item_id: EntityId, part_name: &str) -> Option<&Part> {
		self.tables.parts.get(&(item_id, part_name.to_string()))
	}

	pub fn parts_of(&self, item_id: EntityId) -> Vec<&Part> {
		self.tables.parts.values().filter(|p| p.item_id == item_id).collect()
	}

	/// Sum of every payload part's `datasize` for `item_id`, used to
	/// reconcile the item's declared size (§3 invariant 4).
	pub fn summed_payload_size(&self, item_id: EntityId) -> i64 {
		self.parts_of(item_id).iter().filter(|p| p.is_payload()).map(|p| p.datasize).sum()
	}

	pub fn remove_part(&mut self, item_id: EntityId, part_name: &str) -> Result<(), StoreError> {
		self
			.tables
			.parts
			.remove(&(item_id, part_name.to_string()))
			.map(|_| ())
			.ok_or(StoreError::NotFound { kind: "part", id: item_id })
	}
}

/// Abstracts the out-of-scope external-payload directory (§4.4, §6
/// "Persisted state"). The entity store calls this when a `PLD:` part
/// exceeds the configured size threshold.
#[async_trait]
pub trait ExternalPayloadStore: Send + Sync {
	async fn store(&self, token_hint: &str, bytes: &[u8]) -> Result<String, WireError>;
	async fn load(&self, token: &str) -> Result<Vec<u8>, WireError>;
	async fn remove(&self, token: &str) -> Result<(), WireError>;
}

/// Default implementation: one file per token under a configured
/// directory, so the crate is runnable standalone without a real
/// resource-agent blob store.
pub struct LocalFsPayloadStore {
	root: std::path::PathBuf,
}

impl LocalFsPayloadStore {
	pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
		LocalFsPayloadStore { root: root.into() }
	}

	fn path_for(&self, token: &str) -> std::path::PathBuf {
		self.root.join(token)
	}
}

#[async_trait]
impl ExternalPayloadStore for LocalFsPayloadStore {
	async fn store(&self, token_hint: &str, bytes: &[u8]) -> Result<String, WireError> {
		tokio::fs::create_dir_all(&self.root).await?;
		let token = format!("{}-{}", token_hint, uuid::Uuid::new_v4());
		let mut file = tokio::fs::File::create(self.path_for(&token)).await?;
		file.write_all(bytes).await?;
		Ok(token)
	}

	async fn load(&self, token: &str) -> Result<Vec<u8>, WireError> {
		let mut file = tokio::fs::File::open(self.path_for(token)).await?;
		let mut bytes = Vec::new();
		file.read_to_end(&mut bytes).await?;
		Ok(bytes)
	}

	async fn remove(&self, token: &str) -> Result<(), WireError> {
		tokio::fs::remove_file(self.path_for(token)).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn local_fs_store_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let store = LocalFsPayloadStore::new(dir.path());
		let token = store.store("DATA", b"hello world").await.unwrap();
		let bytes = store.load(&token).await.unwrap();
		assert_eq!(bytes, b"hello world");
		store.remove(&token).await.unwrap();
		assert!(store.load(&token).await.is_err());
	}
}

// vim: ts=4
