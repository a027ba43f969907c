#![allow(dead_code)]

//! Unified configuration for pimd
//!
//! Everything the server needs to boot lives in one `Config` struct,
//! following the teacher's single-source-of-truth layering:
//!
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (`~/.config/pimd/config.toml`, or `--config <path>`)
//! 3. Environment variables (`PIMD_*` prefix)
//! 4. CLI flags (highest priority)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unified server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Address the TCP listener binds to.
	pub bind_address: String,

	/// Directory holding the durable entity store (`redb` file) and the
	/// external payload directory.
	pub data_dir: PathBuf,

	/// Part payloads (`PLD:` namespace) whose declared size exceeds this
	/// threshold are migrated to external storage instead of being stored
	/// inline in the part table (§4.4). Tests disable this by setting it
	/// to `i64::MAX`.
	pub size_threshold_bytes: i64,

	/// Lower clamp on the interval scheduler's effective check interval
	/// (§4.9); expressed in whole minutes.
	pub minimum_check_interval_minutes: i64,

	/// Default per-collection check interval used when a collection has no
	/// explicit cache policy override (§4.9).
	pub default_check_interval_minutes: i64,

	/// Read timeout, in seconds, for subsequent bytes of an in-flight
	/// literal (§4.1). The sole timeout that can abort a handler from the
	/// outside (§5).
	pub literal_read_timeout_secs: u64,

	/// Maximum number of items a single cross-collection move may touch
	/// before the statistics cache falls back to recomputing the affected
	/// collections instead of applying incremental deltas (§4.8).
	pub stats_bulk_move_threshold: usize,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			bind_address: "127.0.0.1:4712".to_string(),
			data_dir: PathBuf::from("./pimd-data"),
			size_threshold_bytes: 4096,
			minimum_check_interval_minutes: 5,
			default_check_interval_minutes: 5,
			literal_read_timeout_secs: 30,
			stats_bulk_move_threshold: 500,
		}
	}
}

impl Config {
	/// Load configuration from a TOML file, falling back to defaults for
	/// any field the file omits (serde's `#[serde(default)]` on the
	/// struct handles the merge).
	pub fn load_from_file(path: &std::path::Path) -> Result<Config, crate::error::PimError> {
		let contents = std::fs::read_to_string(path)?;
		toml::from_str(&contents)
			.map_err(|e| crate::error::PimError::Other { message: format!("invalid config file {}: {}", path.display(), e) })
	}

	/// Apply `PIMD_*` environment variable overrides on top of the given
	/// base configuration.
	pub fn apply_env_overrides(mut self) -> Self {
		if let Ok(v) = std::env::var("PIMD_BIND_ADDRESS") {
			self.bind_address = v;
		}
		if let Ok(v) = std::env::var("PIMD_DATA_DIR") {
			self.data_dir = PathBuf::from(v);
		}
		if let Ok(v) = std::env::var("PIMD_SIZE_THRESHOLD_BYTES") {
			if let Ok(n) = v.parse() {
				self.size_threshold_bytes = n;
			}
		}
		self
	}
}


// vim: ts=4
