//! Flag CRUD (§3, §4.7 AppendFlag/RemoveFlag): a global name table plus
//! a many-to-many item↔flag relation. Append/remove are silent unless
//! the caller asks for an observable change (the `\SEEN` toggle that
//! drives statistics, for instance, is always observable).

use std::collections::BTreeSet;

use crate::notify::{ItemChange, ItemOp};
use crate::types::{EntityId, FlagId, SessionId};

use super::txn::Transaction;

impl Transaction {
	pub fn intern_flag(&mut self, name: &str) -> FlagId {
		self.tables.intern_flag(name)
	}

	pub fn flag_name(&self, id: FlagId) -> Option<&str> {
		self.tables.flag_names.get(&id).map(String::as_str)
	}

	pub fn flags_of(&self, item_id: EntityId) -> BTreeSet<FlagId> {
		self.tables.item_flags.get(&item_id).cloned().unwrap_or_default()
	}

	pub fn has_flag(&self, item_id: EntityId, flag_name: &str) -> bool {
		let Some(flag_id) = self.tables.flag_ids.get(flag_name) else {
			return false;
		};
		self.tables.item_flags.get(&item_id).is_some_and(|flags| flags.contains(flag_id))
	}

	/// Appends `flag_names` to `item_id`. `observable = true` emits an
	/// `ItemChange::ModifyFlags` with changed-parts `{"FLAGS"}` when the
	/// flag set actually changed; silent append is used for bookkeeping
	/// flags the protocol doesn't want surfaced to subscribers.
	pub fn append_flags(
		&mut self,
		item_id: EntityId,
		flag_names: &[String],
		observable: bool,
		session_id: SessionId,
	) {
		let mut changed = false;
		for name in flag_names {
			let id = self.tables.intern_flag(name);
			if self.tables.item_flags.entry(item_id).or_default().insert(id) {
				changed = true;
			}
		}
		if changed && observable {
			self.emit_flags_changed(item_id, session_id);
		}
	}

	pub fn remove_flags(
		&mut self,
		item_id: EntityId,
		flag_names: &[String],
		observable: bool,
		session_id: SessionId,
	) {
		let mut changed = false;
		if let Some(flags) = self.tables.item_flags.get_mut(&item_id) {
			for name in flag_names {
				if let Some(&id) = self.tables.flag_ids.get(name) {
					if flags.remove(&id) {
						changed = true;
					}
				}
			}
		}
		if changed && observable {
			self.emit_flags_changed(item_id, session_id);
		}
	}

	fn emit_flags_changed(&mut self, item_id: EntityId, session_id: SessionId) {
		let mime_type_id = self.tables.items.get(&item_id).map(|i| i.mime_type_id);
		let collection_id = self.tables.items.get(&item_id).map(|i| i.collection_id);
		let mut changed_parts = std::collections::BTreeSet::new();
		changed_parts.insert("FLAGS".to_string());
		self.collector.record_item_change(ItemChange {
			op: ItemOp::ModifyFlags,
			item_ids: vec![item_id],
			mime_type_id,
			source_parent: collection_id,
			dest_parent: None,
			source_resource: None,
			dest_resource: None,
			session_id,
			changed_parts,
		});
	}
}

// vim: ts=4
