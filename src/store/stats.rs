//! Statistics cache (C8): per-collection `(count, unread, size)`
//! maintained incrementally (§4.8).

use std::collections::BTreeMap;

use crate::types::EntityId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
	pub count: i64,
	pub unread: i64,
	pub size: i64,
}

#[derive(Clone, Copy)]
enum Mode {
	/// All collections loaded; subsequent reads are pure lookups.
	Prefetched,
	/// A collection is computed lazily the first time it's asked for.
	OnDemand,
}

#[derive(Clone)]
pub struct StatsCache {
	mode: Mode,
	entries: BTreeMap<EntityId, CollectionStats>,
	/// Moves touching more than this many items invalidate the cache
	/// entries for both sides instead of updating them incrementally,
	/// matching the "fall back to recomputation" rule of §4.8.
	bulk_move_threshold: usize,
}

impl Default for StatsCache {
	/// Placeholder used only as the swapped-out half of `mem::take` during
	/// transaction rollback; never left installed as a live cache.
	fn default() -> Self {
		StatsCache { mode: Mode::OnDemand, entries: BTreeMap::new(), bulk_move_threshold: 0 }
	}
}

impl StatsCache {
	pub fn prefetched(entries: BTreeMap<EntityId, CollectionStats>, bulk_move_threshold: usize) -> Self {
		StatsCache { mode: Mode::Prefetched, entries, bulk_move_threshold }
	}

	pub fn on_demand(bulk_move_threshold: usize) -> Self {
		StatsCache { mode: Mode::OnDemand, entries: BTreeMap::new(), bulk_move_threshold }
	}

    /// Returns the cached stats for `collection_id`, or `None` when in
    /// on-demand mode and the collection hasn't been computed yet —
    /// callers fall back to a full recomputation via the store in that
    /// case and then call `load`.
	pub fn get(&self, collection_id: EntityId) -> Option<CollectionStats> {
		self.entries.get(&collection_id).copied()
	}

	pub fn load(&mut self, collection_id: EntityId, stats: CollectionStats) {
		self.entries.insert(collection_id, stats);
	}

	pub fn item_added(&mut self, collection_id: EntityId, size: i64, seen: bool) {
		let entry = self.entries.entry(collection_id).or_default();
		entry.count += 1;
		if !seen {
			entry.unread += 1;
		}
		entry.size += size;
	}

	pub fn item_removed(&mut self, collection_id: EntityId, size: i64, seen: bool) {
		let entry = self.entries.entry(collection_id).or_default();
		entry.count -= 1;
		if !seen {
			entry.unread -= 1;
		}
		entry.size -= size;
	}

	pub fn items_seen_changed(&mut self, collection_id: EntityId, delta: i64) {
		let entry = self.entries.entry(collection_id).or_default();
		entry.unread -= delta;
	}

	/// Invalidates the entries for a cross-collection move of `moved_count`
	/// items; returns `true` when the bulk threshold was exceeded and the
	/// caller must recompute both collections from scratch.
	pub fn invalidate_on_move(&mut self, source: EntityId, dest: EntityId, moved_count: usize) -> bool {
		if moved_count > self.bulk_move_threshold {
			self.entries.remove(&source);
			self.entries.remove(&dest);
			true
		} else {
			false
		}
	}
}

impl super::txn::Transaction {
	/// Feeds `StatsCache::item_added` from `item_id`'s just-written state
	/// (§4.8 CreateItem); call once a freshly created item's size and
	/// flags are settled, not for the merge-into-existing-item path.
	pub fn note_item_added(&mut self, item_id: EntityId) {
		let Some(item) = self.tables.items.get(&item_id) else { return };
		let collection_id = item.collection_id;
		let size = item.size;
		let seen = self.has_flag(item_id, "\\Seen");
		self.stats.item_added(collection_id, size, seen);
	}

	/// Feeds `StatsCache::item_removed` for an item about to be deleted
	/// (§4.8 Expunge); must run before `delete_item` removes its row.
	pub fn note_item_removed(&mut self, item_id: EntityId) {
		let Some(item) = self.tables.items.get(&item_id) else { return };
		let collection_id = item.collection_id;
		let size = item.size;
		let seen = self.has_flag(item_id, "\\Seen");
		self.stats.item_removed(collection_id, size, seen);
	}

	/// Feeds `StatsCache::items_seen_changed` when an `\Seen` toggle
	/// actually flipped (§4.8 AppendFlag/RemoveFlag).
	pub fn note_seen_changed(&mut self, item_id: EntityId, was_seen: bool, is_seen: bool) {
		if was_seen == is_seen {
			return;
		}
		let Some(collection_id) = self.tables.items.get(&item_id).map(|i| i.collection_id) else { return };
		self.stats.items_seen_changed(collection_id, if is_seen { 1 } else { -1 });
	}

	/// Feeds `StatsCache::invalidate_on_move`, falling back to a per-item
	/// `item_removed`+`item_added` pair below the bulk threshold (§4.8
	/// MoveItems). `items` is each moved item's `(size, seen)` captured
	/// before the move.
	pub fn note_items_moved(&mut self, source: EntityId, dest: EntityId, items: &[(i64, bool)]) {
		if items.is_empty() {
			return;
		}
		let invalidated = self.stats.invalidate_on_move(source, dest, items.len());
		if !invalidated {
			for &(size, seen) in items {
				self.stats.item_removed(source, size, seen);
				self.stats.item_added(dest, size, seen);
			}
		}
	}

	/// Returns `collection_id`'s cached stats, computing and warming the
	/// cache on first access in on-demand mode (§4.8's "stats.count
	/// equals the number of items with parent-id = col..." identity).
	pub fn collection_stats(&mut self, collection_id: EntityId) -> CollectionStats {
		if let Some(stats) = self.stats.get(collection_id) {
			return stats;
		}
		let computed = self.compute_collection_stats(collection_id);
		self.stats.load(collection_id, computed);
		computed
	}

	fn compute_collection_stats(&self, collection_id: EntityId) -> CollectionStats {
		let mut stats = CollectionStats::default();
		for item in self.tables.items.values().filter(|i| i.collection_id == collection_id) {
			stats.count += 1;
			stats.size += item.size;
			if !self.has_flag(item.id, "\\Seen") {
				stats.unread += 1;
			}
		}
		stats
	}
}


// vim: ts=4
