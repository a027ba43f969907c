//! Sequence sets: comma-separated lists of intervals (§4.1).
//!
//! An interval is `a`, `a:b`, or `a:*` where `*` means open-ended; `:*` on
//! its own (or bare `*`) means everything. Parsing accepts `*:b` and
//! normalises it to `b:*` reversed-order form internally (both ends are
//! kept as given; enumeration always walks low to high).

use std::fmt;

use crate::types::EntityId;

/// A single `a`, `a:b`, or `a:*` (or `*` alone) interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
	Single(EntityId),
	Bounded(EntityId, EntityId),
	OpenEnded(EntityId),
	/// Bare `*`: matches everything; only meaningful as the sole interval
	/// in a set.
	Everything,
}

/// A parsed sequence set: an ordered list of intervals in textual order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceSet {
	intervals: Vec<Interval>,
}

impl SequenceSet {
	pub fn new(intervals: Vec<Interval>) -> Self {
		SequenceSet { intervals }
	}

	pub fn single(id: EntityId) -> Self {
		SequenceSet { intervals: vec![Interval::Single(id)] }
	}

	pub fn is_empty(&self) -> bool {
		self.intervals.is_empty()
	}

	/// Parse a textual sequence set, e.g. `"1,3:5,9:*"` or `"*"`.
	pub fn parse(text: &str) -> Result<SequenceSet, String> {
		let mut intervals = Vec::new();
		for part in text.split(',') {
			let part = part.trim();
			if part.is_empty() {
				return Err(format!("empty component in sequence set '{}'", text));
			}
			if part == "*" {
				intervals.push(Interval::Everything);
				continue;
			}
			if let Some((lo, hi)) = part.split_once(':') {
				if lo == "*" && hi == "*" {
					intervals.push(Interval::Everything);
				} else if hi == "*" {
					let lo: EntityId =
						lo.parse().map_err(|_| format!("invalid interval start '{}'", lo))?;
					intervals.push(Interval::OpenEnded(lo));
				} else if lo == "*" {
					// `*:b` normalises to `b:*` per §4.1.
					let hi: EntityId =
						hi.parse().map_err(|_| format!("invalid interval end '{}'", hi))?;
					intervals.push(Interval::OpenEnded(hi));
				} else {
					let lo: EntityId =
						lo.parse().map_err(|_| format!("invalid interval start '{}'", lo))?;
					let hi: EntityId =
						hi.parse().map_err(|_| format!("invalid interval end '{}'", hi))?;
					let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
					intervals.push(Interval::Bounded(lo, hi));
				}
			} else {
				let id: EntityId = part.parse().map_err(|_| format!("invalid id '{}'", part))?;
				intervals.push(Interval::Single(id));
			}
		}
		Ok(SequenceSet { intervals })
	}

	/// Enumerate the ids this set denotes, given the maximum id currently
	/// known to the caller (used to resolve open-ended and `*` intervals).
	/// Order follows interval order, ascending within each bounded
	/// interval; duplicates across overlapping intervals are not removed
	/// (callers that need a set can collect into one).
	pub fn enumerate(&self, max_known_id: EntityId) -> Vec<EntityId> {
		let mut out = Vec::new();
		for interval in &self.intervals {
			match *interval {
				Interval::Single(id) => out.push(id),
				Interval::Bounded(lo, hi) => out.extend(lo..=hi),
				Interval::OpenEnded(lo) => {
					if lo <= max_known_id {
						out.extend(lo..=max_known_id);
					}
				}
				Interval::Everything => {
					out.extend(1..=max_known_id);
				}
			}
		}
		out
	}
}

impl fmt::Display for SequenceSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let parts: Vec<String> = self
			.intervals
			.iter()
			.map(|iv| match iv {
				Interval::Single(id) => id.to_string(),
				Interval::Bounded(lo, hi) => format!("{}:{}", lo, hi),
				Interval::OpenEnded(lo) => format!("{}:*", lo),
				Interval::Everything => "*".to_string(),
			})
			.collect();
		write!(f, "{}", parts.join(","))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_single_ids() {
		let set = SequenceSet::parse("1,3,5").unwrap();
		assert_eq!(set.enumerate(10), vec![1, 3, 5]);
	}

	#[test]
	fn parses_bounded_interval() {
		let set = SequenceSet::parse("3:5").unwrap();
		assert_eq!(set.enumerate(10), vec![3, 4, 5]);
	}

	#[test]
	fn parses_open_ended_interval() {
		let set = SequenceSet::parse("8:*").unwrap();
		assert_eq!(set.enumerate(10), vec![8, 9, 10]);
	}

	#[test]
	fn normalises_star_colon_b() {
		let set = SequenceSet::parse("*:5").unwrap();
		// *:5 normalises to 5:* (open-ended from 5), per §4.1.
		assert_eq!(set.enumerate(7), vec![5, 6, 7]);
	}

	#[test]
	fn bare_star_means_everything() {
		let set = SequenceSet::parse("*").unwrap();
		assert_eq!(set.enumerate(3), vec![1, 2, 3]);
	}

	#[test]
	fn rejects_empty_component() {
		assert!(SequenceSet::parse("1,,3").is_err());
	}

	#[test]
	fn mixed_set_preserves_order() {
		let set = SequenceSet::parse("1,3:5,9:*").unwrap();
		assert_eq!(set.enumerate(11), vec![1, 3, 4, 5, 9, 10, 11]);
	}
}

// vim: ts=4
