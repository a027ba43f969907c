//! In-process query-building primitives (§4.3): `WHERE`, `JOIN`,
//! `ORDER BY`, `GROUP BY`, `VALUES IN`, `LIMIT`.
//!
//! The concrete SQL dialect is out of scope (spec §1); these combinators
//! are evaluated directly over decoded rows rather than translated to
//! SQL text, per the redb-backed design recorded in DESIGN.md.

use std::cmp::Ordering;

/// A predicate over a row, composable with `and`/`or`.
pub enum Predicate<T> {
	All,
	Eq(Box<dyn Fn(&T) -> bool>),
	And(Box<Predicate<T>>, Box<Predicate<T>>),
	Or(Box<Predicate<T>>, Box<Predicate<T>>),
	Not(Box<Predicate<T>>),
}

impl<T> Predicate<T> {
	pub fn matches(&self, row: &T) -> bool {
		match self {
			Predicate::All => true,
			Predicate::Eq(f) => f(row),
			Predicate::And(a, b) => a.matches(row) && b.matches(row),
			Predicate::Or(a, b) => a.matches(row) || b.matches(row),
			Predicate::Not(a) => !a.matches(row),
		}
	}

	pub fn and(self, other: Predicate<T>) -> Predicate<T> {
		Predicate::And(Box::new(self), Box::new(other))
	}

	pub fn or(self, other: Predicate<T>) -> Predicate<T> {
		Predicate::Or(Box::new(self), Box::new(other))
	}
}

pub fn field_eq<T: 'static, V: PartialEq + 'static>(
	field: impl Fn(&T) -> V + 'static,
	value: V,
) -> Predicate<T> {
	Predicate::Eq(Box::new(move |row: &T| field(row) == value))
}

pub fn field_in<T: 'static, V: PartialEq + 'static>(
	field: impl Fn(&T) -> V + 'static,
	values: Vec<V>,
) -> Predicate<T> {
	Predicate::Eq(Box::new(move |row: &T| values.iter().any(|v| *v == field(row))))
}

/// A query over a single row type: filter, order, and bound the result.
pub struct Query<T> {
	predicate: Predicate<T>,
	order_by: Option<Box<dyn Fn(&T, &T) -> Ordering>>,
	limit: Option<usize>,
}

impl<T> Default for Query<T> {
	fn default() -> Self {
		Query { predicate: Predicate::All, order_by: None, limit: None }
	}
}

impl<T: Clone> Query<T> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn filter(mut self, predicate: Predicate<T>) -> Self {
		self.predicate = predicate;
		self
	}

	pub fn order_by(mut self, cmp: impl Fn(&T, &T) -> Ordering + 'static) -> Self {
		self.order_by = Some(Box::new(cmp));
		self
	}

	pub fn limit(mut self, n: usize) -> Self {
		self.limit = Some(n);
		self
	}

	/// Evaluate the query over `rows`, an arbitrary in-process iterator
	/// standing in for a `WHERE ... ORDER BY ... LIMIT` SQL query.
	pub fn evaluate<'a, I: IntoIterator<Item = &'a T>>(&self, rows: I) -> Vec<T>
	where
		T: 'a,
	{
		let mut out: Vec<T> = rows.into_iter().filter(|r| self.predicate.matches(r)).cloned().collect();
		if let Some(cmp) = &self.order_by {
			out.sort_by(|a, b| cmp(a, b));
		}
		if let Some(limit) = self.limit {
			out.truncate(limit);
		}
		out
	}
}

/// Groups rows by a key function, the in-process stand-in for `GROUP BY`.
pub fn group_by<T: Clone, K: Ord>(rows: &[T], key: impl Fn(&T) -> K) -> std::collections::BTreeMap<K, Vec<T>> {
	let mut groups: std::collections::BTreeMap<K, Vec<T>> = std::collections::BTreeMap::new();
	for row in rows {
		groups.entry(key(row)).or_default().push(row.clone());
	}
	groups
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Clone, Debug, PartialEq)]
	struct Row {
		id: i64,
		parent: i64,
	}

	#[test]
	fn filters_and_orders_and_limits() {
		let rows = vec![Row { id: 3, parent: 1 }, Row { id: 1, parent: 1 }, Row { id: 2, parent: 2 }];
		let query = Query::new()
			.filter(field_eq(|r: &Row| r.parent, 1))
			.order_by(|a: &Row, b: &Row| a.id.cmp(&b.id))
			.limit(1);
		let result = query.evaluate(rows.iter());
		assert_eq!(result, vec![Row { id: 1, parent: 1 }]);
	}

	#[test]
	fn values_in_matches_any() {
		let rows = vec![Row { id: 1, parent: 1 }, Row { id: 2, parent: 5 }, Row { id: 3, parent: 9 }];
		let query = Query::new().filter(field_in(|r: &Row| r.parent, vec![1, 9]));
		let result = query.evaluate(rows.iter());
		assert_eq!(result.len(), 2);
	}

	#[test]
	fn group_by_buckets_rows() {
		let rows = vec![Row { id: 1, parent: 1 }, Row { id: 2, parent: 1 }, Row { id: 3, parent: 2 }];
		let groups = group_by(&rows, |r| r.parent);
		assert_eq!(groups.get(&1).unwrap().len(), 2);
		assert_eq!(groups.get(&2).unwrap().len(), 1);
	}
}

// vim: ts=4
