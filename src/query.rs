/// RecordTable Query Implementation
///
/// A [`Query`] is a conjunction of equality predicates plus optional ordering,
/// a row limit and arbitrary filter functions. [`Table::query`] evaluates it
/// into a new table without touching the receiver.
///
/// # Evaluation order
///
/// 1. Equality predicates narrow the running result one at a time. On large
///    tables the most selective predicate (shortest posting list) goes first;
///    attributes without an index are costed as a full scan.
/// 2. `order_by` sorts the narrowed records (stable, leftmost key dominates).
/// 3. `limit` keeps the first N.
/// 4. Filter functions are applied last, as a linear pass.
///
/// # Examples
///
/// ```
/// use recordtable::{record, Query, Table, Value};
///
/// let mut table = Table::new("people");
/// table.create_index("state", false, false).unwrap();
/// table.insert(record! { "name" => "Ann", "state" => "AZ", "age" => 40 }).unwrap();
/// table.insert(record! { "name" => "Bob", "state" => "AZ", "age" => 25 }).unwrap();
/// table.insert(record! { "name" => "Cy", "state" => "NM", "age" => 31 }).unwrap();
///
/// let query = Query::new()
///     .eq("state", "AZ")
///     .order_by("age")
///     .filter(|r| r.value("age").as_i64().unwrap_or(0) > 20);
/// let result = table.query(&query);
/// assert_eq!(result.column("name"), vec![Value::from("Bob"), Value::from("Ann")]);
/// ```

use crate::record::{Record, RecordRef};
use crate::table::Table;
use crate::value::Value;
use indexmap::IndexMap;
use log::trace;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Estimated cost of a predicate on an attribute with no index.
const FULL_SCAN_COST: usize = 1_000_000_000;

/// Sort order specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Ascending order (smallest first)
    #[default]
    Ascending,
    /// Descending order (largest first)
    Descending,
}

impl SortOrder {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// A single sort key specifying an attribute and order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attr: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn ascending(attr: impl Into<String>) -> Self {
        SortKey {
            attr: attr.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(attr: impl Into<String>) -> Self {
        SortKey {
            attr: attr.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Parse `"a, b desc, c asc"` into sort keys, most significant first.
pub fn parse_order_by(spec: &str) -> Vec<SortKey> {
    spec.split(',')
        .filter_map(|term| {
            let mut words = term.split_whitespace();
            let attr = words.next()?;
            let order = match words.next() {
                Some(dir) if dir.eq_ignore_ascii_case("desc") => SortOrder::Descending,
                _ => SortOrder::Ascending,
            };
            Some(SortKey {
                attr: attr.to_string(),
                order,
            })
        })
        .collect()
}

/// Stable multi-key sort. Keys are applied right to left, so the first key
/// dominates and ties keep their earlier relative order.
pub fn sort_records(records: &mut [RecordRef], keys: &[SortKey]) {
    for key in keys.iter().rev() {
        records.sort_by(|a, b| key.order.apply(a.value(&key.attr).cmp(b.value(&key.attr))));
    }
}

type FilterFn = Rc<dyn Fn(&Record) -> bool>;

/// Query builder: conjunctive equality predicates, ordering, limit and
/// filter functions.
#[derive(Clone, Default)]
pub struct Query {
    predicates: IndexMap<String, Value>,
    order_by: Vec<SortKey>,
    limit: Option<usize>,
    filters: Vec<FilterFn>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    /// Require `attr == value`. Blank values match records where the
    /// attribute is absent, null or empty. Repeating an attribute replaces
    /// its earlier predicate.
    pub fn eq(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.insert(attr.into(), value.into().as_key());
        self
    }

    pub fn order_by(mut self, spec: &str) -> Self {
        self.order_by = parse_order_by(spec);
        self
    }

    pub fn order_by_keys(mut self, keys: Vec<SortKey>) -> Self {
        self.order_by = keys;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a filter function. Multiple filters must all pass.
    pub fn filter<F>(mut self, func: F) -> Self
    where
        F: Fn(&Record) -> bool + 'static,
    {
        self.filters.push(Rc::new(func));
        self
    }

    pub fn predicates(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.predicates.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True if the query carries no equality predicates and no filters.
    pub fn is_unconstrained(&self) -> bool {
        self.predicates.is_empty() && self.filters.is_empty()
    }

    fn passes_filters(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f(record))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("predicates", &self.predicates)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl Table {
    /// Evaluate `query` into a new table holding the matching records, with
    /// the same name, options and index definitions as this one.
    pub fn query(&self, query: &Query) -> Table {
        let mut records = self.match_predicates(query);
        if !query.order_by.is_empty() {
            sort_records(&mut records, &query.order_by);
        }
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        if !query.filters.is_empty() {
            records.retain(|r| query.passes_filters(r));
        }
        self.derive(records)
    }

    /// Convenience for a single equality predicate.
    pub fn where_eq(&self, attr: &str, value: impl Into<Value>) -> Table {
        self.query(&Query::new().eq(attr, value))
    }

    /// Remove every record matched by `query`, returning how many were
    /// removed. A query with no predicates and no filters removes nothing.
    pub fn delete(&mut self, query: &Query) -> usize {
        if query.is_unconstrained() {
            return 0;
        }
        let matched = self.query(query);
        self.remove_many(matched.records())
    }

    /// Estimated result size of one equality predicate.
    fn predicate_cost(&self, attr: &str, value: &Value) -> usize {
        self.index(attr)
            .map(|index| index.posting_len(value))
            .unwrap_or(FULL_SCAN_COST)
    }

    fn match_predicates(&self, query: &Query) -> Vec<RecordRef> {
        let mut predicates: Vec<(&str, &Value)> = query.predicates().collect();
        if predicates.len() > 1 && self.len() > self.options().reorder_threshold {
            predicates.sort_by_key(|(attr, value)| self.predicate_cost(attr, value));
            trace!(
                "Predicate order on '{}': {:?}",
                self.name(),
                predicates.iter().map(|(a, _)| *a).collect::<Vec<_>>()
            );
        }

        let mut predicates = predicates.into_iter();
        let Some((attr, value)) = predicates.next() else {
            return self.records().to_vec();
        };
        let mut running: Vec<RecordRef> = match self.index(attr) {
            Some(index) => index.lookup(value),
            None => self
                .iter()
                .filter(|r| r.key(attr) == *value)
                .cloned()
                .collect(),
        };

        for (attr, value) in predicates {
            if running.is_empty() {
                break;
            }
            match self.index(attr) {
                Some(index) => {
                    let posted: HashSet<*const Record> =
                        index.lookup(value).iter().map(Rc::as_ptr).collect();
                    running.retain(|r| posted.contains(&Rc::as_ptr(r)));
                }
                None => running.retain(|r| r.key(attr) == *value),
            }
        }
        running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::table::TableOptions;

    fn people() -> Table {
        let mut table = Table::new("people");
        table.create_index("state", false, false).unwrap();
        let rows = [
            ("Ann", "AZ", "F", 40),
            ("Bob", "AZ", "M", 25),
            ("Cy", "NM", "M", 31),
            ("Di", "AZ", "F", 25),
            ("Ed", "", "M", 50),
        ];
        for (name, state, sex, age) in rows {
            table
                .insert(record! { "name" => name, "state" => state, "sex" => sex, "age" => age })
                .unwrap();
        }
        table
    }

    fn names(table: &Table) -> Vec<String> {
        table.column("name").iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_order_by() {
        let keys = parse_order_by("state, age desc ,name asc");
        assert_eq!(
            keys,
            vec![
                SortKey::ascending("state"),
                SortKey::descending("age"),
                SortKey::ascending("name"),
            ]
        );
        assert!(parse_order_by(" , ").is_empty());
    }

    #[test]
    fn test_indexed_and_scanned_predicates_agree() {
        let table = people();
        let indexed = table.where_eq("state", "AZ");
        let mut unindexed = table.clone_with(true);
        unindexed.drop_index("state");
        let scanned = unindexed.where_eq("state", "AZ");
        assert_eq!(names(&indexed), vec!["Ann", "Bob", "Di"]);
        assert_eq!(names(&indexed), names(&scanned));
    }

    #[test]
    fn test_blank_predicate_matches_missing_values() {
        let table = people();
        assert_eq!(names(&table.where_eq("state", Value::Null)), vec!["Ed"]);
        assert_eq!(names(&table.where_eq("state", "")), vec!["Ed"]);
    }

    #[test]
    fn test_conjunction_is_order_independent() {
        let options = TableOptions {
            reorder_threshold: 0,
            ..TableOptions::default()
        };
        let mut table = people();
        table.set_options(options);
        let a = table.query(&Query::new().eq("state", "AZ").eq("sex", "F"));
        let b = table.query(&Query::new().eq("sex", "F").eq("state", "AZ"));
        assert_eq!(names(&a), vec!["Ann", "Di"]);
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn test_selectivity_prefers_short_postings() {
        let mut table = people();
        table.create_index("sex", false, false).unwrap();
        assert_eq!(table.predicate_cost("state", &Value::from("NM")), 1);
        assert_eq!(table.predicate_cost("sex", &Value::from("M")), 3);
        assert_eq!(table.predicate_cost("state", &Value::from("TX")), 0);
        assert_eq!(table.predicate_cost("name", &Value::from("Ann")), FULL_SCAN_COST);
    }

    #[test]
    fn test_order_limit_then_filter() {
        let table = people();
        let query = Query::new()
            .order_by("age desc, name")
            .limit(3)
            .filter(|r| r.value("sex").as_str() == Some("M"));
        assert_eq!(names(&table.query(&query)), vec!["Ed", "Cy"]);

        let ordered = table.query(&Query::new().order_by("age, name desc"));
        assert_eq!(names(&ordered), vec!["Di", "Bob", "Cy", "Ann", "Ed"]);
    }

    #[test]
    fn test_query_result_has_fresh_indexes() {
        let table = people();
        let result = table.where_eq("sex", "M");
        assert!(result.has_index("state"));
        assert_eq!(result.lookup("state", "AZ").unwrap().len(), 1);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_delete() {
        let mut table = people();
        assert_eq!(table.delete(&Query::new()), 0);
        assert_eq!(table.len(), 5);

        let removed = table.delete(&Query::new().eq("state", "AZ"));
        assert_eq!(removed, 3);
        assert_eq!(names(&table), vec!["Cy", "Ed"]);
        assert!(table.lookup("state", "AZ").unwrap().is_empty());

        let removed = table.delete(&Query::new().filter(|r| r.value("age").as_i64() == Some(50)));
        assert_eq!(removed, 1);
        assert_eq!(names(&table), vec!["Cy"]);
    }
}
