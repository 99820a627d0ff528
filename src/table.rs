/// RecordTable Table Implementation
///
/// A Table is an ordered sequence of records plus a set of indexes keyed by
/// attribute name. Records carry no schema; any two records in the same table
/// may have different attributes.
///
/// Every mutation keeps the indexes and the record sequence in step: a
/// rejected insert or index build leaves the table exactly as it was.
///
/// # Examples
///
/// ```
/// use recordtable::{record, Query, Table, Value};
///
/// let mut table = Table::new("cities");
/// table.create_index("id", true, false).unwrap();
/// table.create_index("city", false, false).unwrap();
///
/// table.insert(record! { "id" => 1, "city" => "A" }).unwrap();
/// table.insert(record! { "id" => 2, "city" => "B" }).unwrap();
/// table.insert(record! { "id" => 3, "city" => "A" }).unwrap();
///
/// // Unique index rejects a duplicate key
/// assert!(table.insert(record! { "id" => 1, "city" => "C" }).is_err());
/// assert_eq!(table.len(), 3);
///
/// let found = table.query(&Query::new().eq("city", "A"));
/// assert_eq!(found.column("id"), vec![Value::Int(1), Value::Int(3)]);
/// ```

use crate::aggregate;
use crate::error::{Error, Result};
use crate::index::{Index, IndexLookup};
use crate::query::{parse_order_by, sort_records, SortKey, SortOrder};
use crate::record::{Record, RecordRef};
use crate::value::Value;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;
use std::rc::Rc;

/// Tunables shared by a table and every table derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Multi-predicate queries on tables larger than this are evaluated most
    /// selective predicate first.
    pub reorder_threshold: usize,
    /// Build a missing index on a join attribute instead of failing.
    pub auto_index_joins: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            reorder_threshold: 100,
            auto_index_joins: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    name: String,
    records: Vec<RecordRef>,
    indexes: IndexMap<String, Index>,
    known_fields: Vec<String>,
    options: TableOptions,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table::with_options(name, TableOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: TableOptions) -> Self {
        Table {
            name: name.into(),
            records: Vec::new(),
            indexes: IndexMap::new(),
            known_fields: Vec::new(),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: TableOptions) {
        self.options = options;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordRef> {
        self.records.iter()
    }

    pub fn records(&self) -> &[RecordRef] {
        &self.records
    }

    pub fn get(&self, position: usize) -> Option<&RecordRef> {
        self.records.get(position)
    }

    /// True if this exact record (by identity) is in the table.
    pub fn contains(&self, record: &RecordRef) -> bool {
        self.records.iter().any(|r| Rc::ptr_eq(r, record))
    }

    // ========================================================================
    // Insert / Remove
    // ========================================================================

    /// Insert a record, posting it into every index.
    ///
    /// All unique indexes are validated before anything is mutated, so a
    /// failed insert leaves the table unchanged. Returns the shared handle of
    /// the stored record.
    pub fn insert(&mut self, record: impl Into<RecordRef>) -> Result<RecordRef> {
        let record = record.into();
        for index in self.indexes.values().filter(|ind| ind.is_unique()) {
            index.check(&record.key(index.attr()))?;
        }
        for index in self.indexes.values_mut() {
            index.post(record.key(index.attr()), record.clone());
        }
        self.records.push(record.clone());
        Ok(record)
    }

    /// Insert records in order, stopping at the first rejected one. Records
    /// inserted before the failure remain.
    pub fn insert_many<I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<RecordRef>,
    {
        let mut count = 0;
        for record in records {
            self.insert(record)?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove one occurrence of `record` (by identity) from every index and
    /// from the sequence. Returns false if it was not present.
    pub fn remove(&mut self, record: &RecordRef) -> bool {
        let Some(pos) = self.records.iter().position(|r| Rc::ptr_eq(r, record)) else {
            return false;
        };
        for index in self.indexes.values_mut() {
            index.remove(record);
        }
        self.records.remove(pos);
        true
    }

    pub fn remove_many<'a, I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = &'a RecordRef>,
    {
        records.into_iter().filter(|r| self.remove(r)).count()
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Create an index on `attr`. A no-op if one already exists.
    ///
    /// The index is built from all current records; if any record violates
    /// the uniqueness or null policy the partial index is discarded and the
    /// error returned.
    pub fn create_index(&mut self, attr: &str, unique: bool, accept_null: bool) -> Result<()> {
        if self.indexes.contains_key(attr) {
            return Ok(());
        }
        let mut index = Index::new(attr, unique, accept_null);
        for record in &self.records {
            if let Err(err) = index.insert(record.key(attr), record.clone()) {
                warn!("Discarding index '{}' on table '{}': {}", attr, self.name, err);
                return Err(err);
            }
        }
        debug!(
            "Created {} index '{}' on table '{}' ({} keys)",
            if unique { "unique" } else { "non-unique" },
            attr,
            self.name,
            index.size()
        );
        self.indexes.insert(attr.to_string(), index);
        Ok(())
    }

    pub fn drop_index(&mut self, attr: &str) -> bool {
        self.indexes.shift_remove(attr).is_some()
    }

    pub fn has_index(&self, attr: &str) -> bool {
        self.indexes.contains_key(attr)
    }

    pub fn index(&self, attr: &str) -> Option<&Index> {
        self.indexes.get(attr)
    }

    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(|k| k.as_str())
    }

    /// Direct index access: a single record for unique indexes, the posting
    /// list for non-unique ones.
    pub fn lookup(&self, attr: &str, key: impl Into<Value>) -> Result<IndexLookup> {
        let index = self
            .indexes
            .get(attr)
            .ok_or_else(|| Error::UnknownAttribute(attr.to_string()))?;
        Ok(index.get(&key.into()))
    }

    // ========================================================================
    // Derived tables
    // ========================================================================

    /// Empty table with the same name, options and index definitions.
    pub fn copy_template(&self) -> Table {
        Table {
            name: self.name.clone(),
            records: Vec::new(),
            indexes: self
                .indexes
                .iter()
                .map(|(attr, ind)| (attr.clone(), ind.copy_template()))
                .collect(),
            known_fields: self.known_fields.clone(),
            options: self.options,
        }
    }

    /// Copy of this table. Index definitions are always copied; records are
    /// shared with the source only when `with_records` is set.
    pub fn clone_with(&self, with_records: bool) -> Table {
        if with_records {
            self.derive(self.records.iter().cloned())
        } else {
            self.copy_template()
        }
    }

    /// Table with this table's definitions holding `records`, which must come
    /// from this table so they already satisfy its unique indexes.
    pub(crate) fn derive<I>(&self, records: I) -> Table
    where
        I: IntoIterator<Item = RecordRef>,
    {
        let mut table = self.copy_template();
        for record in records {
            table.post(record);
        }
        table
    }

    fn post(&mut self, record: RecordRef) {
        for index in self.indexes.values_mut() {
            index.post(record.key(index.attr()), record.clone());
        }
        self.records.push(record);
    }

    /// Rebuild every index from the record sequence, keeping posting order
    /// equal to sequence order.
    fn reindex(&mut self) {
        for index in self.indexes.values_mut() {
            let mut fresh = index.copy_template();
            for record in &self.records {
                fresh.post(record.key(fresh.attr()), record.clone());
            }
            *index = fresh;
        }
    }

    pub fn slice(&self, range: Range<usize>) -> Table {
        let end = range.end.min(self.records.len());
        let start = range.start.min(end);
        self.derive(self.records[start..end].iter().cloned())
    }

    /// Records of `self` followed by records of `other`, validated against
    /// this table's unique indexes.
    pub fn concat(&self, other: &Table) -> Result<Table> {
        let mut table = self.clone_with(true);
        table.insert_many(other.records.iter().cloned())?;
        Ok(table)
    }

    /// First record for each distinct combination of `fields`.
    pub fn unique(&self, fields: &[&str]) -> Table {
        let mut seen: HashSet<Vec<Value>> = HashSet::new();
        self.derive(
            self.records
                .iter()
                .filter(|r| seen.insert(fields.iter().map(|f| r.key(f)).collect()))
                .cloned(),
        )
    }

    // ========================================================================
    // Sorting
    // ========================================================================

    /// Sort in place by an order-by string such as `"state, population desc"`.
    /// The leftmost attribute dominates; sorting is stable.
    pub fn sort(&mut self, order_by: &str) {
        let keys = parse_order_by(order_by);
        self.sort_by_keys(&keys);
    }

    pub fn sort_by_keys(&mut self, keys: &[SortKey]) {
        sort_records(&mut self.records, keys);
        self.reindex();
    }

    /// Stable in-place sort by a key function.
    pub fn sort_by<F>(&mut self, key: F, reverse: bool)
    where
        F: Fn(&Record) -> Value,
    {
        let order = if reverse {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        self.records.sort_by(|a, b| order.apply(key(a).cmp(&key(b))));
        self.reindex();
    }

    // ========================================================================
    // Fields and projection
    // ========================================================================

    /// Declared field names, or the first record's attribute names.
    pub fn fields(&self) -> Vec<String> {
        if !self.known_fields.is_empty() {
            return self.known_fields.clone();
        }
        self.records
            .first()
            .map(|r| r.attr_names().map(String::from).collect())
            .unwrap_or_default()
    }

    pub fn set_known_fields<S: Into<String>>(&mut self, fields: impl IntoIterator<Item = S>) {
        self.known_fields = fields.into_iter().map(Into::into).collect();
    }

    /// Each record's value for `attr`, `Null` where absent.
    pub fn column(&self, attr: &str) -> Vec<Value> {
        self.records.iter().map(|r| r.value(attr).clone()).collect()
    }

    /// Map from one attribute to another; later records overwrite earlier.
    pub fn to_map(&self, key_attr: &str, value_attr: &str) -> IndexMap<Value, Value> {
        self.records
            .iter()
            .map(|r| (r.key(key_attr), r.value(value_attr).clone()))
            .collect()
    }

    /// New table of records projected onto `fields`, keeping the indexes on
    /// the fields that survive.
    pub fn select(&self, fields: &[&str]) -> Table {
        self.project(|attr| fields.contains(&attr))
    }

    pub fn drop_fields(&self, fields: &[&str]) -> Table {
        self.project(|attr| !fields.contains(&attr))
    }

    fn project(&self, keep: impl Fn(&str) -> bool) -> Table {
        let mut table = self.copy_template();
        table.indexes.retain(|attr, _| keep(attr.as_str()));
        table.known_fields.retain(|attr| keep(attr.as_str()));
        for record in &self.records {
            let projected: Record = record
                .iter()
                .filter(|(attr, _)| keep(*attr))
                .map(|(attr, value)| (attr, value.clone()))
                .collect();
            table.post(projected.into_ref());
        }
        table
    }

    /// Rename attributes in place. Records are rebuilt, so handles held from
    /// before the call no longer belong to the table.
    ///
    /// Indexes follow their attribute and are rebuilt with full key checks.
    /// If a renamed record breaks a unique index the table is left unchanged.
    pub fn rename_fields(&mut self, renames: &[(&str, &str)]) -> Result<()> {
        let rename = |attr: &str| -> String {
            renames
                .iter()
                .find(|(from, _)| *from == attr)
                .map(|(_, to)| to.to_string())
                .unwrap_or_else(|| attr.to_string())
        };
        let records: Vec<RecordRef> = self
            .records
            .iter()
            .map(|record| {
                record
                    .iter()
                    .map(|(attr, value)| (rename(attr), value.clone()))
                    .collect::<Record>()
                    .into_ref()
            })
            .collect();

        let mut indexes = IndexMap::with_capacity(self.indexes.len());
        for (attr, ind) in &self.indexes {
            let renamed = rename(attr.as_str());
            let mut fresh = Index::new(renamed.clone(), ind.is_unique(), ind.accepts_null());
            for record in &records {
                if let Err(err) = fresh.insert(record.key(&renamed), record.clone()) {
                    warn!("Rename on table '{}' rejected: {}", self.name, err);
                    return Err(err);
                }
            }
            indexes.insert(renamed, fresh);
        }

        self.records = records;
        self.indexes = indexes;
        self.known_fields = self.known_fields.iter().map(|f| rename(f.as_str())).collect();
        Ok(())
    }

    /// New table whose records carry an extra attribute computed by `func`.
    /// When `func` yields `None` the attribute is set to `default`. An
    /// existing attribute of the same name is replaced.
    pub fn add_field<F>(&self, name: &str, func: F, default: Value) -> Result<Table>
    where
        F: Fn(&Record) -> Option<Value>,
    {
        let mut table = self.copy_template();
        if !table.known_fields.is_empty() && !table.known_fields.iter().any(|f| f == name) {
            table.known_fields.push(name.to_string());
        }
        for record in &self.records {
            let value = func(record).unwrap_or_else(|| default.clone());
            let mut builder = record.to_builder();
            builder.overwrite(name, value);
            table.insert(builder.build())?;
        }
        Ok(table)
    }

    // ========================================================================
    // Column arithmetic
    // ========================================================================

    pub fn sum(&self, attr: &str) -> Result<Value> {
        aggregate::sum(attr).apply(&self.records)
    }

    pub fn avg(&self, attr: &str) -> Result<Value> {
        aggregate::avg(attr).apply(&self.records)
    }

    pub fn min(&self, attr: &str) -> Result<Value> {
        aggregate::min(attr).apply(&self.records)
    }

    pub fn max(&self, attr: &str) -> Result<Value> {
        aggregate::max(attr).apply(&self.records)
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a RecordRef;
    type IntoIter = std::slice::Iter<'a, RecordRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
