/// RecordTable Index Implementation
///
/// An index maps one attribute's values to the records carrying them. It is
/// owned by exactly one table and only ever references that table's records.
///
/// Two variants:
/// - `UniqueIndex`: one record per non-null key, duplicates rejected. Null keys
///   are either rejected or collected into a separate null set, per the
///   index's accept-null policy.
/// - `NonUniqueIndex`: an ordered posting list per key, insertion order kept.
///   The null key is always accepted and indexed like any other key.
///
/// Keys are normalized with [`Value::as_key`], so absent, `Null` and blank
/// attribute values all land on the null key.

use crate::error::{Error, Result};
use crate::record::RecordRef;
use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;

/// Typed result of a direct index lookup.
#[derive(Debug, Clone)]
pub enum IndexLookup {
    /// Unique index, non-null key: at most one record.
    One(Option<RecordRef>),
    /// Non-unique index, or the null set of a unique index.
    Many(Vec<RecordRef>),
}

impl IndexLookup {
    pub fn into_vec(self) -> Vec<RecordRef> {
        match self {
            IndexLookup::One(rec) => rec.into_iter().collect(),
            IndexLookup::Many(recs) => recs,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexLookup::One(rec) => rec.is_some() as usize,
            IndexLookup::Many(recs) => recs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct NonUniqueIndex {
    attr: String,
    postings: IndexMap<Value, Vec<RecordRef>>,
}

impl NonUniqueIndex {
    pub fn new(attr: impl Into<String>) -> Self {
        NonUniqueIndex {
            attr: attr.into(),
            postings: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, key: Value, record: RecordRef) {
        self.postings.entry(key.as_key()).or_default().push(record);
    }

    pub fn lookup(&self, key: &Value) -> &[RecordRef] {
        self.postings
            .get(&key.as_key())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Remove one posting of `record`. Absent records are ignored.
    pub fn remove(&mut self, record: &RecordRef) {
        let key = record.key(&self.attr);
        let emptied = match self.postings.get_mut(&key) {
            Some(list) => {
                if let Some(pos) = list.iter().position(|r| Rc::ptr_eq(r, record)) {
                    list.remove(pos);
                }
                list.is_empty()
            }
            None => false,
        };
        if emptied {
            self.postings.shift_remove(&key);
        }
    }

    pub fn size(&self) -> usize {
        self.postings.len()
    }
}

#[derive(Debug, Clone)]
pub struct UniqueIndex {
    attr: String,
    accept_null: bool,
    entries: IndexMap<Value, RecordRef>,
    nulls: Vec<RecordRef>,
}

impl UniqueIndex {
    pub fn new(attr: impl Into<String>, accept_null: bool) -> Self {
        UniqueIndex {
            attr: attr.into(),
            accept_null,
            entries: IndexMap::new(),
            nulls: Vec::new(),
        }
    }

    pub fn accepts_null(&self) -> bool {
        self.accept_null
    }

    /// Validate that `key` could be inserted, without inserting it.
    pub fn check(&self, key: &Value) -> Result<()> {
        let key = key.as_key();
        if key.is_null() {
            if !self.accept_null {
                return Err(Error::NullKeyRejected {
                    index: self.attr.clone(),
                });
            }
        } else if self.entries.contains_key(&key) {
            return Err(Error::DuplicateKey {
                index: self.attr.clone(),
                key,
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, key: Value, record: RecordRef) -> Result<()> {
        self.check(&key)?;
        self.post(key, record);
        Ok(())
    }

    fn post(&mut self, key: Value, record: RecordRef) {
        let key = key.as_key();
        if key.is_null() {
            self.nulls.push(record);
        } else {
            self.entries.insert(key, record);
        }
    }

    pub fn get(&self, key: &Value) -> IndexLookup {
        let key = key.as_key();
        if key.is_null() {
            IndexLookup::Many(self.nulls.clone())
        } else {
            IndexLookup::One(self.entries.get(&key).cloned())
        }
    }

    /// Remove `record` if it is the one stored under its key.
    pub fn remove(&mut self, record: &RecordRef) {
        let key = record.key(&self.attr);
        if key.is_null() {
            if let Some(pos) = self.nulls.iter().position(|r| Rc::ptr_eq(r, record)) {
                self.nulls.remove(pos);
            }
        } else if self
            .entries
            .get(&key)
            .is_some_and(|stored| Rc::ptr_eq(stored, record))
        {
            self.entries.shift_remove(&key);
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len() + usize::from(!self.nulls.is_empty())
    }
}

/// An index owned by a table.
#[derive(Debug, Clone)]
pub enum Index {
    Unique(UniqueIndex),
    NonUnique(NonUniqueIndex),
}

impl Index {
    pub fn new(attr: impl Into<String>, unique: bool, accept_null: bool) -> Self {
        if unique {
            Index::Unique(UniqueIndex::new(attr, accept_null))
        } else {
            Index::NonUnique(NonUniqueIndex::new(attr))
        }
    }

    pub fn attr(&self) -> &str {
        match self {
            Index::Unique(ind) => &ind.attr,
            Index::NonUnique(ind) => &ind.attr,
        }
    }

    pub fn is_unique(&self) -> bool {
        matches!(self, Index::Unique(_))
    }

    /// Non-unique indexes always accept the null key.
    pub fn accepts_null(&self) -> bool {
        match self {
            Index::Unique(ind) => ind.accept_null,
            Index::NonUnique(_) => true,
        }
    }

    /// Validate a key against the uniqueness and null policies.
    pub fn check(&self, key: &Value) -> Result<()> {
        match self {
            Index::Unique(ind) => ind.check(key),
            Index::NonUnique(_) => Ok(()),
        }
    }

    pub fn insert(&mut self, key: Value, record: RecordRef) -> Result<()> {
        match self {
            Index::Unique(ind) => ind.insert(key, record),
            Index::NonUnique(ind) => {
                ind.insert(key, record);
                Ok(())
            }
        }
    }

    /// Post a record whose key is known to be valid for this index, such as
    /// a record copied from a table that already carries the same index.
    pub(crate) fn post(&mut self, key: Value, record: RecordRef) {
        match self {
            Index::Unique(ind) => ind.post(key, record),
            Index::NonUnique(ind) => ind.insert(key, record),
        }
    }

    /// Records stored under `key`, in insertion order. Missing keys yield an
    /// empty sequence.
    pub fn lookup(&self, key: &Value) -> Vec<RecordRef> {
        self.get(key).into_vec()
    }

    pub fn get(&self, key: &Value) -> IndexLookup {
        match self {
            Index::Unique(ind) => ind.get(key),
            Index::NonUnique(ind) => IndexLookup::Many(ind.lookup(key).to_vec()),
        }
    }

    /// Posting-list length for `key`, without copying the postings.
    pub fn posting_len(&self, key: &Value) -> usize {
        match self {
            Index::Unique(ind) => ind.get(key).len(),
            Index::NonUnique(ind) => ind.lookup(key).len(),
        }
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.posting_len(key) > 0
    }

    pub fn remove(&mut self, record: &RecordRef) {
        match self {
            Index::Unique(ind) => ind.remove(record),
            Index::NonUnique(ind) => ind.remove(record),
        }
    }

    /// Number of distinct keys, counting the null key once if present.
    pub fn size(&self) -> usize {
        match self {
            Index::Unique(ind) => ind.size(),
            Index::NonUnique(ind) => ind.size(),
        }
    }

    /// Distinct keys in ascending order (the null key sorts first).
    pub fn sorted_keys(&self) -> Vec<Value> {
        let mut keys: Vec<Value> = match self {
            Index::Unique(ind) => {
                let mut keys: Vec<Value> = ind.entries.keys().cloned().collect();
                if !ind.nulls.is_empty() {
                    keys.push(Value::Null);
                }
                keys
            }
            Index::NonUnique(ind) => ind.postings.keys().cloned().collect(),
        };
        keys.sort();
        keys
    }

    /// Non-null keys with their postings, in first-insertion order.
    pub fn entries(&self) -> Box<dyn Iterator<Item = (&Value, &[RecordRef])> + '_> {
        match self {
            Index::Unique(ind) => Box::new(
                ind.entries
                    .iter()
                    .map(|(k, r)| (k, std::slice::from_ref(r))),
            ),
            Index::NonUnique(ind) => Box::new(
                ind.postings
                    .iter()
                    .filter(|(k, _)| !k.is_null())
                    .map(|(k, v)| (k, v.as_slice())),
            ),
        }
    }

    /// Every record reachable through this index, null key included.
    pub fn records(&self) -> Vec<RecordRef> {
        match self {
            Index::Unique(ind) => ind
                .entries
                .values()
                .chain(ind.nulls.iter())
                .cloned()
                .collect(),
            Index::NonUnique(ind) => ind.postings.values().flatten().cloned().collect(),
        }
    }

    /// Empty index with the same attribute and policy.
    pub fn copy_template(&self) -> Index {
        match self {
            Index::Unique(ind) => Index::Unique(UniqueIndex::new(ind.attr.clone(), ind.accept_null)),
            Index::NonUnique(ind) => Index::NonUnique(NonUniqueIndex::new(ind.attr.clone())),
        }
    }
}
