/// RecordTable Named-Table Registry
///
/// Intermediate results can be saved under a name and fetched later in the
/// same computation. The registry is an ordinary value owned by the caller;
/// nothing is registered implicitly.
///
/// Saved tables are shared as `Rc<RefCell<Table>>`, the same handle that
/// [`JoinTerm`](crate::JoinTerm) works with.

use crate::error::Result;
use crate::table::Table;
use crate::value::Value;
use indexmap::IndexMap;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: IndexMap<String, Rc<RefCell<Table>>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        TableRegistry::default()
    }

    /// Save `table` under `name` and return the registered handle.
    ///
    /// With `reuse`, an existing entry wins and `table` is dropped; without
    /// it, the entry is replaced.
    pub fn save(&mut self, name: &str, table: Table, reuse: bool) -> Rc<RefCell<Table>> {
        if reuse {
            if let Some(existing) = self.tables.get(name) {
                return Rc::clone(existing);
            }
        }
        debug!("Saving table '{}' ({} records) as '{}'", table.name(), table.len(), name);
        let handle = Rc::new(RefCell::new(table));
        self.tables.insert(name.to_string(), Rc::clone(&handle));
        handle
    }

    pub fn fetch(&self, name: &str) -> Option<Rc<RefCell<Table>>> {
        self.tables.get(name).cloned()
    }

    /// Saved table, or a new empty table if nothing is saved under `name`.
    pub fn fetch_or_empty(&self, name: &str) -> Rc<RefCell<Table>> {
        self.fetch(name)
            .unwrap_or_else(|| Rc::new(RefCell::new(Table::new(name))))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn remove(&mut self, name: &str) -> Option<Rc<RefCell<Table>>> {
        self.tables.shift_remove(name)
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    /// Sum of `attr` over a saved table; an unknown name sums to `Int(0)`.
    pub fn sum_column(&self, name: &str, attr: &str) -> Result<Value> {
        match self.tables.get(name) {
            Some(table) => table.borrow().sum(attr),
            None => Ok(Value::Int(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn scores(name: &str, values: &[i64]) -> Table {
        let mut table = Table::new(name);
        for v in values {
            table.insert(record! { "score" => *v }).unwrap();
        }
        table
    }

    #[test]
    fn test_save_and_fetch() {
        let mut registry = TableRegistry::new();
        let handle = registry.save("top", scores("a", &[1, 2]), true);
        handle.borrow_mut().insert(record! { "score" => 3 }).unwrap();

        let fetched = registry.fetch("top").unwrap();
        assert!(Rc::ptr_eq(&handle, &fetched));
        assert_eq!(fetched.borrow().len(), 3);
        assert!(registry.fetch("missing").is_none());
    }

    #[test]
    fn test_reuse_keeps_existing() {
        let mut registry = TableRegistry::new();
        registry.save("t", scores("first", &[1]), true);
        let kept = registry.save("t", scores("second", &[5, 6]), true);
        assert_eq!(kept.borrow().name(), "first");

        let replaced = registry.save("t", scores("third", &[7]), false);
        assert_eq!(replaced.borrow().name(), "third");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_fetch_or_empty_and_clear() {
        let mut registry = TableRegistry::new();
        assert!(registry.fetch_or_empty("nothing").borrow().is_empty());
        assert!(!registry.contains("nothing"));

        registry.save("x", scores("x", &[1]), true);
        registry.save("y", scores("y", &[2]), true);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["x", "y"]);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sum_column() {
        let mut registry = TableRegistry::new();
        registry.save("s", scores("s", &[4, 5, 6]), true);
        assert_eq!(registry.sum_column("s", "score").unwrap(), Value::Int(15));
        assert_eq!(registry.sum_column("none", "score").unwrap(), Value::Int(0));
    }
}
