/// RecordTable Join Implementation
///
/// Equi-join of two tables on one attribute from each side. Both attributes
/// must be indexed; a missing index is built for the duration of the call
/// unless auto-indexing is turned off, in which case the join fails.
///
/// The index with fewer distinct keys drives the join: for each of its keys
/// that the other index also holds, every pairing of the two posting lists
/// produces one output record. Null keys never match.
///
/// Output records are new records. Each carries the requested columns, or by
/// default every attribute of each side's first record. When both sides
/// supply the same output name the left side wins.
///
/// # Examples
///
/// ```
/// use recordtable::{record, JoinSpec, Table, Value};
///
/// let mut orders = Table::new("orders");
/// orders.insert(record! { "custid" => 1, "amt" => 10 }).unwrap();
/// orders.insert(record! { "custid" => 2, "amt" => 5 }).unwrap();
///
/// let mut customers = Table::new("customers");
/// customers.create_index("id", true, false).unwrap();
/// customers.insert(record! { "id" => 1, "name" => "X" }).unwrap();
/// customers.insert(record! { "id" => 2, "name" => "Y" }).unwrap();
///
/// let joined = orders.join(&customers, &JoinSpec::new("custid", "id")).unwrap();
/// assert_eq!(joined.name(), "(orders:custid^customers:id)");
/// assert_eq!(joined.len(), 2);
/// assert!(joined.iter().all(|r| r.has("amt") && r.has("name")));
/// ```

use crate::error::{Error, Result};
use crate::index::Index;
use crate::record::{RecordBuilder, RecordRef};
use crate::table::Table;
use log::debug;
use std::borrow::Cow;
use std::cell::RefCell;
use std::ops::Add;
use std::rc::Rc;

/// Which input table a join column is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

/// One output column of a join: a source attribute, optionally pinned to a
/// side, written under `alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumn {
    pub side: Option<JoinSide>,
    pub attr: String,
    pub alias: String,
}

impl JoinColumn {
    /// Column taken from whichever side's sample record has it, left first.
    pub fn named(attr: impl Into<String>) -> Self {
        let attr = attr.into();
        JoinColumn {
            side: None,
            alias: attr.clone(),
            attr,
        }
    }

    pub fn left(attr: impl Into<String>) -> Self {
        JoinColumn {
            side: Some(JoinSide::Left),
            ..JoinColumn::named(attr)
        }
    }

    pub fn right(attr: impl Into<String>) -> Self {
        JoinColumn {
            side: Some(JoinSide::Right),
            ..JoinColumn::named(attr)
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }
}

impl From<&str> for JoinColumn {
    fn from(attr: &str) -> Self {
        JoinColumn::named(attr)
    }
}

/// Parse a list of column names separated by commas, semicolons or
/// whitespace.
pub fn parse_columns(spec: &str) -> Vec<JoinColumn> {
    spec.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(JoinColumn::named)
        .collect()
}

/// Parameters of a two-table join.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub left_attr: String,
    pub right_attr: String,
    pub columns: Option<Vec<JoinColumn>>,
    /// Overrides the left table's `auto_index_joins` option.
    pub auto_index: Option<bool>,
}

impl JoinSpec {
    pub fn new(left_attr: impl Into<String>, right_attr: impl Into<String>) -> Self {
        JoinSpec {
            left_attr: left_attr.into(),
            right_attr: right_attr.into(),
            columns: None,
            auto_index: None,
        }
    }

    /// Join on an attribute with the same name on both sides.
    pub fn on(attr: impl Into<String>) -> Self {
        let attr = attr.into();
        JoinSpec::new(attr.clone(), attr)
    }

    pub fn columns<C: Into<JoinColumn>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn auto_index(mut self, enabled: bool) -> Self {
        self.auto_index = Some(enabled);
        self
    }
}

impl Table {
    /// Equi-join this table (left) with `other` (right).
    ///
    /// Either side being empty yields an empty table, before any index or
    /// column checks. The result is named `(left:attr^right:attr)` and gets a
    /// non-unique index on every output column whose source attribute was
    /// indexed on its side.
    pub fn join(&self, other: &Table, spec: &JoinSpec) -> Result<Table> {
        let name = format!(
            "({}:{}^{}:{})",
            self.name(),
            spec.left_attr,
            other.name(),
            spec.right_attr
        );
        let mut result = Table::with_options(name, *self.options());
        if self.is_empty() || other.is_empty() {
            return Ok(result);
        }

        let (left_cols, right_cols) = resolve_columns(self, other, spec.columns.as_deref())?;

        let auto_index = spec.auto_index.unwrap_or(self.options().auto_index_joins);
        let left_index = self.join_index(&spec.left_attr, auto_index)?;
        let right_index = other.join_index(&spec.right_attr, auto_index)?;

        for (table, cols, join_attr) in [
            (self, &left_cols, &spec.left_attr),
            (other, &right_cols, &spec.right_attr),
        ] {
            for col in cols.iter() {
                if table.has_index(&col.attr) || col.attr == *join_attr {
                    result.create_index(&col.alias, false, false)?;
                }
            }
        }

        let left_drives = left_index.size() < right_index.size();
        debug!(
            "Joining '{}' ({} keys) with '{}' ({} keys), driving from the {} side",
            self.name(),
            left_index.size(),
            other.name(),
            right_index.size(),
            if left_drives { "left" } else { "right" }
        );
        let (driver, probe) = if left_drives {
            (&left_index, &right_index)
        } else {
            (&right_index, &left_index)
        };

        for (key, driver_rows) in driver.entries() {
            let probe_rows = probe.lookup(key);
            if probe_rows.is_empty() {
                continue;
            }
            let (left_rows, right_rows): (&[RecordRef], &[RecordRef]) = if left_drives {
                (driver_rows, probe_rows.as_slice())
            } else {
                (probe_rows.as_slice(), driver_rows)
            };
            for left in left_rows {
                for right in right_rows {
                    let mut builder = RecordBuilder::new();
                    for (rec, cols) in [(left, &left_cols), (right, &right_cols)] {
                        for col in cols.iter() {
                            if let Some(value) = rec.get(&col.attr) {
                                builder.set(col.alias.as_str(), value.clone());
                            }
                        }
                    }
                    result.insert(builder.build())?;
                }
            }
        }
        Ok(result)
    }

    /// Index on `attr` for joining: the table's own, or a temporary one when
    /// auto-indexing is allowed.
    fn join_index(&self, attr: &str, auto_index: bool) -> Result<Cow<'_, Index>> {
        if let Some(index) = self.index(attr) {
            return Ok(Cow::Borrowed(index));
        }
        if !auto_index {
            return Err(Error::UnindexedJoinAttribute(attr.to_string()));
        }
        debug!("Building join index on '{}' for table '{}'", attr, self.name());
        let mut index = Index::new(attr, false, false);
        for record in self.iter() {
            index.insert(record.key(attr), record.clone())?;
        }
        Ok(Cow::Owned(index))
    }
}

/// Split the requested columns by side. Unpinned columns go to the left if
/// its sample record has them, else to the right.
fn resolve_columns(
    left: &Table,
    right: &Table,
    columns: Option<&[JoinColumn]>,
) -> Result<(Vec<JoinColumn>, Vec<JoinColumn>)> {
    let left_sample = left.get(0);
    let right_sample = right.get(0);
    let Some(columns) = columns else {
        let pinned = |sample: Option<&RecordRef>, side: JoinSide| -> Vec<JoinColumn> {
            sample
                .map(|rec| {
                    rec.attr_names()
                        .map(|attr| JoinColumn {
                            side: Some(side),
                            ..JoinColumn::named(attr)
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        return Ok((
            pinned(left_sample, JoinSide::Left),
            pinned(right_sample, JoinSide::Right),
        ));
    };

    let has = |sample: Option<&RecordRef>, attr: &str| sample.is_some_and(|r| r.has(attr));
    let mut left_cols = Vec::new();
    let mut right_cols = Vec::new();
    for col in columns {
        let side = match col.side {
            Some(side) => side,
            None if has(left_sample, &col.attr) => JoinSide::Left,
            None if has(right_sample, &col.attr) => JoinSide::Right,
            None => return Err(Error::UnknownAttribute(col.attr.clone())),
        };
        match side {
            JoinSide::Left => left_cols.push(col.clone()),
            JoinSide::Right => right_cols.push(col.clone()),
        }
    }
    Ok((left_cols, right_cols))
}

// ============================================================================
// Deferred joins
// ============================================================================

/// A table and the indexed attribute it joins on, not yet executed.
#[derive(Debug, Clone)]
pub struct JoinTerm {
    table: Rc<RefCell<Table>>,
    attr: String,
}

impl JoinTerm {
    /// Fails with `UnindexedJoinAttribute` unless `attr` is indexed.
    pub fn on(table: &Rc<RefCell<Table>>, attr: &str) -> Result<JoinTerm> {
        if !table.borrow().has_index(attr) {
            return Err(Error::UnindexedJoinAttribute(attr.to_string()));
        }
        Ok(JoinTerm {
            table: Rc::clone(table),
            attr: attr.to_string(),
        })
    }

    pub fn table(&self) -> &Rc<RefCell<Table>> {
        &self.table
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Chain with a table joined on the same attribute name.
    pub fn with(self, table: &Rc<RefCell<Table>>) -> Result<JoinChain> {
        let next = JoinTerm::on(table, &self.attr)?;
        Ok(self + next)
    }

    /// Execute a single term: a copy of its table.
    pub fn execute(&self) -> Table {
        self.table.borrow().clone_with(true)
    }
}

/// Left-to-right composition of join terms, executed on demand.
#[derive(Debug, Clone)]
pub struct JoinChain {
    terms: Vec<JoinTerm>,
}

impl JoinChain {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Chain another table joined on the last term's attribute name.
    pub fn with(self, table: &Rc<RefCell<Table>>) -> Result<JoinChain> {
        let attr = match self.terms.last() {
            Some(term) => term.attr.clone(),
            None => return Ok(self),
        };
        let next = JoinTerm::on(table, &attr)?;
        Ok(self + next)
    }

    /// Run the joins left to right. Each later term joins the accumulated
    /// result, on that term's attribute name, to its table. `columns` applies
    /// only to the final join.
    pub fn execute(&self, columns: Option<Vec<JoinColumn>>) -> Result<Table> {
        let mut terms = self.terms.iter();
        let Some(first) = terms.next() else {
            return Ok(Table::new(""));
        };
        let Some(second) = terms.next() else {
            return Ok(first.execute());
        };
        let remaining = self.terms.len() - 2;

        let spec = |left: &str, right: &str, last: bool| {
            let spec = JoinSpec::new(left, right);
            match (&columns, last) {
                (Some(cols), true) => spec.columns(cols.clone()),
                _ => spec,
            }
        };

        let mut acc = first.table.borrow().join(
            &second.table.borrow(),
            &spec(&first.attr, &second.attr, remaining == 0),
        )?;
        for (i, term) in terms.enumerate() {
            acc.create_index(&term.attr, false, false)?;
            acc = acc.join(
                &term.table.borrow(),
                &spec(&term.attr, &term.attr, i + 1 == remaining),
            )?;
        }
        Ok(acc)
    }
}

impl From<JoinTerm> for JoinChain {
    fn from(term: JoinTerm) -> Self {
        JoinChain { terms: vec![term] }
    }
}

impl Add<JoinTerm> for JoinTerm {
    type Output = JoinChain;

    fn add(self, other: JoinTerm) -> JoinChain {
        JoinChain {
            terms: vec![self, other],
        }
    }
}

impl Add<JoinTerm> for JoinChain {
    type Output = JoinChain;

    fn add(mut self, other: JoinTerm) -> JoinChain {
        self.terms.push(other);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::value::Value;

    fn orders() -> Table {
        let mut table = Table::new("orders");
        table.create_index("custid", false, false).unwrap();
        table
            .insert_many(vec![
                record! { "orderid" => 100, "custid" => 1, "amt" => 10, "sku" => "A" },
                record! { "orderid" => 101, "custid" => 2, "amt" => 5, "sku" => "B" },
                record! { "orderid" => 102, "custid" => 1, "amt" => 7, "sku" => "B" },
                record! { "orderid" => 103, "custid" => 9, "amt" => 1, "sku" => "A" },
            ])
            .unwrap();
        table
    }

    fn customers() -> Table {
        let mut table = Table::new("customers");
        table.create_index("id", true, false).unwrap();
        table
            .insert_many(vec![
                record! { "id" => 1, "name" => "X" },
                record! { "id" => 2, "name" => "Y" },
                record! { "id" => 3, "name" => "Z" },
            ])
            .unwrap();
        table
    }

    fn skus() -> Table {
        let mut table = Table::new("skus");
        table.create_index("sku", true, false).unwrap();
        table
            .insert_many(vec![
                record! { "sku" => "A", "descr" => "anvil" },
                record! { "sku" => "B", "descr" => "bucket" },
            ])
            .unwrap();
        table
    }

    #[test]
    fn test_join_cardinality_and_columns() {
        let joined = orders().join(&customers(), &JoinSpec::new("custid", "id")).unwrap();
        assert_eq!(joined.len(), 3);
        for rec in joined.iter() {
            assert_eq!(rec.value("custid"), rec.value("id"));
            assert!(rec.has("amt") && rec.has("name"));
        }
        assert!(joined.has_index("custid"));
        assert!(joined.has_index("id"));
        assert!(!joined.index("id").unwrap().is_unique());
    }

    #[test]
    fn test_join_is_symmetric_in_content() {
        let forward = orders().join(&customers(), &JoinSpec::new("custid", "id")).unwrap();
        let backward = customers().join(&orders(), &JoinSpec::new("id", "custid")).unwrap();
        let mut a: Vec<Value> = forward.column("orderid");
        let mut b: Vec<Value> = backward.column("orderid");
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_join_with_column_list_and_alias() {
        let spec = JoinSpec::new("custid", "id").columns(vec![
            JoinColumn::named("orderid"),
            JoinColumn::right("name").alias("customer"),
            JoinColumn::named("amt"),
        ]);
        let joined = orders().join(&customers(), &spec).unwrap();
        let fields: Vec<String> = joined.get(0).unwrap().attr_names().map(String::from).collect();
        assert_eq!(fields, vec!["orderid", "amt", "customer"]);
    }

    #[test]
    fn test_left_side_wins_on_name_clash() {
        let mut left = Table::new("l");
        left.insert(record! { "k" => 1, "v" => "left" }).unwrap();
        let mut right = Table::new("r");
        right.insert(record! { "k" => 1, "v" => "right" }).unwrap();
        let joined = left.join(&right, &JoinSpec::on("k")).unwrap();
        assert_eq!(joined.get(0).unwrap().value("v"), &Value::from("left"));
    }

    #[test]
    fn test_join_errors() {
        let customers = customers();
        let err = orders()
            .join(&customers, &JoinSpec::new("sku", "id").auto_index(false))
            .unwrap_err();
        assert!(matches!(err, Error::UnindexedJoinAttribute(attr) if attr == "sku"));

        let spec = JoinSpec::new("custid", "id").columns(["bogus"]);
        assert!(matches!(
            orders().join(&customers, &spec),
            Err(Error::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_empty_side_yields_empty_result() {
        let empty = Table::new("empty");
        let joined = orders()
            .join(&empty, &JoinSpec::new("custid", "nothing").auto_index(false))
            .unwrap();
        assert!(joined.is_empty());
        assert_eq!(joined.name(), "(orders:custid^empty:nothing)");
    }

    #[test]
    fn test_null_keys_never_match() {
        let mut left = Table::new("l");
        left.insert(record! { "k" => "", "v" => 1 }).unwrap();
        left.insert(record! { "v" => 2 }).unwrap();
        let mut right = Table::new("r");
        right.insert(record! { "k" => "", "w" => 3 }).unwrap();
        let joined = left.join(&right, &JoinSpec::on("k")).unwrap();
        assert!(joined.is_empty());
    }

    #[test]
    fn test_join_term_requires_index() {
        let table = Rc::new(RefCell::new(orders()));
        assert!(JoinTerm::on(&table, "custid").is_ok());
        assert!(matches!(
            JoinTerm::on(&table, "amt"),
            Err(Error::UnindexedJoinAttribute(_))
        ));
    }

    #[test]
    fn test_join_chain() {
        let customers = Rc::new(RefCell::new(customers()));
        let orders = Rc::new(RefCell::new(orders()));
        let skus = Rc::new(RefCell::new(skus()));

        let chain = JoinTerm::on(&customers, "id").unwrap()
            + JoinTerm::on(&orders, "custid").unwrap()
            + JoinTerm::on(&skus, "sku").unwrap();
        assert_eq!(chain.len(), 3);

        let result = chain
            .execute(Some(parse_columns("name orderid descr")))
            .unwrap();
        assert_eq!(result.len(), 3);
        let mut rows: Vec<(String, String)> = result
            .iter()
            .map(|r| (r.value("orderid").to_string(), r.value("descr").to_string()))
            .collect();
        rows.sort();
        assert_eq!(
            rows,
            vec![
                ("100".to_string(), "anvil".to_string()),
                ("101".to_string(), "bucket".to_string()),
                ("102".to_string(), "bucket".to_string()),
            ]
        );
        assert_eq!(result.fields(), vec!["name", "orderid", "descr"]);
    }

    #[test]
    fn test_term_with_table_of_same_attribute() {
        let orders = Rc::new(RefCell::new(orders()));
        let skus = Rc::new(RefCell::new(skus()));
        let mut by_sku = orders.borrow().clone_with(true);
        by_sku.create_index("sku", false, false).unwrap();
        let by_sku = Rc::new(RefCell::new(by_sku));

        let chain = JoinTerm::on(&by_sku, "sku").unwrap().with(&skus).unwrap();
        assert_eq!(chain.execute(None).unwrap().len(), 4);
        assert_eq!(JoinTerm::on(&orders, "custid").unwrap().execute().len(), 4);
    }
}
