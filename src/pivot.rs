/// RecordTable Pivot Implementation
///
/// A pivot recursively partitions a table by a list of indexed attributes.
/// Each level holds one child per distinct key of the next attribute, in
/// ascending key order, so every record of the root lands in exactly one
/// leaf. Children at a level enumerate the keys of the whole source table, so
/// sibling sub-tables share one key set and may be empty.
///
/// # Examples
///
/// ```
/// use recordtable::{record, Table, Value};
///
/// let mut table = Table::new("sales");
/// table.create_index("region", false, false).unwrap();
/// table.create_index("product", false, false).unwrap();
/// table.insert(record! { "region" => "east", "product" => "hat" }).unwrap();
/// table.insert(record! { "region" => "west", "product" => "hat" }).unwrap();
/// table.insert(record! { "region" => "east", "product" => "cap" }).unwrap();
///
/// let pivot = table.pivot(&["region", "product"]).unwrap();
/// assert_eq!(pivot.keys(), vec![Value::from("east"), Value::from("west")]);
///
/// let east = pivot.get(&Value::from("east")).unwrap();
/// assert_eq!(east.len(), 2);
/// assert_eq!(east.get(&Value::from("cap")).unwrap().pivot_key_str(), "region:east/product:cap");
/// ```

use crate::aggregate::Aggregator;
use crate::error::{Error, Result};
use crate::record::{RecordBuilder, RecordRef};
use crate::table::Table;
use crate::value::Value;
use log::debug;
use std::fmt::Write;
use std::ops::Deref;

/// Name of the record-count column in summary tables.
pub const COUNT_COLUMN: &str = "Count";

#[derive(Debug, Clone)]
pub struct PivotTable {
    table: Table,
    path: Vec<(String, Value)>,
    pivot_attrs: Vec<String>,
    subtables: Vec<PivotTable>,
}

impl Table {
    /// Partition this table by `attrs`, outermost first. Every attribute must
    /// be indexed.
    pub fn pivot(&self, attrs: &[&str]) -> Result<PivotTable> {
        let missing: Vec<String> = attrs
            .iter()
            .filter(|a| !self.has_index(a))
            .map(|a| a.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::UnindexedPivotAttribute(missing));
        }
        let attrs: Vec<String> = attrs.iter().map(|a| a.to_string()).collect();
        debug!("Pivoting '{}' on {:?}", self.name(), attrs);
        Ok(PivotTable::build(self, self.clone_with(true), Vec::new(), &attrs))
    }
}

impl PivotTable {
    fn build(source: &Table, table: Table, path: Vec<(String, Value)>, attrs: &[String]) -> PivotTable {
        let subtables = match attrs.split_first() {
            Some((attr, rest)) => source
                .index(attr)
                .map(|index| index.sorted_keys())
                .unwrap_or_default()
                .into_iter()
                .map(|key| {
                    let sub = table.where_eq(attr, key.clone());
                    let mut sub_path = path.clone();
                    sub_path.push((attr.clone(), key));
                    PivotTable::build(source, sub, sub_path, rest)
                })
                .collect(),
            None => Vec::new(),
        };
        PivotTable {
            table,
            path,
            pivot_attrs: attrs.to_vec(),
            subtables,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Attributes this level and the levels below it pivot on.
    pub fn pivot_attrs(&self) -> &[String] {
        &self.pivot_attrs
    }

    pub fn subtables(&self) -> &[PivotTable] {
        &self.subtables
    }

    pub fn has_subtables(&self) -> bool {
        !self.subtables.is_empty()
    }

    /// The (attribute, value) pairs selecting this table from the source.
    pub fn pivot_key(&self) -> &[(String, Value)] {
        &self.path
    }

    /// Pivot key as `attr:value/attr:value`.
    pub fn pivot_key_str(&self) -> String {
        self.path
            .iter()
            .map(|(attr, key)| format!("{}:{}", attr, key))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// This level's own key (the last path entry); `Null` at the root.
    pub fn key(&self) -> Value {
        self.path.last().map(|(_, k)| k.clone()).unwrap_or_default()
    }

    /// Keys of the child tables, ascending.
    pub fn keys(&self) -> Vec<Value> {
        self.subtables.iter().map(PivotTable::key).collect()
    }

    /// Child table for `key`.
    pub fn get(&self, key: &Value) -> Option<&PivotTable> {
        let key = key.as_key();
        self.subtables.iter().find(|sub| sub.key() == key)
    }

    /// Leaf tables in key order.
    pub fn leaves(&self) -> Vec<&PivotTable> {
        if self.subtables.is_empty() {
            return vec![self];
        }
        self.subtables.iter().flat_map(PivotTable::leaves).collect()
    }

    // ========================================================================
    // Reports
    // ========================================================================

    /// Nested listing of the pivot. `limit` caps the rows shown per leaf.
    pub fn dump<W: Write>(&self, out: &mut W, limit: Option<usize>) -> Result<()> {
        self.dump_level(out, limit, 0)
    }

    fn dump_level<W: Write>(&self, out: &mut W, limit: Option<usize>, indent: usize) -> Result<()> {
        if indent == 0 {
            writeln!(out, "Pivot: {}", self.pivot_attrs.join(","))?;
        } else {
            writeln!(out, "{}{}", "  ".repeat(indent), self.pivot_key_str())?;
        }
        if self.has_subtables() {
            for sub in self.subtables.iter().filter(|s| !s.is_empty()) {
                sub.dump_level(out, limit, indent + 1)?;
            }
        } else {
            let shown = limit.unwrap_or(self.len()).min(self.len());
            for record in &self.records()[..shown] {
                writeln!(out, "{}{}", "  ".repeat(indent + 1), record)?;
            }
        }
        Ok(())
    }

    /// Tabular report of counts, or of `agg` when given, for pivots of 1 to 3
    /// attributes. Two attributes form a grid with row and column totals;
    /// three attributes print one grid per outer key.
    pub fn dump_counts<W: Write>(&self, out: &mut W, agg: Option<&Aggregator>) -> Result<()> {
        let depth = self.pivot_attrs.len();
        if !(1..=3).contains(&depth) {
            return Err(Error::UnsupportedPivotDepth(depth));
        }
        let measure = |records: &[RecordRef]| -> Result<Value> {
            match agg {
                Some(agg) => agg.apply_for(agg.name(), records),
                None => Ok(Value::from(records.len())),
            }
        };
        writeln!(out, "Pivot: {}", self.pivot_attrs.join(","))?;
        match depth {
            1 => {
                let width = self.keys().iter().map(|k| k.to_string().len()).max().unwrap_or(0);
                for sub in &self.subtables {
                    writeln!(
                        out,
                        "{:<width$} {:>7}",
                        sub.key().to_string(),
                        measure(sub.records())?.to_string(),
                        width = width
                    )?;
                }
            }
            2 => self.write_grid(out, &measure)?,
            _ => {
                for sub in &self.subtables {
                    writeln!(out, "{}", sub.pivot_key_str())?;
                    sub.write_grid(out, &measure)?;
                }
            }
        }
        Ok(())
    }

    fn write_grid<W, F>(&self, out: &mut W, measure: &F) -> Result<()>
    where
        W: Write,
        F: Fn(&[RecordRef]) -> Result<Value>,
    {
        let columns: Vec<Value> = self
            .subtables
            .first()
            .map(PivotTable::keys)
            .unwrap_or_default();
        let key_width = self
            .keys()
            .iter()
            .map(|k| k.to_string().len())
            .max()
            .unwrap_or(0)
            .max(5);
        let col_width = columns
            .iter()
            .map(|k| k.to_string().len())
            .max()
            .unwrap_or(0)
            .max(7);

        let header: Vec<String> = columns
            .iter()
            .map(|k| format!("{:>w$.w$}", k.to_string(), w = col_width))
            .collect();
        writeln!(out, "{:kw$} {}   Total", "", header.join(" "), kw = key_width)?;

        let mut column_records: Vec<Vec<RecordRef>> = vec![Vec::new(); columns.len()];
        for sub in &self.subtables {
            write!(out, "{:<kw$.kw$} ", sub.key().to_string(), kw = key_width)?;
            for (i, cell) in sub.subtables.iter().enumerate() {
                write!(out, "{:>w$} ", measure(cell.records())?.to_string(), w = col_width)?;
                if let Some(bucket) = column_records.get_mut(i) {
                    bucket.extend(cell.records().iter().cloned());
                }
            }
            writeln!(out, "{:>7}", measure(sub.records())?.to_string())?;
        }

        let totals = column_records
            .iter()
            .map(|recs| Ok(format!("{:>w$}", measure(recs)?.to_string(), w = col_width)))
            .collect::<Result<Vec<String>>>()?;
        writeln!(
            out,
            "{:<kw$.kw$} {} {:>7}",
            "Total",
            totals.join(" "),
            measure(self.records())?.to_string(),
            kw = key_width
        )?;
        Ok(())
    }

    /// Flat table of one record per leaf for pivots of 1 to 3 attributes.
    ///
    /// Each record carries the leaf's pivot key attributes plus either a
    /// `Count` column or, when `summary` is given, the named aggregate of the
    /// leaf's records. The result has a non-unique index per pivot attribute.
    pub fn summary_counts(&self, summary: Option<(&str, &Aggregator)>) -> Result<Table> {
        let depth = self.pivot_attrs.len();
        if !(1..=3).contains(&depth) {
            return Err(Error::UnsupportedPivotDepth(depth));
        }
        let mut result = Table::with_options("summary", *self.options());
        for attr in &self.pivot_attrs {
            result.create_index(attr, false, false)?;
        }
        for leaf in self.leaves() {
            let mut builder = RecordBuilder::new();
            for (attr, key) in &leaf.path[self.path.len()..] {
                builder.set(attr.as_str(), key.clone());
            }
            match summary {
                Some((name, agg)) => builder.set(name, agg.apply_for(name, leaf.records())?),
                None => builder.set(COUNT_COLUMN, leaf.len()),
            };
            result.insert(builder.build())?;
        }
        Ok(result)
    }
}

impl Deref for PivotTable {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.table
    }
}
