/// RecordTable Grouping and Aggregation
///
/// `groupby` partitions a table by a key and produces one summary record per
/// group, carrying the key column(s) and one value per requested output.
/// Groups are emitted in the order their keys are first seen.
///
/// Outputs are either literal values or [`Aggregator`]s applied to the whole
/// ordered list of a group's records. A rollup spec such as
/// `"SUM:qty,amount;AVG:price"` expands into one aggregator output per field,
/// resolved through an [`AggregatorRegistry`].
///
/// # Examples
///
/// ```
/// use recordtable::{aggregate, record, GroupBy, Table, Value};
///
/// let mut table = Table::new("sales");
/// table.insert(record! { "region" => "east", "qty" => 3 }).unwrap();
/// table.insert(record! { "region" => "west", "qty" => 1 }).unwrap();
/// table.insert(record! { "region" => "east", "qty" => 4 }).unwrap();
///
/// let spec = GroupBy::attr("region")
///     .aggregate("orders", aggregate::count())
///     .rollup("SUM:qty")
///     .include_all("ALL");
/// let summary = table.groupby(&spec).unwrap();
///
/// let east = summary.lookup("region", "east").unwrap().into_vec();
/// assert_eq!(east[0].value("orders"), &Value::Int(2));
/// assert_eq!(east[0].value("qty"), &Value::Int(7));
/// let all = summary.lookup("region", "ALL").unwrap().into_vec();
/// assert_eq!(all[0].value("qty"), &Value::Int(8));
/// ```

use crate::aggregate::{self, Aggregator, AggregatorRegistry};
use crate::error::Result;
use crate::record::{Record, RecordBuilder, RecordRef};
use crate::table::Table;
use crate::value::Value;
use indexmap::IndexMap;
use log::debug;
use std::fmt;
use std::rc::Rc;

type KeyFn = Rc<dyn Fn(&Record) -> Value>;

/// How records are assigned to groups.
#[derive(Clone)]
pub enum GroupKey {
    /// Group on one attribute.
    Attr(String),
    /// Group on the combination of several attributes; each is written back
    /// as its own column.
    Attrs(Vec<String>),
    /// Group on a computed key, written to the named column.
    Func(String, KeyFn),
}

impl GroupKey {
    fn columns(&self) -> Vec<String> {
        match self {
            GroupKey::Attr(attr) => vec![attr.clone()],
            GroupKey::Attrs(attrs) => attrs.clone(),
            GroupKey::Func(name, _) => vec![name.clone()],
        }
    }

    fn key_of(&self, record: &Record) -> Vec<Value> {
        match self {
            GroupKey::Attr(attr) => vec![record.key(attr)],
            GroupKey::Attrs(attrs) => attrs.iter().map(|a| record.key(a)).collect(),
            GroupKey::Func(_, func) => vec![func(record).as_key()],
        }
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Attr(attr) => f.debug_tuple("Attr").field(attr).finish(),
            GroupKey::Attrs(attrs) => f.debug_tuple("Attrs").field(attrs).finish(),
            GroupKey::Func(name, _) => f.debug_tuple("Func").field(name).finish(),
        }
    }
}

/// One output column: a literal, or an aggregate over the group.
#[derive(Debug, Clone)]
pub enum Output {
    Literal(Value),
    Agg(Aggregator),
}

impl Output {
    fn evaluate(&self, name: &str, records: &[RecordRef]) -> Result<Value> {
        match self {
            Output::Literal(value) => Ok(value.clone()),
            Output::Agg(agg) => agg.apply_for(name, records),
        }
    }
}

impl From<Aggregator> for Output {
    fn from(agg: Aggregator) -> Self {
        Output::Agg(agg)
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Literal(value)
    }
}

/// Named output columns plus an optional rollup spec.
#[derive(Debug, Clone, Default)]
pub struct Outputs {
    columns: IndexMap<String, Output>,
    rollup: Option<String>,
    registry: Option<AggregatorRegistry>,
}

impl Outputs {
    pub fn new() -> Self {
        Outputs::default()
    }

    pub fn column(mut self, name: impl Into<String>, output: impl Into<Output>) -> Self {
        self.columns.insert(name.into(), output.into());
        self
    }

    pub fn rollup(mut self, spec: impl Into<String>) -> Self {
        self.rollup = Some(spec.into());
        self
    }

    /// Registry used to resolve the rollup; the standard one by default.
    pub fn registry(mut self, registry: AggregatorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Explicit columns followed by rollup columns. A rollup column replaces
    /// an explicit column of the same name.
    fn resolve(&self) -> Result<IndexMap<String, Output>> {
        let mut columns = self.columns.clone();
        if let Some(spec) = &self.rollup {
            let standard;
            let registry = match &self.registry {
                Some(registry) => registry,
                None => {
                    standard = AggregatorRegistry::standard();
                    &standard
                }
            };
            for (name, agg) in registry.parse_rollup(spec)? {
                columns.insert(name, Output::Agg(agg));
            }
        }
        Ok(columns)
    }
}

/// Groupby specification.
#[derive(Debug, Clone)]
pub struct GroupBy {
    key: GroupKey,
    outputs: Outputs,
    include_all: Option<Value>,
    first_fields: Vec<String>,
}

impl GroupBy {
    pub fn new(key: GroupKey) -> Self {
        GroupBy {
            key,
            outputs: Outputs::new(),
            include_all: None,
            first_fields: Vec::new(),
        }
    }

    pub fn attr(attr: impl Into<String>) -> Self {
        GroupBy::new(GroupKey::Attr(attr.into()))
    }

    pub fn attrs(attrs: &[&str]) -> Self {
        GroupBy::new(GroupKey::Attrs(attrs.iter().map(|a| a.to_string()).collect()))
    }

    pub fn func<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Record) -> Value + 'static,
    {
        GroupBy::new(GroupKey::Func(name.into(), Rc::new(func)))
    }

    pub fn output(mut self, name: impl Into<String>, output: impl Into<Output>) -> Self {
        self.outputs = self.outputs.column(name, output);
        self
    }

    pub fn aggregate(self, name: impl Into<String>, agg: Aggregator) -> Self {
        self.output(name, agg)
    }

    pub fn rollup(mut self, spec: impl Into<String>) -> Self {
        self.outputs = self.outputs.rollup(spec);
        self
    }

    pub fn registry(mut self, registry: AggregatorRegistry) -> Self {
        self.outputs = self.outputs.registry(registry);
        self
    }

    /// Add a row computed over all records, labeled `label` in every key
    /// column.
    pub fn include_all(mut self, label: impl Into<Value>) -> Self {
        self.include_all = Some(label.into());
        self
    }

    /// Copy these fields verbatim from each group's first record. A first
    /// field replaces an output of the same name.
    pub fn first_fields(mut self, fields: &[&str]) -> Self {
        self.first_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

fn summary_record(
    keys: &[(String, Value)],
    outputs: &IndexMap<String, Output>,
    records: &[RecordRef],
) -> Result<RecordBuilder> {
    let mut builder = RecordBuilder::new();
    for (attr, key) in keys {
        builder.set(attr.as_str(), key.clone());
    }
    for (name, output) in outputs {
        builder.set(name.as_str(), output.evaluate(name, records)?);
    }
    Ok(builder)
}

impl Table {
    /// Summarize this table one record per group.
    ///
    /// A single key column gets a unique index (null keys accepted); composite
    /// keys get a non-unique index per column. The rollup is resolved before
    /// any record is grouped, and a failing aggregator aborts the whole call.
    pub fn groupby(&self, spec: &GroupBy) -> Result<Table> {
        let outputs = spec.outputs.resolve()?;
        let columns = spec.key.columns();

        let mut groups: IndexMap<Vec<Value>, Vec<RecordRef>> = IndexMap::new();
        for record in self.iter() {
            groups
                .entry(spec.key.key_of(record))
                .or_default()
                .push(record.clone());
        }
        debug!(
            "Grouped {} records of '{}' by {:?} into {} groups",
            self.len(),
            self.name(),
            columns,
            groups.len()
        );

        let mut result = Table::with_options(self.name(), *self.options());
        match columns.as_slice() {
            [single] => result.create_index(single, true, true)?,
            many => {
                for col in many {
                    result.create_index(col, false, false)?;
                }
            }
        }

        for (key, records) in &groups {
            let keys: Vec<(String, Value)> = columns.iter().cloned().zip(key.iter().cloned()).collect();
            let mut builder = summary_record(&keys, &outputs, records)?;
            if let Some(first) = records.first() {
                for field in &spec.first_fields {
                    builder.overwrite(field.as_str(), first.value(field).clone());
                }
            }
            result.insert(builder.build())?;
        }

        if let Some(label) = &spec.include_all {
            let keys: Vec<(String, Value)> = columns.iter().map(|c| (c.clone(), label.clone())).collect();
            let builder = summary_record(&keys, &outputs, self.records())?;
            result.insert(builder.build())?;
        }
        Ok(result)
    }

    /// Copy of this table with one extra record whose columns are computed
    /// over all records.
    pub fn add_summary_row(&self, outputs: &Outputs) -> Result<Table> {
        let columns = outputs.resolve()?;
        let builder = summary_record(&[], &columns, self.records())?;
        let mut table = self.clone_with(true);
        table.insert(builder.build())?;
        Ok(table)
    }

    /// Map from each distinct value of `attr` to its record count, or to
    /// `agg` of its records when given. Keys appear in first-seen order.
    pub fn histogram(&self, attr: &str, agg: Option<Aggregator>) -> Result<IndexMap<Value, Value>> {
        const OUT: &str = "out";
        let agg = agg.unwrap_or_else(aggregate::count);
        let summary = self.groupby(&GroupBy::attr(attr).aggregate(OUT, agg))?;
        Ok(summary.to_map(attr, OUT))
    }
}
