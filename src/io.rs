/// RecordTable Import and Export
///
/// Delimited text (CSV and TSV) through the `csv` crate, and JSON arrays of
/// objects through `serde_json`.
///
/// Imported fields are strings named by the header row. Per-field
/// [`Transform`]s turn that text into typed values, falling back to a default
/// when the transform fails or the field is missing. Export writes a fixed
/// field list and substitutes a placeholder for records that lack a field.
///
/// # Examples
///
/// ```
/// use recordtable::io::{self, ExportOptions, ImportOptions, Transform};
/// use recordtable::{Table, Value};
///
/// let text = "id,name\n1,Ann\nx,Bo\n";
/// let mut table = Table::new("people");
/// let options = ImportOptions::new().transform("id", Transform::int(Value::Int(-1)));
/// io::import_csv(&mut table, text.as_bytes(), &options).unwrap();
/// assert_eq!(table.column("id"), vec![Value::Int(1), Value::Int(-1)]);
///
/// let mut out = Vec::new();
/// io::export_csv(&table, &mut out, &ExportOptions::new()).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "id,name\n1,Ann\n-1,Bo\n");
/// ```

use crate::error::Result;
use crate::record::{Record, RecordBuilder};
use crate::table::Table;
use crate::value::Value;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use indexmap::IndexMap;
use log::debug;
use std::fmt;
use std::io::{Read, Write};
use std::rc::Rc;

/// Field separator and quoting convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Comma separated, quoted as needed.
    #[default]
    Csv,
    /// Tab separated, never quoted.
    Tsv,
}

impl Dialect {
    fn delimiter(self) -> u8 {
        match self {
            Dialect::Csv => b',',
            Dialect::Tsv => b'\t',
        }
    }
}

type TransformFn = Rc<dyn Fn(&str) -> Option<Value>>;

/// Conversion applied to one imported field. `None` from the function, or a
/// missing field, yields `default`.
#[derive(Clone)]
pub struct Transform {
    func: TransformFn,
    default: Value,
}

impl Transform {
    pub fn new<F>(func: F, default: impl Into<Value>) -> Self
    where
        F: Fn(&str) -> Option<Value> + 'static,
    {
        Transform {
            func: Rc::new(func),
            default: default.into(),
        }
    }

    pub fn int(default: impl Into<Value>) -> Self {
        Transform::new(|s| s.trim().parse::<i64>().ok().map(Value::Int), default)
    }

    pub fn float(default: impl Into<Value>) -> Self {
        Transform::new(|s| s.trim().parse::<f64>().ok().map(Value::Float), default)
    }

    fn apply(&self, raw: Option<&str>) -> Value {
        raw.and_then(|s| (self.func)(s))
            .unwrap_or_else(|| self.default.clone())
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    dialect: Dialect,
    fields: Option<Vec<String>>,
    transforms: IndexMap<String, Transform>,
}

impl ImportOptions {
    pub fn new() -> Self {
        ImportOptions::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Keep only these columns.
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn transform(mut self, field: impl Into<String>, transform: Transform) -> Self {
        self.transforms.insert(field.into(), transform);
        self
    }

    fn keeps(&self, field: &str) -> bool {
        self.fields
            .as_ref()
            .map_or(true, |fields| fields.iter().any(|f| f == field))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    dialect: Dialect,
    fields: Option<Vec<String>>,
    placeholder: String,
}

impl ExportOptions {
    pub fn new() -> Self {
        ExportOptions::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Columns to write, in order. Defaults to [`Table::fields`].
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Text written where a record has no such attribute. Empty by default.
    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }
}

// ============================================================================
// Delimited text
// ============================================================================

/// Read records from delimited text into `table`. Returns the number of
/// records inserted.
///
/// Rows shorter than the header simply lack the trailing attributes. Insert
/// failures (such as a duplicate unique key) stop the import; rows read
/// before the failure stay in the table.
pub fn import_csv<R: Read>(table: &mut Table, reader: R, options: &ImportOptions) -> Result<usize> {
    let mut reader = ReaderBuilder::new()
        .delimiter(options.dialect.delimiter())
        .quoting(options.dialect == Dialect::Csv)
        .flexible(true)
        .from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut count = 0;
    for row in reader.records() {
        let row = row?;
        let mut builder = RecordBuilder::new();
        for (name, raw) in headers.iter().zip(row.iter()) {
            if !options.keeps(name) {
                continue;
            }
            match options.transforms.get(name) {
                Some(transform) => builder.set(name, transform.apply(Some(raw))),
                None => builder.set(name, raw),
            };
        }
        for (name, transform) in &options.transforms {
            if !builder.has(name) {
                builder.set(name.as_str(), transform.apply(None));
            }
        }
        table.insert(builder.build())?;
        count += 1;
    }
    debug!("Imported {} records into '{}'", count, table.name());
    Ok(count)
}

pub fn import_tsv<R: Read>(table: &mut Table, reader: R, options: &ImportOptions) -> Result<usize> {
    let options = options.clone().dialect(Dialect::Tsv);
    import_csv(table, reader, &options)
}

/// Write `table` as delimited text with a header row. Returns the number of
/// records written.
pub fn export_csv<W: Write>(table: &Table, writer: W, options: &ExportOptions) -> Result<usize> {
    let quote_style = match options.dialect {
        Dialect::Csv => QuoteStyle::Necessary,
        Dialect::Tsv => QuoteStyle::Never,
    };
    let mut writer = WriterBuilder::new()
        .delimiter(options.dialect.delimiter())
        .quote_style(quote_style)
        .from_writer(writer);

    let fields = options.fields.clone().unwrap_or_else(|| table.fields());
    writer.write_record(&fields)?;
    for record in table {
        writer.write_record(fields.iter().map(|f| field_text(record, f, &options.placeholder)))?;
    }
    writer.flush()?;
    Ok(table.len())
}

pub fn export_tsv<W: Write>(table: &Table, writer: W, options: &ExportOptions) -> Result<usize> {
    let options = options.clone().dialect(Dialect::Tsv);
    export_csv(table, writer, &options)
}

fn field_text(record: &Record, field: &str, placeholder: &str) -> String {
    match record.get(field) {
        Some(value) => value.to_string(),
        None => placeholder.to_string(),
    }
}

// ============================================================================
// JSON
// ============================================================================

impl Table {
    /// Records as a JSON array of objects, attributes in record order.
    pub fn to_json(&self) -> Result<String> {
        let records: Vec<&Record> = self.iter().map(|r| &**r).collect();
        Ok(serde_json::to_string(&records)?)
    }

    /// Table of the records in a JSON array of objects.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Table> {
        let records: Vec<Record> = serde_json::from_str(json)?;
        let mut table = Table::new(name);
        table.insert_many(records)?;
        Ok(table)
    }
}
