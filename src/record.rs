/// RecordTable Record Implementation
///
/// A Record is an ordered attribute bag: attribute name to [`Value`], with no
/// declared schema. Records are built once through a [`RecordBuilder`] and then
/// shared between tables as a [`RecordRef`]; identity is the reference, not
/// the contents, so two records with equal attributes are still distinct rows.
///
/// # Examples
///
/// ```
/// use recordtable::{record, Record, RecordBuilder, Value};
///
/// let mut builder = RecordBuilder::new();
/// builder.set("id", 1);
/// builder.set("id", 2); // ignored, first assignment wins
/// builder.set("city", "Phoenix");
/// let rec = builder.build();
///
/// assert_eq!(rec.get("id"), Some(&Value::Int(1)));
/// assert_eq!(rec, record! { "id" => 1, "city" => "Phoenix" });
/// ```

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Shared handle to a record. Tables, indexes and query results all hold
/// clones of the same handle.
pub type RecordRef = Rc<Record>;

static NULL_VALUE: Value = Value::Null;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    attrs: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    pub fn builder() -> RecordBuilder {
        RecordBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn has(&self, attr: &str) -> bool {
        self.attrs.contains_key(attr)
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attrs.get(attr)
    }

    /// Attribute value, or `Null` when the attribute is absent.
    pub fn value(&self, attr: &str) -> &Value {
        self.attrs.get(attr).unwrap_or(&NULL_VALUE)
    }

    /// Index key for `attr`: absent and blank values are the null key.
    pub fn key(&self, attr: &str) -> Value {
        self.value(attr).as_key()
    }

    /// Attribute names in assignment order.
    pub fn attr_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Start a builder pre-populated with this record's attributes.
    pub fn to_builder(&self) -> RecordBuilder {
        RecordBuilder {
            attrs: self.attrs.clone(),
        }
    }

    pub fn into_ref(self) -> RecordRef {
        Rc::new(self)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (attr, value)) in self.attrs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                Value::Str(s) => write!(f, "{}: {:?}", attr, s)?,
                Value::Null => write!(f, "{}: null", attr)?,
                other => write!(f, "{}: {}", attr, other)?,
            }
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut builder = RecordBuilder::new();
        for (k, v) in iter {
            builder.set(k, v);
        }
        builder.build()
    }
}

/// Builder enforcing write-once attributes: the first assignment of an
/// attribute wins and later assignments are ignored.
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    attrs: IndexMap<String, Value>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        RecordBuilder::default()
    }

    /// Set an attribute unless it was already set. Returns true if stored.
    pub fn set(&mut self, attr: impl Into<String>, value: impl Into<Value>) -> bool {
        let attr = attr.into();
        if self.attrs.contains_key(&attr) {
            return false;
        }
        self.attrs.insert(attr, value.into());
        true
    }

    /// Chaining form of [`set`](Self::set).
    pub fn with(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(attr, value);
        self
    }

    /// Replace an attribute regardless of write-once state.
    pub(crate) fn overwrite(&mut self, attr: impl Into<String>, value: Value) {
        self.attrs.insert(attr.into(), value);
    }

    pub fn has(&self, attr: &str) -> bool {
        self.attrs.contains_key(attr)
    }

    pub fn build(self) -> Record {
        Record { attrs: self.attrs }
    }
}

/// Build a [`Record`] from `name => value` pairs.
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($attr:expr => $value:expr),+ $(,)?) => {{
        let mut builder = $crate::RecordBuilder::new();
        $(builder.set($attr, $value);)+
        builder.build()
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_once_builder() {
        let mut builder = RecordBuilder::new();
        assert!(builder.set("a", 1));
        assert!(!builder.set("a", 2));
        let rec = builder.build();
        assert_eq!(rec.value("a"), &Value::Int(1));
    }

    #[test]
    fn test_missing_attribute_reads_as_null() {
        let rec = record! { "a" => "x" };
        assert!(rec.has("a"));
        assert!(!rec.has("b"));
        assert!(rec.value("b").is_null());
        assert_eq!(rec.get("b"), None);
    }

    #[test]
    fn test_blank_attribute_is_null_key() {
        let rec = record! { "a" => "", "b" => 0 };
        assert_eq!(rec.key("a"), Value::Null);
        assert_eq!(rec.key("b"), Value::Int(0));
        assert_eq!(rec.key("missing"), Value::Null);
    }

    #[test]
    fn test_attribute_order_is_assignment_order() {
        let rec = record! { "z" => 1, "a" => 2, "m" => 3 };
        let names: Vec<&str> = rec.attr_names().collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_identity_is_by_reference() {
        let a = record! { "id" => 1 }.into_ref();
        let b = record! { "id" => 1 }.into_ref();
        assert_eq!(*a, *b);
        assert!(!Rc::ptr_eq(&a, &b));
        assert!(Rc::ptr_eq(&a, &a.clone()));
    }

    #[test]
    fn test_display() {
        let rec = record! { "id" => 7, "name" => "X", "note" => Value::Null };
        assert_eq!(rec.to_string(), r#"{id: 7, name: "X", note: null}"#);
    }

    #[test]
    fn test_serializes_as_object() {
        let rec = record! { "id" => 7, "name" => "X" };
        let text = serde_json::to_string(&rec).unwrap();
        assert_eq!(text, r#"{"id":7,"name":"X"}"#);
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rec);
    }
}
