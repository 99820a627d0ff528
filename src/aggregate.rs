/// RecordTable Aggregator Implementation
///
/// An [`Aggregator`] is any function from an ordered slice of records to a
/// [`Value`]. Groupby, rollups, summary rows and pivot summaries all consume
/// this one contract, so callers can mix the standard aggregators below with
/// their own closures.
///
/// Numeric aggregators read values leniently (see [`Value::to_number`]): numeric
/// text counts, blanks and missing attributes are skipped, and any other value
/// is an error. Sums of plain integers stay integers.

use crate::error::{Error, Result};
use crate::record::{Record, RecordRef};
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

type AggregateFn = dyn Fn(&[RecordRef]) -> Result<Value>;

/// Named function from a group of records to a value.
#[derive(Clone)]
pub struct Aggregator {
    name: String,
    func: Rc<AggregateFn>,
}

impl Aggregator {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[RecordRef]) -> Result<Value> + 'static,
    {
        Aggregator {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, records: &[RecordRef]) -> Result<Value> {
        (self.func)(records)
    }

    /// Apply, reporting any failure as an `AggregationFailure` of `output`.
    pub fn apply_for(&self, output: &str, records: &[RecordRef]) -> Result<Value> {
        self.apply(records).map_err(|err| match err {
            Error::AggregationFailure { reason, .. } => Error::aggregation(output, reason),
            other => Error::aggregation(output, other),
        })
    }
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aggregator({})", self.name)
    }
}

/// Numeric reading of one attribute. Blanks are `None`; anything else that
/// does not read as a number is an error.
fn numeric(record: &Record, attr: &str) -> Result<Option<f64>> {
    let value = record.value(attr);
    if value.is_blank() {
        return Ok(None);
    }
    value
        .to_number()
        .map(Some)
        .ok_or_else(|| Error::aggregation(attr, format!("non-numeric value '{}'", value)))
}

/// Running total that stays integral while every input is an integer.
#[derive(Default)]
struct Total {
    int: i64,
    float: f64,
    integral: bool,
    count: usize,
}

impl Total {
    fn new() -> Self {
        Total {
            integral: true,
            ..Default::default()
        }
    }

    fn add(&mut self, record: &Record, attr: &str) -> Result<()> {
        if let Value::Int(v) = record.value(attr) {
            self.add_int(*v);
        } else if let Some(v) = numeric(record, attr)? {
            self.add_float(v);
        }
        Ok(())
    }

    fn add_int(&mut self, v: i64) {
        match self.int.checked_add(v) {
            Some(sum) if self.integral => self.int = sum,
            _ => self.integral = false,
        }
        self.float += v as f64;
        self.count += 1;
    }

    fn add_float(&mut self, v: f64) {
        self.integral = false;
        self.float += v;
        self.count += 1;
    }

    fn value(&self) -> Value {
        if self.integral {
            Value::Int(self.int)
        } else {
            Value::Float(self.float)
        }
    }

    fn mean(&self) -> Value {
        if self.count == 0 {
            Value::Float(0.0)
        } else {
            Value::Float(self.float / self.count as f64)
        }
    }
}

// ============================================================================
// Standard aggregators
// ============================================================================

/// Number of records in the group.
pub fn count() -> Aggregator {
    Aggregator::new("COUNT", |recs| Ok(Value::from(recs.len())))
}

/// Number of distinct value combinations of `attrs`, blanks included.
pub fn count_distinct(attrs: &[&str]) -> Aggregator {
    let attrs: Vec<String> = attrs.iter().map(|a| a.to_string()).collect();
    Aggregator::new("COUNT_DISTINCT", move |recs| {
        let distinct: IndexSet<Vec<Value>> = recs
            .iter()
            .map(|r| attrs.iter().map(|a| r.key(a)).collect())
            .collect();
        Ok(Value::from(distinct.len()))
    })
}

pub fn count_if<F>(pred: F) -> Aggregator
where
    F: Fn(&Record) -> bool + 'static,
{
    Aggregator::new("COUNT_IF", move |recs| {
        Ok(Value::from(recs.iter().filter(|r| pred(r)).count()))
    })
}

pub fn count_if_eq(attr: &str, value: impl Into<Value>) -> Aggregator {
    let attr = attr.to_string();
    let value = value.into().as_key();
    count_if(move |r| r.key(&attr) == value)
}

pub fn sum(attr: &str) -> Aggregator {
    let attr = attr.to_string();
    Aggregator::new("SUM", move |recs| {
        let mut total = Total::new();
        for rec in recs {
            total.add(rec, &attr)?;
        }
        Ok(total.value())
    })
}

/// Sum of the distinct values of `attr`.
pub fn sum_distinct(attr: &str) -> Aggregator {
    let attr = attr.to_string();
    Aggregator::new("SUM_DISTINCT", move |recs| {
        let mut seen: IndexSet<Value> = IndexSet::new();
        let mut total = Total::new();
        for rec in recs {
            if seen.insert(rec.key(&attr)) {
                total.add(rec, &attr)?;
            }
        }
        Ok(total.value())
    })
}

pub fn sum_if<F>(attr: &str, pred: F) -> Aggregator
where
    F: Fn(&Record) -> bool + 'static,
{
    let attr = attr.to_string();
    Aggregator::new("SUM_IF", move |recs| {
        let mut total = Total::new();
        for rec in recs.iter().filter(|r| pred(r)) {
            total.add(rec, &attr)?;
        }
        Ok(total.value())
    })
}

/// Sum of `sum_attr` over records where `attr == value`.
pub fn sum_if_eq(attr: &str, value: impl Into<Value>, sum_attr: &str) -> Aggregator {
    let attr = attr.to_string();
    let value = value.into().as_key();
    sum_if(sum_attr, move |r| r.key(&attr) == value)
}

/// Mean of the numeric values of `attr`; 0.0 for an empty group.
pub fn avg(attr: &str) -> Aggregator {
    avg_if(attr, |_| true)
}

pub fn avg_if<F>(attr: &str, pred: F) -> Aggregator
where
    F: Fn(&Record) -> bool + 'static,
{
    let attr = attr.to_string();
    Aggregator::new("AVG", move |recs| {
        let mut total = Total::new();
        for rec in recs.iter().filter(|r| pred(r)) {
            total.add(rec, &attr)?;
        }
        Ok(total.mean())
    })
}

/// Smallest non-blank value; `Null` if there is none.
pub fn min(attr: &str) -> Aggregator {
    let attr = attr.to_string();
    Aggregator::new("MIN", move |recs| {
        Ok(recs
            .iter()
            .map(|r| r.key(&attr))
            .filter(|v| !v.is_null())
            .min()
            .unwrap_or_default())
    })
}

/// Largest non-blank value; `Null` if there is none.
pub fn max(attr: &str) -> Aggregator {
    let attr = attr.to_string();
    Aggregator::new("MAX", move |recs| {
        Ok(recs
            .iter()
            .map(|r| r.key(&attr))
            .filter(|v| !v.is_null())
            .max()
            .unwrap_or_default())
    })
}

/// First non-blank value of `attr` in group order.
pub fn first(attr: &str) -> Aggregator {
    let attr = attr.to_string();
    Aggregator::new("FIRST", move |recs| {
        Ok(recs
            .iter()
            .map(|r| r.value(&attr))
            .find(|v| !v.is_blank())
            .cloned()
            .unwrap_or_default())
    })
}

/// Last non-blank value of `attr` in group order.
pub fn last(attr: &str) -> Aggregator {
    let attr = attr.to_string();
    Aggregator::new("LAST", move |recs| {
        Ok(recs
            .iter()
            .rev()
            .map(|r| r.value(&attr))
            .find(|v| !v.is_blank())
            .cloned()
            .unwrap_or_default())
    })
}

/// Distinct non-blank values of `attr` as text, sorted and joined by `sep`.
pub fn concat(attr: &str, sep: &str) -> Aggregator {
    let attr = attr.to_string();
    let sep = sep.to_string();
    Aggregator::new("CONCAT", move |recs| {
        let parts: BTreeSet<String> = recs
            .iter()
            .map(|r| r.value(&attr))
            .filter(|v| !v.is_blank())
            .map(|v| v.to_string())
            .collect();
        Ok(Value::from(parts.into_iter().collect::<Vec<_>>().join(&sep)))
    })
}

/// True if any record's `attr` is truthy.
pub fn any(attr: &str) -> Aggregator {
    let attr = attr.to_string();
    Aggregator::new("ANY", move |recs| {
        Ok(Value::Bool(recs.iter().any(|r| r.value(&attr).is_truthy())))
    })
}

/// True if every record's `attr` is truthy. Missing attributes count as true.
pub fn all(attr: &str) -> Aggregator {
    let attr = attr.to_string();
    Aggregator::new("ALL", move |recs| {
        Ok(Value::Bool(
            recs.iter()
                .all(|r| r.get(&attr).map_or(true, Value::is_truthy)),
        ))
    })
}

// ============================================================================
// Registry
// ============================================================================

type Constructor = Rc<dyn Fn(&str) -> Aggregator>;

/// Name to aggregator-constructor mapping used to resolve rollup specs such
/// as `"SUM:qty,amount;AVG:price"`.
#[derive(Clone, Default)]
pub struct AggregatorRegistry {
    constructors: IndexMap<String, Constructor>,
}

impl AggregatorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        AggregatorRegistry::default()
    }

    /// Registry of the standard aggregators, each taking one field name.
    pub fn standard() -> Self {
        let mut registry = AggregatorRegistry::new();
        registry.register("COUNT", |_| count());
        registry.register("COUNT_DISTINCT", |f| count_distinct(&[f]));
        registry.register("SUM", sum);
        registry.register("SUM_DISTINCT", sum_distinct);
        registry.register("AVG", avg);
        registry.register("MIN", min);
        registry.register("MAX", max);
        registry.register("FIRST", first);
        registry.register("LAST", last);
        registry.register("CONCAT", |f| concat(f, ","));
        registry.register("ANY", any);
        registry.register("ALL", all);
        registry
    }

    /// Register a constructor. Names are matched case-insensitively.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(&str) -> Aggregator + 'static,
    {
        self.constructors
            .insert(name.to_ascii_uppercase(), Rc::new(constructor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_ascii_uppercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|k| k.as_str())
    }

    /// Build the aggregator `name` over `field`.
    pub fn resolve(&self, name: &str, field: &str) -> Result<Aggregator> {
        let constructor = self
            .constructors
            .get(&name.trim().to_ascii_uppercase())
            .ok_or_else(|| Error::UnknownAggregator(name.trim().to_string()))?;
        Ok(constructor(field))
    }

    /// Expand a rollup spec into `(output name, aggregator)` pairs, one per
    /// field, each output named after its field. Surrounding parentheses are
    /// optional; an empty spec yields no outputs.
    pub fn parse_rollup(&self, spec: &str) -> Result<Vec<(String, Aggregator)>> {
        let trimmed = spec.trim();
        let body = trimmed
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(trimmed);
        let mut outputs = Vec::new();
        for term in body.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            let (func, fields) = term
                .split_once(':')
                .ok_or_else(|| Error::InvalidRollup(spec.to_string()))?;
            for field in fields.split(',').map(str::trim) {
                if field.is_empty() {
                    return Err(Error::InvalidRollup(spec.to_string()));
                }
                outputs.push((field.to_string(), self.resolve(func, field)?));
            }
        }
        Ok(outputs)
    }
}

impl fmt::Debug for AggregatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn sales() -> Vec<RecordRef> {
        vec![
            record! { "region" => "east", "qty" => 3, "price" => "2.5", "ok" => true }.into_ref(),
            record! { "region" => "west", "qty" => 5, "price" => "", "ok" => true }.into_ref(),
            record! { "region" => "east", "qty" => 3, "price" => 1.5, "ok" => false }.into_ref(),
            record! { "region" => "", "qty" => 1 }.into_ref(),
        ]
    }

    #[test]
    fn test_counts() {
        let recs = sales();
        assert_eq!(count().apply(&recs).unwrap(), Value::Int(4));
        assert_eq!(count_distinct(&["region"]).apply(&recs).unwrap(), Value::Int(3));
        assert_eq!(count_distinct(&["region", "qty"]).apply(&recs).unwrap(), Value::Int(3));
        assert_eq!(count_if_eq("region", "east").apply(&recs).unwrap(), Value::Int(2));
        assert_eq!(count_if(|r| r.has("ok")).apply(&recs).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_sums_keep_integers() {
        let recs = sales();
        assert_eq!(sum("qty").apply(&recs).unwrap(), Value::Int(12));
        assert!(matches!(sum("qty").apply(&recs).unwrap(), Value::Int(_)));
        assert_eq!(sum("price").apply(&recs).unwrap(), Value::Float(4.0));
        assert_eq!(sum_distinct("qty").apply(&recs).unwrap(), Value::Int(9));
        assert_eq!(sum_if_eq("region", "east", "qty").apply(&recs).unwrap(), Value::Int(6));
        assert_eq!(sum("missing").apply(&recs).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_non_numeric_value_fails() {
        let recs = vec![record! { "qty" => "lots" }.into_ref()];
        let err = sum("qty").apply(&recs).unwrap_err();
        assert!(matches!(err, Error::AggregationFailure { .. }));
    }

    #[test]
    fn test_avg_min_max() {
        let recs = sales();
        assert_eq!(avg("qty").apply(&recs).unwrap(), Value::Float(3.0));
        assert_eq!(avg("price").apply(&recs).unwrap(), Value::Float(2.0));
        assert_eq!(avg("qty").apply(&[]).unwrap(), Value::Float(0.0));
        assert_eq!(min("qty").apply(&recs).unwrap(), Value::Int(1));
        assert_eq!(max("region").apply(&recs).unwrap(), Value::from("west"));
        assert_eq!(min("missing").apply(&recs).unwrap(), Value::Null);
    }

    #[test]
    fn test_first_last_concat() {
        let recs = sales();
        assert_eq!(first("price").apply(&recs).unwrap(), Value::from("2.5"));
        assert_eq!(last("region").apply(&recs).unwrap(), Value::from("east"));
        assert_eq!(concat("region", "|").apply(&recs).unwrap(), Value::from("east|west"));
    }

    #[test]
    fn test_any_all() {
        let recs = sales();
        assert_eq!(any("ok").apply(&recs).unwrap(), Value::Bool(true));
        assert_eq!(all("ok").apply(&recs).unwrap(), Value::Bool(false));
        assert_eq!(all("ok").apply(&recs[..2]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_registry_resolves_rollups() {
        let registry = AggregatorRegistry::standard();
        let outputs = registry.parse_rollup("(SUM:qty,price;count:region)").unwrap();
        let names: Vec<&str> = outputs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["qty", "price", "region"]);
        let recs = sales();
        assert_eq!(outputs[0].1.apply(&recs).unwrap(), Value::Int(12));
        assert_eq!(outputs[2].1.apply(&recs).unwrap(), Value::Int(4));
        assert!(registry.parse_rollup("").unwrap().is_empty());
    }

    #[test]
    fn test_registry_errors() {
        let registry = AggregatorRegistry::standard();
        assert!(matches!(
            registry.parse_rollup("MEDIAN:qty"),
            Err(Error::UnknownAggregator(name)) if name == "MEDIAN"
        ));
        assert!(matches!(registry.parse_rollup("SUM qty"), Err(Error::InvalidRollup(_))));
        assert!(matches!(registry.parse_rollup("SUM:qty,"), Err(Error::InvalidRollup(_))));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = AggregatorRegistry::new();
        registry.register("double_sum", |f| {
            let inner = sum(f);
            Aggregator::new("DOUBLE_SUM", move |recs| {
                Ok(Value::from(inner.apply(recs)?.to_number().unwrap_or(0.0) * 2.0))
            })
        });
        let agg = registry.resolve("DOUBLE_SUM", "qty").unwrap();
        assert_eq!(agg.apply(&sales()).unwrap(), Value::Float(24.0));
        assert!(!registry.contains("SUM"));
    }
}
