/// RecordTable - Schema-less In-Memory Record Store
///
/// Records are ordered attribute bags with no declared schema. A table holds
/// an ordered sequence of shared records plus any number of unique or
/// non-unique indexes, and supports equality queries planned by index
/// selectivity, equi-joins, recursive pivots and grouped aggregation.
///
/// Everything is single-threaded: tables and records are shared with `Rc`, and
/// callers that need concurrent access serialize it themselves.

pub mod value;
pub mod record;
pub mod error;
pub mod index;
pub mod table;
pub mod query;
pub mod join;
pub mod pivot;
pub mod aggregate;
pub mod groupby;
pub mod registry;
pub mod io;
pub mod dates;

pub use value::Value;
pub use record::{Record, RecordBuilder, RecordRef};
pub use error::{Error, Result};
pub use index::{Index, IndexLookup, NonUniqueIndex, UniqueIndex};
pub use table::{Table, TableOptions};
pub use query::{parse_order_by, Query, SortKey, SortOrder};
pub use join::{parse_columns, JoinChain, JoinColumn, JoinSide, JoinSpec, JoinTerm};
pub use pivot::{PivotTable, COUNT_COLUMN};
pub use aggregate::{Aggregator, AggregatorRegistry};
pub use groupby::{GroupBy, GroupKey, Output, Outputs};
pub use registry::TableRegistry;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::record;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn cities() -> Table {
        let mut table = Table::new("cities");
        table.create_index("id", true, false).unwrap();
        table.create_index("city", false, false).unwrap();
        for (id, city) in [(1, "A"), (2, "B"), (3, "A")] {
            table.insert(record! { "id" => id, "city" => city }).unwrap();
        }
        table
    }

    fn identities(records: &[RecordRef]) -> HashSet<*const Record> {
        records.iter().map(Rc::as_ptr).collect()
    }

    #[test]
    fn test_where_returns_matches_in_insertion_order() {
        init_logging();
        let table = cities();
        let found = table.where_eq("city", "A");
        assert_eq!(found.column("id"), vec![Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn test_duplicate_unique_key_leaves_table_unchanged() {
        init_logging();
        let mut table = cities();
        let err = table.insert(record! { "id" => 1, "city" => "C" }).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));
        assert_eq!(table.len(), 3);
        // the rejected record never reached the non-unique index either
        assert!(table.lookup("city", "C").unwrap().is_empty());
    }

    #[test]
    fn test_orders_join_customers() {
        init_logging();
        let mut orders = Table::new("Orders");
        orders.insert(record! { "custid" => 1, "amt" => 10 }).unwrap();
        orders.insert(record! { "custid" => 2, "amt" => 5 }).unwrap();
        let mut customers = Table::new("Customers");
        customers.insert(record! { "id" => 1, "name" => "X" }).unwrap();
        customers.insert(record! { "id" => 2, "name" => "Y" }).unwrap();

        let joined = orders
            .join(&customers, &JoinSpec::new("custid", "id").columns(["amt", "name"]))
            .unwrap();
        assert_eq!(joined.len(), 2);
        let mut pairs: Vec<(Value, Value)> = joined
            .iter()
            .map(|r| (r.value("amt").clone(), r.value("name").clone()))
            .collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![(Value::Int(5), Value::from("Y")), (Value::Int(10), Value::from("X"))]
        );
    }

    #[test]
    fn test_index_membership_consistency() {
        init_logging();
        let mut table = Table::new("t");
        table.create_index("k", false, false).unwrap();
        table.create_index("id", true, false).unwrap();
        let mut kept = Vec::new();
        for id in 0..40 {
            let rec = table
                .insert(record! { "id" => id, "k" => id % 7, "maybe" => if id % 3 == 0 { "" } else { "x" } })
                .unwrap();
            kept.push(rec);
        }
        table.create_index("maybe", false, false).unwrap();
        for rec in kept.iter().step_by(3) {
            assert!(table.remove(rec));
        }
        assert!(!table.remove(&kept[0]));
        table.insert(record! { "id" => 100, "k" => 1 }).unwrap();

        let members = identities(table.records());
        for name in table.index_names() {
            let index = table.index(name).unwrap();
            assert_eq!(identities(&index.records()), members, "index {}", name);
            assert_eq!(index.records().len(), table.len(), "index {}", name);
        }
    }

    #[test]
    fn test_query_predicate_order_is_irrelevant() {
        init_logging();
        let mut table = Table::with_options(
            "t",
            TableOptions {
                reorder_threshold: 2,
                ..TableOptions::default()
            },
        );
        table.create_index("a", false, false).unwrap();
        for i in 0..60 {
            table
                .insert(record! { "a" => i % 3, "b" => i % 4, "c" => i % 5 })
                .unwrap();
        }
        let forward = table.query(&Query::new().eq("a", 1).eq("b", 2).eq("c", 0));
        let backward = table.query(&Query::new().eq("c", 0).eq("b", 2).eq("a", 1));
        assert!(!forward.is_empty());
        assert_eq!(forward.len(), backward.len());
        for (x, y) in forward.iter().zip(backward.iter()) {
            assert!(Rc::ptr_eq(x, y));
        }
    }

    #[test]
    fn test_join_cardinality() {
        init_logging();
        let mut left = Table::new("left");
        left.create_index("a", false, false).unwrap();
        let mut right = Table::new("right");
        right.create_index("b", false, false).unwrap();
        for i in 0..30 {
            left.insert(record! { "a" => i % 4, "l" => i }).unwrap();
        }
        for i in 0..25 {
            right.insert(record! { "b" => i % 6, "r" => i }).unwrap();
        }
        right.insert(record! { "r" => 99 }).unwrap();

        let left_index = left.index("a").unwrap();
        let right_index = right.index("b").unwrap();
        let expected: usize = left_index
            .entries()
            .map(|(key, rows)| rows.len() * right_index.posting_len(key))
            .sum();

        let joined = left.join(&right, &JoinSpec::new("a", "b")).unwrap();
        assert_eq!(joined.len(), expected);
        let reversed = right.join(&left, &JoinSpec::new("b", "a")).unwrap();
        assert_eq!(reversed.len(), expected);
    }

    #[test]
    fn test_pivot_partitions_records() {
        init_logging();
        let mut table = Table::new("t");
        table.create_index("x", false, false).unwrap();
        table.create_index("y", false, false).unwrap();
        for i in 0..50 {
            let y = if i % 10 == 0 { Value::Null } else { Value::Int(i % 3) };
            table.insert(record! { "x" => i % 4, "y" => y }).unwrap();
        }
        let pivot = table.pivot(&["x", "y"]).unwrap();
        let mut seen = HashSet::new();
        let mut total = 0;
        for leaf in pivot.leaves() {
            for rec in leaf.table() {
                assert!(seen.insert(Rc::as_ptr(rec)), "record in two partitions");
                total += 1;
            }
        }
        assert_eq!(total, table.len());
        assert_eq!(seen, identities(table.records()));
    }

    #[test]
    fn test_delimited_round_trip() {
        init_logging();
        let table = cities();
        let mut out = Vec::new();
        let fields = ["city", "id"];
        io::export_csv(&table, &mut out, &io::ExportOptions::new().fields(&fields)).unwrap();

        let mut back = Table::new("back");
        io::import_csv(
            &mut back,
            out.as_slice(),
            &io::ImportOptions::new().transform("id", io::Transform::int(Value::Null)),
        )
        .unwrap();
        for field in fields {
            assert_eq!(back.column(field), table.column(field));
        }
    }

    #[test]
    fn test_report_workflow() {
        init_logging();
        let text = "region,rep,amount,ts\n\
                    east,ann,10,2024-03-11 09:00:00\n\
                    west,bo,4,2024-03-12 10:00:00\n\
                    east,cy,6,2024-03-19 11:00:00\n\
                    east,ann,5,2024-03-20 12:00:00\n";
        let mut sales = Table::new("sales");
        io::import_csv(
            &mut sales,
            text.as_bytes(),
            &io::ImportOptions::new().transform("amount", io::Transform::int(0)),
        )
        .unwrap();
        sales.create_index("region", false, false).unwrap();

        let mut registry = TableRegistry::new();
        let east = registry.save("east", sales.where_eq("region", "east"), true);
        assert_eq!(registry.sum_column("east", "amount").unwrap(), Value::Int(21));

        let weekly = east
            .borrow()
            .groupby(
                &GroupBy::func("week", dates::week_start_of("ts", chrono::Weekday::Mon))
                    .rollup("SUM:amount;CONCAT:rep"),
            )
            .unwrap();
        assert_eq!(weekly.column("week"), vec![Value::from("2024-03-11"), Value::from("2024-03-18")]);
        assert_eq!(weekly.column("amount"), vec![Value::Int(10), Value::Int(11)]);
        assert_eq!(weekly.column("rep"), vec![Value::from("ann"), Value::from("ann,cy")]);

        let mut report = String::new();
        sales.pivot(&["region"]).unwrap().dump_counts(&mut report, None).unwrap();
        assert!(report.contains("east"));

        let everyone = Rc::new(RefCell::new(sales.clone_with(true)));
        everyone.borrow_mut().create_index("rep", false, false).unwrap();
        east.borrow_mut().create_index("rep", false, false).unwrap();
        let chain = JoinTerm::on(&everyone, "rep").unwrap() + JoinTerm::on(&east, "rep").unwrap();
        let columns = vec![JoinColumn::left("amount").alias("mine"), JoinColumn::right("amount")];
        let pairs = chain.execute(Some(columns)).unwrap();
        // ann pairs with ann twice over, cy with cy once
        assert_eq!(pairs.len(), 5);
    }
}
