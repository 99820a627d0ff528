/// Grouping Example
///
/// This example demonstrates:
/// - Importing typed records from CSV
/// - `groupby` with explicit aggregators and rollup specs
/// - Composite and computed group keys
/// - Summary rows, histograms and the named-table registry
/// - Exporting a result as TSV

use chrono::Weekday;
use recordtable::io::{self, ExportOptions, ImportOptions, Transform};
use recordtable::{aggregate, dates, AggregatorRegistry, GroupBy, Outputs, Record, Table, TableRegistry, Value};

const ORDERS: &str = "\
region,rep,product,qty,price,placed
east,ann,hat,3,2.50,2024-03-11 09:15:00
west,bo,hat,1,2.00,2024-03-12 10:00:00
east,cy,cap,4,1.00,2024-03-13 14:30:00
east,ann,hat,2,3.50,2024-03-19 08:45:00
west,bo,scarf,,9.00,2024-03-20 16:20:00
north,di,cap,6,1.50,2024-03-21 11:05:00
";

fn main() -> recordtable::Result<()> {
    env_logger::init();

    println!("=== RecordTable Grouping Example ===\n");

    println!("1. Importing orders...");
    let mut orders = Table::new("orders");
    let options = ImportOptions::new()
        .transform("qty", Transform::int(Value::Null))
        .transform("price", Transform::float(0.0));
    let n = io::import_csv(&mut orders, ORDERS.as_bytes(), &options)?;
    println!("   Imported {} orders (blank qty becomes null)\n", n);

    println!("2. Orders per region, with totals...");
    let by_region = orders.groupby(
        &GroupBy::attr("region")
            .aggregate("orders", aggregate::count())
            .aggregate("reps", aggregate::concat("rep", "/"))
            .rollup("SUM:qty;AVG:price")
            .include_all("ALL"),
    )?;
    for rec in &by_region {
        println!("   {}", rec);
    }
    println!();

    println!("3. Region and product...");
    let by_pair = orders.groupby(
        &GroupBy::attrs(&["region", "product"])
            .rollup("SUM:qty")
            .first_fields(&["rep"]),
    )?;
    for rec in &by_pair {
        println!("   {}", rec);
    }
    println!();

    println!("4. Weekly quantities (weeks start Monday)...");
    let weekly = orders.groupby(
        &GroupBy::func("week", dates::week_start_of("placed", Weekday::Mon))
            .rollup("SUM:qty;COUNT_DISTINCT:rep"),
    )?;
    for rec in &weekly {
        println!("   {}", rec);
    }
    println!();

    println!("5. Custom aggregator registry...");
    let mut registry = AggregatorRegistry::standard();
    registry.register("BIG_ORDERS", |field| aggregate::count_if(field_over(field, 2)));
    let big = orders.groupby(&GroupBy::attr("rep").rollup("BIG_ORDERS:qty").registry(registry))?;
    println!("   {:?}\n", big.to_map("rep", "qty"));

    println!("6. Summary row and histogram...");
    let with_total = orders
        .select(&["rep", "qty"])
        .add_summary_row(&Outputs::new().column("rep", Value::from("TOTAL")).rollup("SUM:qty"))?;
    if let Some(last) = with_total.get(with_total.len() - 1) {
        println!("   {}", last);
    }
    for (product, count) in orders.histogram("product", None)? {
        println!("   {:<6} {}", product, count);
    }
    println!();

    println!("7. Saving intermediate results...");
    let mut saved = TableRegistry::new();
    saved.save("east", orders.where_eq("region", "east"), true);
    saved.save("weekly", weekly, true);
    println!("   east qty total: {}", saved.sum_column("east", "qty")?);
    println!("   saved tables: {:?}\n", saved.names().collect::<Vec<_>>());

    println!("8. Exporting the weekly table as TSV...");
    let mut out = Vec::new();
    let weekly = saved.fetch_or_empty("weekly");
    io::export_tsv(&weekly.borrow(), &mut out, &ExportOptions::new().placeholder("-"))?;
    print!("{}", String::from_utf8_lossy(&out));

    saved.clear();
    println!("\n   Registry cleared ({} tables left)", saved.len());

    println!("\n=== Example Complete ===");
    Ok(())
}

/// Predicate: `field` holds a number greater than `threshold`.
fn field_over(field: &str, threshold: i64) -> impl Fn(&Record) -> bool {
    let field = field.to_string();
    move |rec| rec.value(&field).as_i64().is_some_and(|v| v > threshold)
}
