/// Pivot Example
///
/// This example demonstrates:
/// - Pivoting a table on one, two and three indexed attributes
/// - Nested listings with `dump`
/// - Count grids and aggregate grids with `dump_counts`
/// - Flattening a pivot with `summary_counts`

use recordtable::{aggregate, record, Query, Table};

fn main() -> recordtable::Result<()> {
    env_logger::init();

    println!("=== RecordTable Pivot Example ===\n");

    println!("1. Creating sales table...");
    let mut sales = Table::new("sales");
    let data = [
        ("east", "hat", "Q1", 3),
        ("east", "hat", "Q2", 5),
        ("east", "cap", "Q1", 2),
        ("west", "hat", "Q1", 1),
        ("west", "cap", "Q2", 4),
        ("west", "cap", "Q2", 6),
        ("north", "scarf", "Q1", 2),
    ];
    for (region, product, quarter, qty) in data {
        sales.insert(record! {
            "region" => region,
            "product" => product,
            "quarter" => quarter,
            "qty" => qty,
        })?;
    }
    for attr in ["region", "product", "quarter"] {
        sales.create_index(attr, false, false)?;
    }
    println!("   Inserted {} records\n", sales.len());

    println!("2. Nested listing by region (2 rows per region)...");
    let mut out = String::new();
    sales.pivot(&["region"])?.dump(&mut out, Some(2))?;
    print!("{}", out);
    println!();

    println!("3. Record counts by region and product...");
    let by_region_product = sales.pivot(&["region", "product"])?;
    let mut out = String::new();
    by_region_product.dump_counts(&mut out, None)?;
    print!("{}", out);
    println!();

    println!("4. Quantity totals by region and product...");
    let mut out = String::new();
    by_region_product.dump_counts(&mut out, Some(&aggregate::sum("qty")))?;
    print!("{}", out);
    println!();

    println!("5. Three levels: quarter, region, product...");
    let mut out = String::new();
    sales
        .pivot(&["quarter", "region", "product"])?
        .dump_counts(&mut out, None)?;
    print!("{}", out);
    println!();

    println!("6. Navigating the pivot...");
    let east = by_region_product
        .get(&"east".into())
        .map(|sub| sub.pivot_key_str())
        .unwrap_or_default();
    println!("   keys: {:?}", by_region_product.keys());
    println!("   east subtable key: {}\n", east);

    println!("7. Flat summary of non-empty cells...");
    let summary = by_region_product.summary_counts(Some(("qty", &aggregate::sum("qty"))))?;
    let stocked = summary.query(&Query::new().filter(|r| r.value("qty").as_i64() != Some(0)));
    for rec in &stocked {
        println!("   {}", rec);
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
