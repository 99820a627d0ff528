/// Basic Table Example
///
/// This example demonstrates:
/// - Inserting schema-less records
/// - Unique and non-unique indexes
/// - Equality queries with ordering and limits
/// - Sorting, projection and deletion

use recordtable::{record, Error, Query, Table, Value};

fn main() -> recordtable::Result<()> {
    env_logger::init();

    println!("=== RecordTable Basic Example ===\n");

    // 1. Create a table with indexes
    println!("1. Creating stations table...");
    let mut stations = Table::new("stations");
    stations.create_index("code", true, false)?;
    stations.create_index("state", false, false)?;

    let data = [
        ("AUS", "Austin", "TX", 489),
        ("DAL", "Dallas", "TX", 430),
        ("PHX", "Phoenix", "AZ", 1086),
        ("TUS", "Tucson", "AZ", 728),
        ("DEN", "Denver", "CO", 5280),
    ];
    for (code, city, state, elevation) in data {
        stations.insert(record! {
            "code" => code,
            "city" => city,
            "state" => state,
            "elevation" => elevation,
        })?;
    }
    // records need not share a shape
    stations.insert(record! { "code" => "SEA", "city" => "Seattle", "note" => "no state recorded" })?;
    println!("   Inserted {} records\n", stations.len());

    // 2. Unique index rejects duplicates
    println!("2. Inserting a duplicate code...");
    match stations.insert(record! { "code" => "AUS", "city" => "Elsewhere" }) {
        Err(Error::DuplicateKey { index, key }) => {
            println!("   Rejected: '{}' already used in index '{}'", key, index)
        }
        other => println!("   Unexpected: {:?}", other),
    }
    println!("   Table still has {} records\n", stations.len());

    // 3. Typed index lookup
    println!("3. Looking up by code...");
    if let Some(rec) = stations.lookup("code", "PHX")?.into_vec().first() {
        println!("   PHX -> {}", rec);
    }
    println!();

    // 4. Queries
    println!("4. Stations in Arizona or Texas, highest first...");
    for state in ["AZ", "TX"] {
        let found = stations.query(&Query::new().eq("state", state).order_by("elevation desc"));
        for rec in &found {
            println!("   {} {:<8} {}", state, rec.value("city"), rec.value("elevation"));
        }
    }
    println!();

    println!("5. Stations above 1000 ft...");
    let high = stations.query(&Query::new().filter(|r| r.value("elevation").as_i64().unwrap_or(0) > 1000));
    println!("   {:?}\n", high.column("city"));

    // 6. Sort and project
    println!("6. Cities sorted by name, projected to code/city...");
    let mut sorted = stations.select(&["code", "city"]);
    sorted.sort("city");
    for rec in &sorted {
        println!("   {}", rec);
    }
    println!();

    // 7. Numeric helpers
    println!("7. Elevation statistics...");
    println!("   sum={} avg={} min={} max={}\n",
        stations.sum("elevation")?,
        stations.avg("elevation")?,
        stations.min("elevation")?,
        stations.max("elevation")?,
    );

    // 8. Delete
    println!("8. Deleting Texas stations...");
    let removed = stations.delete(&Query::new().eq("state", "TX"));
    println!("   Removed {}, {} remain", removed, stations.len());
    assert!(stations.lookup("state", Value::from("TX"))?.is_empty());

    println!("\n=== Example Complete ===");
    Ok(())
}
