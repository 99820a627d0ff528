/// Join Operations Example
///
/// This example demonstrates:
/// - Equi-joins on indexed attributes
/// - Choosing and renaming output columns
/// - Joins that build their index on the fly, and joins that refuse to
/// - Chaining several tables with `JoinTerm`

use recordtable::{
    parse_columns, record, Error, JoinColumn, JoinSpec, JoinTerm, Query, Table, TableOptions,
};
use std::cell::RefCell;
use std::rc::Rc;

fn main() -> recordtable::Result<()> {
    env_logger::init();

    println!("=== RecordTable Join Operations Example ===\n");

    // 1. Create users table
    println!("1. Creating users table...");
    let mut users = Table::new("users");
    users.create_index("user_id", true, false)?;
    let users_data = [
        (1, "Alice", "alice@example.com"),
        (2, "Bob", "bob@example.com"),
        (3, "Charlie", "charlie@example.com"),
        (4, "Diana", "diana@example.com"),
    ];
    for (id, name, email) in users_data {
        users.insert(record! { "user_id" => id, "name" => name, "email" => email })?;
    }
    println!("   Added {} users\n", users.len());

    // 2. Create orders table
    println!("2. Creating orders table...");
    let mut orders = Table::new("orders");
    orders.create_index("order_id", true, false)?;
    orders.create_index("user_id", false, false)?;
    let orders_data = [
        (101, 1, "Laptop", 1200.0),
        (102, 1, "Mouse", 25.0),
        (103, 2, "Keyboard", 75.0),
        (104, 3, "Monitor", 300.0),
        (105, 5, "Cable", 10.0),
    ];
    for (order_id, user_id, product, amount) in orders_data {
        orders.insert(record! {
            "order_id" => order_id,
            "user_id" => user_id,
            "product" => product,
            "amount" => amount,
        })?;
    }
    println!("   Added {} orders\n", orders.len());

    // 3. Join with all columns
    println!("3. Joining orders with users on user_id...");
    let joined = orders.join(&users, &JoinSpec::on("user_id"))?;
    println!("   Result '{}' has {} rows:", joined.name(), joined.len());
    for rec in &joined {
        println!("   {}", rec);
    }
    println!("   (order 105 has no matching user; Diana has no orders)\n");

    // 4. Selected and renamed columns
    println!("4. Selecting columns with aliases...");
    let mut columns = parse_columns("order_id product amount");
    columns.push(JoinColumn::right("name").alias("customer"));
    let report = orders.join(&users, &JoinSpec::on("user_id").columns(columns))?;
    let report = report.query(&Query::new().order_by("amount desc"));
    for rec in &report {
        println!(
            "   #{} {:<10} {:>8} {}",
            rec.value("order_id"),
            rec.value("product"),
            rec.value("amount"),
            rec.value("customer")
        );
    }
    println!();

    // 5. Unindexed join attributes
    println!("5. Joining on an attribute with no index...");
    let mut emails = Table::new("emails");
    emails.insert(record! { "address" => "bob@example.com", "bounced" => true })?;
    let flagged = users.join(
        &emails,
        &JoinSpec::new("email", "address").columns([
            JoinColumn::left("name"),
            JoinColumn::right("bounced"),
        ]),
    )?;
    println!("   auto-indexed: {} match ({})", flagged.len(), flagged.column("name")[0]);

    let mut strict = Table::with_options(
        "strict",
        TableOptions {
            auto_index_joins: false,
            ..TableOptions::default()
        },
    );
    strict.insert(record! { "email" => "alice@example.com" })?;
    match strict.join(&emails, &JoinSpec::new("email", "address")) {
        Err(Error::UnindexedJoinAttribute(attr)) => {
            println!("   with auto-indexing off: '{}' must be indexed first\n", attr)
        }
        other => println!("   unexpected: {:?}\n", other.map(|t| t.len())),
    }

    // 6. Chained joins
    println!("6. Chaining users, orders and shipments...");
    let mut shipments = Table::new("shipments");
    shipments.create_index("user_id", false, false)?;
    shipments.insert(record! { "user_id" => 1, "carrier" => "UPS" })?;
    shipments.insert(record! { "user_id" => 2, "carrier" => "FedEx" })?;

    let users = Rc::new(RefCell::new(users));
    let orders = Rc::new(RefCell::new(orders));
    let shipments = Rc::new(RefCell::new(shipments));
    let chain = JoinTerm::on(&users, "user_id")?.with(&orders)?.with(&shipments)?;
    let shipped = chain.execute(Some(parse_columns("name product carrier")))?;
    for rec in &shipped {
        println!("   {}", rec);
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
