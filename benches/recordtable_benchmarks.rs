use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use recordtable::*;

fn build_table(size: usize, indexed: bool) -> Table {
    let mut table = Table::new("bench");
    if indexed {
        table.create_index("id", true, false).unwrap();
        table.create_index("bucket", false, false).unwrap();
    }
    for i in 0..size {
        table
            .insert(record! { "id" => i, "bucket" => i % 50, "flag" => i % 7 == 0 })
            .unwrap();
    }
    table
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("unindexed", size), size, |b, &size| {
            b.iter(|| build_table(black_box(size), false));
        });
        group.bench_with_input(BenchmarkId::new("indexed", size), size, |b, &size| {
            b.iter(|| build_table(black_box(size), true));
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for size in [1000, 10000].iter() {
        let indexed = build_table(*size, true);
        let scanned = build_table(*size, false);
        let query = Query::new().eq("bucket", 7).eq("flag", true);

        group.bench_with_input(BenchmarkId::new("indexed", size), size, |b, _| {
            b.iter(|| indexed.query(black_box(&query)));
        });
        group.bench_with_input(BenchmarkId::new("scanned", size), size, |b, _| {
            b.iter(|| scanned.query(black_box(&query)));
        });
    }
    group.finish();
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");

    for size in [100, 1000, 5000].iter() {
        let facts = build_table(*size, true);
        let mut dims = Table::new("dims");
        dims.create_index("bucket", true, false).unwrap();
        for bucket in 0..50 {
            dims.insert(record! { "bucket" => bucket, "label" => format!("b{}", bucket) })
                .unwrap();
        }
        let spec = JoinSpec::on("bucket").columns(["id", "label"]);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| facts.join(&dims, black_box(&spec)).unwrap());
        });
    }
    group.finish();
}

fn bench_groupby(c: &mut Criterion) {
    let mut group = c.benchmark_group("groupby");

    for size in [1000, 10000].iter() {
        let table = build_table(*size, false);
        let spec = GroupBy::attr("bucket").rollup("COUNT:id;SUM:id");

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| table.groupby(black_box(&spec)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_query, bench_join, bench_groupby);
criterion_main!(benches);
