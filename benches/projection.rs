use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use insightstream::dashboard::build_dashboard;
use insightstream::filter::{FilterState, parse_filter_args};
use insightstream::io_utils::{LoadOptions, load_rows};
use insightstream::projection::project_rows;
use insightstream::schema::Dataset;
use tempfile::TempDir;

const CITIES: [(&str, &str); 5] = [
    ("Istanbul", "Besiktas"),
    ("Ankara", "Kizilay"),
    ("Izmir", "Bornova"),
    ("Bursa", "Nilufer"),
    ("Antalya", "Konyaalti"),
];
const CATEGORIES: [&str; 9] = [
    "Coffee", "Tea", "Snacks", "Desserts", "Cold Drinks", "Juice", "Bakery", "Sandwich", "Salad",
];

fn generate_sales(rows: usize) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let csv_path = temp_dir.path().join("sales.csv");
    let mut file = File::create(&csv_path).expect("create csv");
    writeln!(
        file,
        "TRANSACTION ID,DATE,CITY,Branch,PRODUCT CATEGORY,Product,UNIT PRICE,QTY SOLD,PROFIT MARGIN (%)"
    )
    .expect("header");
    for i in 0..rows {
        let (city, branch) = CITIES[i % CITIES.len()];
        let category = CATEGORIES[i % CATEGORIES.len()];
        let month = (i % 12) + 1;
        let day = (i % 28) + 1;
        let price = 20 + (i % 90);
        let qty = 1 + (i % 40);
        let margin = 10 + (i % 35);
        writeln!(
            file,
            "TX{:06},2023-{month:02}-{day:02},{city},{branch},{category},P{:03},\"₺{price},00\",{qty},{margin}%",
            i / 2,
            i % 150
        )
        .expect("row");
    }
    (temp_dir, csv_path)
}

fn bench_projection(c: &mut Criterion) {
    let (temp_dir, csv_path) = generate_sales(20_000);
    let raw = load_rows(&csv_path, &LoadOptions::default()).expect("load rows");
    let dataset = Dataset::from_rows("sales", raw.clone());
    let rows = project_rows(&dataset.rows, &dataset.mapping, &[]);
    let filters = parse_filter_args(&["city=Istanbul,Izmir".to_string()]).expect("filters");

    let mut group = c.benchmark_group("pipeline");

    group.bench_function("profile_and_infer", |b| {
        b.iter_batched(
            || raw.clone(),
            |rows| Dataset::from_rows("sales", rows),
            BatchSize::LargeInput,
        );
    });

    group.bench_function("project_rows", |b| {
        b.iter(|| project_rows(&dataset.rows, &dataset.mapping, &[]));
    });

    group.bench_function("dashboard_unfiltered", |b| {
        b.iter(|| build_dashboard(&rows, &FilterState::default(), dataset.mode));
    });

    group.bench_function("dashboard_filtered", |b| {
        b.iter(|| build_dashboard(&rows, &filters, dataset.mode));
    });

    drop(temp_dir);
    group.finish();
}

criterion_group!(benches, bench_projection);
criterion_main!(benches);
