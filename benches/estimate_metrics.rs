use criterion::{Criterion, criterion_group, criterion_main};
use encoding_rs::UTF_8;
use income_insights::{estimate, metrics, normalize, reader};

fn generate_clients(rows: usize) -> String {
    let mut text = String::from("id;age;gender;city;salary_6to12m_avg\n");
    for i in 0..rows {
        let gender = if i % 2 == 0 { "M" } else { "F" };
        let city = match i % 7 {
            0 => "Paris",
            1 => "Lyon",
            2 => "Nice",
            3 => "Lille",
            4 => "Brest",
            5 => "Metz",
            _ => "",
        };
        let age = if i % 11 == 0 { String::new() } else { (18 + i % 60).to_string() };
        text.push_str(&format!("{i};{age};{gender};{city};{}\n", 1000 + i % 5000));
    }
    text
}

fn bench_pipeline(c: &mut Criterion) {
    let text = generate_clients(20_000);
    let raw = reader::read_table(text.as_bytes(), UTF_8).expect("read table");
    let table = normalize::normalize(&raw);
    let estimates = estimate::estimate_incomes(&table);

    c.bench_function("read_table_20k", |b| {
        b.iter(|| reader::read_table(text.as_bytes(), UTF_8).expect("read table"))
    });
    c.bench_function("estimate_20k", |b| b.iter(|| estimate::estimate_incomes(&table)));
    c.bench_function("aggregate_20k", |b| {
        b.iter(|| metrics::aggregate(&table, &estimates).expect("aggregate"))
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
