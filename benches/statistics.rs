use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dockbench::ids::ProteinId;
use dockbench::results::{MetricRecord, MetricsByMethod};
use dockbench::stats::{compare_methods, AggregateBy, CompareOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Three methods over 20 proteins with 50 ligands each
fn synthetic_results() -> MetricsByMethod {
    let mut rng = StdRng::seed_from_u64(7);
    let mut all = MetricsByMethod::new();
    for method in ["qvina", "vina", "boltz2"] {
        let mut records = Vec::new();
        for p in 0..20 {
            let protein = ProteinId::new(&format!("P{:03}", p));
            for l in 0..50 {
                let affinity = if rng.gen_bool(0.05) {
                    None
                } else {
                    Some(rng.gen_range(-12.0..-2.0))
                };
                records.push(
                    MetricRecord::new(method, &protein, &format!("lig{}", l))
                        .with_affinity(affinity)
                        .with("clash_score", rng.gen_range(0.0..5.0)),
                );
            }
        }
        all.insert(method.to_string(), records);
    }
    all
}

fn bench_compare_by_method(c: &mut Criterion) {
    let all = synthetic_results();
    let options = CompareOptions::default();

    c.bench_function("compare_by_method", |b| {
        b.iter(|| black_box(compare_methods(&all, &options)))
    });
}

fn bench_compare_per_protein(c: &mut Criterion) {
    let all = synthetic_results();
    let options = CompareOptions {
        aggregate_by: AggregateBy::Protein,
        include_per_protein: true,
        ..CompareOptions::default()
    };

    c.bench_function("compare_per_protein", |b| {
        b.iter(|| black_box(compare_methods(&all, &options)))
    });
}

criterion_group!(stats_benches, bench_compare_by_method, bench_compare_per_protein);
criterion_main!(stats_benches);
