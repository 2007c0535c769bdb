use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dockbench::boxes::BoxSpec;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_coordinates(n: usize) -> Vec<Vector3<f64>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| {
            Vector3::new(
                rng.gen_range(-30.0..30.0),
                rng.gen_range(-30.0..30.0),
                rng.gen_range(-30.0..30.0),
            )
        })
        .collect()
}

fn bench_box_from_protein(c: &mut Criterion) {
    let coordinates = random_coordinates(5000);

    c.bench_function("box_from_protein_5000_atoms", |b| {
        b.iter(|| black_box(BoxSpec::from_extent(&coordinates, 2.0, 10.0)))
    });
}

fn bench_box_around_ligand(c: &mut Criterion) {
    let coordinates = random_coordinates(40);

    c.bench_function("box_around_ligand_40_atoms", |b| {
        b.iter(|| black_box(BoxSpec::around_ligand(&coordinates)))
    });
}

fn bench_vina_args(c: &mut Criterion) {
    let spec = BoxSpec::from_extent(&random_coordinates(500), 2.0, 10.0).unwrap();

    c.bench_function("box_vina_args", |b| b.iter(|| black_box(spec.vina_args())));
}

criterion_group!(
    box_benches,
    bench_box_from_protein,
    bench_box_around_ligand,
    bench_vina_args
);
criterion_main!(box_benches);
