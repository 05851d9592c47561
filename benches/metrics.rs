use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modelops::metrics::sequence::ratio;
use modelops::metrics::{evaluate, AutogenMetric, MetricKind};
use modelops::schema::{Outputs, Targets};
use rand::prelude::*;
use std::collections::BTreeMap;

const WORDS: &[&str] = &[
    "model", "registry", "alias", "champion", "version", "prompt", "response", "metric",
    "threshold", "signature", "bundle", "run",
];

fn sentence(rng: &mut StdRng, words: usize) -> String {
    (0..words)
        .map(|_| *WORDS.choose(rng).unwrap_or(&"model"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn create_pairs(n_rows: usize, words: usize) -> (Targets, Outputs) {
    let mut rng = StdRng::seed_from_u64(42);
    let truth: Vec<String> = (0..n_rows).map(|_| sentence(&mut rng, words)).collect();
    let predicted: Vec<String> = truth
        .iter()
        .map(|t| {
            if rng.gen_bool(0.5) {
                t.clone()
            } else {
                sentence(&mut rng, words)
            }
        })
        .collect();
    (
        Targets::from_pairs(truth.iter().map(|t| ("q", t.as_str()))),
        Outputs::from_responses(predicted),
    )
}

fn bench_ratio(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence_ratio");
    let mut rng = StdRng::seed_from_u64(7);

    for words in [8, 32, 128].iter() {
        let a = sentence(&mut rng, *words);
        let b = sentence(&mut rng, *words);
        group.bench_with_input(BenchmarkId::new("words", words), &(a, b), |bench, (a, b)| {
            bench.iter(|| ratio(black_box(a), black_box(b)))
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.sample_size(20);

    let metrics = vec![
        MetricKind::AutogenMetric(AutogenMetric::new("exact", "exact_match")),
        MetricKind::AutogenMetric(AutogenMetric::new("similar", "similarity")),
        MetricKind::AutogenMetric(AutogenMetric::new("length", "length_ratio")),
    ];

    for n_rows in [100, 1000].iter() {
        let (targets, outputs) = create_pairs(*n_rows, 16);
        group.bench_with_input(
            BenchmarkId::new("rows", n_rows),
            &(targets, outputs),
            |bench, (targets, outputs)| {
                bench.iter(|| {
                    evaluate(&metrics, &BTreeMap::new(), black_box(targets), black_box(outputs))
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_ratio, bench_evaluate);
criterion_main!(benches);
