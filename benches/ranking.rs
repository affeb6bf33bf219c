//! Benchmarks for leaderboard ranking and aggregation

#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use prompt_audit_bench::{
    rank_rows, Aggregator, LeaderboardRow, ModelCatalog, ModelSummary,
};

fn create_rows(n: usize) -> Vec<LeaderboardRow> {
    let catalog = ModelCatalog::builtin();
    (0..n)
        .map(|i| {
            let total = 100 + (i % 7) as u64;
            let summary = ModelSummary {
                name: format!("Model {i}"),
                total_tests: total,
                success_tests: total,
                correct_assessments: (i * 37 % 100) as u64,
                total_good_prompts: 40,
                false_positives: (i % 11) as u64,
                total_standard_targets: if i % 3 == 0 { 0 } else { 50 },
                standard_matches: (i % 50) as u64,
                latencies: vec![1.25; 4],
                ..ModelSummary::default()
            };
            LeaderboardRow::from_summary(&format!("model_{i}"), &summary, &catalog)
        })
        .collect()
}

fn benchmark_rank_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_rows");

    for size in &[10, 50, 100, 500] {
        let rows = create_rows(*size);

        group.bench_function(format!("rank_{size}_models"), |b| {
            b.iter(|| rank_rows(black_box(rows.clone()), 0));
        });
    }

    group.finish();
}

fn benchmark_merge_summaries(c: &mut Criterion) {
    let summaries: Vec<ModelSummary> = (0..200)
        .map(|i| ModelSummary {
            name: format!("Model {}", i % 20),
            total_tests: 10,
            success_tests: 9,
            correct_assessments: 7,
            avg_latency: 1.5,
            ..ModelSummary::default()
        })
        .collect();

    c.bench_function("merge_200_summaries", |b| {
        b.iter(|| {
            let mut aggregator = Aggregator::new();
            for (i, summary) in summaries.iter().enumerate() {
                aggregator.merge_summary(&format!("model_{}", i % 20), black_box(summary), "bench.json");
            }
            aggregator.summaries()
        });
    });
}

criterion_group!(benches, benchmark_rank_rows, benchmark_merge_summaries);
criterion_main!(benches);
