use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;

use qalogic_core::{
    Aggregation, Judgement, MetricsAggregator, QueryResult, RetrievalCorrector, TagAlignment,
    TaggedGroup,
};

/// `tags` groups of `per_tag` paraphrases with a deterministic mix of
/// verdicts and top documents.
fn synthetic(tags: i64, per_tag: usize) -> Vec<QueryResult> {
    (0..tags)
        .flat_map(|tag| {
            (0..per_tag).map(move |i| {
                let verdict = if (tag as usize + i) % 3 == 0 {
                    Judgement::Correct
                } else {
                    Judgement::Incorrect
                };
                QueryResult::new(format!("q{tag}-{i}"), "answer", "response")
                    .with_tag(tag)
                    .with_judgement(verdict)
                    .with_retrieved_documents([format!("doc-{}", (tag as usize + i) % 4)])
            })
        })
        .collect()
}

fn bench_tagged_group(c: &mut Criterion) {
    let results = synthetic(500, 8);

    c.bench_function("tagged_group_classify_4k", |b| {
        b.iter(|| {
            let group = TaggedGroup::new(black_box(results.clone())).unwrap();
            (group.gap_tags().len(), group.non_robust_tags().len())
        })
    });

    let group = TaggedGroup::new(results).unwrap();
    c.bench_function("tagged_group_robustness_4k", |b| {
        b.iter(|| black_box(&group).robustness(false))
    });

    c.bench_function("retrieval_correction_4k", |b| {
        b.iter(|| RetrievalCorrector::new(black_box(&group)).correct_group())
    });
}

fn bench_aggregator(c: &mut Criterion) {
    let domains: BTreeMap<String, Vec<QueryResult>> = (0..4)
        .map(|d| (format!("domain-{d}"), synthetic(250, 6)))
        .collect();

    c.bench_function("aggregator_global_robustness", |b| {
        b.iter(|| {
            let agg = MetricsAggregator::new(black_box(domains.clone()))
                .unwrap()
                .with_alignment(TagAlignment::Global);
            agg.robustness(false, Aggregation::Overall, true)
        })
    });

    let agg = MetricsAggregator::new(domains)
        .unwrap()
        .with_alignment(TagAlignment::Global);
    c.bench_function("aggregator_report_global", |b| {
        b.iter(|| black_box(&agg).report(true))
    });
}

criterion_group!(benches, bench_tagged_group, bench_aggregator);
criterion_main!(benches);
