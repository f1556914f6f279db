//! End-to-end scenarios over the public API: judging, grouping,
//! correction, aggregation and reporting.

use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

use qalogic_core::{
    Aggregation, DomainResults, ExactMatchJudge, GroupStats, Judgement, MetricsAggregator,
    MetricsError, QueryResult, RETRIEVAL_OK, RetrievalCorrector, Score, TagAlignment, TaggedGroup,
    judge_all, load_domains, save_domains,
};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn judged(query: &str, tag: i64, verdict: Judgement) -> QueryResult {
    QueryResult::new(query, "answer", "response")
        .with_tag(tag)
        .with_judgement(verdict)
}

// --- Group statistics from bare counts ---

#[test]
fn stratified_group_statistics() {
    let stats = GroupStats::from_counts(&[
        (1, 3),
        (2, 3),
        (3, 3),
        (2, 3),
        (0, 3),
        (0, 3),
        (0, 3),
        (0, 3),
    ])
    .unwrap();

    assert_eq!((stats.gap.groups, stats.gap.examples), (4, 12));
    assert_eq!(
        (stats.robust.groups, stats.robust.examples, stats.robust.correct),
        (1, 3, 3)
    );
    assert_eq!(
        (
            stats.non_robust.groups,
            stats.non_robust.examples,
            stats.non_robust.correct
        ),
        (3, 9, 5)
    );
    assert_eq!((stats.total.groups, stats.total.examples), (8, 24));
    assert!(approx(stats.accuracy().unwrap(), 8.0 / 24.0));
    assert!(approx(stats.robustness().unwrap(), 8.0 / 12.0));
}

// --- Retrieval correction of a paraphrase ---

#[test]
fn paraphrase_with_same_top_document_is_not_a_retrieval_failure() {
    let wrong = judged("Who founded Quantum Dynamics?", 5, Judgement::Incorrect)
        .with_retrieved_documents(["doc-42", "doc-7"]);
    let right = judged("Quantum Dynamics was founded by whom?", 5, Judgement::Correct)
        .with_retrieved_documents(["doc-42"]);
    let group = TaggedGroup::new(vec![wrong.clone(), right]).unwrap();

    let corrected = RetrievalCorrector::new(&group).correct(&wrong).unwrap();
    assert_eq!(corrected.retrieval_judgement, Some(RETRIEVAL_OK));
    assert_eq!(corrected.judgement(), Judgement::Incorrect);
    assert_eq!(wrong.retrieval_judgement, None);
}

// --- Knowledge accuracy ---

#[test]
fn knowledge_accuracy_counts_tags_answered_at_least_once() {
    let group = TaggedGroup::new(vec![
        judged("a1", 1, Judgement::Correct),
        judged("a2", 1, Judgement::Incorrect),
        judged("b1", 2, Judgement::Correct),
        judged("c1", 3, Judgement::Incorrect),
        judged("c2", 3, Judgement::Correct),
        judged("d1", 4, Judgement::Incorrect),
    ])
    .unwrap();
    assert!(approx(group.knowledge_accuracy().unwrap(), 0.75));
}

// --- Empty populations ---

#[test]
fn accuracy_of_empty_population_is_an_error() {
    let group = TaggedGroup::new(Vec::new()).unwrap();
    let err = group.accuracy(None, false).unwrap_err();
    assert!(matches!(err, MetricsError::EmptyPopulation { .. }));

    let populated = TaggedGroup::new(vec![judged("q", 1, Judgement::Correct)]).unwrap();
    let none: &[QueryResult] = &[];
    let err = populated.accuracy(Some(none), false).unwrap_err();
    assert!(matches!(err, MetricsError::EmptyPopulation { .. }));
}

// --- Full pipeline ---

fn raw_dataset() -> DomainResults {
    let mut domains = DomainResults::new();
    domains.insert(
        "employees".to_string(),
        vec![
            QueryResult::new("Who leads R&D?", "Ada Byron", "ada byron")
                .with_tag(1)
                .with_retrieved_documents(["emp-1"]),
            QueryResult::new("R&D is led by?", "Ada Byron", "Charles Babbage")
                .with_tag(1)
                .with_retrieved_documents(["emp-1"]),
            QueryResult::new("Who runs payroll?", "Grace Hopper", "Grace Hopper")
                .with_tag(2)
                .with_retrieved_documents(["emp-9"]),
        ],
    );
    domains.insert(
        "projects".to_string(),
        vec![
            QueryResult::new("Which project ships in May?", "Atlas", "Orion")
                .with_tag(1)
                .with_retrieved_documents(["proj-3"]),
            QueryResult::new("Budget of Atlas?", "4M", "2M")
                .with_tag(3)
                .with_retrieved_documents(["proj-1"]),
        ],
    );
    domains
}

#[tokio::test]
async fn judge_group_correct_and_report() {
    let mut domains = raw_dataset();
    let judge = ExactMatchJudge::default();
    for results in domains.values_mut() {
        judge_all(results, &judge, 4).await.unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("judged.json");
    save_domains(&path, &domains).unwrap();
    let domains = load_domains(&path).unwrap();

    let agg = MetricsAggregator::new(domains).unwrap();
    let Score::PerDomain(acc) = agg.accuracy(false, Aggregation::PerDomain).unwrap() else {
        panic!("expected per-domain accuracy");
    };
    assert!(approx(acc["employees"], 2.0 / 3.0));
    assert!(approx(acc["projects"], 0.0));

    // The incorrect R&D paraphrase shares its top document with the correct one.
    let retrieval = agg.accuracy(true, Aggregation::Overall).unwrap();
    assert!(approx(retrieval.overall().unwrap(), 3.0 / 5.0));

    let report = agg.report(false).unwrap();
    assert_eq!(report.domains.len(), 2);
    assert_eq!(report.domains[0].robustness, Some(2.0 / 3.0));
    assert_eq!(report.domains[1].robustness, None);
    assert!(approx(report.overall_accuracy, 2.0 / 5.0));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["domains"][0]["domain"], "employees");
}

#[test]
fn global_alignment_requires_declaration() {
    let mut domains = BTreeMap::new();
    domains.insert(
        "employees".to_string(),
        vec![judged("q", 1, Judgement::Correct)],
    );
    let agg = MetricsAggregator::new(domains).unwrap();
    let err = agg.tag_gaps(true).unwrap_err();
    assert!(matches!(err, MetricsError::PreconditionViolation { .. }));

    let agg = agg.with_alignment(TagAlignment::Global);
    assert!(agg.tag_gaps(true).unwrap().is_empty());
}

#[test]
fn aggregation_flags_must_be_exclusive() {
    for (per_domain, overall) in [(false, false), (true, true)] {
        let err = Aggregation::from_flags(per_domain, overall).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidConfiguration { .. }));
    }
}
