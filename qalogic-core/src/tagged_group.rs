//! Tag grouping and classification.
//!
//! A [`TaggedGroup`] indexes one collection of judged results by query-logic
//! tag and classifies every tag as a gap, robust or non-robust group:
//!
//! - **gap**: no member answered correctly,
//! - **robust**: every member answered correctly,
//! - **non-robust**: at least one correct and at least one non-correct member.
//!
//! Robust and non-robust tags together are the *competent* tags.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::result::{QueryResult, Tag};

/// Correct/total counts for one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagCounts {
    pub correct: usize,
    pub total: usize,
}

impl TagCounts {
    pub fn new(correct: usize, total: usize) -> Self {
        Self { correct, total }
    }

    /// Classify a non-empty group from its counts alone.
    pub fn class(&self) -> TagClass {
        if self.correct == 0 {
            TagClass::Gap
        } else if self.correct == self.total {
            TagClass::Robust
        } else {
            TagClass::NonRobust
        }
    }

    pub fn as_tuple(&self) -> (usize, usize) {
        (self.correct, self.total)
    }
}

/// Category a tag falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagClass {
    Gap,
    Robust,
    NonRobust,
}

#[derive(Debug, Clone)]
struct TagIndex {
    members: BTreeMap<Tag, Vec<usize>>,
    counts: BTreeMap<Tag, TagCounts>,
}

/// Results of one domain (or one logical collection) grouped by tag.
///
/// The grouping is computed on first use and cached in `index`. The
/// results cannot be mutated through this type, so the cache is only ever
/// invalidated by building a new group.
#[derive(Debug, Clone)]
pub struct TaggedGroup {
    results: Vec<QueryResult>,
    index: OnceLock<TagIndex>,
}

impl TaggedGroup {
    /// Build a group. Every result must carry a tag.
    pub fn new(results: Vec<QueryResult>) -> Result<Self> {
        if let Some(pos) = results.iter().position(|r| r.tag.is_none()) {
            return Err(MetricsError::precondition(format!(
                "result #{pos} ({:?}) has no tag; tag every result before grouping",
                results[pos].query
            )));
        }
        Ok(Self {
            results,
            index: OnceLock::new(),
        })
    }

    /// Build a group from results already known to be tagged.
    pub(crate) fn from_tagged(results: Vec<QueryResult>) -> Self {
        debug_assert!(results.iter().all(|r| r.tag.is_some()));
        Self {
            results,
            index: OnceLock::new(),
        }
    }

    pub fn results(&self) -> &[QueryResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<QueryResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn index(&self) -> &TagIndex {
        self.index.get_or_init(|| {
            let mut members: BTreeMap<Tag, Vec<usize>> = BTreeMap::new();
            let mut counts: BTreeMap<Tag, TagCounts> = BTreeMap::new();
            for (i, result) in self.results.iter().enumerate() {
                let Some(tag) = result.tag else { continue };
                members.entry(tag).or_default().push(i);
                let entry = counts.entry(tag).or_default();
                entry.total += 1;
                if result.is_correct() {
                    entry.correct += 1;
                }
            }
            debug!(
                results = self.results.len(),
                tags = members.len(),
                "Indexed results by tag"
            );
            TagIndex { members, counts }
        })
    }

    /// Members of every tag, in encounter order.
    pub fn tag_to_examples(&self) -> BTreeMap<Tag, Vec<&QueryResult>> {
        self.index()
            .members
            .iter()
            .map(|(tag, idx)| (*tag, idx.iter().map(|&i| &self.results[i]).collect()))
            .collect()
    }

    /// Members of one tag, in encounter order. Empty for unknown tags.
    pub fn examples(&self, tag: Tag) -> impl Iterator<Item = &QueryResult> + '_ {
        self.index()
            .members
            .get(&tag)
            .into_iter()
            .flatten()
            .map(move |&i| &self.results[i])
    }

    /// `(correct, total)` for every tag.
    pub fn counts_per_tag(&self) -> &BTreeMap<Tag, TagCounts> {
        &self.index().counts
    }

    pub fn all_tags(&self) -> BTreeSet<Tag> {
        self.index().counts.keys().copied().collect()
    }

    pub fn contains_tag(&self, tag: Tag) -> bool {
        self.index().counts.contains_key(&tag)
    }

    /// Classification of `tag`, or `None` if no result carries it.
    pub fn classify(&self, tag: Tag) -> Option<TagClass> {
        self.index().counts.get(&tag).map(TagCounts::class)
    }

    fn tags_where(&self, keep: impl Fn(&TagCounts) -> bool) -> BTreeSet<Tag> {
        self.index()
            .counts
            .iter()
            .filter(|(_, c)| keep(c))
            .map(|(tag, _)| *tag)
            .collect()
    }

    /// Tags with at least one correct member.
    pub fn competent_tags(&self) -> BTreeSet<Tag> {
        self.tags_where(|c| c.correct > 0)
    }

    /// Tags that are not competent.
    pub fn gap_tags(&self) -> BTreeSet<Tag> {
        self.tags_where(|c| c.correct == 0)
    }

    /// Competent tags with no non-correct member.
    pub fn robust_tags(&self) -> BTreeSet<Tag> {
        self.tags_where(|c| c.class() == TagClass::Robust)
    }

    /// Competent tags with at least one non-correct member.
    pub fn non_robust_tags(&self) -> BTreeSet<Tag> {
        self.tags_where(|c| c.class() == TagClass::NonRobust)
    }

    /// Fraction of results counted as correct.
    ///
    /// `subset` defaults to every result in the group. Fails with
    /// [`MetricsError::EmptyPopulation`] when there is nothing to average.
    pub fn accuracy(&self, subset: Option<&[QueryResult]>, for_retrieval: bool) -> Result<f64> {
        match subset {
            Some(results) => accuracy_over(results, for_retrieval),
            None => accuracy_over(&self.results, for_retrieval),
        }
    }

    /// Accuracy restricted to results whose tag is competent.
    pub fn robustness(&self, for_retrieval: bool) -> Result<f64> {
        let competent = self.competent_tags();
        let members = self
            .results
            .iter()
            .filter(|r| r.tag.is_some_and(|t| competent.contains(&t)));
        accuracy_over(members, for_retrieval)
            .map_err(|_| MetricsError::empty("robustness (no competent tags)"))
    }

    /// Share of tags answered correctly at least once.
    pub fn knowledge_accuracy(&self) -> Result<f64> {
        let counts = &self.index().counts;
        if counts.is_empty() {
            return Err(MetricsError::empty("knowledge accuracy"));
        }
        let competent = counts.values().filter(|c| c.correct > 0).count();
        Ok(competent as f64 / counts.len() as f64)
    }

    /// Queries answered incorrectly inside each non-robust tag.
    pub fn incorrect_queries_in_non_robust_groups(&self) -> BTreeMap<Tag, Vec<&str>> {
        self.non_robust_tags()
            .into_iter()
            .map(|tag| {
                let queries = self
                    .examples(tag)
                    .filter(|r| !r.is_correct())
                    .map(|r| r.query.as_str())
                    .collect();
                (tag, queries)
            })
            .collect()
    }

    /// Queries answered correctly, for every tag (possibly empty).
    pub fn correct_queries(&self) -> BTreeMap<Tag, Vec<&str>> {
        self.index()
            .members
            .keys()
            .map(|&tag| {
                let queries = self
                    .examples(tag)
                    .filter(|r| r.is_correct())
                    .map(|r| r.query.as_str())
                    .collect();
                (tag, queries)
            })
            .collect()
    }

    /// Pair every incorrectly answered query of a non-robust tag with the
    /// paraphrases of the same tag that were answered correctly.
    pub fn correct_incorrect_pairs(&self) -> BTreeMap<&str, Vec<&str>> {
        let correct = self.correct_queries();
        let mut pairs = BTreeMap::new();
        for (tag, incorrect) in self.incorrect_queries_in_non_robust_groups() {
            let paraphrases = correct.get(&tag).cloned().unwrap_or_default();
            for query in incorrect {
                pairs.insert(query, paraphrases.clone());
            }
        }
        pairs
    }
}

/// Fraction of `results` counted as correct.
pub fn accuracy_over<'a, I>(results: I, for_retrieval: bool) -> Result<f64>
where
    I: IntoIterator<Item = &'a QueryResult>,
{
    let (correct, total) = results.into_iter().fold((0usize, 0usize), |(c, t), r| {
        (c + usize::from(r.counts_as_correct(for_retrieval)), t + 1)
    });
    if total == 0 {
        return Err(MetricsError::empty("accuracy"));
    }
    Ok(correct as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{Judgement, RETRIEVAL_OK};
    use pretty_assertions::assert_eq;

    fn judged(query: &str, tag: Tag, correct: bool) -> QueryResult {
        let verdict = if correct {
            Judgement::Correct
        } else {
            Judgement::Incorrect
        };
        QueryResult::new(query, "answer", "response")
            .with_tag(tag)
            .with_judgement(verdict)
    }

    /// Tags 1 (robust), 2 (non-robust), 3 (gap), 4 (non-robust).
    fn sample_group() -> TaggedGroup {
        TaggedGroup::new(vec![
            judged("q1a", 1, true),
            judged("q2a", 2, true),
            judged("q3a", 3, false),
            judged("q1b", 1, true),
            judged("q2b", 2, false),
            judged("q4a", 4, false),
            judged("q4b", 4, true),
            judged("q3b", 3, false),
        ])
        .unwrap()
    }

    fn set(tags: &[Tag]) -> BTreeSet<Tag> {
        tags.iter().copied().collect()
    }

    #[test]
    fn test_new_rejects_untagged_results() {
        let err = TaggedGroup::new(vec![QueryResult::new("q", "a", "a")]).unwrap_err();
        assert!(matches!(err, MetricsError::PreconditionViolation { .. }));
    }

    #[test]
    fn test_tag_to_examples_preserves_order() {
        let group = sample_group();
        let grouped = group.tag_to_examples();
        let q: Vec<&str> = grouped[&4].iter().map(|r| r.query.as_str()).collect();
        assert_eq!(q, vec!["q4a", "q4b"]);
        assert_eq!(grouped.len(), 4);
    }

    #[test]
    fn test_classification() {
        let group = sample_group();
        assert_eq!(group.all_tags(), set(&[1, 2, 3, 4]));
        assert_eq!(group.competent_tags(), set(&[1, 2, 4]));
        assert_eq!(group.gap_tags(), set(&[3]));
        assert_eq!(group.robust_tags(), set(&[1]));
        assert_eq!(group.non_robust_tags(), set(&[2, 4]));
        assert_eq!(group.classify(3), Some(TagClass::Gap));
        assert_eq!(group.classify(99), None);
    }

    #[test]
    fn test_single_member_tags() {
        let group = TaggedGroup::new(vec![judged("a", 1, true), judged("b", 2, false)]).unwrap();
        assert_eq!(group.robust_tags(), set(&[1]));
        assert_eq!(group.gap_tags(), set(&[2]));
        assert!(group.non_robust_tags().is_empty());
    }

    #[test]
    fn test_accuracy_and_robustness() {
        let group = sample_group();
        // 4 correct of 8.
        assert!((group.accuracy(None, false).unwrap() - 0.5).abs() < f64::EPSILON);
        // Competent tags 1, 2, 4 hold 6 results, 4 of them correct.
        assert!((group.robustness(false).unwrap() - 4.0 / 6.0).abs() < 1e-12);
        assert!((group.knowledge_accuracy().unwrap() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_accuracy_over_subset() {
        let group = sample_group();
        let subset = &group.results()[..2];
        assert!((group.accuracy(Some(subset), false).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_accuracy_for_retrieval_uses_retrieval_verdict() {
        let group = TaggedGroup::new(vec![
            judged("a", 1, true),
            judged("b", 1, false).with_retrieval_judgement(RETRIEVAL_OK),
        ])
        .unwrap();
        assert!((group.accuracy(None, false).unwrap() - 0.5).abs() < f64::EPSILON);
        assert!((group.accuracy(None, true).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_population_errors() {
        let group = TaggedGroup::new(Vec::new()).unwrap();
        assert!(matches!(
            group.accuracy(None, false),
            Err(MetricsError::EmptyPopulation { .. })
        ));
        assert!(matches!(
            group.knowledge_accuracy(),
            Err(MetricsError::EmptyPopulation { .. })
        ));

        let all_gaps = TaggedGroup::new(vec![judged("a", 1, false)]).unwrap();
        assert!(matches!(
            all_gaps.robustness(false),
            Err(MetricsError::EmptyPopulation { .. })
        ));
    }

    #[test]
    fn test_counts_per_tag() {
        let group = sample_group();
        let counts: Vec<(Tag, (usize, usize))> = group
            .counts_per_tag()
            .iter()
            .map(|(t, c)| (*t, c.as_tuple()))
            .collect();
        assert_eq!(counts, vec![(1, (2, 2)), (2, (1, 2)), (3, (0, 2)), (4, (1, 2))]);
    }

    #[test]
    fn test_correct_incorrect_pairs() {
        let group = sample_group();
        let pairs = group.correct_incorrect_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["q2b"], vec!["q2a"]);
        assert_eq!(pairs["q4a"], vec!["q4b"]);

        let correct = group.correct_queries();
        assert!(correct[&3].is_empty());
        assert_eq!(correct[&1], vec!["q1a", "q1b"]);
    }
}
