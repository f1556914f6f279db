//! Retrieval correction — separating generation failures from retrieval
//! failures.
//!
//! Results sharing a tag are paraphrases of one question. When an
//! incorrectly answered paraphrase retrieved the same top document as a
//! correctly answered one, the evidence was there and the generation step
//! is to blame. The corrector marks such results with a positive retrieval
//! verdict on a copy; input results are never modified.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::error::{MetricsError, Result};
use crate::result::{QueryResult, RETRIEVAL_FAILED, RETRIEVAL_OK, Tag};
use crate::tagged_group::TaggedGroup;

/// How a retrieval verdict is obtained for a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalJudgeMethod {
    /// Trust the verdict already stored on the result.
    UseExisting,
    /// Compare retrieved ids with the ground-truth ids.
    UseGroundTruth,
    /// Compare with correctly answered paraphrases of the same tag.
    #[default]
    ContextComparison,
}

/// Applies retrieval correction against one [`TaggedGroup`].
pub struct RetrievalCorrector<'a> {
    group: &'a TaggedGroup,
    non_robust: BTreeSet<Tag>,
}

impl<'a> RetrievalCorrector<'a> {
    pub fn new(group: &'a TaggedGroup) -> Self {
        Self {
            group,
            non_robust: group.non_robust_tags(),
        }
    }

    pub fn group(&self) -> &TaggedGroup {
        self.group
    }

    /// Whether [`correct`](Self::correct) may be applied to `result`.
    pub fn applies_to(&self, result: &QueryResult) -> bool {
        result.tag.is_some_and(|t| self.non_robust.contains(&t))
    }

    /// Return a corrected copy of `result`.
    ///
    /// Precondition: the result's tag is non-robust in the group. Gap tags
    /// have no correct paraphrase to compare with and robust tags have
    /// nothing to correct, so both are rejected with
    /// [`MetricsError::PreconditionViolation`].
    pub fn correct(&self, result: &QueryResult) -> Result<QueryResult> {
        let tag = self.require_non_robust(result)?;
        let mut corrected = result.clone();
        if result.is_correct() {
            return Ok(corrected);
        }

        let Some(top) = result.top_retrieved_document() else {
            return Ok(corrected);
        };
        let shares_evidence = self
            .group
            .examples(tag)
            .filter(|example| example.is_correct())
            .any(|example| example.top_retrieved_document() == Some(top));
        if shares_evidence {
            debug!(tag, query = result.query.as_str(), document = %top, "Retrieval not at fault");
            corrected.retrieval_judgement = Some(RETRIEVAL_OK);
        }
        Ok(corrected)
    }

    /// Return a copy of `result` carrying a retrieval verdict obtained with
    /// `method`.
    ///
    /// A correct answer in a closed domain can only have come from the
    /// retrieved evidence, so it is credited regardless of `method`.
    pub fn judge(&self, result: &QueryResult, method: RetrievalJudgeMethod) -> Result<QueryResult> {
        if result.closed_domain == Some(true) && result.is_correct() {
            let mut judged = result.clone();
            judged.retrieval_judgement = Some(RETRIEVAL_OK);
            return Ok(judged);
        }

        match method {
            RetrievalJudgeMethod::UseExisting => match result.retrieval_judgement {
                Some(RETRIEVAL_OK) | Some(RETRIEVAL_FAILED) => Ok(result.clone()),
                other => Err(MetricsError::precondition(format!(
                    "retrieval verdict for {:?} must already be 0 or 1, found {other:?}",
                    result.query
                ))),
            },
            RetrievalJudgeMethod::UseGroundTruth => {
                let Some(truth) = result.true_document_ids.as_ref() else {
                    return Err(MetricsError::precondition(format!(
                        "ground-truth document ids missing for {:?}",
                        result.query
                    )));
                };
                let truth: BTreeSet<_> = truth.iter().collect();
                let retrieved: BTreeSet<_> = result
                    .retrieved_document_ids
                    .iter()
                    .flatten()
                    .collect();
                let mut judged = result.clone();
                judged.retrieval_judgement = Some(if truth == retrieved {
                    RETRIEVAL_OK
                } else {
                    RETRIEVAL_FAILED
                });
                Ok(judged)
            }
            RetrievalJudgeMethod::ContextComparison => self.correct(result),
        }
    }

    /// Correct every incorrect result of a non-robust tag in the group and
    /// pass all other results through unchanged, preserving order.
    pub fn correct_group(&self) -> Result<Vec<QueryResult>> {
        self.correct_results(self.group.results())
    }

    /// Like [`correct_group`](Self::correct_group) for an arbitrary slice,
    /// classified against this corrector's group.
    pub fn correct_results(&self, results: &[QueryResult]) -> Result<Vec<QueryResult>> {
        let mut rescued = 0usize;
        let corrected = results
            .iter()
            .map(|result| {
                if self.applies_to(result) && !result.is_correct() {
                    let fixed = self.correct(result)?;
                    if fixed.retrieval_judgement != result.retrieval_judgement {
                        rescued += 1;
                    }
                    Ok(fixed)
                } else {
                    Ok(result.clone())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            results = results.len(),
            non_robust_tags = self.non_robust.len(),
            rescued,
            "Applied retrieval correction"
        );
        Ok(corrected)
    }

    fn require_non_robust(&self, result: &QueryResult) -> Result<Tag> {
        match result.tag {
            Some(tag) if self.non_robust.contains(&tag) => Ok(tag),
            Some(tag) => Err(MetricsError::precondition(format!(
                "retrieval correction needs a non-robust tag; tag {tag} is {:?}",
                self.group.classify(tag)
            ))),
            None => Err(MetricsError::precondition(format!(
                "retrieval correction needs a tagged result; {:?} has no tag",
                result.query
            ))),
        }
    }
}
