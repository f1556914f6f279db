//! Judging seam — turns (query, true answer, response) into a verdict.
//!
//! Judges are explicit dependencies: a [`SemanticsMatchJudge`] owns the
//! [`CompletionClient`] it talks to, so there is no process-wide model
//! client. Judging happens strictly before grouping; see [`judge_all`].

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::error::{JudgeError, MetricsError, Result};
use crate::result::{Judgement, QueryResult};

/// Produces a verdict for a single response.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Compare `response` against `true_answer` for `query`.
    async fn judge(
        &self,
        query: &str,
        true_answer: &str,
        response: &str,
    ) -> std::result::Result<Judgement, JudgeError>;

    /// Human-readable name of this judge.
    fn name(&self) -> &str;
}

/// Minimal text-completion interface a model-backed judge needs.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, JudgeError>;

    /// Model identifier, used for logging.
    fn model_name(&self) -> &str;
}

/// Judge that asks a language model whether the response matches the
/// reference answer semantically.
pub struct SemanticsMatchJudge<C> {
    client: C,
}

impl<C: CompletionClient> SemanticsMatchJudge<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Render the grading prompt.
    pub fn render_prompt(query: &str, true_answer: &str, response: &str) -> String {
        format!(
            "Evaluate the accuracy of the given response in relation to the true answer for the \
             specified query. After evaluating, provide a judgement as either \"Correct\" or \
             \"Incorrect\" based on whether the ##Given Response## accurately matches the \
             ##True Answer##.\n\n\
             ##Query##: {query}\n\
             ##True Answer##: {true_answer}\n\
             ##Given Response##: {response}\n\
             ##Judgement##:"
        )
    }
}

#[async_trait]
impl<C: CompletionClient> Judge for SemanticsMatchJudge<C> {
    async fn judge(
        &self,
        query: &str,
        true_answer: &str,
        response: &str,
    ) -> std::result::Result<Judgement, JudgeError> {
        let prompt = Self::render_prompt(query, true_answer, response);
        let raw = self.client.complete(&prompt).await?;
        debug!(model = self.client.model_name(), raw = raw.as_str(), "Judge replied");
        parse_verdict(&raw)
    }

    fn name(&self) -> &str {
        "semantics_match"
    }
}

/// Parse a free-text verdict.
///
/// Models often decorate the label ("Correct.", "**Incorrect**"), so only
/// the leading word after stripping punctuation is considered.
pub fn parse_verdict(raw: &str) -> std::result::Result<Judgement, JudgeError> {
    let lowered = raw
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if lowered.starts_with("incorrect") {
        Ok(Judgement::Incorrect)
    } else if lowered.starts_with("correct") {
        Ok(Judgement::Correct)
    } else {
        Err(JudgeError::UnparseableVerdict {
            raw: raw.to_string(),
        })
    }
}

/// Offline judge: normalized exact string comparison.
#[derive(Debug, Clone, Default)]
pub struct ExactMatchJudge {
    pub case_sensitive: bool,
}

impl ExactMatchJudge {
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    fn normalize(&self, text: &str) -> String {
        let collapsed = text
            .trim()
            .trim_matches(|c: char| c == '"' || c == '.')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if self.case_sensitive {
            collapsed
        } else {
            collapsed.to_lowercase()
        }
    }
}

#[async_trait]
impl Judge for ExactMatchJudge {
    async fn judge(
        &self,
        _query: &str,
        true_answer: &str,
        response: &str,
    ) -> std::result::Result<Judgement, JudgeError> {
        if self.normalize(true_answer) == self.normalize(response) {
            Ok(Judgement::Correct)
        } else {
            Ok(Judgement::Incorrect)
        }
    }

    fn name(&self) -> &str {
        "exact_match"
    }
}

/// Judge every unjudged result with at most `concurrency` calls in flight.
///
/// Each result is borrowed exclusively by a single in-flight call, so the
/// same record is never judged concurrently. Already-judged results are
/// skipped. Returns the number of results that were judged by this call.
pub async fn judge_all(
    results: &mut [QueryResult],
    judge: &dyn Judge,
    concurrency: usize,
) -> Result<usize> {
    if concurrency == 0 {
        return Err(MetricsError::invalid_configuration(
            "judging concurrency must be at least 1",
        ));
    }

    let pending: Vec<&mut QueryResult> = results.iter_mut().filter(|r| !r.is_judged()).collect();
    let count = pending.len();
    info!(judge = judge.name(), pending = count, concurrency, "Judging results");

    stream::iter(pending)
        .map(|result| async move {
            result.judge_response(judge).await.inspect_err(|e| {
                warn!(query = result.query.as_str(), error = %e, "Judge failed");
            })
        })
        .buffer_unordered(concurrency)
        .try_collect::<Vec<_>>()
        .await?;

    Ok(count)
}
