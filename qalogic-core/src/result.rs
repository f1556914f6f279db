//! Evaluated query records.
//!
//! A [`QueryResult`] is one question/answer pair produced by the external
//! generation pipeline, together with the model response, the query-logic
//! tag it belongs to and, once judged, its verdict. Retrieval-augmented
//! runs additionally carry the ranked document ids that were retrieved.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::Result;
use crate::judge::Judge;

/// Identifier of a semantic equivalence class ("query logic").
pub type Tag = i64;

/// Retrieval verdict: the retrieved evidence was sufficient.
pub const RETRIEVAL_OK: u8 = 1;
/// Retrieval verdict: the retrieved evidence was not sufficient.
pub const RETRIEVAL_FAILED: u8 = 0;

/// Outcome of comparing a response against the reference answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Judgement {
    Correct,
    Incorrect,
    #[default]
    Unjudged,
}

impl Judgement {
    pub fn is_correct(self) -> bool {
        self == Judgement::Correct
    }
}

impl fmt::Display for Judgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Judgement::Correct => "Correct",
            Judgement::Incorrect => "Incorrect",
            Judgement::Unjudged => "Unjudged",
        };
        f.write_str(label)
    }
}

/// A document identifier from the retrieval backend.
///
/// Backends disagree on whether ids are integers or strings, so ids are
/// normalized to their string form on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawDocumentId", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for DocumentId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDocumentId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

impl From<RawDocumentId> for DocumentId {
    fn from(raw: RawDocumentId) -> Self {
        match raw {
            RawDocumentId::Text(s) => Self(s),
            RawDocumentId::Unsigned(n) => Self(n.to_string()),
            RawDocumentId::Signed(n) => Self(n.to_string()),
        }
    }
}

/// One evaluated query instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Natural-language question text.
    pub query: String,
    /// Ground-truth answer. Structured answers are kept as compact JSON.
    #[serde(deserialize_with = "answer_text")]
    pub answer: String,
    /// Answer produced by the system under test.
    #[serde(alias = "gpt_response")]
    pub response: String,
    /// Query-logic group this instance belongs to.
    #[serde(default, alias = "query_tag")]
    pub tag: Option<Tag>,
    #[serde(default, deserialize_with = "nullable_judgement")]
    judgement: Judgement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_document_ids: Option<Vec<DocumentId>>,
    /// Retrieved document ids, best match first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_document_ids: Option<Vec<DocumentId>>,
    /// [`RETRIEVAL_OK`] or [`RETRIEVAL_FAILED`] once retrieval was judged.
    #[serde(
        default,
        deserialize_with = "retrieval_verdict",
        skip_serializing_if = "Option::is_none"
    )]
    pub retrieval_judgement: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_domain: Option<bool>,
}

impl QueryResult {
    pub fn new(
        query: impl Into<String>,
        answer: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            response: response.into(),
            tag: None,
            judgement: Judgement::Unjudged,
            true_document_ids: None,
            retrieved_document_ids: None,
            retrieval_judgement: None,
            closed_domain: None,
        }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Attach a verdict obtained elsewhere (e.g. a previous judging run).
    pub fn with_judgement(mut self, judgement: Judgement) -> Self {
        self.judgement = judgement;
        self
    }

    pub fn with_retrieved_documents<I, D>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DocumentId>,
    {
        self.retrieved_document_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_true_documents<I, D>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DocumentId>,
    {
        self.true_document_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_retrieval_judgement(mut self, verdict: u8) -> Self {
        self.retrieval_judgement = Some(verdict);
        self
    }

    pub fn with_closed_domain(mut self, closed: bool) -> Self {
        self.closed_domain = Some(closed);
        self
    }

    pub fn judgement(&self) -> Judgement {
        self.judgement
    }

    pub fn is_correct(&self) -> bool {
        self.judgement.is_correct()
    }

    pub fn is_judged(&self) -> bool {
        self.judgement != Judgement::Unjudged
    }

    /// Store a verdict if none has been stored yet.
    ///
    /// Returns `false` (and leaves the record untouched) when the result was
    /// already judged, or when `judgement` is itself `Unjudged`.
    pub fn record_judgement(&mut self, judgement: Judgement) -> bool {
        if self.is_judged() || judgement == Judgement::Unjudged {
            return false;
        }
        self.judgement = judgement;
        true
    }

    /// Whether retrieval can be credited for this result.
    ///
    /// An explicit retrieval verdict wins. Without one, a correct answer
    /// implies the retrieved evidence was sufficient.
    pub fn retrieval_credit(&self) -> bool {
        match self.retrieval_judgement {
            Some(verdict) => verdict == RETRIEVAL_OK,
            None => self.is_correct(),
        }
    }

    /// Whether this result counts towards accuracy, either for the answer
    /// itself or for the retrieval step.
    pub fn counts_as_correct(&self, for_retrieval: bool) -> bool {
        if for_retrieval {
            self.retrieval_credit()
        } else {
            self.is_correct()
        }
    }

    /// The highest-ranked retrieved document, if any.
    pub fn top_retrieved_document(&self) -> Option<&DocumentId> {
        self.retrieved_document_ids.as_ref().and_then(|ids| ids.first())
    }

    /// Judge the response, at most once.
    ///
    /// If a verdict is already stored the judge is not consulted and the
    /// stored verdict is returned.
    pub async fn judge_response(&mut self, judge: &dyn Judge) -> Result<Judgement> {
        if self.is_judged() {
            return Ok(self.judgement);
        }
        let verdict = judge
            .judge(&self.query, &self.answer, &self.response)
            .await?;
        self.record_judgement(verdict);
        Ok(self.judgement)
    }

    /// Judge a retrieval-augmented response.
    ///
    /// In a closed domain the answer can only come from the retrieved
    /// evidence, so a failed retrieval is an incorrect answer without
    /// consulting the judge.
    pub async fn judge_rag_response(&mut self, judge: &dyn Judge) -> Result<Judgement> {
        if self.closed_domain == Some(true) && self.retrieval_judgement == Some(RETRIEVAL_FAILED) {
            self.record_judgement(Judgement::Incorrect);
            return Ok(self.judgement);
        }
        self.judge_response(judge).await
    }
}

fn nullable_judgement<'de, D>(deserializer: D) -> std::result::Result<Judgement, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Judgement>::deserialize(deserializer)?.unwrap_or_default())
}

fn retrieval_verdict<'de, D>(deserializer: D) -> std::result::Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<u8>::deserialize(deserializer)? {
        Some(other) if other != RETRIEVAL_OK && other != RETRIEVAL_FAILED => Err(
            D::Error::custom(format!("retrieval_judgement must be 0 or 1, found {other}")),
        ),
        verdict => Ok(verdict),
    }
}

fn answer_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}
