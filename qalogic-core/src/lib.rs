//! # qalogic Core
//!
//! Robustness metrics for question-answering evaluation results.
//! Groups judged results by query-logic tag, classifies each group as a
//! gap, robust or non-robust group, computes accuracy, robustness and
//! knowledge accuracy across domains, and separates retrieval failures
//! from generation failures.

pub mod aggregator;
pub mod config;
pub mod correction;
pub mod dataset;
pub mod error;
pub mod hypothesis;
pub mod judge;
pub mod report;
pub mod result;
pub mod tagged_group;

// Re-export commonly used types at the crate root.
pub use aggregator::{Aggregation, DomainScope, MetricsAggregator, Score, TagAlignment};
pub use config::{
    JudgeConfig, MetricsConfig, ReportConfig, ReportFormat, load_config, load_config_with_file,
};
pub use correction::{RetrievalCorrector, RetrievalJudgeMethod};
pub use dataset::{DomainResults, load_domains, load_results, save_domains};
pub use error::{ConfigError, JudgeError, MetricsError, Result};
pub use hypothesis::{HypothesisComparison, HypothesisReport};
pub use judge::{CompletionClient, ExactMatchJudge, Judge, SemanticsMatchJudge, judge_all};
pub use report::{DomainReport, GroupCount, GroupStats, Report};
pub use result::{DocumentId, Judgement, QueryResult, RETRIEVAL_FAILED, RETRIEVAL_OK, Tag};
pub use tagged_group::{TagClass, TagCounts, TaggedGroup, accuracy_over};
