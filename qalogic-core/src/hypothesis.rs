//! Comparison of two clusters tagged with the same taxonomy.
//!
//! Typical use: one cluster holds short phrasings, the other long
//! phrasings of the same questions. A tag is only treated as a gap when
//! neither cluster answered it, so both reports count the same groups as
//! out of reach.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::report::GroupStats;
use crate::result::{QueryResult, Tag};
use crate::tagged_group::TaggedGroup;

/// Group statistics for both clusters of a [`HypothesisComparison`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisReport {
    pub mutual_gap_tags: BTreeSet<Tag>,
    pub robust_cluster: GroupStats,
    pub non_robust_cluster: GroupStats,
}

impl HypothesisReport {
    /// Robustness difference, robust cluster minus non-robust cluster.
    pub fn robustness_gap(&self) -> Option<f64> {
        Some(self.robust_cluster.robustness()? - self.non_robust_cluster.robustness()?)
    }
}

#[derive(Debug, Clone)]
pub struct HypothesisComparison {
    robust: TaggedGroup,
    non_robust: TaggedGroup,
}

impl HypothesisComparison {
    pub fn new(robust_cluster: TaggedGroup, non_robust_cluster: TaggedGroup) -> Self {
        Self {
            robust: robust_cluster,
            non_robust: non_robust_cluster,
        }
    }

    /// Build both clusters from raw results. Every result must be tagged.
    pub fn from_results(
        robust_cluster: Vec<QueryResult>,
        non_robust_cluster: Vec<QueryResult>,
    ) -> Result<Self> {
        Ok(Self::new(
            TaggedGroup::new(robust_cluster)?,
            TaggedGroup::new(non_robust_cluster)?,
        ))
    }

    pub fn robust_cluster(&self) -> &TaggedGroup {
        &self.robust
    }

    pub fn non_robust_cluster(&self) -> &TaggedGroup {
        &self.non_robust
    }

    /// Tags that are gaps in both clusters.
    pub fn mutual_gap_tags(&self) -> BTreeSet<Tag> {
        self.robust
            .gap_tags()
            .intersection(&self.non_robust.gap_tags())
            .copied()
            .collect()
    }

    pub fn report(&self) -> Result<HypothesisReport> {
        let gaps = self.mutual_gap_tags();
        Ok(HypothesisReport {
            robust_cluster: GroupStats::from_details(self.robust.counts_per_tag(), &gaps)?,
            non_robust_cluster: GroupStats::from_details(self.non_robust.counts_per_tag(), &gaps)?,
            mutual_gap_tags: gaps,
        })
    }
}
