//! Group statistics reports.
//!
//! Summarizes `(correct, total)` counts per tag into gap / robust /
//! non-robust group statistics and checks that the correct examples are
//! fully accounted for by the robust and non-robust groups.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};

use crate::aggregator::MetricsAggregator;
use crate::error::{MetricsError, Result};
use crate::result::Tag;
use crate::tagged_group::{TagCounts, TaggedGroup};

/// Number of groups, examples and correct examples in one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupCount {
    pub groups: usize,
    pub examples: usize,
    pub correct: usize,
}

impl GroupCount {
    fn add(&mut self, counts: TagCounts) {
        self.groups += 1;
        self.examples += counts.total;
        self.correct += counts.correct;
    }

    fn merge(&mut self, other: &GroupCount) {
        self.groups += other.groups;
        self.examples += other.examples;
        self.correct += other.correct;
    }
}

/// Statistics over the groups of one domain (or one cluster).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupStats {
    pub gap: GroupCount,
    pub robust: GroupCount,
    pub non_robust: GroupCount,
    pub total: GroupCount,
}

impl GroupStats {
    /// Build statistics from per-tag counts and the gap tags chosen by the
    /// caller's tag alignment.
    ///
    /// A non-gap tag is robust when every example is correct and non-robust
    /// otherwise. Under global alignment this includes tags answered
    /// correctly only in other domains.
    pub fn from_details(details: &BTreeMap<Tag, TagCounts>, gap_tags: &BTreeSet<Tag>) -> Result<Self> {
        let mut stats = GroupStats::default();
        for (tag, counts) in details {
            if gap_tags.contains(tag) {
                stats.gap.add(*counts);
            } else if counts.correct == counts.total && counts.total > 0 {
                stats.robust.add(*counts);
            } else {
                stats.non_robust.add(*counts);
            }
            stats.total.add(*counts);
        }
        stats.check_consistency()?;
        Ok(stats)
    }

    /// Build statistics from bare `(correct, total)` pairs, treating a group
    /// as a gap exactly when none of its examples is correct.
    pub fn from_counts(counts: &[(usize, usize)]) -> Result<Self> {
        let details: BTreeMap<Tag, TagCounts> = counts
            .iter()
            .zip(0..)
            .map(|(&(correct, total), tag)| (tag, TagCounts::new(correct, total)))
            .collect();
        let gaps = details
            .iter()
            .filter(|(_, c)| c.correct == 0)
            .map(|(tag, _)| *tag)
            .collect();
        Self::from_details(&details, &gaps)
    }

    /// Statistics for a single group with its own gap tags.
    pub fn from_group(group: &TaggedGroup) -> Result<Self> {
        Self::from_details(group.counts_per_tag(), &group.gap_tags())
    }

    /// Every correct example must sit in a robust or non-robust group.
    pub fn check_consistency(&self) -> Result<()> {
        let expected = self.robust.correct + self.non_robust.correct;
        if self.total.correct != expected {
            return Err(MetricsError::InternalConsistency {
                expected,
                actual: self.total.correct,
            });
        }
        Ok(())
    }

    pub fn accuracy(&self) -> Result<f64> {
        if self.total.examples == 0 {
            return Err(MetricsError::empty("accuracy"));
        }
        Ok(self.total.correct as f64 / self.total.examples as f64)
    }

    /// Accuracy over robust and non-robust examples. `None` when there are
    /// no competent examples.
    pub fn robustness(&self) -> Option<f64> {
        let (correct, total) = self.robustness_fraction();
        (total > 0).then(|| correct as f64 / total as f64)
    }

    /// Numerator and denominator of [`robustness`](Self::robustness).
    pub fn robustness_fraction(&self) -> (usize, usize) {
        (
            self.robust.examples + self.non_robust.correct,
            self.robust.examples + self.non_robust.examples,
        )
    }

    fn merge(&mut self, other: &GroupStats) {
        self.gap.merge(&other.gap);
        self.robust.merge(&other.robust);
        self.non_robust.merge(&other.non_robust);
        self.total.merge(&other.total);
    }

    /// Human-readable block, rounding ratios to `decimals` places.
    pub fn render(&self, decimals: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Gap groups: {} groups with {} examples",
            self.gap.groups, self.gap.examples
        );
        let _ = writeln!(
            out,
            "Robust groups (# of groups/examples/correct examples): {} / {} / {}",
            self.robust.groups, self.robust.examples, self.robust.correct
        );
        let _ = writeln!(
            out,
            "Non-robust groups (# of groups/examples/correct examples): {} / {} / {}",
            self.non_robust.groups, self.non_robust.examples, self.non_robust.correct
        );
        let _ = writeln!(
            out,
            "Total number of groups: {} groups with {} examples",
            self.total.groups, self.total.examples
        );
        match self.accuracy() {
            Ok(acc) => {
                let _ = writeln!(
                    out,
                    "\tAccuracy: {acc:.decimals$} ({} / {})",
                    self.total.correct, self.total.examples
                );
            }
            Err(_) => out.push_str("\tAccuracy: n/a (no examples)\n"),
        }
        let (num, den) = self.robustness_fraction();
        match self.robustness() {
            Some(rob) => {
                let _ = writeln!(out, "\tRobustness: {rob:.decimals$} ({num} / {den})");
            }
            None => out.push_str("\tRobustness: n/a (no competent groups)\n"),
        }
        out
    }
}

/// Report section for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainReport {
    pub domain: String,
    pub stats: GroupStats,
    pub accuracy: f64,
    pub robustness: Option<f64>,
}

/// Per-domain group statistics plus pooled totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub align_globally: bool,
    pub domains: Vec<DomainReport>,
    pub overall: GroupStats,
    pub overall_accuracy: f64,
    pub overall_robustness: Option<f64>,
}

impl Report {
    pub(crate) fn build(aggregator: &MetricsAggregator, align_globally: bool) -> Result<Self> {
        let global_gaps = if align_globally {
            Some(aggregator.tag_gaps(true)?)
        } else {
            None
        };

        let mut overall = GroupStats::default();
        let mut domains = Vec::with_capacity(aggregator.domains().len());
        for (name, group) in aggregator.domains() {
            let stats = match &global_gaps {
                Some(gaps) => GroupStats::from_details(group.counts_per_tag(), gaps)?,
                None => GroupStats::from_group(group)?,
            };
            let accuracy = stats
                .accuracy()
                .map_err(|_| MetricsError::empty(format!("report for domain {name:?}")))?;
            overall.merge(&stats);
            domains.push(DomainReport {
                domain: name.clone(),
                stats,
                accuracy,
                robustness: stats.robustness(),
            });
        }
        overall.check_consistency()?;

        Ok(Self {
            align_globally,
            domains,
            overall,
            overall_accuracy: overall.accuracy()?,
            overall_robustness: overall.robustness(),
        })
    }

    /// Human-readable report, rounding ratios to `decimals` places.
    pub fn render(&self, decimals: usize) -> String {
        let mut out = String::new();
        for section in &self.domains {
            let _ = writeln!(out, "====== {} ======", section.domain);
            out.push_str(&section.stats.render(decimals));
            out.push('\n');
        }
        let scope = if self.align_globally {
            "globally aligned tags"
        } else {
            "domain-local tags"
        };
        let _ = writeln!(out, "====== all domains ({scope}) ======");
        out.push_str(&self.overall.render(decimals));
        out
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(f.precision().unwrap_or(2)))
    }
}
