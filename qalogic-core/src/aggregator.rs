//! Multi-domain metrics aggregation.
//!
//! A [`MetricsAggregator`] composes one [`TaggedGroup`] per domain. Tags
//! are read domain-locally by default. When every domain was tagged with
//! the same taxonomy they can be aligned globally, so that tag `k` in one
//! domain is the same query logic as tag `k` in any other.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

use crate::correction::RetrievalCorrector;
use crate::error::{MetricsError, Result};
use crate::report::Report;
use crate::result::{QueryResult, Tag};
use crate::tagged_group::{TaggedGroup, accuracy_over};

/// How tags relate across domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagAlignment {
    /// Tag values come from one taxonomy shared by every domain.
    #[default]
    Global,
    /// Tag values are only meaningful inside their own domain.
    Domain,
}

/// Which statistic shape to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// One value per domain.
    PerDomain,
    /// One value pooled over every result of every domain.
    Overall,
}

impl Aggregation {
    /// Resolve a pair of mutually exclusive flags into an aggregation mode.
    ///
    /// Exactly one flag must be set.
    pub fn from_flags(per_domain: bool, overall: bool) -> Result<Self> {
        match (per_domain, overall) {
            (true, false) => Ok(Aggregation::PerDomain),
            (false, true) => Ok(Aggregation::Overall),
            (false, false) => Err(MetricsError::invalid_configuration(
                "no aggregation mode requested; choose per-domain or overall",
            )),
            (true, true) => Err(MetricsError::invalid_configuration(
                "per-domain and overall aggregation are mutually exclusive",
            )),
        }
    }
}

/// Key of a per-scope tag set: a named domain or every domain at once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainScope {
    Domain(String),
    AllDomains,
}

impl fmt::Display for DomainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainScope::Domain(name) => f.write_str(name),
            DomainScope::AllDomains => f.write_str("all domains"),
        }
    }
}

/// A statistic, either pooled or broken down by domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Overall(f64),
    PerDomain(BTreeMap<String, f64>),
}

impl Score {
    pub fn overall(&self) -> Option<f64> {
        match self {
            Score::Overall(v) => Some(*v),
            Score::PerDomain(_) => None,
        }
    }

    pub fn per_domain(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Score::Overall(_) => None,
            Score::PerDomain(map) => Some(map),
        }
    }
}

/// Accuracy, robustness and knowledge statistics over several domains.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    domains: BTreeMap<String, TaggedGroup>,
    alignment: TagAlignment,
    global: OnceLock<TaggedGroup>,
}

impl MetricsAggregator {
    /// Group each domain's results. Every result must carry a tag.
    ///
    /// The aggregator starts with [`TagAlignment::Domain`]; callers that
    /// guarantee a shared taxonomy opt in with
    /// [`with_alignment`](Self::with_alignment).
    pub fn new(domains: BTreeMap<String, Vec<QueryResult>>) -> Result<Self> {
        let domains = domains
            .into_iter()
            .map(|(name, results)| {
                TaggedGroup::new(results)
                    .map(|group| (name.clone(), group))
                    .map_err(|e| MetricsError::precondition(format!("domain {name:?}: {e}")))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self::from_groups(domains))
    }

    pub fn from_groups(domains: BTreeMap<String, TaggedGroup>) -> Self {
        Self {
            domains,
            alignment: TagAlignment::Domain,
            global: OnceLock::new(),
        }
    }

    /// Declare how tags relate across domains.
    pub fn with_alignment(mut self, alignment: TagAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn alignment(&self) -> TagAlignment {
        self.alignment
    }

    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    pub fn domains(&self) -> &BTreeMap<String, TaggedGroup> {
        &self.domains
    }

    pub fn group(&self, domain: &str) -> Option<&TaggedGroup> {
        self.domains.get(domain)
    }

    /// Every domain's results pooled into one group, for global alignment.
    pub fn global_group(&self) -> Result<&TaggedGroup> {
        self.require_alignment(true)?;
        Ok(self.pooled())
    }

    fn pooled(&self) -> &TaggedGroup {
        self.global.get_or_init(|| {
            let pooled: Vec<QueryResult> = self
                .domains
                .values()
                .flat_map(|g| g.results().iter().cloned())
                .collect();
            debug!(
                domains = self.domains.len(),
                results = pooled.len(),
                "Pooled domains for global tag alignment"
            );
            TaggedGroup::from_tagged(pooled)
        })
    }

    fn require_alignment(&self, align_globally: bool) -> Result<()> {
        if align_globally && self.alignment != TagAlignment::Global {
            return Err(MetricsError::precondition(
                "global tag alignment requested, but domains were not declared to share a tag taxonomy",
            ));
        }
        Ok(())
    }

    /// Competent tags per domain, plus an [`DomainScope::AllDomains`] entry
    /// when aligning globally.
    pub fn tag_competency(&self, align_globally: bool) -> Result<BTreeMap<DomainScope, BTreeSet<Tag>>> {
        self.require_alignment(align_globally)?;
        let mut competency: BTreeMap<DomainScope, BTreeSet<Tag>> = self
            .domains
            .iter()
            .map(|(name, group)| (DomainScope::Domain(name.clone()), group.competent_tags()))
            .collect();
        if align_globally {
            competency.insert(DomainScope::AllDomains, self.pooled().competent_tags());
        }
        Ok(competency)
    }

    /// Every tag per domain, plus an [`DomainScope::AllDomains`] entry when
    /// aligning globally.
    pub fn all_tags(&self, align_globally: bool) -> Result<BTreeMap<DomainScope, BTreeSet<Tag>>> {
        self.require_alignment(align_globally)?;
        let mut tags: BTreeMap<DomainScope, BTreeSet<Tag>> = self
            .domains
            .iter()
            .map(|(name, group)| (DomainScope::Domain(name.clone()), group.all_tags()))
            .collect();
        if align_globally {
            tags.insert(DomainScope::AllDomains, self.pooled().all_tags());
        }
        Ok(tags)
    }

    /// Tags never answered correctly.
    ///
    /// With global alignment a tag is a gap only if no domain answered it
    /// correctly. Domain-locally, the union of every domain's gaps.
    pub fn tag_gaps(&self, align_globally: bool) -> Result<BTreeSet<Tag>> {
        self.require_alignment(align_globally)?;
        if align_globally {
            return Ok(self.pooled().gap_tags());
        }
        Ok(self
            .domains
            .values()
            .flat_map(|group| group.gap_tags())
            .collect())
    }

    /// Competent tags that apply to `domain` under the chosen alignment.
    fn competent_for(&self, group: &TaggedGroup, align_globally: bool) -> BTreeSet<Tag> {
        if align_globally {
            self.pooled().competent_tags()
        } else {
            group.competent_tags()
        }
    }

    /// Results per domain: the judged originals, or the retrieval-corrected
    /// copies when `for_retrieval` is set.
    fn population(&self, for_retrieval: bool) -> Result<BTreeMap<&str, Cow<'_, [QueryResult]>>> {
        if !for_retrieval {
            return Ok(self
                .domains
                .iter()
                .map(|(name, group)| (name.as_str(), Cow::Borrowed(group.results())))
                .collect());
        }
        let mut corrected = self.correct_for_retrieval()?;
        Ok(self
            .domains
            .keys()
            .map(|name| {
                let results = corrected.remove(name).unwrap_or_default();
                (name.as_str(), Cow::Owned(results))
            })
            .collect())
    }

    /// Fraction of results counted as correct.
    pub fn accuracy(&self, for_retrieval: bool, aggregation: Aggregation) -> Result<Score> {
        let population = self.population(for_retrieval)?;
        match aggregation {
            Aggregation::PerDomain => population
                .iter()
                .map(|(name, results)| {
                    accuracy_over(results.iter(), for_retrieval)
                        .map(|v| (name.to_string(), v))
                        .map_err(|_| MetricsError::empty(format!("accuracy of domain {name:?}")))
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Score::PerDomain),
            Aggregation::Overall => {
                accuracy_over(population.values().flat_map(|r| r.iter()), for_retrieval)
                    .map(Score::Overall)
            }
        }
    }

    /// Accuracy restricted to results whose tag is competent.
    ///
    /// Competency always comes from the answer judgements; `for_retrieval`
    /// only changes which results count as correct inside competent tags.
    pub fn robustness(
        &self,
        for_retrieval: bool,
        aggregation: Aggregation,
        align_globally: bool,
    ) -> Result<Score> {
        self.require_alignment(align_globally)?;
        let population = self.population(for_retrieval)?;
        let competent: BTreeMap<&str, BTreeSet<Tag>> = self
            .domains
            .iter()
            .map(|(name, group)| (name.as_str(), self.competent_for(group, align_globally)))
            .collect();
        let in_competent = |name: &str, r: &QueryResult| {
            r.tag
                .is_some_and(|t| competent.get(name).is_some_and(|set| set.contains(&t)))
        };

        match aggregation {
            Aggregation::PerDomain => population
                .iter()
                .map(|(name, results)| {
                    let members = results.iter().filter(|r| in_competent(name, r));
                    accuracy_over(members, for_retrieval)
                        .map(|v| (name.to_string(), v))
                        .map_err(|_| {
                            MetricsError::empty(format!(
                                "robustness of domain {name:?} (no competent tags)"
                            ))
                        })
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Score::PerDomain),
            Aggregation::Overall => {
                let members = population
                    .iter()
                    .flat_map(|(name, results)| results.iter().filter(move |r| in_competent(name, r)));
                accuracy_over(members, for_retrieval)
                    .map(Score::Overall)
                    .map_err(|_| MetricsError::empty("robustness (no competent tags)"))
            }
        }
    }

    /// Share of tags answered correctly at least once.
    ///
    /// Per domain, a domain's tag counts as known under global alignment if
    /// any domain answered it correctly.
    pub fn knowledge_accuracy(&self, aggregation: Aggregation, align_globally: bool) -> Result<Score> {
        self.require_alignment(align_globally)?;
        match aggregation {
            Aggregation::PerDomain => self
                .domains
                .iter()
                .map(|(name, group)| {
                    let tags = group.all_tags();
                    if tags.is_empty() {
                        return Err(MetricsError::empty(format!(
                            "knowledge accuracy of domain {name:?}"
                        )));
                    }
                    let competent = self.competent_for(group, align_globally);
                    let known = tags.iter().filter(|t| competent.contains(t)).count();
                    Ok((name.clone(), known as f64 / tags.len() as f64))
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Score::PerDomain),
            Aggregation::Overall if align_globally => {
                self.pooled().knowledge_accuracy().map(Score::Overall)
            }
            Aggregation::Overall => {
                let (known, total) = self.domains.values().fold((0, 0), |(k, t), group| {
                    let counts = group.counts_per_tag();
                    (
                        k + counts.values().filter(|c| c.correct > 0).count(),
                        t + counts.len(),
                    )
                });
                if total == 0 {
                    return Err(MetricsError::empty("knowledge accuracy"));
                }
                Ok(Score::Overall(known as f64 / total as f64))
            }
        }
    }

    /// Retrieval-corrected copy of every domain's results.
    ///
    /// Incorrect results of non-robust tags are corrected against their
    /// paraphrases; everything else passes through unchanged. Under global
    /// alignment, paraphrases from every domain are eligible evidence.
    pub fn correct_for_retrieval(&self) -> Result<BTreeMap<String, Vec<QueryResult>>> {
        match self.alignment {
            TagAlignment::Global => {
                let corrector = RetrievalCorrector::new(self.pooled());
                self.domains
                    .iter()
                    .map(|(name, group)| -> Result<(String, Vec<QueryResult>)> {
                        Ok((name.clone(), corrector.correct_results(group.results())?))
                    })
                    .collect()
            }
            TagAlignment::Domain => self
                .domains
                .iter()
                .map(|(name, group)| -> Result<(String, Vec<QueryResult>)> {
                    Ok((name.clone(), RetrievalCorrector::new(group).correct_group()?))
                })
                .collect(),
        }
    }

    /// Per-domain group statistics with consistency checks.
    pub fn report(&self, align_globally: bool) -> Result<Report> {
        self.require_alignment(align_globally)?;
        Report::build(self, align_globally)
    }
}
