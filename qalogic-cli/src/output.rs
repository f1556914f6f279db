//! Rendering of reports for the terminal or as JSON.

use qalogic_core::{HypothesisReport, Report, ReportFormat};
use serde::Serialize;
use std::fmt::Write as _;

/// Retrieval-corrected headline numbers over every domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrievalSummary {
    pub accuracy: f64,
    /// `None` when no tag was answered correctly anywhere.
    pub robustness: Option<f64>,
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    #[serde(flatten)]
    report: &'a Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    retrieval: Option<&'a RetrievalSummary>,
}

pub fn render_report(
    report: &Report,
    retrieval: Option<&RetrievalSummary>,
    format: ReportFormat,
    decimals: usize,
) -> anyhow::Result<String> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(&ReportOutput {
            report,
            retrieval,
        })?),
        ReportFormat::Text => {
            let mut out = report.render(decimals);
            if let Some(summary) = retrieval {
                out.push('\n');
                let _ = writeln!(out, "====== retrieval (corrected) ======");
                let _ = writeln!(out, "\tAccuracy: {:.decimals$}", summary.accuracy);
                match summary.robustness {
                    Some(rob) => {
                        let _ = writeln!(out, "\tRobustness: {rob:.decimals$}");
                    }
                    None => out.push_str("\tRobustness: n/a (no competent groups)\n"),
                }
            }
            Ok(out)
        }
    }
}

pub fn render_hypothesis(
    report: &HypothesisReport,
    format: ReportFormat,
    decimals: usize,
) -> anyhow::Result<String> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ReportFormat::Text => {
            let mut out = String::new();
            let gaps: Vec<String> = report
                .mutual_gap_tags
                .iter()
                .map(|t| t.to_string())
                .collect();
            let _ = writeln!(out, "Mutual gap tags: [{}]", gaps.join(", "));
            out.push_str("\n====== robust cluster ======\n");
            out.push_str(&report.robust_cluster.render(decimals));
            out.push_str("\n====== non-robust cluster ======\n");
            out.push_str(&report.non_robust_cluster.render(decimals));
            if let Some(delta) = report.robustness_gap() {
                let _ = writeln!(out, "\nRobustness difference: {delta:+.decimals$}");
            }
            Ok(out)
        }
    }
}
