//! CLI subcommand handlers.

use crate::output::{RetrievalSummary, render_hypothesis, render_report};
use crate::{AlignArg, Commands, ConfigAction, FormatArg};
use qalogic_core::{
    Aggregation, ExactMatchJudge, HypothesisComparison, MetricsAggregator, MetricsConfig,
    MetricsError, ReportFormat, TagAlignment, judge_all,
};
use std::path::Path;
use tracing::info;

impl From<AlignArg> for TagAlignment {
    fn from(arg: AlignArg) -> Self {
        match arg {
            AlignArg::Global => TagAlignment::Global,
            AlignArg::Domain => TagAlignment::Domain,
        }
    }
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Report {
            dataset,
            align,
            format,
            decimals,
            retrieval,
        } => {
            let config = load(workspace, config_file)?;
            let alignment = align.map(Into::into).unwrap_or(config.alignment);
            let format = format.map(Into::into).unwrap_or(config.report.format);
            let decimals = decimals.unwrap_or(config.report.decimals);
            let text = report(&dataset, alignment, format, decimals, retrieval)?;
            println!("{text}");
            Ok(())
        }
        Commands::Correct {
            dataset,
            output,
            align,
        } => {
            let config = load(workspace, config_file)?;
            let alignment = align.map(Into::into).unwrap_or(config.alignment);
            correct(&dataset, &output, alignment)
        }
        Commands::Judge {
            dataset,
            output,
            concurrency,
            case_sensitive,
        } => {
            let config = load(workspace, config_file)?;
            let concurrency = concurrency.unwrap_or(config.judge.concurrency);
            let case_sensitive = case_sensitive || config.judge.case_sensitive;
            judge(&dataset, &output, concurrency, case_sensitive).await
        }
        Commands::Hypothesis {
            robust,
            non_robust,
            format,
        } => {
            let config = load(workspace, config_file)?;
            let format = format.map(Into::into).unwrap_or(config.report.format);
            let text = hypothesis(&robust, &non_robust, format, config.report.decimals)?;
            println!("{text}");
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace, config_file),
    }
}

/// Load layered configuration, with an explicit config file above the
/// environment layer.
fn load(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<MetricsConfig> {
    qalogic_core::load_config_with_file(Some(workspace), config_file, None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn aggregator(dataset: &Path, alignment: TagAlignment) -> anyhow::Result<MetricsAggregator> {
    let domains = qalogic_core::load_domains(dataset)?;
    Ok(MetricsAggregator::new(domains)?.with_alignment(alignment))
}

pub(crate) fn report(
    dataset: &Path,
    alignment: TagAlignment,
    format: ReportFormat,
    decimals: usize,
    retrieval: bool,
) -> anyhow::Result<String> {
    let agg = aggregator(dataset, alignment)?;
    let align_globally = alignment == TagAlignment::Global;
    let report = agg.report(align_globally)?;

    let summary = if retrieval {
        let accuracy = agg
            .accuracy(true, Aggregation::Overall)?
            .overall()
            .unwrap_or_default();
        let robustness = match agg.robustness(true, Aggregation::Overall, align_globally) {
            Ok(score) => score.overall(),
            Err(MetricsError::EmptyPopulation { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        Some(RetrievalSummary {
            accuracy,
            robustness,
        })
    } else {
        None
    };

    render_report(&report, summary.as_ref(), format, decimals)
}

pub(crate) fn correct(dataset: &Path, output: &Path, alignment: TagAlignment) -> anyhow::Result<()> {
    let agg = aggregator(dataset, alignment)?;
    let corrected = agg.correct_for_retrieval()?;
    qalogic_core::save_domains(output, &corrected)?;
    info!(output = %output.display(), "Wrote retrieval-corrected dataset");
    Ok(())
}

pub(crate) async fn judge(
    dataset: &Path,
    output: &Path,
    concurrency: usize,
    case_sensitive: bool,
) -> anyhow::Result<()> {
    let mut domains = qalogic_core::load_domains(dataset)?;
    let judge = ExactMatchJudge::new(case_sensitive);
    let mut judged = 0;
    for (name, results) in domains.iter_mut() {
        let n = judge_all(results, &judge, concurrency).await?;
        info!(domain = name.as_str(), judged = n, "Judged domain");
        judged += n;
    }
    qalogic_core::save_domains(output, &domains)?;
    info!(judged, output = %output.display(), "Wrote judged dataset");
    Ok(())
}

pub(crate) fn hypothesis(
    robust: &Path,
    non_robust: &Path,
    format: ReportFormat,
    decimals: usize,
) -> anyhow::Result<String> {
    let comparison = HypothesisComparison::from_results(
        qalogic_core::load_results(robust)?,
        qalogic_core::load_results(non_robust)?,
    )?;
    render_hypothesis(&comparison.report()?, format, decimals)
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".qalogic");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = MetricsConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_file)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
