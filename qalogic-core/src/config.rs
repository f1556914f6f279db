//! Configuration for qalogic.
//!
//! Uses `figment` for layered configuration: defaults -> config files -> environment ->
//! explicit file -> overrides.
//! Configuration is loaded from `~/.config/qalogic/config.toml` and/or `.qalogic/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::aggregator::TagAlignment;
use crate::error::ConfigError;

/// Largest number of decimal places a report may request.
pub const MAX_REPORT_DECIMALS: usize = 6;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// How tag values relate across domains. `global` declares that every
    /// domain was tagged with one shared taxonomy.
    #[serde(default)]
    pub alignment: TagAlignment,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Settings for bulk judging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Maximum number of judge calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Whether the offline exact-match judge compares case.
    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_concurrency() -> usize {
    8
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            case_sensitive: false,
        }
    }
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Text => write!(f, "text"),
            ReportFormat::Json => write!(f, "json"),
        }
    }
}

/// Settings for rendering reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_decimals")]
    pub decimals: usize,
    #[serde(default)]
    pub format: ReportFormat,
}

fn default_decimals() -> usize {
    2
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
            format: ReportFormat::default(),
        }
    }
}

impl MetricsConfig {
    /// Reject values no operation can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.judge.concurrency == 0 {
            return Err(ConfigError::Invalid {
                message: "judge.concurrency must be at least 1".to_string(),
            });
        }
        if self.report.decimals > MAX_REPORT_DECIMALS {
            return Err(ConfigError::Invalid {
                message: format!(
                    "report.decimals is {}, the maximum is {MAX_REPORT_DECIMALS}",
                    self.report.decimals
                ),
            });
        }
        Ok(())
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "qalogic", "qalogic")
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".qalogic").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `QALOGIC_`)
/// 3. Workspace-local config (`.qalogic/config.toml`)
/// 4. User config (`~/.config/qalogic/config.toml`)
/// 5. Built-in defaults
///
/// The merged configuration is validated before it is returned.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&MetricsConfig>,
) -> Result<MetricsConfig, ConfigError> {
    load_config_with_file(workspace, None, overrides)
}

/// Like [`load_config`], with an explicit TOML file merged above the
/// environment layer and below `overrides`.
///
/// Only the keys the file sets replace lower layers.
pub fn load_config_with_file(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&MetricsConfig>,
) -> Result<MetricsConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(MetricsConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // QALOGIC_JUDGE__CONCURRENCY, QALOGIC_REPORT__FORMAT, ...
    figment = figment.merge(Env::prefixed("QALOGIC_").split("__"));

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::Invalid {
                message: format!("config file not found: {}", path.display()),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: MetricsConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

/// Check whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
