//! Configuration system for Pollard.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/pollard/config.toml` and/or `.pollard/config.toml`
//! in the workspace directory.

use crate::error::ConfigError;
use crate::pipeline::fetcher::{self, GITHUB_API_BASE};
use crate::pipeline::options::ScoreOpts;
use crate::pipeline::synthesizer;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const WORKSPACE_DIR: &str = ".pollard";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollardConfig {
    pub fetch: FetchConfig,
    pub synthesis: SynthesisConfig,
    pub score: ScoreOpts,
}

/// Fetch stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Concurrent outbound requests.
    pub parallelism: usize,
    /// HTTP client timeout in seconds.
    pub request_timeout_secs: u64,
    /// Code host API root. Point at a local server in tests.
    pub github_api_base: String,
    /// Optional bearer token for the code host API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    pub user_agent: String,
    pub fetch_readme: bool,
    pub fetch_docs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            parallelism: fetcher::DEFAULT_PARALLELISM,
            request_timeout_secs: fetcher::REQUEST_TIMEOUT.as_secs(),
            github_api_base: GITHUB_API_BASE.to_string(),
            github_token: None,
            user_agent: fetcher::USER_AGENT.to_string(),
            fetch_readme: true,
            fetch_docs: true,
        }
    }
}

/// Synthesis stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Agent command line, e.g. `"claude"`. Empty disables synthesis.
    pub agent: String,
    /// Concurrent agent processes.
    pub parallelism: usize,
    /// Per-item agent timeout in seconds.
    pub timeout_secs: u64,
    /// Items synthesized per run in balanced mode (0 = all).
    pub balanced_limit: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            agent: String::new(),
            parallelism: synthesizer::DEFAULT_PARALLELISM,
            timeout_secs: synthesizer::DEFAULT_TIMEOUT.as_secs(),
            balanced_limit: synthesizer::DEFAULT_BALANCED_LIMIT,
        }
    }
}

impl PollardConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.fetch.parallelism == 0 {
            return invalid("fetch.parallelism must be at least 1");
        }
        if self.fetch.request_timeout_secs == 0 {
            return invalid("fetch.request_timeout_secs must be at least 1");
        }
        if url::Url::parse(&self.fetch.github_api_base).is_err() {
            return invalid("fetch.github_api_base is not a valid URL");
        }
        if self.synthesis.parallelism == 0 {
            return invalid("synthesis.parallelism must be at least 1");
        }
        if self.synthesis.timeout_secs == 0 {
            return invalid("synthesis.timeout_secs must be at least 1");
        }

        let weights = &self.score.weights;
        if !weights.is_valid() {
            return invalid("score.weights must be non-negative and sum to a positive value");
        }

        let half_lives = &self.score.half_lives;
        if [half_lives.trends, half_lives.research, half_lives.repos]
            .iter()
            .any(|d| d.is_zero())
        {
            return invalid("score.half_lives must be positive");
        }

        let thresholds = &self.score.thresholds;
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(thresholds.high) || !in_range(thresholds.medium) {
            return invalid("score.thresholds must be within [0, 1]");
        }
        if thresholds.medium > thresholds.high {
            return invalid("score.thresholds.medium must not exceed score.thresholds.high");
        }

        Ok(())
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "pollard", "pollard")
}

/// User-level config path, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Workspace-level config path.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_DIR).join(CONFIG_FILE)
}

/// Load configuration from all sources, merging them in priority order.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `POLLARD_`)
/// 3. Workspace-local config (`.pollard/config.toml`)
/// 4. User config (`~/.config/pollard/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&PollardConfig>,
) -> Result<PollardConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PollardConfig::default()));

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

    // POLLARD_FETCH__PARALLELISM, POLLARD_SYNTHESIS__AGENT, ...
    figment = figment.merge(Env::prefixed("POLLARD_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load a single explicit config file on top of the defaults.
pub fn load_config_file(path: &Path) -> Result<PollardConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Figment::from(Serialized::defaults(PollardConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// Check whether any Pollard configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
