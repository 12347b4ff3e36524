use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::agent::history::{MAX_STEPS, VIEWPORT_EXPANSION};
use crate::agent::model::ModelOptions;

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "page-pilot",
    version,
    about = "LLM-driven browser automation agent"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: page-pilot.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one natural-language task against a live page
    Run {
        /// The task to complete
        #[arg(long)]
        task: String,

        /// URL to open before the task starts
        #[arg(long)]
        url: Option<String>,

        /// Path to the browser sidecar script
        #[arg(long)]
        sidecar: Option<String>,

        /// Model name (falls back to OPENAI_MODEL / MODEL)
        #[arg(long)]
        model: Option<String>,

        /// API key (falls back to OPENAI_API_KEY / API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// API base URL (falls back to OPENAI_BASE_URL / BASE_URL)
        #[arg(long)]
        base_url: Option<String>,

        /// Maximum steps for this task
        #[arg(long)]
        max_steps: Option<usize>,

        /// Viewport expansion in px (-1 = whole page, 0 = viewport only)
        #[arg(long)]
        viewport_expansion: Option<i64>,

        /// JSONL trace output path
        #[arg(long)]
        trace: Option<String>,

        /// Enable the execute_javascript tool (off by default)
        #[arg(long, default_value_t = false)]
        allow_scripts: bool,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `page-pilot.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub agent: AgentSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSection {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSection {
    #[serde(default = "default_sidecar")]
    pub sidecar: String,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            sidecar: default_sidecar(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_viewport_expansion")]
    pub viewport_expansion: i64,

    #[serde(default = "default_language")]
    pub working_language: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: MAX_STEPS,
            viewport_expansion: VIEWPORT_EXPANSION,
            working_language: default_language(),
        }
    }
}

// Serde default helpers
fn default_sidecar() -> String { "scripts/browser_server.js".to_string() }
fn default_max_steps() -> usize { MAX_STEPS }
fn default_viewport_expansion() -> i64 { VIEWPORT_EXPANSION }
fn default_language() -> String { "English".to_string() }

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or("page-pilot.yaml");
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_default(),
        Err(_) => AppConfig::default(),
    }
}

// ============================================================================
// Resolution (merge CLI args, config file, environment)
// ============================================================================

/// First non-empty environment variable among `names`.
pub fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
}

/// Resolve model options: CLI > config file > environment > defaults.
pub fn resolve_model_options(
    cli_model: Option<&str>,
    cli_api_key: Option<&str>,
    cli_base_url: Option<&str>,
    config: &ModelSection,
) -> ModelOptions {
    let model = cli_model
        .map(str::to_string)
        .or_else(|| config.model.clone())
        .or_else(|| env_first(&["OPENAI_MODEL", "MODEL"]))
        .unwrap_or_else(|| "gpt-4o-mini".to_string());
    let api_key = cli_api_key
        .map(str::to_string)
        .or_else(|| config.api_key.clone())
        .or_else(|| env_first(&["OPENAI_API_KEY", "API_KEY"]))
        .unwrap_or_default();
    let base_url = cli_base_url
        .map(str::to_string)
        .or_else(|| config.base_url.clone())
        .or_else(|| env_first(&["OPENAI_BASE_URL", "BASE_URL"]))
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
    ModelOptions {
        model,
        api_key,
        base_url,
    }
}
