//! Configuration types and loading.
//!
//! Config is loaded once at startup from a YAML file (default `./config.yaml`) and
//! environment, then passed explicitly to the channel, the Gemini client, and the pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading or validating configuration. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Telegram bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    #[serde(default)]
    pub tg_token: Option<String>,

    /// Gemini API key. Overridden by GEMINI_API_KEY env when set.
    #[serde(default)]
    pub gpt_token: Option<String>,

    /// Text placed before the command label in every prompt.
    #[serde(default)]
    pub preamble: String,

    /// Gemini backend settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Recognized command prefixes and the label each one puts in the prompt.
    #[serde(default = "default_commands")]
    pub commands: Vec<CommandConfig>,

    /// Pool sizes, queue capacity, deadlines, and reply texts.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tg_token: None,
            gpt_token: None,
            preamble: String::new(),
            gemini: GeminiConfig::default(),
            commands: default_commands(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Gemini model and endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// Model id (default "gemini-1.5-flash").
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// API root (default "https://generativelanguage.googleapis.com").
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
        }
    }
}

/// One command: messages starting with `prefix` become prompts labelled with `label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub prefix: String,
    pub label: String,
}

/// Worker/dispatcher pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Number of concurrent generation calls (default 10).
    #[serde(default = "default_pool_size")]
    pub worker_count: usize,

    /// Number of concurrent Telegram sends (default 10).
    #[serde(default = "default_pool_size")]
    pub dispatcher_count: usize,

    /// Capacity of the intake and outtake queues. Producers wait when a queue is full (default 64).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Deadline for a single generation call, in seconds (default 60).
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,

    /// Deadline for a single Telegram send, in seconds (default 30).
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Append which worker and dispatcher handled each reply.
    #[serde(default)]
    pub annotate_replies: bool,

    /// Reply sent when a command arrives without an argument.
    #[serde(default = "default_missing_argument_notice")]
    pub missing_argument_notice: String,

    /// Reply sent when generation fails for a request.
    #[serde(default = "default_failure_reply")]
    pub failure_reply: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_pool_size(),
            dispatcher_count: default_pool_size(),
            queue_capacity: default_queue_capacity(),
            generate_timeout_secs: default_generate_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            annotate_replies: false,
            missing_argument_notice: default_missing_argument_notice(),
            failure_reply: default_failure_reply(),
        }
    }
}

impl PipelineConfig {
    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_commands() -> Vec<CommandConfig> {
    vec![
        CommandConfig {
            prefix: "/topic".to_string(),
            label: "TOPIC".to_string(),
        },
        CommandConfig {
            prefix: "/phrase".to_string(),
            label: "PHRASE".to_string(),
        },
    ]
}

fn default_pool_size() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    64
}

fn default_generate_timeout_secs() -> u64 {
    60
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_missing_argument_notice() -> String {
    "Please, enter your topic or phrase".to_string()
}

fn default_failure_reply() -> String {
    "Sorry, I could not write that one. Please try again later.".to_string()
}

/// Non-empty trimmed value from the environment, falling back to the configured value.
fn env_or(env_key: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(env_key)
        .ok()
        .and_then(|s| non_empty(&s))
        .or_else(|| configured.and_then(|s| non_empty(s)))
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_or("TELEGRAM_BOT_TOKEN", config.tg_token.as_ref())
}

/// Resolve the Gemini API key: env GEMINI_API_KEY overrides config.
pub fn resolve_generation_key(config: &Config) -> Option<String> {
    env_or("GEMINI_API_KEY", config.gpt_token.as_ref())
}

impl Config {
    /// Check pool sizes, queue capacity, deadlines, and the command table.
    /// Secrets are checked separately, after env overrides are applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.worker_count == 0 {
            return Err(ConfigError::Invalid("pipeline.workerCount must be at least 1".into()));
        }
        if p.dispatcher_count == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.dispatcherCount must be at least 1".into(),
            ));
        }
        if p.queue_capacity == 0 {
            return Err(ConfigError::Invalid("pipeline.queueCapacity must be at least 1".into()));
        }
        if p.generate_timeout_secs == 0 || p.send_timeout_secs == 0 {
            return Err(ConfigError::Invalid("pipeline timeouts must be at least 1 second".into()));
        }
        if p.missing_argument_notice.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.missingArgumentNotice must not be empty".into(),
            ));
        }
        if p.failure_reply.trim().is_empty() {
            return Err(ConfigError::Invalid("pipeline.failureReply must not be empty".into()));
        }
        if self.commands.is_empty() {
            return Err(ConfigError::Invalid("at least one command is required".into()));
        }
        for c in &self.commands {
            let prefix = c.prefix.trim();
            if prefix.is_empty() || prefix.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "command prefix {:?} must be a single non-empty word",
                    c.prefix
                )));
            }
        }
        Ok(())
    }

    /// Apply command-line pool sizes over the file values, then validate again.
    pub fn apply_pool_overrides(
        &mut self,
        workers: Option<usize>,
        dispatchers: Option<usize>,
    ) -> Result<(), ConfigError> {
        if let Some(n) = workers {
            self.pipeline.worker_count = n;
        }
        if let Some(n) = dispatchers {
            self.pipeline.dispatcher_count = n;
        }
        self.validate()
    }
}

/// Startup secrets after env overrides.
#[derive(Clone)]
pub struct Secrets {
    pub telegram_token: String,
    pub generation_key: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

/// Resolve both secrets; either one missing is a startup error.
pub fn resolve_secrets(config: &Config) -> Result<Secrets, ConfigError> {
    let telegram_token = resolve_telegram_token(config).ok_or(ConfigError::Missing("tgToken"))?;
    let generation_key = resolve_generation_key(config).ok_or(ConfigError::Missing("gptToken"))?;
    Ok(Secrets {
        telegram_token,
        generation_key,
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("QUILL_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"))
}

/// Parse config from YAML text. `path` is only used in error messages.
pub fn parse_config(s: &str, path: &Path) -> Result<Config, ConfigError> {
    serde_yaml::from_str(s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate config from the given path (or QUILL_CONFIG_PATH, or ./config.yaml).
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf), ConfigError> {
    let path = path.unwrap_or_else(default_config_path);
    let s = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config = parse_config(&s, &path)?;
    config.validate()?;
    log::debug!("loaded config from {}", path.display());
    Ok((config, path))
}
