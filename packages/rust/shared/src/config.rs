//! Application configuration for LessonForge.
//!
//! User config lives at `~/.lessonforge/lessonforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LessonError, Result};
use crate::types::{SectionKind, StudentLevel};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lessonforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lessonforge";

/// Upper bound on retries for a single remote call.
pub const MAX_CALL_RETRIES: u32 = 1;

// ---------------------------------------------------------------------------
// Config structs (matching lessonforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults for generation runs.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generation service settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Progress weight overrides, keyed by section name.
    #[serde(default)]
    pub weights: BTreeMap<String, u32>,

    /// Degradation reporting policy.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_lesson_type")]
    pub lesson_type: String,

    #[serde(default = "default_student_level")]
    pub student_level: String,

    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Section scheduling: "sequential" or "parallel".
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            lesson_type: default_lesson_type(),
            student_level: default_student_level(),
            target_language: default_target_language(),
            schedule: default_schedule(),
        }
    }
}

fn default_lesson_type() -> String {
    "discussion".into()
}
fn default_student_level() -> String {
    "B1".into()
}
fn default_target_language() -> String {
    "English".into()
}
fn default_schedule() -> String {
    "sequential".into()
}

/// `[ai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default model for every section.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-call timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Budget for a whole section, including its retry.
    #[serde(default = "default_section_timeout")]
    pub section_timeout_secs: u64,

    /// Retries per remote call (0 or 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Additional endpoints sections can be routed to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            request_timeout_secs: default_request_timeout(),
            section_timeout_secs: default_section_timeout(),
            max_retries: default_max_retries(),
            endpoints: Vec::new(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_request_timeout() -> u64 {
    60
}
fn default_section_timeout() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    1
}

/// `[[ai.endpoints]]` entry: a named model instance with the sections it serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    /// Falls back to `[ai].base_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Falls back to `[ai].model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Falls back to `[ai].api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Section names routed to this endpoint.
    #[serde(default)]
    pub sections: Vec<String>,
}

/// `[policy]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Attach a user-facing notice to lessons with degraded sections.
    #[serde(default)]
    pub notify_user_on_degraded: bool,
}

// ---------------------------------------------------------------------------
// Runtime client config (resolved from config + environment)
// ---------------------------------------------------------------------------

/// Fully resolved settings for one generation endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint label used in logs and usage stats.
    pub name: String,
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

/// Section scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    #[default]
    Sequential,
    Parallel,
}

impl FromStr for Schedule {
    type Err = LessonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            other => Err(LessonError::config(format!(
                "unknown schedule '{other}': expected 'sequential' or 'parallel'"
            ))),
        }
    }
}

impl AppConfig {
    /// Check values that serde cannot: ranges, names and enums-as-strings.
    pub fn validate(&self) -> Result<()> {
        self.defaults.student_level.parse::<StudentLevel>()?;
        self.defaults.schedule.parse::<Schedule>()?;

        if self.ai.max_retries > MAX_CALL_RETRIES {
            return Err(LessonError::config(format!(
                "ai.max_retries = {} exceeds the limit of {MAX_CALL_RETRIES}",
                self.ai.max_retries
            )));
        }
        if self.ai.request_timeout_secs == 0 || self.ai.section_timeout_secs == 0 {
            return Err(LessonError::config("ai timeouts must be greater than zero"));
        }
        parse_base_url(&self.ai.base_url)?;

        for (name, weight) in &self.weights {
            name.parse::<SectionKind>()
                .map_err(|_| LessonError::config(format!("weights: unknown section '{name}'")))?;
            if *weight == 0 {
                return Err(LessonError::config(format!(
                    "weights: '{name}' must be a positive integer"
                )));
            }
        }

        for endpoint in &self.ai.endpoints {
            if let Some(url) = &endpoint.base_url {
                parse_base_url(url)?;
            }
            for section in &endpoint.sections {
                section.parse::<SectionKind>().map_err(|_| {
                    LessonError::config(format!(
                        "endpoint '{}': unknown section '{section}'",
                        endpoint.name
                    ))
                })?;
            }
        }

        Ok(())
    }

    pub fn schedule(&self) -> Result<Schedule> {
        self.defaults.schedule.parse()
    }

    /// Resolve the default endpoint, reading its API key from the environment.
    pub fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            name: "default".into(),
            base_url: parse_base_url(&self.ai.base_url)?,
            api_key: read_api_key(&self.ai.api_key_env)?,
            model: self.ai.model.clone(),
            request_timeout: Duration::from_secs(self.ai.request_timeout_secs),
        })
    }

    /// Resolve every `[[ai.endpoints]]` entry with the sections it serves.
    pub fn endpoint_configs(&self) -> Result<Vec<(ClientConfig, Vec<SectionKind>)>> {
        self.ai
            .endpoints
            .iter()
            .map(|endpoint| {
                let base_url = endpoint.base_url.as_deref().unwrap_or(&self.ai.base_url);
                let key_env = endpoint
                    .api_key_env
                    .as_deref()
                    .unwrap_or(&self.ai.api_key_env);
                let sections = endpoint
                    .sections
                    .iter()
                    .map(|s| s.parse::<SectionKind>())
                    .collect::<Result<Vec<_>>>()?;

                let client = ClientConfig {
                    name: endpoint.name.clone(),
                    base_url: parse_base_url(base_url)?,
                    api_key: read_api_key(key_env)?,
                    model: endpoint.model.clone().unwrap_or_else(|| self.ai.model.clone()),
                    request_timeout: Duration::from_secs(self.ai.request_timeout_secs),
                };
                Ok((client, sections))
            })
            .collect()
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| LessonError::config(format!("invalid base URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LessonError::config(format!(
            "base URL '{raw}' has unsupported scheme '{other}'"
        ))),
    }
}

fn read_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(LessonError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lessonforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| LessonError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lessonforge/lessonforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LessonError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| LessonError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LessonError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LessonError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LessonError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    read_api_key(&config.ai.api_key_env).map(|_| ())
}
