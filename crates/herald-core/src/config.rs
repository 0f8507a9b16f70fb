use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HeraldError, Result};

/// Top-level Herald configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
///
/// This layer sits under the `[collaborators]` stage retry; leave it unset
/// unless the model endpoint needs retries of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Graph engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Negative verdicts allowed per (asset, loop kind) before forward progress is forced.
    #[serde(default = "default_retry_bound")]
    pub retry_bound: u32,
    /// Chunks requested per retrieval call.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Upper bound on the number of planned assets.
    #[serde(default = "default_max_assets")]
    pub max_assets: usize,
    /// Runaway guard: transitions allowed in a single `advance` call.
    #[serde(default = "default_max_transitions")]
    pub max_transitions: usize,
    /// Query used by the Reviewer to fetch brand guidelines.
    #[serde(default = "default_guidelines_query")]
    pub guidelines_query: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            retry_bound: default_retry_bound(),
            top_k: default_top_k(),
            max_assets: default_max_assets(),
            max_transitions: default_max_transitions(),
            guidelines_query: default_guidelines_query(),
        }
    }
}

fn default_retry_bound() -> u32 { 3 }
fn default_top_k() -> usize { 3 }
fn default_max_assets() -> usize { 5 }
fn default_max_transitions() -> usize { 200 }
fn default_guidelines_query() -> String { "Brand Tone and Forbidden Words".to_string() }

/// Timeout and transient-retry policy for collaborator calls.
///
/// With `[model.retry]` also set, one transient generation failure can cost
/// up to `max_attempts * (max_retries + 1)` requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts for a transient failure (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_call_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_call_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_call_backoff(),
            max_backoff_ms: default_call_max_backoff(),
        }
    }
}

impl CollaboratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 { 60 }
fn default_max_attempts() -> u32 { 3 }
fn default_call_backoff() -> u64 { 250 }
fn default_call_max_backoff() -> u64 { 4000 }

/// Snapshot store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String { "~/.herald/campaigns.db".to_string() }

/// Knowledge base location and chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_path")]
    pub path: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: default_knowledge_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_knowledge_path() -> String { "~/.herald/knowledge.db".to_string() }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }

/// Where published documents land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String { "~/.herald/published".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| HeraldError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| HeraldError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.top_k == 0 {
            return Err(HeraldError::Config("workflow.top_k must be at least 1".into()));
        }
        if self.workflow.max_assets == 0 {
            return Err(HeraldError::Config(
                "workflow.max_assets must be at least 1".into(),
            ));
        }
        if self.collaborators.max_attempts == 0 {
            return Err(HeraldError::Config(
                "collaborators.max_attempts must be at least 1".into(),
            ));
        }
        if self.knowledge.chunk_overlap >= self.knowledge.chunk_size {
            return Err(HeraldError::Config(
                "knowledge.chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        expand_home(&self.store.path)
    }

    pub fn knowledge_path(&self) -> PathBuf {
        expand_home(&self.knowledge.path)
    }

    pub fn output_dir(&self) -> PathBuf {
        expand_home(&self.publish.output_dir)
    }
}

/// Resolve a leading `~/` against `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_HERALD_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_HERALD_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_HERALD_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_HERALD_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_HERALD_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let toml_str = r#"
[model]
model_id = "gemini-2.5-flash"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.workflow.retry_bound, 3);
        assert_eq!(config.workflow.top_k, 3);
        assert_eq!(config.workflow.max_assets, 5);
        assert_eq!(config.workflow.guidelines_query, "Brand Tone and Forbidden Words");
        assert_eq!(config.collaborators.max_attempts, 3);
        assert_eq!(config.knowledge.chunk_size, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_chunking() {
        let toml_str = r#"
[model]
model_id = "m"

[knowledge]
chunk_size = 100
chunk_overlap = 100
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(config.validate(), Err(HeraldError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let toml_str = r#"
[model]
model_id = "m"

[collaborators]
max_attempts = 0
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_home() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(expand_home("~/x/y.db"), PathBuf::from("/home/tester/x/y.db"));
        assert_eq!(expand_home("/abs/y.db"), PathBuf::from("/abs/y.db"));
    }
}
