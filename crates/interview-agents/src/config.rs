use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use interview_orchestration::OrchestratorConfig;

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ModelEndpoint {
    /// Base URL up to and including `/v1`.
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Runtime configuration for the interview agents.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: ModelEndpoint,
    /// Facts REST service. `None` keeps the index in memory.
    pub index_url: Option<String>,
    /// TOML file with orchestrator tunables.
    pub orchestrator_config: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl AgentConfig {
    /// Build from any key lookup; `Default` reads the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let timeout_secs = lookup("INTERVIEW_MODEL_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);
        Self {
            model: ModelEndpoint {
                url: lookup("INTERVIEW_MODEL_URL")
                    .unwrap_or_else(|| "http://localhost:8000/v1".into()),
                model: lookup("INTERVIEW_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
                api_key: lookup("INTERVIEW_API_KEY").filter(|k| !k.is_empty()),
                max_tokens: 1024,
                temperature: 0.3,
                timeout: Duration::from_secs(timeout_secs),
            },
            index_url: lookup("INTERVIEW_INDEX_URL").filter(|u| !u.is_empty()),
            orchestrator_config: lookup("INTERVIEW_CONFIG")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Load and validate orchestrator tunables, falling back to defaults
    /// when no file is configured.
    pub fn load_orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let config = match &self.orchestrator_config {
            Some(path) => OrchestratorConfig::load(path)
                .with_context(|| format!("Failed to load orchestrator config from {}", path.display()))?,
            None => OrchestratorConfig::default(),
        };
        config
            .validate()
            .context("Orchestrator config failed validation")?;
        Ok(config)
    }
}

/// Check if an inference endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = AgentConfig::from_lookup(lookup(&[]));
        assert_eq!(config.model.url, "http://localhost:8000/v1");
        assert!(config.model.api_key.is_none());
        assert!(config.index_url.is_none());
        assert!(config.orchestrator_config.is_none());
        assert_eq!(config.model.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_env_overrides() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("INTERVIEW_MODEL_URL", "http://judge:9000/v1"),
            ("INTERVIEW_MODEL", "qwen"),
            ("INTERVIEW_API_KEY", ""),
            ("INTERVIEW_INDEX_URL", "http://rag:8001"),
            ("INTERVIEW_MODEL_TIMEOUT_SECS", "30"),
        ]));
        assert_eq!(config.model.url, "http://judge:9000/v1");
        assert_eq!(config.model.model, "qwen");
        assert!(config.model.api_key.is_none());
        assert_eq!(config.index_url.as_deref(), Some("http://rag:8001"));
        assert_eq!(config.model.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_load_orchestrator_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "transcript_window = 4").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = AgentConfig::from_lookup(lookup(&[("INTERVIEW_CONFIG", path.as_str())]));
        let loaded = config.load_orchestrator_config().unwrap();
        assert_eq!(loaded.transcript_window, 4);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let config =
            AgentConfig::from_lookup(lookup(&[("INTERVIEW_CONFIG", "/nonexistent/interview.toml")]));
        assert!(config.load_orchestrator_config().is_err());
    }
}
