use crate::ai::{AiBackend, ClaudeClient, GeminiClient, OllamaClient, OpenAIClient};
use crate::provider::Provider;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub ollama_url: Option<String>,
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some("ollama".to_string()),
            default_model: None,
            ollama_url: None,
            claude_api_key: None,
            openai_api_key: None,
            gemini_api_key: None,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Ollama)
    }

    pub fn model(&self) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| self.provider().default_model().to_string())
    }

    fn stored_key(&self, provider: Provider) -> Option<&String> {
        match provider {
            Provider::Ollama => None,
            Provider::Claude => self.claude_api_key.as_ref(),
            Provider::OpenAI => self.openai_api_key.as_ref(),
            Provider::Gemini => self.gemini_api_key.as_ref(),
        }
    }

    /// API key for `provider`, checking the environment first, then config
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        self.api_key_with(provider, |var| std::env::var(var).ok())
    }

    fn api_key_with(&self, provider: Provider, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        provider
            .key_env_var()
            .and_then(|var| env(var))
            .filter(|key| !key.is_empty())
            .or_else(|| self.stored_key(provider).cloned())
    }

    fn require_key(&self, provider: Provider) -> Result<String> {
        self.api_key(provider).ok_or_else(|| {
            anyhow!(
                "{} API key not configured. Set {} or add it to {}",
                provider.display_name(),
                provider.key_env_var().unwrap_or("the API key"),
                Self::get_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "the config file".to_string())
            )
        })
    }

    /// Build the AI backend for the configured provider and model
    pub fn backend(&self) -> Result<Box<dyn AiBackend>> {
        let model = self.model();
        let backend: Box<dyn AiBackend> = match self.provider() {
            Provider::Ollama => {
                let url = self.ollama_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
                Box::new(OllamaClient::new(url, &model))
            }
            Provider::Claude => Box::new(ClaudeClient::new(&self.require_key(Provider::Claude)?, &model)),
            Provider::OpenAI => Box::new(OpenAIClient::new(&self.require_key(Provider::OpenAI)?, &model)),
            Provider::Gemini => Box::new(GeminiClient::new(&self.require_key(Provider::Gemini)?, &model)),
        };
        Ok(backend)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("scriptwright").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.provider(), Provider::Ollama);
        assert_eq!(config.model(), Provider::Ollama.default_model());
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::new();
        config.provider = Some("gemini".to_string());
        config.default_model = Some("gemini-2.5-pro".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.provider(), Provider::Gemini);
        assert_eq!(loaded.model(), "gemini-2.5-pro");
    }

    #[test]
    fn test_config_without_gemini_key_field_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"provider":"claude","default_model":null,"ollama_url":null,"claude_api_key":"k","openai_api_key":null}"#,
        )
        .unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.claude_api_key.as_deref(), Some("k"));
        assert!(loaded.gemini_api_key.is_none());
    }

    #[test]
    fn test_env_key_takes_precedence() {
        let mut config = Config::new();
        config.openai_api_key = Some("stored".to_string());

        let from_env = config.api_key_with(Provider::OpenAI, |_| Some("env".to_string()));
        assert_eq!(from_env.as_deref(), Some("env"));

        let fallback = config.api_key_with(Provider::OpenAI, |_| None);
        assert_eq!(fallback.as_deref(), Some("stored"));

        assert_eq!(config.api_key_with(Provider::Ollama, |_| Some("x".into())), None);
    }

    #[test]
    fn test_ollama_backend_needs_no_key() {
        assert!(Config::new().backend().is_ok());
    }
}
