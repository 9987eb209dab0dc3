use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::conversation::{ChatMode, ModeKind};
use crate::provider::Provider;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub mode: Option<String>,
    pub gemini_api_key: Option<String>,
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub secret: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Gemini.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Load the config file (defaults when absent) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Persist the model choice without touching anything else in the file.
    ///
    /// Re-reads the file so environment overrides never get written to disk.
    pub fn save_default_model(model: &str) -> Result<()> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path).unwrap_or_else(|_| Self::new());
        config.default_model = Some(model.to_string());
        config.save_to(&path)
    }

    /// Environment values win over the file; `lookup` is `std::env::var` outside tests
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(key) = non_empty("ANTHROPIC_API_KEY") {
            self.claude_api_key = Some(key);
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(url) = non_empty("OLLAMA_HOST") {
            self.ollama_url = Some(url);
        }
        if let Some(secret) = non_empty("LARS_SECRET") {
            self.secret = Some(secret);
        }
    }

    pub fn api_key(&self, provider: Provider) -> Option<String> {
        match provider {
            Provider::Gemini => self.gemini_api_key.clone(),
            Provider::Claude => self.claude_api_key.clone(),
            Provider::OpenAI => self.openai_api_key.clone(),
            Provider::Ollama => None,
        }
    }

    pub fn provider(&self) -> Result<Provider> {
        match self.provider.as_deref() {
            Some(name) => name.parse::<Provider>().map_err(|e| anyhow!(e)),
            None => Ok(Provider::Gemini),
        }
    }

    /// Configured model, or the provider's default
    pub fn model_for(&self, provider: Provider) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string())
    }

    pub fn ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Decide which chat variant to run.
    ///
    /// An explicit choice (command line, then config file) wins. Without one
    /// the chat is gated when a passphrase is available and open otherwise.
    pub fn resolve_mode(&self, explicit: Option<ModeKind>) -> Result<ChatMode> {
        let configured = match self.mode.as_deref() {
            Some(name) => Some(name.parse::<ModeKind>().map_err(|e| anyhow!(e))?),
            None => None,
        };
        let secret = self.secret.clone().filter(|s| !s.is_empty());

        let kind = explicit.or(configured).unwrap_or(if secret.is_some() {
            ModeKind::Gated
        } else {
            ModeKind::Open
        });

        match kind {
            ModeKind::Scripted => Ok(ChatMode::Scripted),
            ModeKind::Open => Ok(ChatMode::Open),
            ModeKind::Gated => secret
                .map(|secret| ChatMode::Gated { secret })
                .ok_or_else(|| anyhow!("gated mode needs a passphrase: set LARS_SECRET or \"secret\" in the config file")),
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("lars"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("lars.log"))
    }
}
