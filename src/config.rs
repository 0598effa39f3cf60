use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Externally reachable base URL Telegram delivers updates to.
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Bot API server override (a local Bot API server, or a mock in tests).
    #[serde(default)]
    pub api_url: Option<String>,
    /// Shared secret Telegram echoes back in `X-Telegram-Bot-Api-Secret-Token`.
    #[serde(default)]
    pub secret_token: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            webhook_url: String::new(),
            listen_addr: default_listen_addr(),
            api_url: None,
            secret_token: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 1984))
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_system_prompt() -> String {
    "You are a kind and patient English tutor. The user is learning English. \
     First, if there are grammar, spelling, or word choice mistakes, gently correct them \
     and give a very short explanation (1 sentence). \
     Then, continue the conversation naturally in English on the same topic. \
     Keep responses encouraging, clear, and under 3 sentences."
        .to_string()
}

impl Config {
    /// Load the optional TOML file at `path`, apply environment overrides and
    /// validate the result. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            info!(
                "No config file at {}, using defaults and environment",
                path.display()
            );
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay values from the environment. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(url) = var("WEBHOOK_URL") {
            self.telegram.webhook_url = url;
        }
        if let Some(url) = var("TELEGRAM_API_URL") {
            self.telegram.api_url = Some(url);
        }
        if let Some(secret) = var("WEBHOOK_SECRET_TOKEN") {
            self.telegram.secret_token = Some(secret);
        }
        if let Some(addr) = var("LISTEN_ADDR") {
            match addr.parse() {
                Ok(addr) => self.telegram.listen_addr = addr,
                Err(_) => tracing::warn!("Ignoring invalid LISTEN_ADDR: {}", addr),
            }
        }
        if let Some(key) = var("GROQ_API_KEY") {
            self.llm.api_key = Some(key);
        }

        // An empty key in the file means "not configured".
        if self.llm.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            self.llm.api_key = None;
        }
        if self.telegram.secret_token.as_deref().is_some_and(str::is_empty) {
            self.telegram.secret_token = None;
        }
    }

    /// Startup checks. The LLM API key is deliberately not required here:
    /// its absence surfaces per call instead.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("TELEGRAM_BOT_TOKEN is not set");
        }
        if self.telegram.webhook_url.trim().is_empty() {
            bail!("WEBHOOK_URL is not set (e.g. https://123456.ngrok-free.app)");
        }
        self.telegram.webhook_endpoint()?;
        self.telegram.api_url()?;

        if let Some(secret) = &self.telegram.secret_token {
            let valid_chars = secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if secret.len() > 256 || !valid_chars {
                bail!("WEBHOOK_SECRET_TOKEN must be 1-256 characters of A-Z, a-z, 0-9, _ and -");
            }
        }
        Ok(())
    }
}

impl TelegramConfig {
    /// The URL registered with Telegram: the webhook base with a root path.
    pub fn webhook_endpoint(&self) -> Result<Url> {
        let base = self.webhook_url.trim().trim_end_matches('/');
        Url::parse(&format!("{base}/"))
            .with_context(|| format!("Invalid WEBHOOK_URL: {}", self.webhook_url))
    }

    pub fn api_url(&self) -> Result<Option<Url>> {
        self.api_url
            .as_deref()
            .map(|url| Url::parse(url).with_context(|| format!("Invalid TELEGRAM_API_URL: {url}")))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn from_env(pairs: &[(&str, &str)]) -> Config {
        let mut config = Config::default();
        config.apply_env(env(pairs));
        config
    }

    #[test]
    fn test_defaults_match_tutor_setup() {
        let config = Config::default();
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(config.llm.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.llm.max_tokens, 500);
        assert_eq!(config.llm.timeout_secs, 20);
        assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.llm.system_prompt.contains("English tutor"));
        assert_eq!(config.telegram.listen_addr.port(), 1984);
    }

    #[test]
    fn test_env_values_fill_config() {
        let config = from_env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("WEBHOOK_URL", "https://example.ngrok-free.app"),
            ("GROQ_API_KEY", "gsk-test"),
        ]);
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.llm.api_key.as_deref(), Some("gsk-test"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_bot_token_is_fatal() {
        let config = from_env(&[("WEBHOOK_URL", "https://example.com")]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_missing_webhook_url_is_fatal() {
        let config = from_env(&[("TELEGRAM_BOT_TOKEN", "123:abc")]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("WEBHOOK_URL"));
    }

    #[test]
    fn test_empty_env_values_count_as_unset() {
        let config = from_env(&[
            ("TELEGRAM_BOT_TOKEN", "  "),
            ("WEBHOOK_URL", "https://example.com"),
            ("GROQ_API_KEY", ""),
        ]);
        assert!(config.validate().is_err());
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_missing_api_key_is_not_a_startup_error() {
        let config = from_env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("WEBHOOK_URL", "https://example.com"),
        ]);
        assert!(config.llm.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_webhook_endpoint_has_single_root_slash() {
        let mut telegram = TelegramConfig {
            webhook_url: "https://example.com/".to_string(),
            ..TelegramConfig::default()
        };
        assert_eq!(
            telegram.webhook_endpoint().unwrap().as_str(),
            "https://example.com/"
        );

        telegram.webhook_url = "https://example.com/hooks".to_string();
        assert_eq!(
            telegram.webhook_endpoint().unwrap().as_str(),
            "https://example.com/hooks/"
        );
    }

    #[test]
    fn test_invalid_webhook_url_rejected() {
        let config = from_env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("WEBHOOK_URL", "not a url"),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_file_with_env_override() {
        let mut config = Config::parse(
            r#"
[telegram]
bot_token = "from-file"
webhook_url = "https://file.example.com"
listen_addr = "127.0.0.1:8080"

[llm]
api_key = ""
model = "llama-3.1-8b-instant"
max_tokens = 256
"#,
        )
        .unwrap();
        config.apply_env(env(&[("TELEGRAM_BOT_TOKEN", "from-env")]));

        assert_eq!(config.telegram.bot_token, "from-env");
        assert_eq!(config.telegram.webhook_url, "https://file.example.com");
        assert_eq!(config.telegram.listen_addr.port(), 8080);
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.llm.max_tokens, 256);
        assert_eq!(config.llm.timeout_secs, 20);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_invalid_listen_addr_keeps_default() {
        let config = from_env(&[("LISTEN_ADDR", "nowhere")]);
        assert_eq!(config.telegram.listen_addr, default_listen_addr());
    }

    #[test]
    fn test_secret_token_charset_checked() {
        let mut config = from_env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("WEBHOOK_URL", "https://example.com"),
            ("WEBHOOK_SECRET_TOKEN", "good_secret-1"),
        ]);
        assert!(config.validate().is_ok());

        config.telegram.secret_token = Some("bad secret!".to_string());
        assert!(config.validate().is_err());
    }
}
