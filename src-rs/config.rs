use anyhow::{bail, Result};
use std::env;
use std::fmt;

pub const DEFAULT_BUNDLE_ID: &str = "com.tencent.xinWeChat";

pub const ENV_PROVIDER: &str = "WECHAT_ASSIST_AI_PROVIDER";
pub const ENV_MODEL: &str = "WECHAT_ASSIST_AI_MODEL";
pub const ENV_BASE_URL: &str = "WECHAT_ASSIST_AI_BASE_URL";
pub const ENV_API_KEY: &str = "WECHAT_ASSIST_AI_API_KEY";
pub const ENV_BUNDLE_ID: &str = "WECHAT_ASSIST_BUNDLE_ID";
pub const ENV_LOG: &str = "WECHAT_ASSIST_LOG";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
// Ollama ignores the key but OpenAI-compatible clients still send one.
const OLLAMA_PLACEHOLDER_KEY: &str = "ollama";
const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Ollama,
}

impl Provider {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            other => bail!("unsupported {ENV_PROVIDER} {other:?} (expected openai or ollama)"),
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => OPENAI_BASE_URL,
            Provider::Ollama => OLLAMA_BASE_URL,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
        })
    }
}

/// Chat-completion endpoint settings for reply generation.
#[derive(Clone, PartialEq)]
pub struct AiConfig {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub temperature: f32,
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl AiConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from a variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider = match var(ENV_PROVIDER) {
            Some(raw) => Provider::parse(&raw)?,
            None => Provider::OpenAi,
        };
        let Some(model) = var(ENV_MODEL) else {
            bail!("{ENV_MODEL} must be set to the model used for replies");
        };
        let base_url = var(ENV_BASE_URL)
            .unwrap_or_else(|| provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();
        let api_key = match (var(ENV_API_KEY), provider) {
            (Some(key), _) => key,
            (None, Provider::Ollama) => OLLAMA_PLACEHOLDER_KEY.to_string(),
            (None, Provider::OpenAi) => bail!("{ENV_API_KEY} must be set for provider openai"),
        };

        Ok(Self {
            provider,
            model,
            base_url,
            api_key,
            temperature: DEFAULT_TEMPERATURE,
        })
    }
}

/// Target app: explicit flag, then `WECHAT_ASSIST_BUNDLE_ID`, then WeChat.
pub fn bundle_id(flag: Option<&str>) -> String {
    resolve_bundle_id(flag, |name| env::var(name).ok())
}

fn resolve_bundle_id<F>(flag: Option<&str>, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    flag.map(str::to_string)
        .or_else(|| lookup(ENV_BUNDLE_ID))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BUNDLE_ID.to_string())
}
