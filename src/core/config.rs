use std::env;

use thiserror::Error;

/// Model used for every completion request.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_LLM_HOST: &str = "https://api.groq.com/openai";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

pub const API_KEY_VAR: &str = "GROQ_API_KEY";
pub const LLM_HOST_VAR: &str = "STUDY_BUDDY_LLM_HOST";

pub const SETUP_INSTRUCTIONS: &str = r"GROQ_API_KEY is missing!

Set your Groq API key in the environment before starting Study Buddy:

    export GROQ_API_KEY=your_groq_api_key_here

For hosted deployments, add GROQ_API_KEY to the service's secret store and
restart the process.

Get a free API key at: https://console.groq.com/keys";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {API_KEY_VAR}")]
    MissingApiKey,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl AppConfig {
    /// Resolve the config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Resolve the config using `lookup` to read variables. A blank
    /// API key counts as missing.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_api_key = lookup(API_KEY_VAR)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let openai_api_hostname =
            lookup(LLM_HOST_VAR).unwrap_or_else(|| DEFAULT_LLM_HOST.to_string());

        Ok(Self {
            openai_api_hostname,
            openai_api_key,
            openai_model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }
}
