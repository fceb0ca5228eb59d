use anyhow::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::conversation::{
    CostEstimator, MessageCounter, TokenCounter, WindowConfig, WindowStrategy,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub memory: MemoryConfig,
    pub llm: LlmConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    pub budget: usize,
    pub strategy: WindowStrategy,
    pub include_system: bool,
    pub estimator: EstimatorKind,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Budget counts messages
    Messages,
    /// Budget counts estimated tokens
    Tokens,
}

impl MemoryConfig {
    pub fn window(&self) -> WindowConfig {
        WindowConfig::new(self.budget, self.strategy, self.include_system)
    }

    pub fn estimator(&self) -> Arc<dyn CostEstimator> {
        match self.estimator {
            EstimatorKind::Messages => Arc::new(MessageCounter),
            EstimatorKind::Tokens => Arc::new(TokenCounter::default()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub system_prompt: String,
}

impl Settings {
    /// Defaults, then the optional settings file, then `APP__*` env vars
    pub fn load_from(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let env = Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true);
        let mut settings = Self::load_with(path, env)?;

        if settings.llm.api_key.is_none() {
            settings.llm.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        Ok(settings)
    }

    fn load_with(path: &str, env: Environment) -> Result<Self> {
        let config = Self::defaults()?
            .add_source(File::with_name(path).required(false))
            .add_source(env)
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("memory.budget", 500_i64)?
            .set_default("memory.strategy", "keep_last_with_system_pinned")?
            .set_default("memory.include_system", true)?
            .set_default("memory.estimator", "tokens")?
            .set_default("llm.base_url", "https://api.openai.com")?
            .set_default("llm.model", "gpt-3.5-turbo")?
            .set_default("llm.timeout_seconds", 60_i64)?
            .set_default("llm.max_tokens", 1024_i64)?
            .set_default("llm.temperature", 0.7_f64)?
            .set_default("prompts.system_prompt", "You are a helpful assistant")
    }
}
