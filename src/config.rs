use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    payment::types::{DEFAULT_NETWORK, PaymentMode, PaymentProfile},
    pipeline::insight::DEFAULT_TEMPERATURE,
};

const CONFIG_SCHEMA: &str = include_str!("../insight-relay.schema.json");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub insight: InsightConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_network() -> String {
    DEFAULT_NETWORK.to_string()
}

fn default_private_key_env() -> String {
    "EVM_PRIVATE_KEY".to_string()
}

fn default_relay_url() -> String {
    "https://api.httpayer.com/proxy".to_string()
}

// One USDC in 6-decimal atomic units.
fn default_max_amount_per_request() -> u64 {
    1_000_000
}

fn default_news_url() -> String {
    "https://api.itsgloria.ai/news?feed_categories=ai,crypto".to_string()
}

fn default_flows_url() -> String {
    "https://nansen.api.corbits.dev/api/v1/smart-money/netflow".to_string()
}

fn default_search_url() -> String {
    "https://mesh.heurist.xyz/x402/agents/ExaSearchDigestAgent/exa_web_search".to_string()
}

fn default_chat_url() -> String {
    "https://api.httpayer.com/llm/chat".to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_console_level() -> String {
    "warn".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentConfig {
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_max_amount_per_request")]
    pub max_amount_per_request: u64,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            private_key_env: default_private_key_env(),
            relay_url: default_relay_url(),
            max_amount_per_request: default_max_amount_per_request(),
            request_timeout_ms: None,
        }
    }
}

impl PaymentConfig {
    pub fn profile(&self, mode: PaymentMode) -> PaymentProfile {
        PaymentProfile {
            mode,
            network: self.network.clone(),
            relay_url: self.relay_url.clone(),
            max_amount_per_request: u128::from(self.max_amount_per_request),
            timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn private_key(&self) -> Result<String> {
        env::var(&self.private_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "{} environment variable is not set.",
                    self.private_key_env
                )
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointsConfig {
    #[serde(default = "default_news_url")]
    pub news_url: String,
    #[serde(default = "default_flows_url")]
    pub flows_url: String,
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default = "default_chat_url")]
    pub chat_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            news_url: default_news_url(),
            flows_url: default_flows_url(),
            search_url: default_search_url(),
            chat_url: default_chat_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default)]
    pub file_enabled: bool,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_console_level")]
    pub console_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            file_enabled: false,
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            console_level: default_console_level(),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config = Self::from_jsonc(&config_content)
            .with_context(|| format!("failed to load {}", config_path.display()))?;

        if !config.logging.dir.is_absolute() {
            let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
            config.logging.dir = config_base.join(&config.logging.dir);
        }

        Ok(config)
    }

    /// Loads `config_path`, or falls back to defaults when an implicit path does not exist.
    pub fn load_or_default(config_path: &Path, explicit: bool) -> Result<Self> {
        if !explicit && !config_path.exists() {
            tracing::debug!(
                target: "config",
                path = %config_path.display(),
                "config_file_absent_using_defaults"
            );
            return Ok(Self::default());
        }
        Self::load(config_path)
    }

    pub fn from_jsonc(content: &str) -> Result<Self> {
        let config_value: Value = json5::from_str(content).context("failed to parse config")?;
        validate_against_schema(&config_value)?;
        serde_json::from_value(config_value).context("failed to deserialize config")
    }
}

fn validate_against_schema(config_value: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(CONFIG_SCHEMA).context("failed to parse embedded config schema")?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}
