use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;

pub type Number = f32;

/// Hard cap on texts per embedding request, imposed by the hosted service.
pub const MAX_EMBED_BATCH: usize = 100;

#[derive(Deserialize)]
pub struct RagletConfig {
    pub data_dir: Option<String>,
    pub source_dir: Option<String>,
    pub group_column: Option<String>,
    pub item_column: Option<String>,
    pub top_k: Option<usize>,
    pub batch_size: Option<usize>,
    pub throttle_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub embed_model: Option<String>,
    pub chat_model: Option<String>,
    pub api_base: Option<String>,
}

impl RagletConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(RagletConfig {
            data_dir: config.get("data_dir").ok(),
            source_dir: config.get("source_dir").ok(),
            group_column: config.get("group_column").ok(),
            item_column: config.get("item_column").ok(),
            top_k: config.get("top_k").ok(),
            batch_size: config.get("batch_size").ok(),
            throttle_ms: config.get("throttle_ms").ok(),
            max_retries: config.get("max_retries").ok(),
            timeout_secs: config.get("timeout_secs").ok(),
            embed_model: config.get("embed_model").ok(),
            chat_model: config.get("chat_model").ok(),
            api_base: config.get("api_base").ok(),
        })
    }
}

pub struct State {
    pub data_dir: String,
    pub source_dir: String,
    pub group_column: String,
    pub item_column: String,
    pub top_k: usize,
    pub batch_size: usize,
    pub throttle_ms: u64,
    pub max_retries: usize,
    pub timeout_secs: u64,
    pub embed_model: String,
    pub chat_model: String,
    pub api_base: String,
}

impl State {
    pub fn new() -> Result<Self> {
        let mut config = Config::default();
        #[allow(deprecated)]
        {
            config.merge(ConfigFile::with_name("raglet_config").required(false))?;
            config.merge(Environment::with_prefix("RAGLET"))?;
        }

        let raglet_config = RagletConfig::try_from(&config)?;

        let data_dir = raglet_config
            .data_dir
            .or_else(|| env::var("RAGLET_DATA_DIR").ok())
            .unwrap_or_else(|| "data".to_string());

        let source_dir = raglet_config
            .source_dir
            .or_else(|| env::var("RAGLET_SOURCE_DIR").ok())
            .unwrap_or_else(|| "menu".to_string());

        let group_column = raglet_config
            .group_column
            .unwrap_or_else(|| "Category".to_string());

        let item_column = raglet_config
            .item_column
            .unwrap_or_else(|| "Item".to_string());

        let top_k = raglet_config
            .top_k
            .or_else(|| env::var("RAGLET_TOP_K").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(5);

        let batch_size = raglet_config
            .batch_size
            .or_else(|| env::var("RAGLET_BATCH_SIZE").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(MAX_EMBED_BATCH);

        let throttle_ms = raglet_config
            .throttle_ms
            .or_else(|| env::var("RAGLET_THROTTLE_MS").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(1000);

        let max_retries = raglet_config
            .max_retries
            .or_else(|| env::var("RAGLET_MAX_RETRIES").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(5);

        let timeout_secs = raglet_config
            .timeout_secs
            .or_else(|| env::var("RAGLET_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(30);

        let embed_model = raglet_config
            .embed_model
            .unwrap_or_else(|| "gemini-embedding-001".to_string());

        let chat_model = raglet_config
            .chat_model
            .unwrap_or_else(|| "gemini-2.0-flash".to_string());

        let api_base = raglet_config
            .api_base
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());

        if batch_size == 0 || batch_size > MAX_EMBED_BATCH {
            anyhow::bail!(
                "RAGLET_BATCH_SIZE must be between 1 and {}.",
                MAX_EMBED_BATCH
            );
        }
        if top_k == 0 {
            anyhow::bail!("RAGLET_TOP_K must be at least 1.");
        }

        Ok(Self {
            data_dir,
            source_dir,
            group_column,
            item_column,
            top_k,
            batch_size,
            throttle_ms,
            max_retries,
            timeout_secs,
            embed_model,
            chat_model,
            api_base,
        })
    }

    pub fn print_config(&self) {
        println!("data_dir={}", self.data_dir);
        println!("source_dir={}", self.source_dir);
        println!("group_column={}", self.group_column);
        println!("item_column={}", self.item_column);
        println!("top_k={}", self.top_k);
        println!("batch_size={}", self.batch_size);
        println!("throttle_ms={}", self.throttle_ms);
        println!("max_retries={}", self.max_retries);
        println!("timeout_secs={}", self.timeout_secs);
        println!("embed_model={}", self.embed_model);
        println!("chat_model={}", self.chat_model);
        println!("api_base={}", self.api_base);
    }
}

/// The credential is only ever read from the process environment, never
/// from the config file.
pub fn api_key() -> Result<String> {
    env::var("GEMINI_API_KEY").context("GEMINI_API_KEY not set in environment")
}

pub fn verbose_print(message: &str) {
    if env::var("RAGLET_VERBOSE").unwrap_or_else(|_| "false".to_string()) == "true" {
        eprintln!("{}", message);
    }
}
