//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment: `BULKPIPE_*` environment variables underneath, an optional
//! TOML file on top. Nested keys use a double underscore in the environment:
//! `BULKPIPE_PIPELINE__QUEUE_CAPACITY=4` lands in `[pipeline] queue_capacity`.
//!
//! ```toml
//! target_urls = ["http://localhost:9200", "https://search-logs.us-east-1.es.amazonaws.com"]
//!
//! [pipeline]
//! target_bulk_size_in_bytes = 1048576
//! omit_type_headers = true
//!
//! [http]
//! connect_timeout_secs = 5
//! request_timeout_secs = 60
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::pipeline::{DEFAULT_TARGET_BULK_SIZE_IN_BYTES, HttpClientFactory, PipelineOptions};

/// 📦 One struct to rule them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Every batch goes to every one of these.
    pub target_urls: Vec<String>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// 🚚 Batching and signing knobs.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_bulk_size_in_bytes: usize,
    pub omit_type_headers: bool,
    pub queue_capacity: usize,
    pub credential_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_bulk_size_in_bytes: DEFAULT_TARGET_BULK_SIZE_IN_BYTES,
            omit_type_headers: false,
            queue_capacity: 1,
            credential_ttl_secs: 60,
        }
    }
}

/// 🌐 How patient each endpoint's HTTP client is. No request timeout unless you ask.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: None,
        }
    }
}

impl HttpConfig {
    /// 🏭 A client factory honoring these timeouts.
    pub fn client_factory(&self) -> HttpClientFactory {
        let connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        let request_timeout = self.request_timeout_secs.map(Duration::from_secs);
        Arc::new(move || {
            let builder = reqwest::Client::builder().connect_timeout(connect_timeout);
            match request_timeout {
                Some(timeout) => builder.timeout(timeout),
                None => builder,
            }
            .build()
        })
    }
}

impl PipelineConfig {
    /// 🔧 Turn file-shaped config into runtime options. The credential provider is
    /// left to the default chain.
    pub fn to_options(&self, http: &HttpConfig) -> PipelineOptions {
        PipelineOptions {
            target_bulk_size_in_bytes: self.target_bulk_size_in_bytes,
            omit_type_headers: self.omit_type_headers,
            queue_capacity: self.queue_capacity,
            http_client_factory: Some(http.client_factory()),
            credential_provider: None,
            credential_ttl: Duration::from_secs(self.credential_ttl_secs),
        }
    }
}

/// 🚀 Load the config from `BULKPIPE_*` env vars plus an optional TOML file.
///
/// - `None` → env vars only.
/// - `Some(path)` → env vars + TOML, merged. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("BULKPIPE_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (BULKPIPE_*). \
             Is `target_urls` in there? It's the one thing we can't guess.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (BULKPIPE_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}
