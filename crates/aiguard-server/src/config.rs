//! Server configuration

use aiguard_policy::FilterMode;
use aiguard_stream::GuardConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Server configuration, loaded from YAML with CLI overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding rule YAML files
    #[serde(default = "default_policies_dir")]
    pub policies_dir: String,

    /// Filtering options
    #[serde(default)]
    pub guard: GuardOptions,
}

/// Filtering options as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardOptions {
    /// `mask` or `truncate`: how block rules behave
    #[serde(default = "default_action")]
    pub action: FilterMode,

    /// Mock generator chunk size, in characters
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Buffered chunk count that forces a flush
    #[serde(default = "default_buffer_tokens")]
    pub buffer_tokens: usize,

    /// Trailing context retained across emissions, in characters
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,

    /// Simulated generation latency per chunk, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub per_chunk_delay_ms: u64,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            action: default_action(),
            chunk_chars: default_chunk_chars(),
            buffer_tokens: default_buffer_tokens(),
            window_chars: default_window_chars(),
            per_chunk_delay_ms: default_delay_ms(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file (if present) and apply CLI overrides
    pub fn load(config_path: &str, cli: &crate::Cli) -> anyhow::Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        if let Some(listen) = &cli.listen {
            config.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(policies) = &cli.policies {
            config.policies_dir = policies.clone();
        }
        if let Some(action) = cli.action {
            config.guard.action = action;
        }

        Ok(config)
    }

    /// The typed filter configuration handed to the orchestrator
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            mode: self.guard.action,
            chunk_chars: self.guard.chunk_chars,
            buffer_tokens: self.guard.buffer_tokens,
            window_chars: self.guard.window_chars,
            per_chunk_delay: Duration::from_millis(self.guard.per_chunk_delay_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            policies_dir: default_policies_dir(),
            guard: GuardOptions::default(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_policies_dir() -> String {
    "./policies".to_string()
}

fn default_action() -> FilterMode {
    FilterMode::Mask
}

fn default_chunk_chars() -> usize {
    3
}

fn default_buffer_tokens() -> usize {
    10
}

fn default_window_chars() -> usize {
    128
}

fn default_delay_ms() -> u64 {
    80
}
