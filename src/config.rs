//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// External bridge configuration (absent when no peer URL is set)
    pub bridge: Option<BridgeConfig>,
    /// Per-user file store configuration
    pub files: FilesConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// LLM provider configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key for the provider
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Base URL of the provider API
    pub base_url: String,
}

/// External bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Peer URL template; may contain a `{user_id}` placeholder
    pub url: String,
    /// Identity we announce to the peer (also used for loop prevention)
    pub identity: String,
    /// Bound on the connection handshake
    pub connect_timeout: Duration,
    /// Maximum automatic reconnect attempts before the bridge goes Failed
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential reconnect backoff
    pub reconnect_base: Duration,
    /// Cap on the reconnect backoff delay
    pub reconnect_cap: Duration,
}

impl BridgeConfig {
    /// Bridge config with the production timing defaults
    pub fn new(url: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            identity: identity.into(),
            connect_timeout: Duration::from_secs(10),
            max_reconnect_attempts: 5,
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
        }
    }
}

/// Per-user file store configuration
#[derive(Debug, Clone)]
pub struct FilesConfig {
    /// Base directory for per-user data
    pub data_dir: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8000),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            llm: LlmConfig {
                api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            },
            bridge: env::var("EXTERNAL_WS_URL").ok().map(|url| {
                BridgeConfig::new(
                    url,
                    env::var("EXTERNAL_WS_USER_ID")
                        .unwrap_or_else(|_| "gateway-backend".to_string()),
                )
            }),
            files: FilesConfig {
                data_dir: env::var("USER_DATA_DIR").unwrap_or_else(|_| "user_contexts".to_string()),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_without_env() {
        env::remove_var("PORT");
        env::remove_var("HOST");
        env::remove_var("EXTERNAL_WS_URL");
        let config = Config::from_env();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.bridge.is_none());
        assert_eq!(config.files.data_dir, "user_contexts");
    }

    #[test]
    #[serial]
    fn bridge_config_from_env() {
        env::set_var("EXTERNAL_WS_URL", "ws://peer.example/ws/{user_id}");
        env::set_var("EXTERNAL_WS_USER_ID", "my-backend");
        let config = Config::from_env();
        let bridge = config.bridge.expect("bridge should be configured");
        assert_eq!(bridge.url, "ws://peer.example/ws/{user_id}");
        assert_eq!(bridge.identity, "my-backend");
        assert_eq!(bridge.max_reconnect_attempts, 5);
        env::remove_var("EXTERNAL_WS_URL");
        env::remove_var("EXTERNAL_WS_USER_ID");
    }
}
