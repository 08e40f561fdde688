//! Server configuration from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use agent_runner::{ExecutorConfig, ModelClientConfig};
use tracing::warn;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

const DEFAULT_DATA_DIR: &str = ".chat-data";
const DEFAULT_PORT: u16 = 8081;
const DEFAULT_MODEL_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_MODEL_NAME: &str = "llama3";
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 120;
const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub model: ModelClientConfig,
    pub executor: ExecutorConfig,
    pub default_system_prompt: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str, default: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            data_dir: PathBuf::from(text("CHAT_DATA_DIR", DEFAULT_DATA_DIR)),
            bind_addr: parsed(&lookup, "CHAT_BIND_ADDR", default_bind_addr()),
            model: ModelClientConfig {
                base_url: text("MODEL_BASE_URL", DEFAULT_MODEL_BASE_URL),
                model: text("MODEL_NAME", DEFAULT_MODEL_NAME),
                api_key: lookup("MODEL_API_KEY").filter(|v| !v.trim().is_empty()),
            },
            executor: ExecutorConfig {
                step_timeout: Duration::from_secs(parsed(
                    &lookup,
                    "STEP_TIMEOUT_SECS",
                    DEFAULT_STEP_TIMEOUT_SECS,
                )),
                stream_timeout: Duration::from_secs(parsed(
                    &lookup,
                    "STREAM_TIMEOUT_SECS",
                    DEFAULT_STREAM_TIMEOUT_SECS,
                )),
            },
            default_system_prompt: text("DEFAULT_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = name, value = %raw, default = %default, "Malformed value, using default");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.bind_addr, default_bind_addr());
        assert_eq!(config.model.base_url, DEFAULT_MODEL_BASE_URL);
        assert_eq!(config.model.model, DEFAULT_MODEL_NAME);
        assert!(config.model.api_key.is_none());
        assert_eq!(config.executor.step_timeout, Duration::from_secs(120));
        assert_eq!(config.executor.stream_timeout, Duration::from_secs(300));
        assert_eq!(config.default_system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("CHAT_DATA_DIR", "/tmp/chats"),
            ("CHAT_BIND_ADDR", "127.0.0.1:9000"),
            ("MODEL_API_KEY", "secret"),
            ("STEP_TIMEOUT_SECS", " 5 "),
            ("DEFAULT_SYSTEM_PROMPT", "Be brief."),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/chats"));
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.model.api_key.as_deref(), Some("secret"));
        assert_eq!(config.executor.step_timeout, Duration::from_secs(5));
        assert_eq!(config.default_system_prompt, "Be brief.");
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = config(&[
            ("CHAT_BIND_ADDR", "not an address"),
            ("STREAM_TIMEOUT_SECS", "soon"),
            ("MODEL_NAME", "   "),
        ]);
        assert_eq!(config.bind_addr, default_bind_addr());
        assert_eq!(config.executor.stream_timeout, Duration::from_secs(300));
        assert_eq!(config.model.model, DEFAULT_MODEL_NAME);
    }
}
