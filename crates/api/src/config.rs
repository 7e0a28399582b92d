use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: OperationMode,
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // Cache aggressively, short timeouts
    Accurate,  // Always fresh, patient with the model
    Balanced,  // Default
}

/// Gemini rejects inline payloads well below this.
pub const MAX_IMAGE_BYTES_CEILING: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_image_bytes: usize,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_llm_calls: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            max_image_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            base_url: extract::llm::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            concurrency: ConcurrencyConfig {
                max_concurrent_llm_calls: 4,
                request_timeout_secs: 45,
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 1000,
                max_backoff_ms: 8000,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 10000,
            },
        }
    }
}

impl AppConfig {
    pub fn fast_mode() -> Self {
        Self {
            mode: OperationMode::Fast,
            concurrency: ConcurrencyConfig {
                max_concurrent_llm_calls: 10,
                request_timeout_secs: 20,
            },
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 500,
                max_backoff_ms: 2000,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 50000,
            },
            ..Self::default()
        }
    }

    pub fn accurate_mode() -> Self {
        Self {
            mode: OperationMode::Accurate,
            concurrency: ConcurrencyConfig {
                max_concurrent_llm_calls: 2,
                request_timeout_secs: 90,
            },
            retry: RetryConfig {
                max_retries: 4,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            // Off by default; CACHE_ENABLED=true still gets a usable capacity
            cache: CacheConfig {
                enabled: false,
                max_entries: 10000,
            },
            ..Self::default()
        }
    }

    pub fn for_mode(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Fast => Self::fast_mode(),
            OperationMode::Accurate => Self::accurate_mode(),
            OperationMode::Balanced => Self::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Mode preset first, then individual overrides.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match get("APP_MODE") {
            Some(raw) => parse_mode(&raw)?,
            None => OperationMode::Balanced,
        };
        let mut config = Self::for_mode(mode);

        config.model.api_key = get("GEMINI_API_KEY").ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;
        if let Some(model) = get("GEMINI_MODEL") {
            config.model.model = model;
        }
        if let Some(base_url) = get("GEMINI_BASE_URL") {
            config.model.base_url = base_url;
        }
        if let Some(addr) = get("BIND_ADDR") {
            config.server.bind_addr = addr;
        }

        override_with(&get, "MAX_IMAGE_BYTES", &mut config.server.max_image_bytes)?;
        override_with(
            &get,
            "MAX_CONCURRENT_LLM_CALLS",
            &mut config.concurrency.max_concurrent_llm_calls,
        )?;
        override_with(&get, "REQUEST_TIMEOUT_SECS", &mut config.concurrency.request_timeout_secs)?;
        override_with(&get, "MAX_RETRIES", &mut config.retry.max_retries)?;
        override_with(&get, "CACHE_ENABLED", &mut config.cache.enabled)?;
        override_with(&get, "CACHE_MAX_ENTRIES", &mut config.cache.max_entries)?;

        if config.concurrency.max_concurrent_llm_calls == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_CONCURRENT_LLM_CALLS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if config.server.max_image_bytes == 0 || config.server.max_image_bytes > MAX_IMAGE_BYTES_CEILING {
            return Err(ConfigError::Invalid {
                var: "MAX_IMAGE_BYTES",
                value: config.server.max_image_bytes.to_string(),
                reason: format!("must be between 1 and {}", MAX_IMAGE_BYTES_CEILING),
            });
        }
        if config.cache.enabled && config.cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                var: "CACHE_MAX_ENTRIES",
                value: "0".to_string(),
                reason: "must be at least 1 while the cache is enabled".to_string(),
            });
        }

        Ok(config)
    }
}

fn parse_mode(raw: &str) -> Result<OperationMode, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "fast" => Ok(OperationMode::Fast),
        "balanced" => Ok(OperationMode::Balanced),
        "accurate" => Ok(OperationMode::Accurate),
        _ => Err(ConfigError::Invalid {
            var: "APP_MODE",
            value: raw.to_string(),
            reason: "expected fast, balanced or accurate".to_string(),
        }),
    }
}

fn override_with<G, T>(get: &G, var: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(raw) = get(var) {
        *target = raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
