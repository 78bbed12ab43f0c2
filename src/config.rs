use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "RAILCLUB";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    crate::api::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("railclub/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_debounce", with = "humantime_serde")]
    pub debounce: Duration,
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
    /// Bound on the suggestion cache; absent means keep everything for the
    /// session lifetime.
    #[serde(default)]
    pub cache_capacity: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            min_query_len: default_min_query_len(),
            cache_capacity: None,
        }
    }
}

fn default_debounce() -> Duration {
    crate::search::DEFAULT_DEBOUNCE
}

fn default_min_query_len() -> usize {
    crate::search::DEFAULT_MIN_QUERY_LEN
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix)?);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    base.api.timeout = other.api.timeout;

    base.search.debounce = other.search.debounce;
    if other.search.min_query_len != 0 {
        base.search.min_query_len = other.search.min_query_len;
    }
    if other.search.cache_capacity.is_some() {
        base.search.cache_capacity = other.search.cache_capacity;
    }

    base
}

fn load_env(prefix: &str) -> Result<Config> {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    if map.is_empty() {
        return Ok(Config::default());
    }

    let mut cfg = Config::default();

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "search.debounce" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.search.debounce = duration;
            }
        }
        "search.min_query_len" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.search.min_query_len = parsed;
            }
        }
        "search.cache_capacity" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.search.cache_capacity = Some(parsed);
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("railclub").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/railclub.yaml")),
            env_prefix: Some("RAILCLUB_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, crate::api::DEFAULT_BASE_URL);
        assert_eq!(cfg.search.min_query_len, 2);
        assert_eq!(cfg.search.cache_capacity, None);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "api:\n  base_url: https://dev.railclub.ru/api/\nsearch:\n  cache_capacity: 64"
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("RAILCLUB_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "https://dev.railclub.ru/api/");
        assert_eq!(cfg.search.cache_capacity, Some(64));
    }

    #[test]
    fn env_overrides() {
        env::set_var("RAILCLUB_TEST_ENV_API__BASE_URL", "https://stage.railclub.ru/api/");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/railclub.yaml")),
            env_prefix: Some("RAILCLUB_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "https://stage.railclub.ru/api/");
        env::remove_var("RAILCLUB_TEST_ENV_API__BASE_URL");
    }
}
