use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub remote_url: Option<String>,
    pub page_size: usize,
    pub autoload_interval: Duration,
    pub request_timeout: Duration,
    pub query_http_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_root = env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(home).join(".local/share"));

        Self {
            db_path: data_root.join("turnscope/collector.duckdb"),
            remote_url: None,
            page_size: 100,
            autoload_interval: Duration::from_millis(250),
            request_timeout: Duration::from_secs(10),
            query_http_addr: "127.0.0.1:1779".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    db_path: Option<PathBuf>,
    remote_url: Option<String>,
    page_size: Option<usize>,
    autoload_interval: Option<String>,
    request_timeout: Option<String>,
    query_http_addr: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("TURNSCOPE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("turnscope/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| TraceError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| TraceError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let page_size = match env::var("TURNSCOPE_PAGE_SIZE") {
        Ok(v) => Some(v.parse::<usize>().map_err(|e| {
            TraceError::Config(format!("bad TURNSCOPE_PAGE_SIZE in environment: {e}"))
        })?),
        Err(_) => None,
    };

    Ok(ConfigOverrides {
        db_path: env::var("TURNSCOPE_DB_PATH").ok().map(PathBuf::from),
        remote_url: env::var("TURNSCOPE_REMOTE_URL").ok(),
        page_size,
        autoload_interval: env::var("TURNSCOPE_AUTOLOAD_INTERVAL").ok(),
        request_timeout: env::var("TURNSCOPE_REQUEST_TIMEOUT").ok(),
        query_http_addr: env::var("TURNSCOPE_QUERY_HTTP_ADDR").ok(),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.db_path {
        cfg.db_path = v;
    }
    if let Some(v) = overrides.remote_url {
        let trimmed = v.trim();
        cfg.remote_url = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
    if let Some(v) = overrides.page_size {
        if v == 0 {
            return Err(TraceError::Config(format!(
                "page_size in {source} must be at least 1"
            )));
        }
        cfg.page_size = v;
    }
    if let Some(v) = overrides.autoload_interval {
        let interval = humantime::parse_duration(&v).map_err(|e| {
            TraceError::Config(format!("bad autoload_interval in {source}: {e} (value={v})"))
        })?;
        if interval.is_zero() {
            return Err(TraceError::Config(format!(
                "autoload_interval in {source} must be greater than zero"
            )));
        }
        cfg.autoload_interval = interval;
    }
    if let Some(v) = overrides.request_timeout {
        cfg.request_timeout = humantime::parse_duration(&v).map_err(|e| {
            TraceError::Config(format!("bad request_timeout in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.query_http_addr {
        cfg.query_http_addr = v;
    }
    Ok(())
}
