use serde::Deserialize;
use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::net::SocketAddr;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_db_path() -> String {
    "datadeck.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(addr) = lookup("DATADECK_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("Invalid DATADECK_BIND_ADDR: {}", addr))?;
        }
        if let Some(path) = lookup("DATADECK_DB_PATH") {
            if path.trim().is_empty() {
                anyhow::bail!("DATADECK_DB_PATH must not be empty");
            }
            config.db_path = path;
        }
        if let Some(size) = lookup("DATADECK_MAX_FILE_SIZE") {
            config.max_file_size = size
                .parse()
                .with_context(|| format!("Invalid DATADECK_MAX_FILE_SIZE: {}", size))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, default_bind_addr());
        assert_eq!(config.db_path, "datadeck.db");
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DATADECK_BIND_ADDR", "0.0.0.0:8080"),
            ("DATADECK_DB_PATH", ":memory:"),
            ("DATADECK_MAX_FILE_SIZE", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.db_path, ":memory:");
        assert_eq!(config.max_file_size, 1024);
    }

    #[test]
    fn invalid_size_is_rejected() {
        assert!(Config::from_lookup(lookup(&[("DATADECK_MAX_FILE_SIZE", "lots")])).is_err());
    }
}
