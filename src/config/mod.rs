// src/config/mod.rs
//! Application configuration (TOML), with env overrides for secrets.
//!
//! Lookup order:
//! 1) `$NEWSDESK_CONFIG_PATH` (must exist if set)
//! 2) `config/newsdesk.toml`
//! 3) built-in defaults

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "NEWSDESK_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/newsdesk.toml";

pub const ENV_EXTERNAL_API_KEY: &str = "EXTERNAL_FEED_API_KEY";
pub const ENV_PUSH_SERVER_KEY: &str = "PUSH_SERVER_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub external: ExternalConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// Display name used in logs and as the fallback author.
    pub name: String,
    pub base_url: String,
    /// `"ENV"` means: read from `EXTERNAL_FEED_API_KEY`.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Items requested per combined-feed call.
    pub batch_limit: usize,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            name: "Wire".to_string(),
            base_url: String::new(),
            api_key: None,
            timeout_secs: 8,
            batch_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub default_page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_page_size: crate::paginate::DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Multicast endpoint of the push gateway. Empty = channel not configured.
    pub endpoint: String,
    /// `"ENV"` means: read from `PUSH_SERVER_KEY`.
    pub server_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u8,
    /// Consecutive transient failures before an endpoint is deactivated.
    pub max_transient_failures: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            server_key: None,
            timeout_secs: 10,
            max_retries: 3,
            max_transient_failures: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub max_idle_days: i64,
    pub prune_interval_hours: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_idle_days: 7,
            prune_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// JSON array of internal records to seed the in-memory store with.
    pub seed_path: Option<String>,
    pub default_author: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            seed_path: None,
            default_author: "Staff".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing newsdesk config toml")?;
        cfg.resolve_secrets()?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        let mut cfg = Self::default();
        cfg.resolve_secrets()?;
        Ok(cfg)
    }

    /// Replace `"ENV"` placeholders; an absent key falls back to the env var if set.
    fn resolve_secrets(&mut self) -> Result<()> {
        self.external.api_key = resolve_secret(self.external.api_key.take(), ENV_EXTERNAL_API_KEY)?;
        self.push.server_key = resolve_secret(self.push.server_key.take(), ENV_PUSH_SERVER_KEY)?;
        Ok(())
    }

    fn sanitize(&mut self) {
        let d_ext = ExternalConfig::default();
        if self.external.timeout_secs == 0 {
            self.external.timeout_secs = d_ext.timeout_secs;
        }
        if self.external.batch_limit == 0 {
            self.external.batch_limit = d_ext.batch_limit;
        }
        if self.external.name.trim().is_empty() {
            self.external.name = d_ext.name;
        }
        if self.feed.default_page_size == 0 {
            self.feed.default_page_size = FeedConfig::default().default_page_size;
        }
        let d_push = PushConfig::default();
        if self.push.timeout_secs == 0 {
            self.push.timeout_secs = d_push.timeout_secs;
        }
        self.push.max_retries = self
            .push
            .max_retries
            .clamp(1, crate::notify::fcm::MAX_PUSH_RETRIES);
        if self.push.max_transient_failures == 0 {
            self.push.max_transient_failures = d_push.max_transient_failures;
        }
        let d_reg = RegistryConfig::default();
        if self.registry.max_idle_days <= 0 {
            self.registry.max_idle_days = d_reg.max_idle_days;
        }
        if self.registry.prune_interval_hours == 0 {
            self.registry.prune_interval_hours = d_reg.prune_interval_hours;
        }
    }
}

fn resolve_secret(value: Option<String>, env_name: &str) -> Result<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.eq_ignore_ascii_case("env") => std::env::var(env_name)
            .map(Some)
            .map_err(|_| anyhow!("Missing {env_name} env var")),
        Some(v) if !v.is_empty() => Ok(Some(v)),
        _ => Ok(std::env::var(env_name).ok().filter(|v| !v.is_empty())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[serial_test::serial]
    #[test]
    fn partial_toml_keeps_defaults_and_sanitizes() {
        env::remove_var(ENV_EXTERNAL_API_KEY);
        env::remove_var(ENV_PUSH_SERVER_KEY);
        let cfg = AppConfig::from_toml_str(
            r#"
            [external]
            base_url = "https://feed.example/api"
            timeout_secs = 0

            [registry]
            max_idle_days = -3

            [push]
            max_retries = 200
            "#,
        )
        .unwrap();
        assert_eq!(cfg.external.base_url, "https://feed.example/api");
        assert_eq!(cfg.external.timeout_secs, 8);
        assert_eq!(cfg.external.batch_limit, 50);
        assert_eq!(cfg.registry.max_idle_days, 7);
        assert_eq!(cfg.feed.default_page_size, 10);
        assert!(cfg.push.endpoint.is_empty());
        assert!(cfg.push.server_key.is_none());
        assert_eq!(cfg.push.max_retries, crate::notify::fcm::MAX_PUSH_RETRIES);
    }

    #[serial_test::serial]
    #[test]
    fn env_placeholder_resolves_secret() {
        env::set_var(ENV_PUSH_SERVER_KEY, "secret-key");
        let cfg = AppConfig::from_toml_str(
            r#"
            [push]
            endpoint = "https://push.example/send"
            server_key = "ENV"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.push.server_key.as_deref(), Some("secret-key"));

        env::remove_var(ENV_PUSH_SERVER_KEY);
        let err = AppConfig::from_toml_str("[push]\nserver_key = \"ENV\"\n").unwrap_err();
        assert!(err.to_string().contains(ENV_PUSH_SERVER_KEY));
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        // No file in CWD -> defaults
        let cfg = AppConfig::load_default().unwrap();
        assert_eq!(cfg.registry.max_idle_days, 7);

        // Env path wins
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "[feed]\ndefault_page_size = 25\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = AppConfig::load_default().unwrap();
        assert_eq!(cfg.feed.default_page_size, 25);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(AppConfig::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
