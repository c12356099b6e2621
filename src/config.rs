//! Judge configuration
//!
//! Loaded from the environment (after `.env`, if present). Every value has a
//! default so a bare worker starts against a local Redis.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::{ExecutionLimits, DEFAULT_MEMORY_LIMIT_MB, DEFAULT_TIME_LIMIT_MS};
use crate::runner::sandboxed::DEFAULT_MAX_OUTPUT_BYTES;

#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Language table; the built-in one when unset
    pub languages_config: Option<PathBuf>,
    pub redis_url: String,
    /// Maximum concurrent judgings in queued mode
    pub workers: usize,
    /// Compile time limit in milliseconds (default: 30000ms = 30s)
    pub compile_time_limit_ms: u32,
    /// Compile memory limit in MB (default: 2048MB)
    pub compile_memory_limit_mb: u32,
    pub default_time_limit_ms: u32,
    pub default_memory_limit_mb: u32,
    pub max_output_bytes: u64,
    /// Parent of per-judging workspaces; the system temp dir when unset
    pub work_root: Option<PathBuf>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            languages_config: None,
            redis_url: "redis://localhost:6379".to_string(),
            workers: 4,
            compile_time_limit_ms: 30_000,
            compile_memory_limit_mb: 2048,
            default_time_limit_ms: DEFAULT_TIME_LIMIT_MS,
            default_memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            work_root: None,
        }
    }
}

impl JudgeConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            languages_config: lookup("LANGUAGES_CONFIG").map(PathBuf::from),
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            workers: parse_or(&lookup, "JUDGE_WORKERS", defaults.workers)?,
            compile_time_limit_ms: parse_or(
                &lookup,
                "COMPILE_TIME_LIMIT_MS",
                defaults.compile_time_limit_ms,
            )?,
            compile_memory_limit_mb: parse_or(
                &lookup,
                "COMPILE_MEMORY_LIMIT_MB",
                defaults.compile_memory_limit_mb,
            )?,
            default_time_limit_ms: parse_or(
                &lookup,
                "DEFAULT_TIME_LIMIT_MS",
                defaults.default_time_limit_ms,
            )?,
            default_memory_limit_mb: parse_or(
                &lookup,
                "DEFAULT_MEMORY_LIMIT_MB",
                defaults.default_memory_limit_mb,
            )?,
            max_output_bytes: parse_or(&lookup, "MAX_OUTPUT_BYTES", defaults.max_output_bytes)?,
            work_root: lookup("JUDGE_WORK_ROOT").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            anyhow::bail!("JUDGE_WORKERS must be at least 1");
        }
        if self.max_output_bytes == 0 {
            anyhow::bail!("MAX_OUTPUT_BYTES must be positive");
        }
        ExecutionLimits::new(self.compile_time_limit_ms, self.compile_memory_limit_mb)
            .context("Invalid compile limits")?;
        ExecutionLimits::new(self.default_time_limit_ms, self.default_memory_limit_mb)
            .context("Invalid default limits")?;
        Ok(())
    }

    /// Applied when a problem omits its own limits
    pub fn default_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_limit_ms: self.default_time_limit_ms,
            memory_limit_mb: self.default_memory_limit_mb,
        }
    }

    pub fn compile_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_limit_ms: self.compile_time_limit_ms,
            memory_limit_mb: self.compile_memory_limit_mb,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = JudgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.workers, 4);
        assert_eq!(config.compile_limits(), ExecutionLimits::new(30_000, 2048).unwrap());
        assert_eq!(config.default_limits(), ExecutionLimits::default());
        assert!(config.languages_config.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = JudgeConfig::from_lookup(lookup(&[
            ("JUDGE_WORKERS", "8"),
            ("DEFAULT_TIME_LIMIT_MS", " 2000 "),
            ("LANGUAGES_CONFIG", "/etc/judge/languages.toml"),
        ]))
        .unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.default_limits().time_limit_ms, 2000);
        assert_eq!(
            config.languages_config,
            Some(PathBuf::from("/etc/judge/languages.toml"))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(JudgeConfig::from_lookup(lookup(&[("JUDGE_WORKERS", "many")])).is_err());
        assert!(JudgeConfig::from_lookup(lookup(&[("JUDGE_WORKERS", "0")])).is_err());
        assert!(JudgeConfig::from_lookup(lookup(&[("DEFAULT_MEMORY_LIMIT_MB", "0")])).is_err());
    }
}
