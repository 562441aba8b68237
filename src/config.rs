use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::util::parse_bool_flag;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api/ask";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 1.0;
const DEFAULT_FRAME_MS: u64 = 16;

/// Sampling defaults sent with every prompt unless overridden.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub sampling: SamplingConfig,
    pub frame_interval: Duration,
    pub store_path: PathBuf,
    pub debug_payload: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let working_dir = std::env::current_dir()?;
        let api_url = std::env::var("CHATBLOCKS_API_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let temperature = parse_f32_var("CHATBLOCKS_TEMPERATURE")?.unwrap_or(DEFAULT_TEMPERATURE);
        let top_p = parse_f32_var("CHATBLOCKS_TOP_P")?.unwrap_or(DEFAULT_TOP_P);
        let frame_ms = std::env::var("CHATBLOCKS_FRAME_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_FRAME_MS)
            .clamp(1, 1000);
        let store_path = std::env::var("CHATBLOCKS_STORE_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| working_dir.join(".chatblocks").join("threads.json"));
        let debug_payload = std::env::var("CHATBLOCKS_DEBUG_PAYLOAD")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(false);

        Ok(Self {
            api_url,
            sampling: SamplingConfig { temperature, top_p },
            frame_interval: Duration::from_millis(frame_ms),
            store_path,
            debug_payload,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid CHATBLOCKS_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.sampling.temperature.is_finite()
            || !(0.0..=2.0).contains(&self.sampling.temperature)
        {
            bail!(
                "Invalid CHATBLOCKS_TEMPERATURE {}: expected a value between 0.0 and 2.0",
                self.sampling.temperature
            );
        }

        if !self.sampling.top_p.is_finite() || !(0.0..=1.0).contains(&self.sampling.top_p) {
            bail!(
                "Invalid CHATBLOCKS_TOP_P {}: expected a value between 0.0 and 1.0",
                self.sampling.top_p
            );
        }

        if self.frame_interval.is_zero() {
            bail!("CHATBLOCKS_FRAME_MS must be at least 1");
        }

        Ok(())
    }
}

fn parse_f32_var(name: &str) -> Result<Option<f32>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<f32>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => bail!("{name} must be a number, got '{trimmed}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for name in [
            "CHATBLOCKS_API_URL",
            "CHATBLOCKS_TEMPERATURE",
            "CHATBLOCKS_TOP_P",
            "CHATBLOCKS_FRAME_MS",
            "CHATBLOCKS_STORE_PATH",
            "CHATBLOCKS_DEBUG_PAYLOAD",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_load_uses_sampling_defaults() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        let config = Config::load().expect("config loads");
        assert_eq!(config.sampling, SamplingConfig::default());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.frame_interval, Duration::from_millis(16));
        assert!(config.store_path.ends_with(".chatblocks/threads.json"));
        assert!(!config.debug_payload);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_reads_overrides_and_clamps_frame_interval() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("CHATBLOCKS_TEMPERATURE", "0.2");
        std::env::set_var("CHATBLOCKS_TOP_P", " 0.9 ");
        std::env::set_var("CHATBLOCKS_FRAME_MS", "0");
        std::env::set_var("CHATBLOCKS_DEBUG_PAYLOAD", "on");
        let config = Config::load().expect("config loads");
        assert_eq!(config.sampling.temperature, 0.2);
        assert_eq!(config.sampling.top_p, 0.9);
        assert_eq!(config.frame_interval, Duration::from_millis(1));
        assert!(config.debug_payload);
        clear_env();
    }

    #[test]
    fn test_load_rejects_non_numeric_temperature() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("CHATBLOCKS_TEMPERATURE", "warm");
        assert!(Config::load().is_err());
        clear_env();
    }
}
