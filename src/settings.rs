use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_USER_AGENT: &str = "AutoCheckRH/1.0";

/// Runtime settings: defaults, then `autocheck.toml`, then `AUTOCHECK_*` env vars.
/// CLI flags are applied on top by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Minimum seconds between two requests to the same host.
    pub delay: f64,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    pub user_agent: String,
    pub links: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            delay: 0.55,
            timeout: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            links: PathBuf::from("lidos.csv"),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let d = Settings::default();
        Config::builder()
            .set_default("delay", d.delay)?
            .set_default("timeout", d.timeout as i64)?
            .set_default("user_agent", d.user_agent)?
            .set_default("links", d.links.to_string_lossy().into_owned())?
            .set_default("output_dir", d.output_dir.to_string_lossy().into_owned())?
            .add_source(File::with_name("autocheck").required(false))
            .add_source(Environment::with_prefix("AUTOCHECK"))
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    /// Per-host delay. Zero or negative disables throttling.
    pub fn delay(&self) -> Result<Duration> {
        if self.delay.is_nan() || self.delay <= 0.0 {
            return Ok(Duration::ZERO);
        }
        Duration::try_from_secs_f64(self.delay)
            .with_context(|| format!("Invalid delay: {} seconds is out of range", self.delay))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_delay_means_no_throttle() {
        let s = Settings {
            delay: -1.0,
            ..Settings::default()
        };
        assert_eq!(s.delay().unwrap(), Duration::ZERO);
    }

    #[test]
    fn fractional_delay() {
        let s = Settings {
            delay: 0.25,
            ..Settings::default()
        };
        assert_eq!(s.delay().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn huge_delay_is_rejected() {
        let s = Settings {
            delay: 1e20,
            ..Settings::default()
        };
        let err = s.delay().unwrap_err();
        assert!(err.to_string().contains("out of range"));
        let s = Settings {
            delay: f64::INFINITY,
            ..Settings::default()
        };
        assert!(s.delay().is_err());
    }
}
