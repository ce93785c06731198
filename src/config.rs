// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::model::Source;
use crate::orchestrator::RunSettings;
use crate::pipeline::text::{Blacklist, DEFAULT_BLACKLIST};
use crate::pipeline::{PipelineConfig, DEFAULT_CATEGORY, DEFAULT_PRICE_TEXT};

pub const ENV_PATH: &str = "HARVEST_CONFIG_PATH";
const ENV_CONCURRENCY: &str = "HARVEST_CONCURRENCY";
const ENV_FORWARD_WINDOW_DAYS: &str = "HARVEST_FORWARD_WINDOW_DAYS";
const ENV_ADAPTER_TIMEOUT_SECS: &str = "HARVEST_ADAPTER_TIMEOUT_SECS";
const ENV_POLITENESS_DELAY_MS: &str = "HARVEST_POLITENESS_DELAY_MS";

/// Upper bounds on the acceptance window; larger values overflow date arithmetic.
pub const MAX_FORWARD_WINDOW_DAYS: i64 = 3650;
pub const MAX_GRACE_PERIOD_HOURS: i64 = 8760;

const DEFAULT_TOML_PATH: &str = "config/harvest.toml";
const DEFAULT_JSON_PATH: &str = "config/harvest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Max adapters in flight per batch.
    pub concurrency: usize,
    pub adapter_timeout_secs: u64,
    /// Pause between batches, not after the last one.
    pub politeness_delay_ms: u64,
    pub forward_window_days: i64,
    pub grace_period_hours: i64,
    /// IANA name of the reference timezone for local dates and days.
    pub timezone: String,
    pub default_price_text: String,
    pub default_category: String,
    pub blacklist: Vec<String>,
    pub run_interval_secs: u64,
    pub status_path: PathBuf,
    pub sources: Vec<Source>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            adapter_timeout_secs: 60,
            politeness_delay_ms: 2000,
            forward_window_days: 14,
            grace_period_hours: 24,
            timezone: "America/Los_Angeles".to_string(),
            default_price_text: DEFAULT_PRICE_TEXT.to_string(),
            default_category: DEFAULT_CATEGORY.to_string(),
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            run_interval_secs: 3600,
            status_path: PathBuf::from("state/source_status.json"),
            sources: Vec::new(),
        }
    }
}

impl HarvestConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading harvest config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = Self::parse(&content, ext.as_str())
            .with_context(|| format!("parsing {}", path.display()))?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $HARVEST_CONFIG_PATH
    /// 2) config/harvest.toml
    /// 3) config/harvest.json
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            bail!("{ENV_PATH} points to non-existent path {}", pb.display());
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Err(anyhow!(
            "no harvest config found (set {ENV_PATH} or create {DEFAULT_TOML_PATH})"
        ))
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        match hint_ext {
            "toml" => Ok(toml::from_str(s)?),
            "json" => Ok(serde_json::from_str(s)?),
            _ => toml::from_str(s)
                .map_err(anyhow::Error::from)
                .or_else(|_| serde_json::from_str(s).map_err(anyhow::Error::from))
                .map_err(|_| anyhow!("unsupported harvest config format")),
        }
    }

    /// Numeric tunables may be overridden from env; unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<usize>(ENV_CONCURRENCY) {
            self.concurrency = v;
        }
        if let Some(v) = env_parse::<i64>(ENV_FORWARD_WINDOW_DAYS) {
            self.forward_window_days = v;
        }
        if let Some(v) = env_parse::<u64>(ENV_ADAPTER_TIMEOUT_SECS) {
            self.adapter_timeout_secs = v;
        }
        if let Some(v) = env_parse::<u64>(ENV_POLITENESS_DELAY_MS) {
            self.politeness_delay_ms = v;
        }
        self.concurrency = self.concurrency.max(1);
        self.forward_window_days = self.forward_window_days.max(0);
        self.grace_period_hours = self.grace_period_hours.max(0);
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for s in &self.sources {
            let name = s.name.trim();
            if name.is_empty() {
                bail!("source with empty name (url '{}')", s.url);
            }
            if !seen.insert(name) {
                bail!("duplicate source name '{name}'");
            }
        }
        self.check_windows()?;
        self.tz()?;
        Ok(())
    }

    fn check_windows(&self) -> Result<()> {
        if !(0..=MAX_FORWARD_WINDOW_DAYS).contains(&self.forward_window_days) {
            bail!(
                "forward_window_days {} out of range 0..={MAX_FORWARD_WINDOW_DAYS}",
                self.forward_window_days
            );
        }
        if !(0..=MAX_GRACE_PERIOD_HOURS).contains(&self.grace_period_hours) {
            bail!(
                "grace_period_hours {} out of range 0..={MAX_GRACE_PERIOD_HOURS}",
                self.grace_period_hours
            );
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        Tz::from_str(self.timezone.trim())
            .map_err(|e| anyhow!("invalid timezone '{}': {e}", self.timezone))
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        self.check_windows()?;
        Ok(PipelineConfig {
            grace_period: chrono::Duration::hours(self.grace_period_hours),
            forward_window: chrono::Duration::days(self.forward_window_days),
            blacklist: Blacklist::new(&self.blacklist),
            timezone: self.tz()?,
            default_price_text: self.default_price_text.clone(),
            default_category: self.default_category.clone(),
        })
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            concurrency: self.concurrency.max(1),
            adapter_timeout: Duration::from_secs(self.adapter_timeout_secs),
            politeness_delay: Duration::from_millis(self.politeness_delay_ms),
        }
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_interval_secs.max(1))
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = key, value = %raw, "ignoring unparsable override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const TOML: &str = r#"
concurrency = 2
politeness_delay_ms = 500
timezone = "America/Chicago"

[[sources]]
name = "Library"
url = "https://lib.test/feed.xml"
adapter = "rss"
category = "Community"

[[sources]]
name = "Park Board"
enabled = false
adapter = "fixed"
extra = { events = [{ title = "Movies in the Park", date = "Friday 8pm" }] }
"#;

    fn clear_env() {
        for k in [
            ENV_PATH,
            ENV_CONCURRENCY,
            ENV_FORWARD_WINDOW_DAYS,
            ENV_ADAPTER_TIMEOUT_SECS,
            ENV_POLITENESS_DELAY_MS,
        ] {
            env::remove_var(k);
        }
    }

    #[test]
    fn toml_with_defaults_filled_in() {
        let cfg = HarvestConfig::parse(TOML, "toml").unwrap();
        assert_eq!(cfg.concurrency, 2);
        assert_eq!(cfg.adapter_timeout_secs, 60);
        assert_eq!(cfg.forward_window_days, 14);
        assert_eq!(cfg.sources.len(), 2);
        assert!(cfg.sources[0].enabled);
        assert!(!cfg.sources[1].enabled);
        assert!(cfg.sources[1].extra.contains_key("events"));
        assert_eq!(cfg.tz().unwrap(), chrono_tz::America::Chicago);

        let s = cfg.run_settings();
        assert_eq!(s.politeness_delay, Duration::from_millis(500));
        assert_eq!(s.adapter_timeout, Duration::from_secs(60));
    }

    #[test]
    fn json_without_hint_is_accepted() {
        let json = r#"{"concurrency": 5, "sources": [{"name": "Venue", "url": "https://v.test"}]}"#;
        let cfg = HarvestConfig::parse(json, "").unwrap();
        assert_eq!(cfg.concurrency, 5);
        assert_eq!(cfg.sources[0].name, "Venue");
    }

    #[test]
    fn duplicate_or_empty_names_are_rejected() {
        let mut cfg = HarvestConfig::default();
        cfg.sources = vec![Source::new("A", ""), Source::new("A", "")];
        assert!(cfg.validate().is_err());
        cfg.sources = vec![Source::new("  ", "https://x.test")];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_timezone_is_rejected() {
        let cfg = HarvestConfig {
            timezone: "Mars/Olympus".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(cfg.pipeline_config().is_err());
    }

    #[test]
    fn custom_blacklist_replaces_default() {
        let cfg = HarvestConfig {
            blacklist: vec!["Sold Out".into()],
            ..Default::default()
        };
        let p = cfg.pipeline_config().unwrap();
        assert_eq!(p.blacklist.terms(), ["sold out"]);
        assert_eq!(p.forward_window, chrono::Duration::days(14));
        assert_eq!(p.grace_period, chrono::Duration::hours(24));
    }

    #[test]
    fn oversized_windows_are_rejected() {
        let cfg = HarvestConfig {
            forward_window_days: 100_000_000,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(cfg.pipeline_config().is_err());

        let cfg = HarvestConfig {
            grace_period_hours: MAX_GRACE_PERIOD_HOURS + 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = HarvestConfig {
            forward_window_days: MAX_FORWARD_WINDOW_DAYS,
            grace_period_hours: MAX_GRACE_PERIOD_HOURS,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
        assert!(cfg.pipeline_config().is_ok());
    }

    #[serial_test::serial]
    #[test]
    fn oversized_window_from_env_fails_load() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        fs::write(&path, "forward_window_days = 7\n").unwrap();
        env::set_var(ENV_FORWARD_WINDOW_DAYS, "100000000");
        assert!(HarvestConfig::load_from(&path).is_err());
        clear_env();
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_and_clamping() {
        clear_env();
        env::set_var(ENV_CONCURRENCY, "0");
        env::set_var(ENV_FORWARD_WINDOW_DAYS, "7");
        env::set_var(ENV_ADAPTER_TIMEOUT_SECS, "soon");

        let mut cfg = HarvestConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.concurrency, 1);
        assert_eq!(cfg.forward_window_days, 7);
        assert_eq!(cfg.adapter_timeout_secs, 60);

        clear_env();
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        clear_env();

        // nothing on disk
        assert!(HarvestConfig::load_default().is_err());

        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(tmp.path().join(DEFAULT_TOML_PATH), TOML).unwrap();
        let cfg = HarvestConfig::load_default().unwrap();
        assert_eq!(cfg.sources.len(), 2);

        let p_json = tmp.path().join("other.json");
        fs::write(&p_json, r#"{"sources": [{"name": "X"}]}"#).unwrap();
        env::set_var(ENV_PATH, p_json.display().to_string());
        let cfg = HarvestConfig::load_default().unwrap();
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].name, "X");

        env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(HarvestConfig::load_default().is_err());

        clear_env();
        env::set_current_dir(&old).unwrap();
    }
}
