use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runner::CheckRunner;
use crate::scanner::{axe::AxeEngine, default_scanner::DefaultScanner};
use crate::session::webdriver::{BrowserKind, WebDriverConfig, WebDriverFactory};
use crate::session::SessionProvider;
use crate::target::{ScanTarget, TargetError};

/// Everything needed to run an audit against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditSettings {
    pub target: String,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub browser: BrowserKind,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_axe_script")]
    pub axe_script: PathBuf,
    #[serde(default = "default_navigation_timeout", with = "humantime_str")]
    pub navigation_timeout: Duration,
    #[serde(default = "default_analysis_timeout", with = "humantime_str")]
    pub analysis_timeout: Duration,
    #[serde(default = "default_element_timeout", with = "humantime_str")]
    pub element_timeout: Duration,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
}

fn default_webdriver_url() -> String {
    "http://127.0.0.1:4444".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_axe_script() -> PathBuf {
    PathBuf::from("node_modules/axe-core/axe.min.js")
}

fn default_navigation_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_analysis_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_element_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_parallelism() -> usize {
    4
}

/// Durations as human-friendly strings such as `30s` or `1m 30s`.
mod humantime_str {
    use std::time::Duration;

    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(D::Error::custom)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("invalid target: {0}")]
    Target(#[from] TargetError),
    #[error("parallelism must be at least 1")]
    ZeroParallelism,
    #[error("`{0}` must be longer than zero")]
    ZeroTimeout(&'static str),
    #[error("webdriver_url must not be empty")]
    EmptyWebDriverUrl,
}

impl AuditSettings {
    /// Every accepted key, for layers (such as the environment) that must skip foreign ones.
    pub const KEYS: [&'static str; 10] = [
        "target",
        "webdriver_url",
        "browser",
        "headless",
        "axe_script",
        "navigation_timeout",
        "analysis_timeout",
        "element_timeout",
        "parallelism",
        "catalog",
    ];

    /// Settings with every default applied for `target`.
    pub fn for_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            webdriver_url: default_webdriver_url(),
            browser: BrowserKind::default(),
            headless: default_headless(),
            axe_script: default_axe_script(),
            navigation_timeout: default_navigation_timeout(),
            analysis_timeout: default_analysis_timeout(),
            element_timeout: default_element_timeout(),
            parallelism: default_parallelism(),
            catalog: None,
        }
    }

    pub fn validate(&self) -> Result<ScanTarget, SettingsError> {
        let target = ScanTarget::parse(&self.target)?;
        if self.parallelism == 0 {
            return Err(SettingsError::ZeroParallelism);
        }
        for (name, value) in [
            ("navigation_timeout", self.navigation_timeout),
            ("analysis_timeout", self.analysis_timeout),
            ("element_timeout", self.element_timeout),
        ] {
            if value.is_zero() {
                return Err(SettingsError::ZeroTimeout(name));
            }
        }
        if self.webdriver_url.trim().is_empty() {
            return Err(SettingsError::EmptyWebDriverUrl);
        }
        Ok(target)
    }

    pub fn webdriver_config(&self) -> WebDriverConfig {
        WebDriverConfig {
            endpoint: self.webdriver_url.clone(),
            browser: self.browser,
            headless: self.headless,
            page_load_timeout: self.navigation_timeout,
            script_timeout: self.analysis_timeout,
        }
    }

    /// Wire the WebDriver factory, axe engine and scanner into a runner.
    pub fn build_runner(&self) -> Result<CheckRunner> {
        let factory = WebDriverFactory::new(&self.webdriver_config())
            .context("failed to configure WebDriver client")?;
        let provider = SessionProvider::new(Arc::new(factory), self.navigation_timeout);
        let engine = Arc::new(AxeEngine::new(&self.axe_script));
        let scanner = DefaultScanner::new(engine, self.analysis_timeout);
        Ok(CheckRunner::new(provider, Arc::new(scanner))
            .with_element_timeout(self.element_timeout)
            .with_parallelism(self.parallelism))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fills_defaults_for_everything_but_target() {
        let settings: AuditSettings =
            serde_json::from_value(json!({ "target": "https://example.org/" })).unwrap();
        assert_eq!(settings, AuditSettings::for_target("https://example.org/"));
        assert_eq!(settings.webdriver_url, "http://127.0.0.1:4444");
        assert_eq!(settings.navigation_timeout, Duration::from_secs(30));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn target_is_required() {
        assert!(serde_json::from_value::<AuditSettings>(json!({})).is_err());
    }

    #[test]
    fn parses_human_durations_and_browser() {
        let settings: AuditSettings = serde_json::from_value(json!({
            "target": "https://example.org/",
            "browser": "firefox",
            "analysis_timeout": "1m 30s",
            "element_timeout": "500ms"
        }))
        .unwrap();
        assert_eq!(settings.browser, BrowserKind::Firefox);
        assert_eq!(settings.analysis_timeout, Duration::from_secs(90));
        assert_eq!(settings.element_timeout, Duration::from_millis(500));

        let round_trip = serde_json::to_value(&settings).unwrap();
        assert_eq!(round_trip["analysis_timeout"], "1m 30s");
    }

    #[test]
    fn keys_cover_every_field() {
        let mut settings = AuditSettings::for_target("https://example.org/");
        settings.catalog = Some(PathBuf::from("extra.yaml"));
        let value = serde_json::to_value(&settings).unwrap();
        let mut fields: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        let mut keys: Vec<_> = AuditSettings::KEYS.iter().map(|k| k.to_string()).collect();
        fields.sort();
        keys.sort();
        assert_eq!(fields, keys);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = serde_json::from_value::<AuditSettings>(json!({
            "target": "https://example.org/",
            "paralelism": 2
        }))
        .unwrap_err();
        assert!(err.to_string().contains("paralelism"));
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let mut settings = AuditSettings::for_target("https://example.org/");
        settings.parallelism = 0;
        assert_eq!(settings.validate(), Err(SettingsError::ZeroParallelism));

        let mut settings = AuditSettings::for_target("https://example.org/");
        settings.analysis_timeout = Duration::ZERO;
        assert_eq!(
            settings.validate(),
            Err(SettingsError::ZeroTimeout("analysis_timeout"))
        );

        let settings = AuditSettings::for_target("not a url");
        assert!(matches!(settings.validate(), Err(SettingsError::Target(_))));
    }

    #[test]
    fn webdriver_config_follows_timeouts() {
        let mut settings = AuditSettings::for_target("https://example.org/");
        settings.browser = BrowserKind::Edge;
        settings.headless = false;
        let config = settings.webdriver_config();
        assert_eq!(config.browser, BrowserKind::Edge);
        assert!(!config.headless);
        assert_eq!(config.page_load_timeout, Duration::from_secs(30));
        assert_eq!(config.script_timeout, Duration::from_secs(60));
        assert!(settings.build_runner().is_ok());
    }
}
