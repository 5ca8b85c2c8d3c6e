use std::env;
use std::path::{Path, PathBuf};

use a11y_audit_core::{AuditSettings, BrowserKind, ScanTarget};
use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File, Map};

pub const ENV_PREFIX: &str = "A11Y_AUDIT";

/// Values given on the command line; they win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target: Option<String>,
    pub webdriver_url: Option<String>,
    pub browser: Option<BrowserKind>,
    pub catalog: Option<PathBuf>,
    pub parallelism: Option<usize>,
}

/// Resolve settings from defaults, an optional config file, `A11Y_AUDIT_*` variables and flags.
pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<(AuditSettings, ScanTarget)> {
    let settings: AuditSettings = layered(config_file, overrides)?
        .try_deserialize()
        .context("invalid audit configuration (is a target set?)")?;
    let target = settings.validate()?;
    Ok((settings, target))
}

/// The extra catalog file from the same layers as [`load`], without requiring a target.
pub fn catalog(config_file: Option<&Path>, flag: Option<&Path>) -> Result<Option<PathBuf>> {
    let overrides = Overrides {
        catalog: flag.map(Path::to_path_buf),
        ..Overrides::default()
    };
    match layered(config_file, &overrides)?.get_string("catalog") {
        Ok(path) => Ok(Some(PathBuf::from(path))),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err).context("invalid `catalog` setting"),
    }
}

fn layered(config_file: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let mut builder = Config::builder();
    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }
    builder
        .add_source(environment())
        .set_override_option("target", overrides.target.clone())?
        .set_override_option("webdriver_url", overrides.webdriver_url.clone())?
        .set_override_option("browser", overrides.browser.map(|b| b.to_string()))?
        .set_override_option(
            "catalog",
            overrides.catalog.as_ref().map(|p| p.display().to_string()),
        )?
        .set_override_option("parallelism", overrides.parallelism.map(|p| p as i64))?
        .build()
        .context("failed to read audit configuration")
}

/// `A11Y_AUDIT_*` variables that name a setting. Others sharing the prefix
/// (`A11Y_AUDIT_LOG_LEVEL` and the like) belong to wrappers and are skipped.
fn environment() -> Environment {
    let prefix = format!("{}_", ENV_PREFIX.to_ascii_lowercase());
    let vars: Map<String, String> = env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .filter(|(key, _)| {
            key.to_ascii_lowercase()
                .strip_prefix(&prefix)
                .map_or(false, |name| AuditSettings::KEYS.contains(&name))
        })
        .collect();
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .source(Some(vars))
}
