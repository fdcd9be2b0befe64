use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, io};
use tracing::{debug, warn};

use crate::logic::error::ProbeError;
use crate::logic::types::{parse_endpoint, Credentials, QuerySpec};

pub const DEFAULT_TABLE: &str = "stories";
pub const DEFAULT_COLUMNS: &[&str] = &["id"];
pub const DEFAULT_LIMIT: u32 = 1;

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_SERVICE_KEY: &str = "SUPABASE_SERVICE_KEY";
pub const ENV_KEY_FALLBACK: &str = "SUPABASE_KEY";
pub const ENV_TABLE: &str = "TABLEPROBE_TABLE";
pub const ENV_COLUMNS: &str = "TABLEPROBE_COLUMNS";
pub const ENV_LIMIT: &str = "TABLEPROBE_LIMIT";

/// Probe settings as they appear in one layer (file, environment or flags).
/// Every field is optional; unset fields fall through to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ProbeConfig {
    /// Read a TOML config file. A missing file is not an error.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ProbeError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file");
                return Ok(None);
            }
            Err(e) => {
                return Err(ProbeError::InvalidConfig(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        toml::from_str(&content)
            .map(Some)
            .map_err(|e| ProbeError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Write the config as TOML, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Build the environment layer through `lookup` so callers (and tests)
    /// decide where variables come from.
    pub fn from_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let limit = get(ENV_LIMIT).and_then(|raw| match raw.trim().parse::<u32>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(value = %raw, error = %e, "ignoring {}", ENV_LIMIT);
                None
            }
        });

        Self {
            url: get(ENV_URL),
            service_key: get(ENV_SERVICE_KEY).or_else(|| get(ENV_KEY_FALLBACK)),
            table: get(ENV_TABLE),
            columns: get(ENV_COLUMNS).map(|raw| split_columns(&raw)),
            limit,
        }
    }

    /// Overlay `higher` on top of `self`; set fields in `higher` win.
    pub fn merge(self, higher: ProbeConfig) -> ProbeConfig {
        ProbeConfig {
            url: higher.url.or(self.url),
            service_key: higher.service_key.or(self.service_key),
            table: higher.table.or(self.table),
            columns: higher.columns.or(self.columns),
            limit: higher.limit.or(self.limit),
        }
    }

    pub fn table_or_default(&self) -> &str {
        self.table.as_deref().unwrap_or(DEFAULT_TABLE)
    }

    pub fn columns_or_default(&self) -> Vec<String> {
        self.columns
            .clone()
            .unwrap_or_else(|| DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect())
    }

    pub fn limit_or_default(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Validate into what the probe actually needs.
    pub fn resolve(&self) -> Result<(Credentials, QuerySpec), ProbeError> {
        let credentials = Credentials::new(
            self.url.as_deref().unwrap_or_default(),
            self.service_key.as_deref().unwrap_or_default(),
        )?;
        let spec = QuerySpec::new(
            self.table_or_default(),
            &self.columns_or_default(),
            self.limit_or_default(),
        )?;
        Ok((credentials, spec))
    }

    /// Same rules as `resolve`, except that missing credentials are allowed;
    /// they may come from the environment later.
    pub fn check_storable(&self) -> Result<(), ProbeError> {
        if let Some(url) = &self.url {
            parse_endpoint(url)?;
        }
        if let Some(key) = &self.service_key {
            if key.trim().is_empty() {
                return Err(ProbeError::InvalidConfig("service key must not be empty".to_string()));
            }
        }
        QuerySpec::new(
            self.table_or_default(),
            &self.columns_or_default(),
            self.limit_or_default(),
        )?;
        Ok(())
    }
}

/// Where an effective value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Default,
    File,
    Env,
    Flag,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::Default => "default",
            Source::File => "config file",
            Source::Env => "environment",
            Source::Flag => "command line",
        }
    }
}

/// The three layers kept apart so `config show` can explain itself
#[derive(Debug, Clone, Default)]
pub struct LayeredConfig {
    pub file: ProbeConfig,
    pub env: ProbeConfig,
    pub flags: ProbeConfig,
}

impl LayeredConfig {
    /// `path` is `None` when there is nowhere to look for a config file.
    pub fn load<F>(path: Option<&Path>, lookup: F, flags: ProbeConfig) -> Result<Self, ProbeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => ProbeConfig::from_file(path)?.unwrap_or_default(),
            None => ProbeConfig::default(),
        };
        Ok(Self {
            file,
            env: ProbeConfig::from_env(lookup),
            flags,
        })
    }

    pub fn effective(&self) -> ProbeConfig {
        self.file
            .clone()
            .merge(self.env.clone())
            .merge(self.flags.clone())
    }

    pub fn source_of<P>(&self, is_set: P) -> Source
    where
        P: Fn(&ProbeConfig) -> bool,
    {
        if is_set(&self.flags) {
            Source::Flag
        } else if is_set(&self.env) {
            Source::Env
        } else if is_set(&self.file) {
            Source::File
        } else {
            Source::Default
        }
    }
}

pub fn split_columns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Platform config location, e.g. `~/.config/tableprobe/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "tableprobe", "tableprobe").map(|pd| pd.config_dir().join("config.toml"))
}

/// Explicit path (supports `~`) or the platform default.
pub fn resolve_config_path(explicit: Option<&str>) -> Result<PathBuf, ProbeError> {
    match explicit {
        Some(p) => Ok(PathBuf::from(shellexpand::tilde(p).into_owned())),
        None => default_config_path().ok_or_else(|| {
            ProbeError::InvalidConfig("no home directory to place the config file in; pass --config".to_string())
        }),
    }
}
