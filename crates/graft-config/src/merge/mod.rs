//! Configuration discovery, layering and environment overrides

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use graft_core::error::GraftError;
use graft_core::types::MergeStrategy;
use tracing::debug;

use crate::settings::{GraftConfig, RegistryBackend};
use crate::ConfigResult;

/// Project configuration file name
pub const CONFIG_FILE_NAME: &str = "graft.toml";

/// Prefix of recognized environment overrides
pub const ENV_PREFIX: &str = "GRAFT_";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
    /// Global config file, `~/.graft/config.toml` by default
    global_path: Option<Utf8PathBuf>,
}

/// Configuration layering and merging
pub struct ConfigLayering;

/// One parsed configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    pub source: ConfigSource,
    pub table: toml::Table,
}

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Global config file
    Global(Utf8PathBuf),
    /// Project graft.toml file
    Project(Utf8PathBuf),
    /// Environment variable
    Environment(String),
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self {
            cwd,
            global_path: default_global_path(),
        }
    }

    /// Use a specific global config file instead of `~/.graft/config.toml`
    pub fn with_global_path(mut self, path: Utf8PathBuf) -> Self {
        self.global_path = Some(path);
        self
    }

    /// Find graft.toml in the working directory or its ancestors
    pub fn find_project_config(&self) -> Option<Utf8PathBuf> {
        self.cwd
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load the project layer if a graft.toml exists
    pub async fn load_project_layer(&self) -> ConfigResult<Option<ConfigLayer>> {
        match self.find_project_config() {
            Some(path) => load_layer_at(&path, ConfigSource::Project(path.clone())).await.map(Some),
            None => Ok(None),
        }
    }

    /// Load the global layer if the global config file exists
    pub async fn load_global_layer(&self) -> ConfigResult<Option<ConfigLayer>> {
        match &self.global_path {
            Some(path) if path.is_file() => {
                load_layer_at(path, ConfigSource::Global(path.clone())).await.map(Some)
            },
            _ => Ok(None),
        }
    }

    /// Load global, project and environment configuration into one validated config
    pub async fn load(&self) -> ConfigResult<(GraftConfig, Vec<ConfigSource>)> {
        let global = self.load_global_layer().await?;
        let project = self.load_project_layer().await?;
        let env_overrides = ConfigLayering::collect_env_overrides();

        let mut sources: Vec<ConfigSource> = global
            .iter()
            .chain(project.iter())
            .map(|layer| layer.source.clone())
            .collect();
        let mut env_keys: Vec<&String> = env_overrides
            .keys()
            .filter(|key| ConfigLayering::is_known_override(key))
            .collect();
        env_keys.sort();
        sources.extend(env_keys.into_iter().cloned().map(ConfigSource::Environment));

        let config = ConfigLayering::merge_configs(global, project, &env_overrides)?;
        debug!(sources = sources.len(), "configuration loaded");
        Ok((config, sources))
    }
}

async fn load_layer_at(path: &Utf8Path, source: ConfigSource) -> ConfigResult<ConfigLayer> {
    let table = crate::toml::load_layer(path).await?;
    Ok(ConfigLayer { source, table })
}

fn default_global_path() -> Option<Utf8PathBuf> {
    let home = dirs::home_dir()?;
    let home = Utf8PathBuf::try_from(home).ok()?;
    Some(home.join(".graft").join("config.toml"))
}

const KNOWN_OVERRIDES: &[&str] = &[
    "GRAFT_OFFLINE",
    "GRAFT_REGISTRY_URL",
    "GRAFT_REGISTRY_BACKEND",
    "GRAFT_RETRIES",
    "GRAFT_TIMEOUT_MS",
    "GRAFT_MERGE_STRATEGY",
    "GRAFT_CACHE_PATH",
    "GRAFT_CACHE_PERSIST",
    "GRAFT_BATCH_SIZE",
];

impl ConfigLayering {
    /// Merge layers in precedence order: global, project, environment.
    ///
    /// Tables are merged key by key so a project file only needs the
    /// settings it changes. The result is validated before it is returned.
    pub fn merge_configs(
        global: Option<ConfigLayer>,
        project: Option<ConfigLayer>,
        env_overrides: &HashMap<String, String>,
    ) -> ConfigResult<GraftConfig> {
        let mut merged = toml::Table::new();

        for layer in global.into_iter().chain(project) {
            // Deserialize each layer alone so errors name the offending file
            Self::check_layer(&layer)?;
            Self::merge_tables(&mut merged, layer.table);
        }

        let mut config: GraftConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| GraftError::ConfigParse {
                path: "merged configuration".to_string(),
                message: e.to_string(),
            })?;

        Self::apply_env_overrides(&mut config, env_overrides)?;
        config.validate()?;

        Ok(config)
    }

    fn check_layer(layer: &ConfigLayer) -> ConfigResult<()> {
        let path = match &layer.source {
            ConfigSource::Global(path) | ConfigSource::Project(path) => path.to_string(),
            ConfigSource::Environment(key) => key.clone(),
        };
        toml::Value::Table(layer.table.clone())
            .try_into::<GraftConfig>()
            .map(|_| ())
            .map_err(|e| GraftError::ConfigParse {
                path,
                message: e.to_string(),
            })
    }

    fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
        for (key, value) in overlay {
            if let toml::Value::Table(incoming) = value {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    Self::merge_tables(existing, incoming);
                    continue;
                }
                base.insert(key, toml::Value::Table(incoming));
            } else {
                base.insert(key, value);
            }
        }
    }

    /// Apply `GRAFT_*` overrides. Unrecognized keys are ignored.
    fn apply_env_overrides(
        config: &mut GraftConfig,
        overrides: &HashMap<String, String>,
    ) -> ConfigResult<()> {
        // Sorted so the first reported error is stable
        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();

        for key in keys {
            let value = overrides[key].trim();
            match key.as_str() {
                "GRAFT_OFFLINE" => config.registry.offline = parse_bool(key, value)?,
                "GRAFT_REGISTRY_URL" => config.registry.registry_url = Some(value.to_string()),
                "GRAFT_REGISTRY_BACKEND" => {
                    config.registry.backend = match value {
                        "npm-cli" | "npm" => RegistryBackend::NpmCli,
                        "http" => RegistryBackend::Http,
                        other => {
                            return Err(env_error(key, format!("unknown backend '{}'", other)))
                        },
                    }
                },
                "GRAFT_RETRIES" => config.registry.retries = parse_number(key, value)?,
                "GRAFT_TIMEOUT_MS" => config.registry.timeout_ms = parse_number(key, value)?,
                "GRAFT_MERGE_STRATEGY" => {
                    config.merge.strategy = value
                        .parse::<MergeStrategy>()
                        .map_err(|reason| env_error(key, reason))?
                },
                "GRAFT_CACHE_PATH" => config.cache.path = Utf8PathBuf::from(value),
                "GRAFT_CACHE_PERSIST" => config.cache.persist = parse_bool(key, value)?,
                "GRAFT_BATCH_SIZE" => config.analyzer.batch_size = parse_number(key, value)?,
                _ => {
                    // Unknown environment variable, ignore
                },
            }
        }

        Ok(())
    }

    fn is_known_override(key: &str) -> bool {
        KNOWN_OVERRIDES.contains(&key)
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect()
    }
}

fn env_error(key: &str, reason: impl Into<String>) -> GraftError {
    GraftError::ConfigValidation {
        field: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(env_error(key, format!("expected a boolean, got '{}'", other))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| env_error(key, format!("expected a number, got '{}'", value)))
}
