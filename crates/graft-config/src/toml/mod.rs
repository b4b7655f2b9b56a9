//! graft.toml parsing and serialization

use camino::Utf8Path;
use graft_core::error::GraftError;

use crate::settings::GraftConfig;
use crate::ConfigResult;

/// Parse a complete graft.toml, filling omitted settings with defaults
pub fn parse_graft_toml(content: &str) -> ConfigResult<GraftConfig> {
    let config: GraftConfig = toml::from_str(content).map_err(|e| GraftError::ConfigParse {
        path: "graft.toml".to_string(),
        message: e.to_string(),
    })?;

    config.validate()?;

    Ok(config)
}

/// Parse a graft.toml into a raw table for layering.
///
/// Unknown keys are only detected once layers are combined and
/// deserialized into [`GraftConfig`].
pub fn parse_layer(content: &str, path: &Utf8Path) -> ConfigResult<toml::Table> {
    content.parse::<toml::Table>().map_err(|e| GraftError::ConfigParse {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Serialize a configuration back to TOML
pub fn serialize_graft_toml(config: &GraftConfig) -> ConfigResult<String> {
    toml::to_string_pretty(config).map_err(|e| GraftError::Serialization {
        message: format!("TOML serialization error: {}", e),
    })
}

/// Load and parse a graft.toml file
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<GraftConfig> {
    let content = read_file(path).await?;

    parse_graft_toml(&content).map_err(|e| match e {
        GraftError::ConfigParse { message, .. } => GraftError::ConfigParse {
            path: path.to_string(),
            message,
        },
        other => other,
    })
}

/// Load one configuration layer from disk
pub async fn load_layer(path: &Utf8Path) -> ConfigResult<toml::Table> {
    let content = read_file(path).await?;
    parse_layer(&content, path)
}

async fn read_file(path: &Utf8Path) -> ConfigResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GraftError::io(format!("Failed to read {}", path), e))
}
