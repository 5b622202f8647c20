use std::{io::ErrorKind, path::PathBuf};

use envmon_common::DashboardConfig;
use tracing::info;

use crate::error::ConfigError;

#[derive(Clone)]
pub struct SheetSecrets {
    pub api_key: String,
    pub sheet_id: String,
    pub range: String,
}

/// Keys read from the environment at startup. Never logged.
#[derive(Clone)]
pub struct Secrets {
    pub openrouter_api_key: String,
    pub openweathermap_api_key: String,
    pub sheets: Option<SheetSecrets>,
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        let sheets = match (env_value("GOOGLE_SHEETS_API_KEY"), env_value("PROFILE_SHEET_ID")) {
            (Some(api_key), Some(sheet_id)) => Some(SheetSecrets {
                api_key,
                sheet_id,
                range: env_value("PROFILE_SHEET_RANGE").unwrap_or_else(|| "Sheet1".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            openrouter_api_key: required("OPENROUTER_API_KEY")?,
            openweathermap_api_key: required("OPENWEATHERMAP_API_KEY")?,
            sheets,
        })
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env_value(name).ok_or(ConfigError::MissingSecret(name))
}

pub fn config_path() -> PathBuf {
    std::env::var("ENVMON_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.envmon/config.json"))
}

pub async fn load_config(path: PathBuf) -> Result<DashboardConfig, ConfigError> {
    let mut config = match tokio::fs::read(&path).await {
        Ok(raw) => serde_json::from_slice::<DashboardConfig>(&raw)
            .map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config file at {}, using defaults", path.display());
            DashboardConfig::default()
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    config.sanitize();
    Ok(config)
}
