use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const APP_DIR_NAME: &str = "scrum-ims";
const CONFIG_FILE_NAME: &str = "config.json";

pub fn config_directory() -> AppResult<PathBuf> {
    if let Ok(dir) = env::var("IMS_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| AppError::Configuration("unable to locate a config directory".to_string()))
}

pub fn config_file_path() -> AppResult<PathBuf> {
    Ok(config_directory()?.join(CONFIG_FILE_NAME))
}

/// Settings persisted by `ims config init`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default)]
    pub jira_base_url: Option<String>,
    #[serde(default)]
    pub jira_email: Option<String>,
    #[serde(default)]
    pub jira_token: Option<String>,
    #[serde(default)]
    pub default_mapping: Option<String>,
}

impl StoredConfig {
    pub fn load() -> AppResult<Self> {
        Self::load_from(&config_file_path()?)
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                AppError::Configuration(format!("invalid config file {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(AppError::Io(err)),
        }
    }

    pub fn save(&self) -> AppResult<()> {
        self.save_to(&config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| AppError::Configuration(format!("failed to write config: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Effective settings: the stored file overlaid with `IMS_*` environment
/// variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jira_base_url: Option<String>,
    pub jira_email: Option<String>,
    pub jira_token: Option<String>,
    pub mapping_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(mapping_override: Option<PathBuf>) -> AppResult<Self> {
        let stored = StoredConfig::load()?;
        Ok(Self::resolve(stored, mapping_override, |key| env::var(key).ok()))
    }

    fn resolve(
        stored: StoredConfig,
        mapping_override: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let pick = |key: &str, stored: Option<String>| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .or(stored)
        };

        Self {
            jira_base_url: pick("IMS_JIRA_BASE_URL", stored.jira_base_url),
            jira_email: pick("IMS_JIRA_EMAIL", stored.jira_email),
            jira_token: pick("IMS_JIRA_TOKEN", stored.jira_token),
            mapping_path: mapping_override
                .or_else(|| pick("IMS_MAPPING", stored.default_mapping).map(PathBuf::from)),
        }
    }

    pub fn mapping_path(&self) -> AppResult<&Path> {
        self.mapping_path.as_deref().ok_or_else(|| {
            AppError::Configuration(
                "no mapping file given; pass --mapping or set IMS_MAPPING".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn stored() -> StoredConfig {
        StoredConfig {
            jira_base_url: Some("https://stored.atlassian.net".to_string()),
            jira_email: Some("stored@example.com".to_string()),
            jira_token: None,
            default_mapping: Some("/etc/ims/mapping.json".to_string()),
        }
    }

    #[test]
    fn environment_overrides_stored_values() {
        let env = HashMap::from([
            ("IMS_JIRA_BASE_URL", "https://env.atlassian.net"),
            ("IMS_JIRA_TOKEN", "secret"),
            ("IMS_JIRA_EMAIL", "  "),
        ]);
        let config = AppConfig::resolve(stored(), None, |key| {
            env.get(key).map(|value| value.to_string())
        });

        assert_eq!(config.jira_base_url.as_deref(), Some("https://env.atlassian.net"));
        assert_eq!(config.jira_email.as_deref(), Some("stored@example.com"));
        assert_eq!(config.jira_token.as_deref(), Some("secret"));
        assert_eq!(
            config.mapping_path().unwrap(),
            Path::new("/etc/ims/mapping.json")
        );
    }

    #[test]
    fn command_line_mapping_wins() {
        let config = AppConfig::resolve(stored(), Some(PathBuf::from("local.json")), |_| {
            Some("/env/mapping.json".to_string())
        });
        assert_eq!(config.mapping_path().unwrap(), Path::new("local.json"));
    }

    #[test]
    fn missing_mapping_is_a_configuration_error() {
        let config = AppConfig::resolve(StoredConfig::default(), None, |_| None);
        assert!(matches!(
            config.mapping_path(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn stored_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");
        assert_eq!(StoredConfig::load_from(&path).unwrap(), StoredConfig::default());

        stored().save_to(&path).unwrap();
        assert_eq!(StoredConfig::load_from(&path).unwrap(), stored());
    }
}
