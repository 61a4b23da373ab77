use log::warn;
use serde::{ Serialize, Deserialize };
use std::error::Error;
use std::fs;
use std::path::Path;

use crate::llm::DEFAULT_MODEL_ID;

/// Locally persisted client settings: the single API credential and the
/// selected model. One JSON file, rewritten whole on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub selected_model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL_ID.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            selected_model: default_model(),
        }
    }
}

/// A missing or corrupt settings file degrades to defaults; the user just
/// has to re-enter the key.
pub fn load_settings(path: &Path) -> Settings {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            return Settings::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Malformed settings file {}: {}. Using defaults.", path.display(), e);
            Settings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.selected_model, DEFAULT_MODEL_ID);
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{oops").unwrap();
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/settings.json");

        let settings = Settings {
            api_key: Some("sk-test".to_string()),
            selected_model: "gpt-4o".to_string(),
        };
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path), settings);
    }
}
