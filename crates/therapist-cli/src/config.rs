//! Settings file handling.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use therapist_core::{CustomProfession, DEFAULT_PROCESS_NAME, GameData, GroupBy, LayoutRegistry};
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub process_name: String,
    /// Extra layout profiles; override builtin ones with the same build id.
    pub layouts_dir: Option<PathBuf>,
    /// Labor/skill/profession schema replacing the builtin one.
    pub game_data: Option<PathBuf>,
    pub group_by: GroupBy,
    #[serde(rename = "custom_profession")]
    pub custom_professions: Vec<CustomProfession>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            layouts_dir: None,
            game_data: None,
            group_by: GroupBy::default(),
            custom_professions: Vec::new(),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Failed to determine config directory")?;
    Ok(config_dir.join("therapist").join("config.toml"))
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// Load `explicit` if given (it must exist), else the default location if
    /// present, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::load(path)?;
            info!("Loaded settings from {}", path.display());
            return Ok(config);
        }

        match default_config_path() {
            Ok(path) if path.exists() => {
                let config = Self::load(&path)?;
                info!("Loaded settings from {}", path.display());
                Ok(config)
            }
            _ => {
                debug!("No settings file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn layout_registry(&self) -> Result<LayoutRegistry> {
        let mut registry = LayoutRegistry::builtin()?;
        if let Some(dir) = &self.layouts_dir {
            let count = registry
                .load_dir(dir)
                .with_context(|| format!("Failed to read layouts from {}", dir.display()))?;
            info!("Loaded {} layout(s) from {}", count, dir.display());
        }
        Ok(registry)
    }

    pub fn game_data(&self) -> Result<GameData> {
        match &self.game_data {
            Some(path) => GameData::load(path)
                .with_context(|| format!("Failed to load game data from {}", path.display())),
            None => Ok(GameData::builtin()?),
        }
    }

    pub fn custom_profession(&self, name: &str) -> Option<&CustomProfession> {
        self.custom_professions
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}
