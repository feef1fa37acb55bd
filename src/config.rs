use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "TRIP_PLANNER_CONFIG";
pub const DATA_DIR_ENV: &str = "TRIP_PLANNER_DATA_DIR";

const DEFAULT_TRIP_DURATION: u32 = 7;
const MAX_TRIP_DURATION: u32 = 366;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannerConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub log_dir: Option<PathBuf>,
    pub log_filter: String,
    pub default_trip_duration: u32,
    /// Upper bound on a trip's length in days.
    pub max_trip_duration: u32,
    pub catalog_fixture: Option<PathBuf>,
    pub default_search_language: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: "trip-planner.db".to_string(),
            log_dir: None,
            log_filter: "info".to_string(),
            default_trip_duration: DEFAULT_TRIP_DURATION,
            max_trip_duration: MAX_TRIP_DURATION,
            catalog_fixture: None,
            default_search_language: "en".to_string(),
        }
    }
}

impl PlannerConfig {
    /// Resolves the config file from the environment, falling back to
    /// `<data dir>/config.yaml`. A missing file yields defaults.
    pub fn load() -> AppResult<Self> {
        let data_dir_override = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        let path = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => PathBuf::from(path),
            None => data_dir_override
                .clone()
                .unwrap_or_else(default_data_dir)
                .join("config.yaml"),
        };

        let mut config = Self::from_file(&path)?;
        if let Some(data_dir) = data_dir_override {
            config.data_dir = data_dir;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        if !path.is_file() {
            tracing::debug!(path = %path.to_string_lossy(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }

    fn validate(&self) -> AppResult<()> {
        if self.database_file.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "config: databaseFile cannot be empty".to_string(),
            ));
        }
        if self.default_search_language.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "config: defaultSearchLanguage cannot be empty".to_string(),
            ));
        }
        if self.default_trip_duration > self.max_trip_duration {
            return Err(AppError::InvalidInput(format!(
                "config: defaultTripDuration {} exceeds maxTripDuration {}",
                self.default_trip_duration, self.max_trip_duration
            )));
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(unix)]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".trip-planner");
        }
    }

    #[cfg(windows)]
    {
        if let Ok(home) = std::env::var("USERPROFILE") {
            return PathBuf::from(home).join(".trip-planner");
        }
    }

    std::env::current_dir()
        .map(|cwd| cwd.join(".trip-planner"))
        .unwrap_or_else(|_| PathBuf::from(".trip-planner"))
}
