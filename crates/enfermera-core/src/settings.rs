use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use enfermera_client::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::service::RecencyWindow;

pub const ENV_PREFIX: &str = "ENFERMERA";
pub const STATE_DIR_ENV: &str = "ENFERMERA_STATE_DIR";
const CONFIG_FILE_NAME: &str = "enfermera.toml";

/// Tunables layered from defaults, an optional TOML file and `ENFERMERA__*`
/// environment variables. The API credential is deliberately not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub recency_from: u16,
    pub recency_to: u16,
    pub state_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let window = RecencyWindow::default();
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
            recency_from: window.from,
            recency_to: window.to,
            state_dir: None,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("app", "Enfermera", "enfermera")
}

pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl Settings {
    /// Loads settings. An explicit `file` must exist; the default location
    /// is optional.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        match file {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_file() {
                    builder = builder.add_source(File::from(path.as_path()).required(false));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        debug!(target: "enfermera_core", ?settings, "configuration loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            bail!("`model` must not be empty");
        }
        if self.base_url.trim().is_empty() {
            bail!("`base_url` must not be empty");
        }
        if self.timeout_secs == 0 {
            bail!("`timeout_secs` must be greater than zero");
        }
        if self.recency_from > self.recency_to {
            bail!(
                "`recency_from` ({}) must not be after `recency_to` ({})",
                self.recency_from,
                self.recency_to
            );
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn recency(&self) -> RecencyWindow {
        RecencyWindow {
            from: self.recency_from,
            to: self.recency_to,
        }
    }

    /// Where persisted preferences live: explicit override, then
    /// `ENFERMERA_STATE_DIR`, then the platform data directory.
    pub fn resolve_state_dir(&self, override_dir: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = override_dir {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        if let Some(dir) = std::env::var_os(STATE_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .context("unable to resolve a state directory; pass --state-dir")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.model, "gemini-2.5-flash");
        assert_eq!(settings.recency(), RecencyWindow::default());
        assert_eq!(settings.client_config().timeout, Duration::from_secs(60));
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("enfermera.toml");
        fs::write(
            &path,
            "model = \"gemini-2.0-flash\"\ntimeout_secs = 15\nrecency_from = 2022\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.model, "gemini-2.0-flash");
        assert_eq!(settings.timeout_secs, 15);
        assert_eq!(settings.recency_from, 2022);
        assert_eq!(settings.recency_to, 2025);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let settings = Settings {
            recency_from: 2025,
            recency_to: 2020,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn explicit_state_dir_wins() {
        let settings = Settings {
            state_dir: Some(PathBuf::from("/from/settings")),
            ..Settings::default()
        };
        let dir = settings
            .resolve_state_dir(Some(Path::new("/from/flag")))
            .unwrap();
        assert_eq!(dir, PathBuf::from("/from/flag"));
        assert_eq!(
            settings.resolve_state_dir(None).unwrap(),
            PathBuf::from("/from/settings")
        );
    }
}
