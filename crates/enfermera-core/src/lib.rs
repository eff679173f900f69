use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use enfermera_client::{GeminiClient, GenerativeBackend};

pub mod controller;
pub mod favicon;
pub mod markdown;
pub mod messages;
pub mod service;
pub mod settings;
pub mod state;
pub mod theme;
pub mod transform;

use settings::Settings;
use theme::{FilePreferenceStore, ThemeController, ThemePreference};
use time::OffsetDateTime;
use tracing::{debug, info};

/// Inputs required to bring up the application core.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: Settings,
    /// Overrides the directory holding persisted preferences.
    pub state_dir: Option<PathBuf>,
    /// Color scheme reported by the host terminal, if any.
    pub ambient_theme: Option<ThemePreference>,
    /// Timestamp captured during process initialization for diagnostics.
    pub boot_timestamp: OffsetDateTime,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            state_dir: None,
            ambient_theme: None,
            boot_timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Clone)]
pub struct AppRuntime {
    config: AppConfig,
    controller: SearchController,
    theme: ThemeController,
}

impl AppRuntime {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn controller(&self) -> SearchController {
        self.controller.clone()
    }

    pub fn theme(&self) -> &ThemeController {
        &self.theme
    }

    pub fn theme_mut(&mut self) -> &mut ThemeController {
        &mut self.theme
    }
}

/// Resolves the persisted theme without touching the search backend.
pub async fn open_theme(config: &AppConfig) -> Result<ThemeController> {
    let state_dir = config
        .settings
        .resolve_state_dir(config.state_dir.as_deref())?;
    let store = FilePreferenceStore::in_dir(&state_dir);
    debug!(
        target: "enfermera_core",
        preferences = %store.path().display(),
        "opening preference store"
    );
    Ok(ThemeController::resolve(Arc::new(store), config.ambient_theme).await)
}

/// Builds the runtime against the Gemini API. Fails when no API credential
/// is present in the environment.
pub async fn bootstrap(config: AppConfig) -> Result<AppRuntime> {
    let client = GeminiClient::from_env(config.settings.client_config())
        .context("cannot start without an API credential")?;
    info!(
        target: "enfermera_core",
        model = client.model(),
        boot_timestamp = %config.boot_timestamp,
        "Gemini client initialized"
    );
    bootstrap_with_backend(config, Arc::new(client)).await
}

pub async fn bootstrap_with_backend(
    config: AppConfig,
    backend: Arc<dyn GenerativeBackend>,
) -> Result<AppRuntime> {
    let theme = open_theme(&config).await?;
    let service = QueryService::new(backend).with_recency(config.settings.recency());
    let controller = SearchController::new(service);
    Ok(AppRuntime {
        config,
        controller,
        theme,
    })
}

pub use controller::{SearchController, SearchError, StateWatcher};
pub use service::{QueryError, QueryService, RecencyWindow, SearchResult};
pub use state::{SearchSessionState, View};
pub use transform::{transform, Article};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_theme_uses_ambient_signal_without_saved_value() {
        let tmp = tempdir().expect("tempdir");
        let config = AppConfig {
            state_dir: Some(tmp.path().to_path_buf()),
            ambient_theme: Some(ThemePreference::Dark),
            ..AppConfig::default()
        };
        let theme = open_theme(&config).await.expect("theme opens");
        assert_eq!(theme.current(), ThemePreference::Dark);
    }
}
