use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Color;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::{fs, task};
use tracing::{debug, warn};

pub const THEME_KEY: &str = "theme";
const PREFERENCES_FILE_NAME: &str = "preferences.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    Dark,
    #[default]
    Light,
}

impl ThemePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemePreference::Dark => "dark",
            ThemePreference::Light => "light",
        }
    }

    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            ThemePreference::Dark => ThemePreference::Light,
            ThemePreference::Light => ThemePreference::Dark,
        }
    }

    pub fn is_dark(self) -> bool {
        self == ThemePreference::Dark
    }

    /// Startup resolution: saved value, then the ambient signal, then light.
    pub fn resolve(saved: Option<Self>, ambient: Option<Self>) -> Self {
        saved.or(ambient).unwrap_or_default()
    }

    /// Interprets a stored preference: exactly `"dark"` is dark, any other
    /// present value is light.
    pub fn from_saved(value: &Value) -> Self {
        if value.as_str() == Some("dark") {
            ThemePreference::Dark
        } else {
            ThemePreference::Light
        }
    }

    /// Reads a `COLORFGBG`-style `fg;bg` value; dark backgrounds are the
    /// low ANSI indices except light grey (7).
    pub fn from_colorfgbg(value: &str) -> Option<Self> {
        let background: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
        Some(match background {
            0..=6 | 8 => ThemePreference::Dark,
            _ => ThemePreference::Light,
        })
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait ThemeStore: Send + Sync {
    async fn load(&self) -> Result<Option<ThemePreference>>;
    async fn save(&self, preference: ThemePreference) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredValue {
    value: Value,
    stored_at: OffsetDateTime,
}

/// Key/value preferences persisted as one JSON document on disk.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            path: dir.as_ref().join(PREFERENCES_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, StoredValue>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(BTreeMap::new());
        }
        let data = fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read preferences file {:?}", self.path))?;
        if data.is_empty() {
            return Ok(BTreeMap::new());
        }
        let path = self.path.clone();
        task::spawn_blocking(move || {
            serde_json::from_slice(&data)
                .with_context(|| format!("failed to deserialize preferences file {path:?}"))
        })
        .await?
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all().await?.remove(key).map(|entry| entry.value))
    }

    pub async fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.read_all().await.unwrap_or_else(|error| {
            warn!(
                target: "enfermera_core",
                error = %error,
                "discarding unreadable preferences file"
            );
            BTreeMap::new()
        });
        entries.insert(
            key.to_string(),
            StoredValue {
                value,
                stored_at: OffsetDateTime::now_utc(),
            },
        );

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create state dir {parent:?}"))?;
        }
        let payload = task::spawn_blocking(move || serde_json::to_vec_pretty(&entries)).await??;
        fs::write(&self.path, payload)
            .await
            .with_context(|| format!("failed to write preferences file {:?}", self.path))?;

        debug!(target: "enfermera_core", file = ?self.path, key, "stored preference");
        Ok(())
    }
}

#[async_trait]
impl ThemeStore for FilePreferenceStore {
    async fn load(&self) -> Result<Option<ThemePreference>> {
        let saved = self.get(THEME_KEY).await?;
        Ok(saved.as_ref().map(ThemePreference::from_saved))
    }

    async fn save(&self, preference: ThemePreference) -> Result<()> {
        self.put(THEME_KEY, Value::from(preference.as_str())).await
    }
}

/// Holds the process-wide theme and writes every change through the store.
#[derive(Clone)]
pub struct ThemeController {
    current: ThemePreference,
    store: Arc<dyn ThemeStore>,
}

impl ThemeController {
    pub async fn resolve(store: Arc<dyn ThemeStore>, ambient: Option<ThemePreference>) -> Self {
        let saved = match store.load().await {
            Ok(saved) => saved,
            Err(error) => {
                warn!(target: "enfermera_core", error = %error, "failed to load saved theme");
                None
            }
        };
        let current = ThemePreference::resolve(saved, ambient);
        debug!(
            target: "enfermera_core",
            ?saved,
            ?ambient,
            theme = %current,
            "resolved theme preference"
        );
        Self { current, store }
    }

    pub fn current(&self) -> ThemePreference {
        self.current
    }

    pub async fn toggle(&mut self) -> ThemePreference {
        self.set(self.current.toggled()).await
    }

    pub async fn set(&mut self, preference: ThemePreference) -> ThemePreference {
        self.current = preference;
        if let Err(error) = self.store.save(preference).await {
            warn!(
                target: "enfermera_core",
                error = %error,
                theme = %preference,
                "failed to persist theme preference"
            );
        }
        self.current
    }
}

/// Terminal colors for one theme. `styled == false` renders plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub styled: bool,
    pub title: Color,
    pub heading: Color,
    pub strong: Color,
    pub accent: Color,
    pub muted: Color,
    pub link: Color,
    pub error: Color,
}

impl Palette {
    pub fn for_theme(theme: ThemePreference) -> Self {
        match theme {
            ThemePreference::Light => Self {
                styled: true,
                title: rgb(0x2a, 0x3b, 0x4f),
                heading: rgb(0x4a, 0x55, 0x68),
                strong: rgb(0x2a, 0x3b, 0x4f),
                accent: rgb(0x7d, 0x93, 0x72),
                muted: rgb(0x6b, 0x72, 0x80),
                link: rgb(0x6a, 0x7b, 0x95),
                error: rgb(0x9f, 0x12, 0x39),
            },
            ThemePreference::Dark => Self {
                styled: true,
                title: rgb(0xd1, 0xc4, 0xe9),
                heading: rgb(0xb0, 0xc4, 0xde),
                strong: rgb(0xe5, 0xe7, 0xeb),
                accent: rgb(0xa3, 0xb8, 0x99),
                muted: rgb(0x9c, 0xa3, 0xaf),
                link: rgb(0xd1, 0xc4, 0xe9),
                error: rgb(0xfd, 0xa4, 0xaf),
            },
        }
    }

    #[must_use]
    pub fn plain(mut self) -> Self {
        self.styled = false;
        self
    }
}

fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::TrueColor { r, g, b }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingStore {
        saved: Option<ThemePreference>,
        writes: Mutex<Vec<ThemePreference>>,
    }

    #[async_trait]
    impl ThemeStore for RecordingStore {
        async fn load(&self) -> Result<Option<ThemePreference>> {
            Ok(self.saved)
        }

        async fn save(&self, preference: ThemePreference) -> Result<()> {
            self.writes.lock().unwrap().push(preference);
            Ok(())
        }
    }

    #[test]
    fn resolution_prefers_saved_then_ambient() {
        use ThemePreference::{Dark, Light};
        assert_eq!(ThemePreference::resolve(Some(Light), Some(Dark)), Light);
        assert_eq!(ThemePreference::resolve(None, Some(Dark)), Dark);
        assert_eq!(ThemePreference::resolve(None, None), Light);
    }

    #[test]
    fn colorfgbg_background_decides() {
        assert_eq!(ThemePreference::from_colorfgbg("15;0"), Some(ThemePreference::Dark));
        assert_eq!(ThemePreference::from_colorfgbg("0;15"), Some(ThemePreference::Light));
        assert_eq!(ThemePreference::from_colorfgbg("0;default;7"), Some(ThemePreference::Light));
        assert_eq!(ThemePreference::from_colorfgbg("garbage"), None);
    }

    #[test]
    fn palettes_differ_per_theme() {
        let light = Palette::for_theme(ThemePreference::Light);
        let dark = Palette::for_theme(ThemePreference::Dark);
        assert_ne!(light, dark);
        assert!(!dark.plain().styled);
    }

    #[tokio::test]
    async fn double_toggle_restores_and_writes_in_order() {
        let store = Arc::new(RecordingStore::default());
        let mut theme = ThemeController::resolve(store.clone(), None).await;
        let initial = theme.current();

        assert_eq!(theme.toggle().await, initial.toggled());
        assert_eq!(theme.toggle().await, initial);
        assert_eq!(
            *store.writes.lock().unwrap(),
            vec![initial.toggled(), initial]
        );
    }

    #[tokio::test]
    async fn file_store_round_trips_saved_theme() {
        let dir = tempdir().expect("tempdir");
        let store = FilePreferenceStore::in_dir(dir.path().join("nested"));
        assert_eq!(store.load().await.unwrap(), None);

        store.save(ThemePreference::Dark).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(ThemePreference::Dark));
        store.save(ThemePreference::Light).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(ThemePreference::Light));
    }

    #[tokio::test]
    async fn any_saved_value_other_than_dark_means_light() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(FilePreferenceStore::in_dir(dir.path()));

        store.put(THEME_KEY, Value::from("sepia")).await.unwrap();
        let theme = ThemeController::resolve(store.clone(), Some(ThemePreference::Dark)).await;
        assert_eq!(theme.current(), ThemePreference::Light);

        store.put(THEME_KEY, Value::from("Dark")).await.unwrap();
        let theme = ThemeController::resolve(store, None).await;
        assert_eq!(theme.current(), ThemePreference::Light);
    }

    #[tokio::test]
    async fn saved_value_survives_a_new_controller() {
        let dir = tempdir().expect("tempdir");
        let store: Arc<dyn ThemeStore> = Arc::new(FilePreferenceStore::in_dir(dir.path()));
        let mut first = ThemeController::resolve(store.clone(), Some(ThemePreference::Light)).await;
        first.set(ThemePreference::Dark).await;

        let second = ThemeController::resolve(store, Some(ThemePreference::Light)).await;
        assert_eq!(second.current(), ThemePreference::Dark);
    }
}
