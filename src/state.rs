use std::sync::Arc;

use crate::config::AppConfig;
use crate::library::MediaLibrary;
use crate::metrics::Metrics;
use crate::settings::{SettingsError, SettingsStore};

/// The shared application state.
///
/// Built once at startup and cloned into every handler. All mutable state
/// (library root, response cache, settings) lives behind these handles.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration, fixed for the life of the process.
    pub config: Arc<AppConfig>,
    /// The persisted user settings, including the library root.
    pub settings: Arc<SettingsStore>,
    /// The library rooted at the current `folderPath`.
    pub library: Arc<MediaLibrary>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: AppConfig, settings: SettingsStore) -> Self {
        let metrics = Metrics::new();
        let library = MediaLibrary::new(settings.folder_path(), &config, metrics.clone());
        Self { config: Arc::new(config), settings: Arc::new(settings), library: Arc::new(library), metrics }
    }

    /// Opens the settings document named by `config` and builds the state
    /// around it.
    pub async fn initialize(config: AppConfig) -> Result<Self, SettingsError> {
        let settings =
            SettingsStore::open(config.library.settings_path(), config.library.default_folder()).await?;
        Ok(Self::new(config, settings))
    }
}
