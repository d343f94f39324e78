//! The per-user settings document.
//!
//! Stored as camelCase JSON (`config.json`) next to the user's other
//! configuration. Holds the library root and a handful of UI preferences.
//! The server configuration in [`crate::config`] is a separate thing.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::library::TEMP_DIR;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub folder_path: PathBuf,
    pub remember_category: bool,
    pub lang: String,
    pub image_quality: u8,
    pub image_width: u32,
    pub image_height: u32,
}

impl Settings {
    pub fn with_folder(folder_path: PathBuf) -> Self {
        Self { folder_path, ..Self::default() }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            folder_path: crate::config::LibraryConfig::default().default_folder(),
            remember_category: true,
            lang: "en".to_string(),
            image_quality: 75,
            image_width: 1920,
            image_height: 1080,
        }
    }
}

/// A partial update. Fields that are absent keep their current value;
/// fields the document does not know are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsUpdate {
    pub folder_path: Option<String>,
    pub remember_category: Option<bool>,
    pub lang: Option<String>,
    pub image_quality: Option<u8>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
    #[error("folder path is not an accessible directory: {0}")]
    InvalidFolder(PathBuf),
}

impl SettingsError {
    fn io(path: &Path, source: io::Error) -> Self {
        SettingsError::Io { path: path.to_path_buf(), source }
    }
}

impl From<SettingsError> for AppError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::InvalidFolder(path) => {
                tracing::warn!("Rejected folder path {}", path.display());
                AppError::InvalidPath("Invalid folder path or permission denied".into())
            }
            SettingsError::Invalid { field, message } => {
                AppError::ValidationError { field: field.to_string(), message }
            }
            SettingsError::Io { source, .. } => AppError::operation("Error saving settings", source),
            SettingsError::Serialize(e) => AppError::Internal(e.into()),
        }
    }
}

/// Loads, validates and persists [`Settings`].
///
/// Reads come from memory. Writers are serialized so two updates cannot
/// interleave their file writes.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
    writer: Mutex<()>,
}

impl SettingsStore {
    /// Opens the document at `path`, writing defaults when it does not exist
    /// yet. The library root and its `temp` directory are created.
    pub async fn open(path: PathBuf, default_folder: PathBuf) -> Result<Self, SettingsError> {
        let settings = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Settings>(&bytes) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Unreadable settings file {}, using defaults: {}", path.display(), e);
                    Settings::with_folder(default_folder)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let defaults = Settings::with_folder(default_folder);
                write_atomically(&path, &defaults).await?;
                tracing::info!("Settings file created at {}", path.display());
                defaults
            }
            Err(e) => return Err(SettingsError::io(&path, e)),
        };

        ensure_library_dirs(&settings.folder_path).await?;
        tracing::info!("Library root: {}", settings.folder_path.display());

        Ok(Self { path, current: RwLock::new(settings), writer: Mutex::new(()) })
    }

    pub fn get(&self) -> Settings {
        self.current.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn folder_path(&self) -> PathBuf {
        self.current.read().unwrap_or_else(|p| p.into_inner()).folder_path.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `update`, persists the result and returns it. Nothing is
    /// written when validation fails.
    pub async fn update(&self, update: SettingsUpdate) -> Result<Settings, SettingsError> {
        let _writer = self.writer.lock().await;
        let mut next = self.get();

        if let Some(q) = update.image_quality {
            if !(1..=100).contains(&q) {
                return Err(SettingsError::Invalid { field: "imageQuality", message: "must be between 1 and 100".into() });
            }
            next.image_quality = q;
        }
        if let Some(w) = update.image_width {
            if w == 0 {
                return Err(SettingsError::Invalid { field: "imageWidth", message: "must be greater than 0".into() });
            }
            next.image_width = w;
        }
        if let Some(h) = update.image_height {
            if h == 0 {
                return Err(SettingsError::Invalid { field: "imageHeight", message: "must be greater than 0".into() });
            }
            next.image_height = h;
        }
        if let Some(lang) = update.lang {
            let len = lang.trim().chars().count();
            if !(2..=16).contains(&len) {
                return Err(SettingsError::Invalid { field: "lang", message: "must be 2 to 16 characters".into() });
            }
            next.lang = lang.trim().to_string();
        }
        if let Some(remember) = update.remember_category {
            next.remember_category = remember;
        }
        if let Some(folder) = update.folder_path {
            next.folder_path = checked_folder(&folder).await?;
        }

        write_atomically(&self.path, &next).await?;
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = next.clone();
        Ok(next)
    }

    /// Changes only the library root.
    pub async fn set_folder_path(&self, folder: &str) -> Result<PathBuf, SettingsError> {
        let update = SettingsUpdate { folder_path: Some(folder.to_string()), ..SettingsUpdate::default() };
        Ok(self.update(update).await?.folder_path)
    }
}

/// A new root must already exist and be a directory; its `temp` is created.
async fn checked_folder(folder: &str) -> Result<PathBuf, SettingsError> {
    let folder = folder.trim();
    if folder.is_empty() || folder.contains('\0') {
        return Err(SettingsError::InvalidFolder(PathBuf::from(folder)));
    }
    let path = PathBuf::from(folder);
    match tokio::fs::metadata(&path).await {
        Ok(md) if md.is_dir() => {}
        _ => return Err(SettingsError::InvalidFolder(path)),
    }
    tokio::fs::create_dir_all(path.join(TEMP_DIR)).await.map_err(|e| {
        tracing::warn!("Cannot create {} under {}: {}", TEMP_DIR, path.display(), e);
        SettingsError::InvalidFolder(path.clone())
    })?;
    Ok(path)
}

async fn ensure_library_dirs(root: &Path) -> Result<(), SettingsError> {
    let temp = root.join(TEMP_DIR);
    tokio::fs::create_dir_all(&temp).await.map_err(|e| SettingsError::io(&temp, e))
}

// Serialize to a sibling file and rename over the target.
async fn write_atomically(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| SettingsError::io(parent, e))?;
    }
    let json = serde_json::to_vec_pretty(settings)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await.map_err(|e| SettingsError::io(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(SettingsError::io(path, e));
    }
    Ok(())
}
