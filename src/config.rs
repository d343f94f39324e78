use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where the per-user settings document lives and which folder becomes the
/// library root when no settings exist yet.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LibraryConfig {
    pub settings_path: Option<String>,
    pub default_folder: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StatsConfig {
    pub max_open_dirs: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    pub security: Option<SecurityConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl StatsConfig {
    /// Number of directories the aggregator may hold open at once.
    pub fn effective_max_open_dirs(&self) -> usize {
        self.max_open_dirs.unwrap_or_else(|| (num_cpus::get() * 4).clamp(4, 64))
    }
}

impl LibraryConfig {
    /// `<config_dir>/lockerz/config/config.json` unless overridden.
    pub fn settings_path(&self) -> PathBuf {
        if let Some(p) = self.settings_path.as_deref().filter(|p| !p.trim().is_empty()) {
            return PathBuf::from(p);
        }
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lockerz")
            .join("config")
            .join("config.json")
    }

    /// `<Documents>/LockerZ` unless overridden.
    pub fn default_folder(&self) -> PathBuf {
        if let Some(p) = self.default_folder.as_deref().filter(|p| !p.trim().is_empty()) {
            return PathBuf::from(p);
        }
        dirs::document_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Documents")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("LockerZ")
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: lockerz.toml (in CWD)
        .add_source(::config::File::with_name("lockerz").required(false));

    if let Ok(custom_path) = std::env::var("LOCKERZ_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("LOCKERZ").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Cache
    if cfg.cache.ttl_secs == 0 {
        return Err(anyhow::anyhow!("cache.ttl_secs must be > 0"));
    }
    if cfg.cache.capacity == 0 {
        return Err(anyhow::anyhow!("cache.capacity must be > 0"));
    }

    // Stats
    if let Some(n) = cfg.stats.max_open_dirs {
        if n == 0 || n > 256 {
            return Err(anyhow::anyhow!("stats.max_open_dirs must be in 1..=256"));
        }
    }

    Ok(())
}
