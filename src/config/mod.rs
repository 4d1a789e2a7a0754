//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::HashSet,
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{StorageMode, validate_sub_dir};

mod cli;

pub use cli::{
    CacheOverrides, CliArgs, Command, LoggingOverrides, MaintenanceArgs, ServeArgs,
    ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tiercache";
const ENV_PREFIX: &str = "TIERCACHE";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_PORT: u16 = 3100;
const DEFAULT_BASE_DIR: &str = ".cache";
const DEFAULT_NAMESPACE: &str = "app";
const DEFAULT_MEMORY_TTL_SECS: u64 = 300;
const DEFAULT_MAX_MEMORY_ENTRIES: usize = 1000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub admin: AdminSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Global read-through switch; purges run regardless.
    pub enabled: bool,
    pub namespace: String,
    /// Root under which every disk-backed instance gets its sub-directory.
    pub base_dir: PathBuf,
    pub instances: Vec<CacheInstanceSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInstanceSettings {
    pub name: String,
    pub storage: StorageMode,
    pub memory_ttl: Option<Duration>,
    pub disk_ttl: Option<Duration>,
    pub cache_dir: Option<String>,
    pub max_memory_entries: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct AdminSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Purge(args)) | Some(Command::Stats(args)) => {
            raw.apply_maintenance_overrides(args)
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    admin: RawAdminSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.admin_host.as_ref() {
            self.admin.host = Some(host.clone());
        }
        if let Some(port) = overrides.admin_port {
            self.admin.port = Some(port);
        }
        self.apply_cache_overrides(&overrides.cache);
        self.apply_logging_overrides(&overrides.logging);
    }

    fn apply_maintenance_overrides(&mut self, args: &MaintenanceArgs) {
        self.apply_cache_overrides(&args.cache);
        self.apply_logging_overrides(&args.logging);
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(enabled) = overrides.enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(dir) = overrides.base_dir.as_ref() {
            self.cache.base_dir = Some(dir.clone());
        }
        if let Some(namespace) = overrides.namespace.as_ref() {
            self.cache.namespace = Some(namespace.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            admin,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let admin = build_admin_settings(admin)?;

        Ok(Self {
            logging,
            cache,
            admin,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let base_dir = cache
        .base_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_DIR));
    if base_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.base_dir",
            "path must not be empty",
        ));
    }

    let namespace = cache
        .namespace
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let raw_instances = cache.instances.unwrap_or_else(default_instances);
    let mut seen = HashSet::new();
    let mut instances = Vec::with_capacity(raw_instances.len());
    for raw in raw_instances {
        let instance = build_instance_settings(raw)?;
        if !seen.insert(instance.name.clone()) {
            return Err(LoadError::invalid(
                "cache.instances.name",
                format!("instance `{}` is declared more than once", instance.name),
            ));
        }
        instances.push(instance);
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        namespace,
        base_dir,
        instances,
    })
}

fn build_instance_settings(raw: RawInstanceSettings) -> Result<CacheInstanceSettings, LoadError> {
    let name = raw
        .name
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("cache.instances.name", "must not be empty"))?;

    let storage = match raw.storage {
        Some(value) => StorageMode::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.instances.storage", reason))?,
        None => StorageMode::Memory,
    };

    let memory_ttl = match raw.memory_ttl_secs {
        Some(secs) => Some(ttl_secs(secs, "cache.instances.memory_ttl_secs")?),
        None => storage
            .uses_memory()
            .then(|| Duration::from_secs(DEFAULT_MEMORY_TTL_SECS)),
    };
    let disk_ttl = raw
        .disk_ttl_secs
        .map(|secs| ttl_secs(secs, "cache.instances.disk_ttl_secs"))
        .transpose()?;

    if let Some(dir) = raw.cache_dir.as_deref() {
        validate_sub_dir(dir)
            .map_err(|err| LoadError::invalid("cache.instances.cache_dir", err.to_string()))?;
    }

    let max_memory_entries = NonZeroUsize::new(
        raw.max_memory_entries
            .unwrap_or(DEFAULT_MAX_MEMORY_ENTRIES),
    )
    .ok_or_else(|| {
        LoadError::invalid(
            "cache.instances.max_memory_entries",
            "must be greater than zero",
        )
    })?;

    Ok(CacheInstanceSettings {
        name,
        storage,
        memory_ttl,
        disk_ttl,
        cache_dir: raw.cache_dir,
        max_memory_entries,
    })
}

fn default_instances() -> Vec<RawInstanceSettings> {
    vec![
        RawInstanceSettings {
            name: Some("tiered".to_string()),
            storage: Some("both".to_string()),
            memory_ttl_secs: Some(300),
            disk_ttl_secs: Some(3600),
            cache_dir: Some("tiered".to_string()),
            max_memory_entries: None,
        },
        RawInstanceSettings {
            name: Some("memory".to_string()),
            storage: Some("memory".to_string()),
            memory_ttl_secs: Some(300),
            ..Default::default()
        },
        RawInstanceSettings {
            name: Some("disk".to_string()),
            storage: Some("disk".to_string()),
            disk_ttl_secs: Some(86_400),
            cache_dir: Some("disk".to_string()),
            ..Default::default()
        },
    ]
}

fn build_admin_settings(admin: RawAdminSettings) -> Result<AdminSettings, LoadError> {
    let host = admin
        .host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());
    let port = admin.port.unwrap_or(DEFAULT_ADMIN_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "admin.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("admin.addr", reason))?;

    Ok(AdminSettings { addr })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    namespace: Option<String>,
    base_dir: Option<PathBuf>,
    instances: Option<Vec<RawInstanceSettings>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawInstanceSettings {
    name: Option<String>,
    storage: Option<String>,
    memory_ttl_secs: Option<u64>,
    disk_ttl_secs: Option<u64>,
    cache_dir: Option<String>,
    max_memory_entries: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAdminSettings {
    host: Option<String>,
    port: Option<u16>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn ttl_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}
