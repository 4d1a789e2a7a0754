use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the tiercache binary.
#[derive(Debug, Parser)]
#[command(name = "tiercache", version, about = "Tiered read-through cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "TIERCACHE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the administrative HTTP listener.
    Serve(Box<ServeArgs>),
    /// Wipe every configured cache instance once and exit.
    Purge(MaintenanceArgs),
    /// Print per-instance key counts and exit.
    Stats(MaintenanceArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub cache: CacheOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the administrative listener host.
    #[arg(long = "admin-host", value_name = "HOST")]
    pub admin_host: Option<String>,

    /// Override the administrative listener port.
    #[arg(long = "admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MaintenanceArgs {
    #[command(flatten)]
    pub cache: CacheOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Toggle read-through caching globally.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub enabled: Option<bool>,

    /// Override the root directory holding disk-backed instances.
    #[arg(long = "cache-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub base_dir: Option<PathBuf>,

    /// Override the key namespace prefix.
    #[arg(long = "cache-namespace", value_name = "PREFIX")]
    pub namespace: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
