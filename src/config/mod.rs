//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::config::{DEFAULT_CACHE_DIRECTORY, DEFAULT_MEMORY_LIMIT};
use crate::cache::{CacheBackend, CacheConfig};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "querydeck";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

/// Command-line arguments for the querydeck binary.
#[derive(Debug, Parser)]
#[command(name = "querydeck", version, about = "Concurrent page-load queries with a write-through cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "QUERYDECK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run every query of a page definition and print the resulting states.
    Load(LoadArgs),
    /// Cache maintenance.
    Cache(CacheArgs),
}

#[derive(Debug, Args, Clone)]
pub struct LoadArgs {
    /// Page definition (TOML) listing the queries to run.
    #[arg(value_name = "PAGE", value_hint = ValueHint::FilePath)]
    pub page: PathBuf,

    /// Run fingerprint values; replaces the page's own fingerprint when given.
    #[arg(long = "fingerprint", value_name = "VALUE")]
    pub fingerprint: Vec<String>,

    /// Skip the cache for this load.
    #[arg(long = "no-cache", action = clap::ArgAction::SetTrue)]
    pub no_cache: bool,

    /// Print every intermediate snapshot as a JSON line.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub watch: bool,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Remove every entry from the persistent cache.
    Clear(ClearArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ClearArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the backend base URL request ids are resolved against.
    #[arg(long = "base-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub base_url: Option<String>,

    /// Override the cache backend (memory | fs).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the directory of the filesystem cache.
    #[arg(long = "cache-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,

    /// Override the log level (e.g. info, debug).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendSettings,
    pub cache: CacheConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: Url,
    pub user_agent: String,
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

    builder = builder.add_source(Environment::with_prefix("QUERYDECK").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Load(args) => raw.apply_overrides(&args.overrides),
        Command::Cache(args) => match &args.command {
            CacheCommand::Clear(clear) => raw.apply_overrides(&clear.overrides),
        },
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
    backend: RawBackendSettings,
    cache: RawCacheSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(url) = overrides.base_url.as_ref() {
            self.backend.base_url = Some(url.clone());
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(dir) = overrides.cache_dir.as_ref() {
            self.cache.directory = Some(dir.clone());
        }
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
        Ok(Self {
            backend: build_backend_settings(raw.backend)?,
            cache: build_cache_settings(raw.cache)?,
            logging: build_logging_settings(raw.logging)?,
        })
    }
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let base_url = backend
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_BASE_URL);
    let base_url = Url::parse(base_url)
        .map_err(|err| LoadError::invalid("backend.base_url", format!("failed to parse: {err}")))?;
    if base_url.cannot_be_a_base() {
        return Err(LoadError::invalid(
            "backend.base_url",
            "must be an absolute http(s) URL",
        ));
    }

    let user_agent = backend
        .user_agent
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| crate::infra::http_client::HttpResourceClient::user_agent().to_string());

    Ok(BackendSettings {
        base_url,
        user_agent,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let backend = match cache.backend {
        Some(value) => CacheBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackend::default(),
    };

    let memory_limit = cache.memory_limit.unwrap_or(DEFAULT_MEMORY_LIMIT);
    if memory_limit == 0 {
        return Err(LoadError::invalid(
            "cache.memory_limit",
            "must be greater than zero",
        ));
    }

    let directory = cache
        .directory
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIRECTORY));

    Ok(CacheConfig {
        enabled: cache.enabled.unwrap_or(true),
        backend,
        directory,
        memory_limit,
    })
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

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    base_url: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<String>,
    directory: Option<PathBuf>,
    memory_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.backend.base_url.as_str(), "http://127.0.0.1:3000/");
        assert!(settings.backend.user_agent.starts_with("querydeck/"));
        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.backend, CacheBackend::Fs);
        assert_eq!(settings.cache.directory, PathBuf::from(DEFAULT_CACHE_DIRECTORY));
        assert_eq!(settings.logging.level, LevelFilter::INFO);
        assert!(matches!(settings.logging.format, LogFormat::Compact));
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.backend.base_url = Some("http://file.example".to_string());
        raw.logging.level = Some("info".to_string());

        let overrides = Overrides {
            base_url: Some("http://cli.example:8080".to_string()),
            log_level: Some("debug".to_string()),
            cache_backend: Some("memory".to_string()),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.backend.base_url.as_str(), "http://cli.example:8080/");
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.cache.backend, CacheBackend::Memory);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = Overrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn invalid_values_name_their_key() {
        let mut raw = RawSettings::default();
        raw.cache.backend = Some("redis".to_string());
        let err = Settings::from_raw(raw).expect_err("invalid backend");
        assert!(matches!(err, LoadError::Invalid { key: "cache.backend", .. }));

        let mut raw = RawSettings::default();
        raw.cache.memory_limit = Some(0);
        let err = Settings::from_raw(raw).expect_err("zero limit");
        assert!(matches!(err, LoadError::Invalid { key: "cache.memory_limit", .. }));

        let mut raw = RawSettings::default();
        raw.backend.base_url = Some("mailto:someone@example.org".to_string());
        let err = Settings::from_raw(raw).expect_err("not a base");
        assert!(matches!(err, LoadError::Invalid { key: "backend.base_url", .. }));
    }

    #[test]
    fn config_file_is_layered_under_cli() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config");
        writeln!(
            file,
            "[backend]\nbase_url = \"http://file.example\"\n\n[cache]\nbackend = \"memory\"\nmemory_limit = 8\n"
        )
        .expect("write config");

        let path = file.path().to_string_lossy().into_owned();
        let args = CliArgs::parse_from([
            "querydeck",
            "--config-file",
            path.as_str(),
            "load",
            "page.toml",
            "--base-url",
            "http://cli.example",
        ]);
        let settings = load(&args).expect("settings");

        assert_eq!(settings.backend.base_url.as_str(), "http://cli.example/");
        assert_eq!(settings.cache.backend, CacheBackend::Memory);
        assert_eq!(settings.cache.memory_limit, 8);
    }

    #[test]
    fn parse_load_arguments() {
        let args = CliArgs::parse_from([
            "querydeck",
            "load",
            "pages/gene.toml",
            "--fingerprint",
            "ENSG00000141510",
            "--fingerprint",
            "meta",
            "--no-cache",
            "--watch",
        ]);

        match args.command {
            Command::Load(load) => {
                assert_eq!(load.page, PathBuf::from("pages/gene.toml"));
                assert_eq!(load.fingerprint, vec!["ENSG00000141510", "meta"]);
                assert!(load.no_cache);
                assert!(load.watch);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_cache_clear_arguments() {
        let args = CliArgs::parse_from(["querydeck", "cache", "clear", "--cache-dir", "/tmp/qd"]);
        match args.command {
            Command::Cache(CacheArgs {
                command: CacheCommand::Clear(clear),
            }) => {
                assert_eq!(clear.overrides.cache_dir, Some(PathBuf::from("/tmp/qd")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
