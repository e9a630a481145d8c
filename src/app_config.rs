//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use offline_regions::{OfflineConfig, PausePolicy};

use crate::cli::DownloadArgs;

/// Database file used when neither a flag nor the config file names one.
pub const DEFAULT_DATABASE: &str = "offline-regions.db";

/// `key = value` file configuration for CLI defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    /// Region database path.
    pub database: Option<PathBuf>,
    /// Maximum concurrent fetches.
    pub concurrency: Option<u8>,
    /// Maximum attempts per resource.
    pub max_retries: Option<u8>,
    /// Per-request timeout in seconds.
    pub fetch_timeout_secs: Option<u64>,
    /// Ceiling on stored tiles across all regions.
    pub tile_count_limit: Option<u64>,
    /// Delay between connectivity checks while offline.
    pub offline_poll_interval_ms: Option<u64>,
    pub pause_policy: Option<PausePolicy>,
}

impl FileConfig {
    /// Validates config values against the same ranges as the CLI flags.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(max_retries) = self.max_retries
            && !(1..=10).contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=10");
        }
        if let Some(timeout) = self.fetch_timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `fetch_timeout_secs`: {timeout}. Expected range: 1..=3600");
        }
        if self.offline_poll_interval_ms == Some(0) {
            bail!("Invalid config value for `offline_poll_interval_ms`: 0. Expected a positive value");
        }
        Ok(())
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/offline-regions/config.toml`
/// 2. `$HOME/.config/offline-regions/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("offline-regions")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("offline-regions")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path) if path.exists() => Some(load_file_config(path)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "database" => {
                cfg.database = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "concurrency" => cfg.concurrency = Some(parse_integer_u8(value).with_context(invalid)?),
            "max_retries" => cfg.max_retries = Some(parse_integer_u8(value).with_context(invalid)?),
            "fetch_timeout_secs" => {
                cfg.fetch_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "tile_count_limit" => {
                cfg.tile_count_limit = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "offline_poll_interval_ms" => {
                cfg.offline_poll_interval_ms =
                    Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "pause_policy" => {
                let label = parse_string_literal(value).with_context(invalid)?;
                cfg.pause_policy = Some(parse_pause_policy(&label).with_context(|| {
                    format!("Invalid `pause_policy` value '{label}' on line {line_no}")
                })?);
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let value = parse_integer_u64(raw_value)?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_pause_policy(value: &str) -> Result<PausePolicy> {
    match value {
        "drain" => Ok(PausePolicy::Drain),
        "abort" => Ok(PausePolicy::Abort),
        _ => bail!("Expected one of: drain, abort"),
    }
}

/// Database path with precedence flag > file > default.
#[must_use]
pub fn effective_database(flag: Option<&Path>, file: Option<&FileConfig>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| file.and_then(|cfg| cfg.database.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
}

/// Download tunables with precedence flags > file > library defaults.
#[must_use]
pub fn effective_offline_config(args: &DownloadArgs, file: Option<&FileConfig>) -> OfflineConfig {
    let file = file.cloned().unwrap_or_default();
    let defaults = OfflineConfig::default();
    OfflineConfig {
        max_concurrent_fetches: args
            .concurrency
            .or(file.concurrency)
            .map_or(defaults.max_concurrent_fetches, usize::from),
        fetch_timeout: args
            .timeout
            .or(file.fetch_timeout_secs)
            .map_or(defaults.fetch_timeout, Duration::from_secs),
        max_retry_attempts: args
            .max_retries
            .or(file.max_retries)
            .map_or(defaults.max_retry_attempts, u32::from),
        tile_count_limit: args.tile_limit.or(file.tile_count_limit),
        offline_poll_interval: file
            .offline_poll_interval_ms
            .map_or(defaults.offline_poll_interval, Duration::from_millis),
        pause_policy: file.pause_policy.unwrap_or(defaults.pause_policy),
    }
}
