use crate::cli::{Cli, OutputFormat};
use crate::error::{ConfigError, ConfigResult as Result};
use crate::http_client::{DEFAULT_BASE_URL, HttpClientConfig};
use crate::model::ValidationKind;
use crate::orchestrator::OrchestratorConfig;
use crate::session::{DispatchMode, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub network: NetworkConfig,
    pub validation: ValidationSettings,
    pub output: OutputConfig,
}

/// Remote validation service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL; endpoints are `{base_url}/dtd`, `/schematron`, `/format`
    pub base_url: String,
    /// Schematron ruleset selector
    pub schematron: Option<String>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
}

/// Validation workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationSettings {
    /// Quiet period after an edit, in milliseconds
    pub debounce_ms: u64,
    /// Kinds validated each cycle, in order
    pub kinds: Vec<ValidationKind>,
    pub dispatch: DispatchMode,
    /// Send loaded files through the `format` endpoint first
    pub format_on_load: bool,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormatConfig,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    Human,
    Json,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            schematron: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            kinds: ValidationKind::ALL.to_vec(),
            dispatch: DispatchMode::Concurrent,
            format_on_load: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormatConfig::Human,
            verbose: false,
            quiet: false,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            config = Self::load_from_file(config_path).await?;
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = found_config;
        }

        config = Self::apply_environment_overrides(config)?;
        config = Self::merge_with_cli(config, cli);
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "jats-validator.toml",
            "jats-validator.json",
            ".jats-validator.toml",
            ".jats-validator.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("jats-validator");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(base_url) = env.get("JATS_VALIDATOR_BASE_URL") {
            config.service.base_url = base_url;
        }

        if let Some(schematron) = env.get("JATS_VALIDATOR_SCHEMATRON") {
            config.service.schematron = Some(schematron).filter(|s| !s.is_empty());
        }

        if let Some(timeout) = env.get("JATS_VALIDATOR_TIMEOUT") {
            config.network.timeout_seconds = parse_env("JATS_VALIDATOR_TIMEOUT", &timeout)?;
        }

        if let Some(debounce) = env.get("JATS_VALIDATOR_DEBOUNCE_MS") {
            config.validation.debounce_ms = parse_env("JATS_VALIDATOR_DEBOUNCE_MS", &debounce)?;
        }

        if let Some(kinds) = env.get("JATS_VALIDATOR_KINDS") {
            config.validation.kinds = kinds
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<ValidationKind>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| {
                    ConfigError::Environment(format!("Invalid JATS_VALIDATOR_KINDS value: {}", e))
                })?;
        }

        if let Some(dispatch) = env.get("JATS_VALIDATOR_DISPATCH") {
            config.validation.dispatch = parse_env("JATS_VALIDATOR_DISPATCH", &dispatch)?;
        }

        if let Some(format_on_load) = env.get("JATS_VALIDATOR_FORMAT_ON_LOAD") {
            config.validation.format_on_load =
                parse_env("JATS_VALIDATOR_FORMAT_ON_LOAD", &format_on_load)?;
        }

        if let Some(verbose) = env.get("JATS_VALIDATOR_VERBOSE") {
            config.output.verbose = parse_env("JATS_VALIDATOR_VERBOSE", &verbose)?;
        }

        if let Some(quiet) = env.get("JATS_VALIDATOR_QUIET") {
            config.output.quiet = parse_env("JATS_VALIDATOR_QUIET", &quiet)?;
        }

        if let Some(format) = env.get("JATS_VALIDATOR_OUTPUT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid JATS_VALIDATOR_OUTPUT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration; only flags actually given override
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(base_url) = &cli.base_url {
            config.service.base_url = base_url.clone();
        }
        if let Some(schematron) = &cli.schematron {
            config.service.schematron = Some(schematron.clone());
        }

        if let Some(timeout) = cli.timeout {
            config.network.timeout_seconds = timeout;
        }

        if let Some(debounce_ms) = cli.debounce_ms {
            config.validation.debounce_ms = debounce_ms;
        }
        if !cli.kinds.is_empty() {
            config.validation.kinds = cli.kinds.clone();
        }
        if let Some(dispatch) = cli.dispatch {
            config.validation.dispatch = dispatch;
        }
        if let Some(format_on_load) = cli.format_on_load() {
            config.validation.format_on_load = format_on_load;
        }

        if let Some(format) = cli.output_format {
            config.output.format = format.into();
        }
        if cli.verbose || cli.debug {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        let url = reqwest::Url::parse(&config.service.base_url).map_err(|e| {
            ConfigError::Validation(format!(
                "Invalid service base URL {}: {}",
                config.service.base_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "Service base URL must use http or https: {}",
                config.service.base_url
            )));
        }

        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        if config.network.timeout_seconds > 600 {
            return Err(ConfigError::Validation(
                "Timeout cannot exceed 600 seconds".to_string(),
            ));
        }

        if config.validation.debounce_ms > 60_000 {
            return Err(ConfigError::Validation(
                "Debounce delay cannot exceed 60000 ms".to_string(),
            ));
        }

        if config.validation.kinds.is_empty() {
            return Err(ConfigError::Validation(
                "At least one validation kind must be specified".to_string(),
            ));
        }
        for (i, kind) in config.validation.kinds.iter().enumerate() {
            if config.validation.kinds[..i].contains(kind) {
                return Err(ConfigError::Validation(format!(
                    "Validation kind listed twice: {}",
                    kind
                )));
            }
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }

    pub fn get_timeout_duration(config: &Config) -> Duration {
        Duration::from_secs(config.network.timeout_seconds)
    }

    pub fn get_debounce_duration(config: &Config) -> Duration {
        Duration::from_millis(config.validation.debounce_ms)
    }

    pub fn http_client_config(config: &Config) -> HttpClientConfig {
        HttpClientConfig {
            base_url: config.service.base_url.clone(),
            timeout_seconds: config.network.timeout_seconds,
            ..Default::default()
        }
    }

    pub fn orchestrator_config(config: &Config) -> OrchestratorConfig {
        OrchestratorConfig {
            debounce: Self::get_debounce_duration(config),
            session: SessionConfig {
                kinds: config.validation.kinds.clone(),
                dispatch: config.validation.dispatch,
                schematron: config.service.schematron.clone(),
            },
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, value)))
}
