//! Configuration for the context curation service
//!
//! A single [`Config`] value is loaded once at process start (optional TOML
//! file, then `CURATOR__SECTION__KEY` environment overrides) and passed into
//! every component constructor.

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{ContextError, Result};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CURATOR";

/// Root configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub documentation: DocumentationConfig,
}

impl Config {
    /// Load from an optional file plus environment overrides
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<()> {
        unit_interval("analysis.relevance_threshold", self.analysis.relevance_threshold)?;
        unit_interval("detection.confidence_threshold", self.detection.confidence_threshold)?;
        unit_interval("detection.min_evidence_confidence", self.detection.min_evidence_confidence)?;
        unit_interval("rules.domain_relevance_threshold", self.rules.domain_relevance_threshold)?;

        if self.analysis.max_prompt_length == 0 {
            return Err(ContextError::Configuration(
                "analysis.max_prompt_length must be positive".to_string(),
            ));
        }

        let methods = &self.detection.methods;
        for (name, method) in [
            ("file_pattern", &methods.file_pattern),
            ("directory", &methods.directory),
            ("dependency", &methods.dependency),
            ("config_file", &methods.config_file),
        ] {
            if !method.weight.is_finite() || method.weight < 0.0 {
                return Err(ContextError::Configuration(format!(
                    "detection.methods.{}.weight must be a non-negative number",
                    name
                )));
            }
        }
        if !methods.any_active() {
            return Err(ContextError::Configuration(
                "at least one detection method must be enabled with a positive weight".to_string(),
            ));
        }

        if !crate::rules::is_text_rule_location(&self.rules.target_file) {
            return Err(ContextError::Configuration(format!(
                "rules.target_file must be a known plain-text rule file, got {}",
                self.rules.target_file
            )));
        }

        if self.documentation.enabled && self.documentation.endpoint.trim().is_empty() {
            return Err(ContextError::Configuration(
                "documentation.endpoint is required when documentation is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ContextError::Configuration(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whole-request timeout; the only cancellation mechanism for an analysis
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8081 }
fn default_request_timeout_ms() -> u64 { 15_000 }
fn default_max_body_bytes() -> usize { 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Prompt analysis and relevance gate
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Below this relevance the pipeline returns the fixed "not relevant" response
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    #[serde(default = "default_max_prompt_length")]
    pub max_prompt_length: usize,
}

fn default_relevance_threshold() -> f64 { 0.3 }
fn default_max_prompt_length() -> usize { 10_000 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_relevance_threshold(),
            max_prompt_length: default_max_prompt_length(),
        }
    }
}

/// Enablement and weight of one detection method
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MethodConfig {
    #[serde(default = "default_method_enabled")]
    pub enabled: bool,
    pub weight: f64,
}

fn default_method_enabled() -> bool { true }

impl MethodConfig {
    pub fn new(weight: f64) -> Self {
        Self { enabled: true, weight }
    }

    /// Enabled with a positive weight
    pub fn is_active(&self) -> bool {
        self.enabled && self.weight > 0.0
    }
}

/// Per-method detection settings, in registration order
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionMethods {
    #[serde(default = "default_file_pattern")]
    pub file_pattern: MethodConfig,
    #[serde(default = "default_directory")]
    pub directory: MethodConfig,
    #[serde(default = "default_dependency")]
    pub dependency: MethodConfig,
    #[serde(default = "default_config_file")]
    pub config_file: MethodConfig,
}

fn default_file_pattern() -> MethodConfig { MethodConfig::new(0.25) }
fn default_directory() -> MethodConfig { MethodConfig::new(0.20) }
fn default_dependency() -> MethodConfig { MethodConfig::new(0.35) }
fn default_config_file() -> MethodConfig { MethodConfig::new(0.20) }

impl Default for DetectionMethods {
    fn default() -> Self {
        Self {
            file_pattern: default_file_pattern(),
            directory: default_directory(),
            dependency: default_dependency(),
            config_file: default_config_file(),
        }
    }
}

impl DetectionMethods {
    pub fn any_active(&self) -> bool {
        [self.file_pattern, self.directory, self.dependency, self.config_file]
            .iter()
            .any(MethodConfig::is_active)
    }
}

/// Product detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Products scoring below this are reported but flagged low-confidence
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Evidence below this is discarded before scoring
    #[serde(default = "default_min_evidence_confidence")]
    pub min_evidence_confidence: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_detection_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_detection_cache_entries")]
    pub cache_max_entries: usize,
    #[serde(default)]
    pub methods: DetectionMethods,
}

fn default_confidence_threshold() -> f64 { 0.7 }
fn default_min_evidence_confidence() -> f64 { 0.3 }
fn default_max_depth() -> usize { 6 }
fn default_max_files() -> usize { 5_000 }
fn default_detection_cache_ttl() -> u64 { 300 }
fn default_detection_cache_entries() -> usize { 256 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            min_evidence_confidence: default_min_evidence_confidence(),
            max_depth: default_max_depth(),
            max_files: default_max_files(),
            cache_ttl_secs: default_detection_cache_ttl(),
            cache_max_entries: default_detection_cache_entries(),
            methods: DetectionMethods::default(),
        }
    }
}

impl DetectionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Rule intelligence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    /// Below this aggregate relevance, suggest adding domain guidance
    #[serde(default = "default_domain_relevance_threshold")]
    pub domain_relevance_threshold: f64,
    /// Rule file the merged proposal targets
    #[serde(default = "default_target_file")]
    pub target_file: String,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_domain_relevance_threshold() -> f64 { 0.3 }
fn default_target_file() -> String { ".cursorrules".to_string() }
fn default_max_file_bytes() -> u64 { 256 * 1024 }

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            domain_relevance_threshold: default_domain_relevance_threshold(),
            target_file: default_target_file(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Documentation provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_doc_endpoint")]
    pub endpoint: String,
    /// Bearer token for the documentation service
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_doc_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_doc_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_doc_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_breaker_failures")]
    pub circuit_breaker_failures: usize,
    #[serde(default = "default_breaker_reset")]
    pub circuit_breaker_reset_secs: u64,
}

fn default_doc_endpoint() -> String { "http://localhost:8090".to_string() }
fn default_doc_timeout_ms() -> u64 { 5_000 }
fn default_doc_retry_attempts() -> usize { 2 }
fn default_doc_retry_backoff_ms() -> u64 { 200 }
fn default_breaker_failures() -> usize { 5 }
fn default_breaker_reset() -> u64 { 30 }

impl Default for DocumentationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_doc_endpoint(),
            api_key: None,
            timeout_ms: default_doc_timeout_ms(),
            retry_attempts: default_doc_retry_attempts(),
            retry_backoff_ms: default_doc_retry_backoff_ms(),
            circuit_breaker_failures: default_breaker_failures(),
            circuit_breaker_reset_secs: default_breaker_reset(),
        }
    }
}

impl DocumentationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_reset_secs)
    }
}
