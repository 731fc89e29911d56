//! Configuration infrastructure
//!
//! Configuration is layered, lowest precedence first:
//! 1. Built-in defaults (see [`defaults`])
//! 2. An optional config file (JSON or TOML, picked by extension)
//! 3. Environment variables, e.g. `HARVEST__MATCHING__MATCH_THRESHOLD=0.8`
//! 4. Command-line flags, applied by the binary
//!
//! [`ConfigManager`] owns the per-user config file location.

#![allow(clippy::uninlined_format_args)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::infrastructure::site_profiles::SiteProfile;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Run shape: limits, intervals and modes
    pub harvest: HarvestConfig,

    /// Session health supervision
    pub session: SessionConfig,

    /// Politeness and transport settings
    pub network: NetworkConfig,

    /// Candidate matching vocabulary and thresholds
    pub matching: MatchingConfig,

    /// Price plausibility and outlier filtering
    pub pricing: PricingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-site selector overrides keyed by site name
    pub sites: HashMap<String, SiteProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Render pages invisibly (browser-backed sources only)
    pub headless: bool,

    /// Process only the first `test_limit` pending models
    pub test_mode: bool,
    pub test_limit: usize,

    /// Candidates inspected per model, in search-result order
    pub max_candidates_per_model: usize,

    /// Variant pages opened per accepted candidate
    pub max_variants_per_candidate: usize,

    /// Proactively restart the session every N models
    pub session_refresh_interval: usize,

    /// Persist progress every N models
    pub checkpoint_interval: usize,

    /// Word appended to the search phrase when the first search yields nothing
    pub search_hint: String,

    /// Save the HTML of pages that yield no price under `<log dir>/snapshots`
    pub debug_snapshots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for any single page fetch or render wait
    pub page_timeout_secs: u64,

    /// Restart attempts before a session is declared fatal
    pub restart_budget: u32,

    /// Backoff between restart attempts
    pub restart_base_delay_ms: u64,
    pub restart_max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Each session picks one at random; a restart picks another
    pub user_agents: Vec<String>,

    /// Optional proxy pool (`http://host:port`), rotated like user agents
    pub proxies: Vec<String>,

    /// Hard request rate limit
    pub max_requests_per_second: u32,

    /// Base delay before each request; jitter is added on top
    pub request_delay_ms: u64,
    pub request_jitter_ms: u64,

    /// Retries for transient (non-session) fetch failures
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum share of query tokens found in a title (inclusive)
    pub match_threshold: f64,

    /// Reject titles carrying a variant keyword the query does not contain
    pub reject_unrequested_variants: bool,

    /// Tokens allowed right after a strict-prefix match
    pub allowed_qualifiers: Vec<String>,

    /// Tokens that turn a model into a different sub-variant
    pub variant_keywords: Vec<String>,

    /// Words removed before token-overlap scoring
    pub noise_words: Vec<String>,

    pub accessory_keywords: Vec<String>,
    pub category_keywords: Vec<String>,
    pub foreign_category_keywords: Vec<String>,
}

/// Inclusive plausible selling-price band, in the market's base unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBounds {
    pub min: u64,
    pub max: u64,
}

impl PriceBounds {
    pub const fn contains(&self, value: u64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub price_bounds: PriceBounds,

    /// Reference price may be at most this many times the selling price
    pub mrp_multiplier_cap: f64,

    /// Outlier pass runs while max > factor × min
    pub outlier_spread_factor: f64,

    /// Values below median / divisor are dropped
    pub outlier_median_divisor: f64,

    /// Never filter below this many prices
    pub outlier_min_retained: usize,

    /// Price texts longer than this are ignored
    pub max_price_text_len: usize,

    /// Words marking a text as promotional rather than a price
    pub promo_keywords: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` next to the executable
    pub directory: Option<PathBuf>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Offset from UTC for log timestamps, in minutes
    pub utc_offset_minutes: i32,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            headless: defaults::HEADLESS,
            test_mode: false,
            test_limit: defaults::TEST_LIMIT,
            max_candidates_per_model: defaults::MAX_CANDIDATES_PER_MODEL,
            max_variants_per_candidate: defaults::MAX_VARIANTS_PER_CANDIDATE,
            session_refresh_interval: defaults::SESSION_REFRESH_INTERVAL,
            checkpoint_interval: defaults::CHECKPOINT_INTERVAL,
            search_hint: defaults::SEARCH_HINT.to_string(),
            debug_snapshots: defaults::DEBUG_SNAPSHOTS,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: defaults::PAGE_TIMEOUT_SECS,
            restart_budget: defaults::RESTART_BUDGET,
            restart_base_delay_ms: defaults::RESTART_BASE_DELAY_MS,
            restart_max_delay_ms: defaults::RESTART_MAX_DELAY_MS,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agents: defaults::USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            proxies: Vec::new(),
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            request_delay_ms: defaults::REQUEST_DELAY_MS,
            request_jitter_ms: defaults::REQUEST_JITTER_MS,
            max_retries: defaults::MAX_RETRIES,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            match_threshold: defaults::MATCH_THRESHOLD,
            reject_unrequested_variants: true,
            allowed_qualifiers: words(defaults::ALLOWED_QUALIFIERS),
            variant_keywords: words(defaults::VARIANT_KEYWORDS),
            noise_words: words(defaults::NOISE_WORDS),
            accessory_keywords: words(defaults::ACCESSORY_KEYWORDS),
            category_keywords: words(defaults::CATEGORY_KEYWORDS),
            foreign_category_keywords: words(defaults::FOREIGN_CATEGORY_KEYWORDS),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            price_bounds: PriceBounds {
                min: defaults::PRICE_MIN,
                max: defaults::PRICE_MAX,
            },
            mrp_multiplier_cap: defaults::MRP_MULTIPLIER_CAP,
            outlier_spread_factor: defaults::OUTLIER_SPREAD_FACTOR,
            outlier_median_divisor: defaults::OUTLIER_MEDIAN_DIVISOR,
            outlier_min_retained: defaults::OUTLIER_MIN_RETAINED,
            max_price_text_len: defaults::MAX_PRICE_TEXT_LEN,
            promo_keywords: words(defaults::PROMO_KEYWORDS),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            directory: None,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: true,
            utc_offset_minutes: defaults::LOG_UTC_OFFSET_MINUTES,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters.insert("selectors".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| (*w).to_string()).collect()
}

impl AppConfig {
    /// Build the layered configuration: defaults, optional file, environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&Self::default())
                .context("Failed to serialize default configuration")?,
        );

        if let Some(path) = path {
            if !path.exists() {
                bail!("Configuration file not found: {}", path.display());
            }
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration sources")?;

        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent values before a run starts.
    pub fn validate(&self) -> Result<()> {
        let bounds = self.pricing.price_bounds;
        if bounds.min >= bounds.max {
            bail!("price_bounds.min ({}) must be below price_bounds.max ({})", bounds.min, bounds.max);
        }
        if !(self.matching.match_threshold > 0.0 && self.matching.match_threshold <= 1.0) {
            bail!("match_threshold must be in (0, 1], got {}", self.matching.match_threshold);
        }
        if self.pricing.mrp_multiplier_cap <= 1.0 {
            bail!("mrp_multiplier_cap must be greater than 1, got {}", self.pricing.mrp_multiplier_cap);
        }
        if self.pricing.outlier_spread_factor <= 1.0 || self.pricing.outlier_median_divisor <= 1.0 {
            bail!("outlier factors must be greater than 1");
        }
        if self.pricing.outlier_min_retained < 1 {
            bail!("outlier_min_retained must be at least 1");
        }
        if self.harvest.checkpoint_interval == 0 || self.harvest.session_refresh_interval == 0 {
            bail!("checkpoint_interval and session_refresh_interval must be non-zero");
        }
        if self.harvest.max_candidates_per_model == 0 {
            bail!("max_candidates_per_model must be non-zero");
        }
        if self.network.max_requests_per_second == 0 {
            bail!("max_requests_per_second must be non-zero");
        }
        if self.session.page_timeout_secs == 0 {
            bail!("page_timeout_secs must be non-zero");
        }
        if self.network.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            bail!("user_agents must contain at least one entry");
        }
        for proxy in &self.network.proxies {
            if url::Url::parse(proxy).is_err() {
                bail!("invalid proxy URL '{}'", proxy);
            }
        }
        Ok(())
    }
}

/// Per-user configuration file management
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Configuration manager for the per-user config file
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    /// Configuration manager for an explicit path
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into() }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the default configuration unless a file already exists.
    ///
    /// Returns `true` when a new file was written.
    pub async fn initialize_default(&self) -> Result<bool> {
        if self.config_path.exists() {
            info!("Configuration already present at {:?}", self.config_path);
            return Ok(false);
        }
        self.save_config(&AppConfig::default()).await?;
        info!("🎉 Wrote default configuration to {:?}", self.config_path);
        Ok(true)
    }

    /// Save configuration as pretty JSON
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(dir) = self.config_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create config directory {:?}", dir))?;
                info!("✅ Created configuration directory: {:?}", dir);
            }
        }

        let content = serde_json::to_string_pretty(config)
            .context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("Failed to write configuration file {:?}", self.config_path))?;
        Ok(())
    }

    /// Load the managed file through the layered loader.
    pub fn load_config(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            AppConfig::load(Some(&self.config_path))
        } else {
            AppConfig::load(None)
        }
    }
}

/// Default values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "price-harvester";
    pub const CONFIG_FILE_NAME: &str = "harvester_config.json";
    pub const ENV_PREFIX: &str = "HARVEST";

    pub const HEADLESS: bool = true;
    /// Models processed in test mode
    pub const TEST_LIMIT: usize = 5;
    pub const MAX_CANDIDATES_PER_MODEL: usize = 8;
    pub const MAX_VARIANTS_PER_CANDIDATE: usize = 5;
    pub const SESSION_REFRESH_INTERVAL: usize = 80;
    pub const CHECKPOINT_INTERVAL: usize = 100;
    pub const SEARCH_HINT: &str = "mobile";
    pub const DEBUG_SNAPSHOTS: bool = true;

    pub const PAGE_TIMEOUT_SECS: u64 = 20;
    pub const RESTART_BUDGET: u32 = 3;
    pub const RESTART_BASE_DELAY_MS: u64 = 3000;
    pub const RESTART_MAX_DELAY_MS: u64 = 30000;

    pub const USER_AGENTS: &[&str] = &[
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    ];
    pub const MAX_REQUESTS_PER_SECOND: u32 = 1;
    /// Delay between requests; the 2-4 s pacing comes from delay plus jitter
    pub const REQUEST_DELAY_MS: u64 = 2000;
    pub const REQUEST_JITTER_MS: u64 = 2000;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1500;

    pub const MATCH_THRESHOLD: f64 = 0.70;
    pub const ALLOWED_QUALIFIERS: &[&str] = &["5g"];
    pub const VARIANT_KEYWORDS: &[&str] = &[
        "pro", "max", "mini", "plus", "ultra", "lite", "fe", "edge", "note", "fold", "flip",
        "prime", "air", "se", "neo", "master", "edition", "turbo", "racing", "gt", "carbon",
        "explorer", "speed", "youth", "classic",
    ];
    pub const NOISE_WORDS: &[&str] = &[
        "sponsored", "visit", "the", "store", "brand", "new", "original", "genuine", "authentic",
        "official", "latest", "smartphone", "mobile", "phone", "cell", "dual", "sim", "5g", "4g",
        "lte", "volte",
    ];
    pub const ACCESSORY_KEYWORDS: &[&str] = &[
        "cover", "case", "charger", "screen protector", "cable", "earphone", "headphone",
        "tempered glass", "skin", "stand", "bag", "adapter", "power bank", "holder", "mount",
        "pouch", "warranty", "insurance",
    ];
    pub const CATEGORY_KEYWORDS: &[&str] = &["mobile", "phone", "smartphone"];
    pub const FOREIGN_CATEGORY_KEYWORDS: &[&str] = &["laptop", "notebook", "tablet"];

    pub const PRICE_MIN: u64 = 3000;
    pub const PRICE_MAX: u64 = 200_000;
    pub const MRP_MULTIPLIER_CAP: f64 = 3.0;
    pub const OUTLIER_SPREAD_FACTOR: f64 = 3.0;
    pub const OUTLIER_MEDIAN_DIVISOR: f64 = 3.0;
    pub const OUTLIER_MIN_RETAINED: usize = 2;
    pub const MAX_PRICE_TEXT_LEN: usize = 100;
    pub const PROMO_KEYWORDS: &[&str] = &[
        "save", "off", "discount", "cashback", "bank", "emi", "extra", "month", "exchange",
        "coupon", "bonus",
    ];

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_MAX_FILES: u32 = 10;
    /// UTC+05:30
    pub const LOG_UTC_OFFSET_MINUTES: i32 = 330;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.harvest.max_candidates_per_model, 8);
        assert_eq!(config.harvest.max_variants_per_candidate, 5);
        assert_eq!(config.harvest.session_refresh_interval, 80);
        assert_eq!(config.harvest.checkpoint_interval, 100);
        assert_eq!(config.pricing.price_bounds, PriceBounds { min: 3000, max: 200_000 });
        assert!((config.matching.match_threshold - 0.70).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_rejects_inverted_bounds() {
        let mut config = AppConfig::default();
        config.pricing.price_bounds = PriceBounds { min: 5000, max: 4000 };
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.matching.match_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_checks_identity_pools() {
        let mut config = AppConfig::default();
        config.network.user_agents.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.network.proxies = vec!["not a proxy".into()];
        assert!(config.validate().is_err());

        config.network.proxies = vec!["http://10.0.0.2:3128".into()];
        config.validate().unwrap();
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.json");
        std::fs::write(
            &path,
            r#"{ "harvest": { "checkpoint_interval": 25 }, "matching": { "allowed_qualifiers": [] } }"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.harvest.checkpoint_interval, 25);
        assert!(config.matching.allowed_qualifiers.is_empty());
        assert_eq!(config.harvest.max_candidates_per_model, 8);
    }

    #[tokio::test]
    async fn test_config_manager_writes_default_once() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.json"));

        assert!(manager.initialize_default().await.unwrap());
        assert!(!manager.initialize_default().await.unwrap());

        let loaded = manager.load_config().unwrap();
        assert_eq!(loaded.harvest.checkpoint_interval, defaults::CHECKPOINT_INTERVAL);
    }
}
