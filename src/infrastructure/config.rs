//! Configuration infrastructure
//!
//! Contains configuration loading and management for the crawl-and-enrich
//! pipeline.
//!
//! Configuration is resolved in three layers, later layers winning:
//! 1. Built-in defaults (see [`defaults`])
//! 2. The JSON config file (created with defaults on first run)
//! 3. `SHELF_SCOUT__<SECTION>__<KEY>` environment variables

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::domain::{Locale, RankBonusConfig, SocialPlatform};
use crate::infrastructure::parsing::ParsingConfig;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub discovery: DiscoveryConfig,
    pub fetch: FetchConfig,
    pub generator: GeneratorConfig,
    pub batch: BatchConfig,
    pub social: SocialConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub parsing: ParsingConfig,
}

/// The one site being crawled and its listing sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub sources: Vec<SourceConfig>,
    /// Partner tag appended to product links in stored records
    pub affiliate_tag: Option<String>,
}

/// A named listing source with its trust weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Root listing path (relative to `base_url`) or absolute URL
    pub path: String,
    pub weight: f64,
    /// Marker that identifies this source's sub-category navigation links
    pub nav_pattern: String,
    /// First page plus paginated continuations per category
    pub max_pages: u32,
}

impl SourceConfig {
    #[must_use]
    pub fn root_url(&self, base_url: &str) -> String {
        if self.path.starts_with("http://") || self.path.starts_with("https://") {
            self.path.clone()
        } else {
            format!("{}{}", base_url.trim_end_matches('/'), self.path)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Stop crawling once this many unique candidates are known
    pub target_count: usize,
    pub max_categories_per_source: usize,
    pub shuffle_categories: bool,
    pub rank_bonus: RankBonusConfig,
    /// Cooldown before the next request on a source after a rate-limited page
    pub rate_limit_cooldown_min_ms: u64,
    pub rate_limit_cooldown_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub max_requests_per_second: u32,
    /// Randomized delay before a first attempt
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Randomized delay before a retry
    pub retry_min_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Exponential backoff after transient failures
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Wait after a 429/503 answer
    pub rate_limited_min_ms: u64,
    pub rate_limited_max_ms: u64,
    pub user_agents: Vec<String>,
    pub accept_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub top_p: f32,
    pub locales: Vec<Locale>,
    pub max_title_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Ledger checkpoint interval, in processed candidates
    pub batch_size: usize,
    pub priority_threshold: f64,
    pub max_workers: usize,
    /// Pacing delay before each candidate
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Consecutive rate-limited fetches that abort the run; 0 disables
    pub abort_after_rate_limited: u32,
    pub existence_check_chunk: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub platforms: Vec<SocialPlatform>,
    pub max_images: usize,
    pub max_products: usize,
    pub priority_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
    pub candidates_csv: String,
    pub candidates_json: String,
    pub ledger_file: String,
    pub social_ledger_file: String,
    pub bundle_dir: String,
    pub social_dir: String,
    /// Empty means `<data_dir>/shelf_scout.db`
    pub database_url: String,
}

impl OutputConfig {
    #[must_use]
    pub fn candidates_csv_path(&self) -> PathBuf {
        self.data_dir.join(&self.candidates_csv)
    }

    #[must_use]
    pub fn candidates_json_path(&self) -> PathBuf {
        self.data_dir.join(&self.candidates_json)
    }

    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }

    #[must_use]
    pub fn social_ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.social_ledger_file)
    }

    #[must_use]
    pub fn bundle_path(&self) -> PathBuf {
        self.data_dir.join(&self.bundle_dir)
    }

    #[must_use]
    pub fn social_path(&self) -> PathBuf {
        self.data_dir.join(&self.social_dir)
    }

    #[must_use]
    pub fn resolved_database_url(&self) -> String {
        if self.database_url.is_empty() {
            format!("sqlite://{}", self.data_dir.join(defaults::DATABASE_FILE).display())
        } else {
            self.database_url.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,
    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,
    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let source = |name: &str, path: &str, weight: f64, nav: &str| SourceConfig {
            name: name.to_string(),
            path: path.to_string(),
            weight,
            nav_pattern: nav.to_string(),
            max_pages: defaults::MAX_PAGES_PER_CATEGORY,
        };

        Self {
            base_url: defaults::BASE_URL.to_string(),
            sources: vec![
                source("bestsellers", "/gp/bestsellers", 100.0, "zg_bs_nav"),
                source("movers_shakers", "/gp/movers-and-shakers", 90.0, "zg_bsms_nav"),
                source("most_wished_for", "/gp/most-wished-for", 85.0, "zg_mw_nav"),
                source("gift_ideas", "/gp/most-gifted", 75.0, "zg_mg_nav"),
                source("new_releases", "/gp/new-releases", 70.0, "zg_bsnr_nav"),
            ],
            affiliate_tag: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target_count: defaults::TARGET_COUNT,
            max_categories_per_source: defaults::MAX_CATEGORIES_PER_SOURCE,
            shuffle_categories: true,
            rank_bonus: RankBonusConfig::default(),
            rate_limit_cooldown_min_ms: 10_000,
            rate_limit_cooldown_max_ms: 20_000,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_attempts: defaults::RETRY_ATTEMPTS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            min_delay_ms: 1_500,
            max_delay_ms: 4_000,
            retry_min_delay_ms: 3_000,
            retry_max_delay_ms: 6_000,
            backoff_base_ms: 5_000,
            backoff_max_ms: 20_000,
            rate_limited_min_ms: 10_000,
            rate_limited_max_ms: 20_000,
            user_agents: defaults::USER_AGENTS.iter().map(ToString::to_string).collect(),
            accept_language: "en-US,en;q=0.9,ar;q=0.8".to_string(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::GENERATOR_ENDPOINT.to_string(),
            model: defaults::GENERATOR_MODEL.to_string(),
            timeout_seconds: defaults::GENERATOR_TIMEOUT_SECONDS,
            temperature: 0.7,
            top_p: 0.9,
            locales: vec![Locale::En, Locale::Ar],
            max_title_chars: 200,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            priority_threshold: defaults::PRIORITY_THRESHOLD,
            max_workers: 1,
            min_delay_ms: 3_000,
            max_delay_ms: 6_000,
            abort_after_rate_limited: 5,
            existence_check_chunk: 100,
        }
    }
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            platforms: SocialPlatform::ALL.to_vec(),
            max_images: 5,
            max_products: 50,
            priority_threshold: defaults::PRIORITY_THRESHOLD,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: ConfigManager::get_app_data_dir().unwrap_or_else(|_| PathBuf::from("data")),
            candidates_csv: "product_links.csv".to_string(),
            candidates_json: "product_links.json".to_string(),
            ledger_file: "batch_progress.json".to_string(),
            social_ledger_file: "social_progress.json".to_string(),
            bundle_dir: "products".to_string(),
            social_dir: "social_content".to_string(),
            database_url: String::new(),
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
            log_dir: None,
            max_files: defaults::LOG_MAX_FILES,
            module_filters: HashMap::from([
                ("sqlx".to_string(), "warn".to_string()),
                ("reqwest".to_string(), "info".to_string()),
                ("hyper".to_string(), "warn".to_string()),
                ("html5ever".to_string(), "warn".to_string()),
                ("selectors".to_string(), "warn".to_string()),
            ]),
        }
    }
}

/// Loads and saves [`AppConfig`]
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(defaults::APP_DIR);

        Ok(data_dir)
    }

    /// Configuration manager for the default per-user config file
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE);
        Ok(Self { config_path })
    }

    #[must_use]
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration, creating the default file if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if fs::try_exists(&self.config_path).await.unwrap_or(false) {
            let content = fs::read_to_string(&self.config_path)
                .await
                .context("Failed to read configuration file")?;

            if let Err(parse_error) = serde_json::from_str::<serde_json::Value>(&content) {
                warn!("⚠️  Configuration file is not valid JSON: {}", parse_error);
                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }
                self.save_config(&AppConfig::default())
                    .await
                    .context("Failed to save default configuration")?;
                info!("✅ Reset to default configuration");
            }
        } else {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            self.save_config(&AppConfig::default()).await?;
        }

        let config = Self::layered(&self.config_path)?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Defaults, then the JSON file, then environment overrides
    fn layered(path: &Path) -> Result<AppConfig> {
        let defaults = config::Config::try_from(&AppConfig::default())
            .context("Failed to build default configuration layer")?;

        config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(path).format(config::FileFormat::Json).required(false))
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration layers")?
            .try_deserialize::<AppConfig>()
            .context("Failed to deserialize configuration")
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {:?}", self.config_path);
        Ok(())
    }
}

pub mod defaults {
    pub const APP_DIR: &str = "shelf-scout";
    pub const CONFIG_FILE: &str = "config.json";
    pub const DATABASE_FILE: &str = "shelf_scout.db";
    pub const ENV_PREFIX: &str = "SHELF_SCOUT";

    pub const BASE_URL: &str = "https://www.amazon.ae";

    /// Unique candidates after which discovery stops
    pub const TARGET_COUNT: usize = 2000;

    /// First page plus two continuations
    pub const MAX_PAGES_PER_CATEGORY: u32 = 3;

    pub const MAX_CATEGORIES_PER_SOURCE: usize = 25;

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const RETRY_ATTEMPTS: u32 = 3;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 1;

    pub const GENERATOR_ENDPOINT: &str = "http://localhost:11434/api/generate";
    pub const GENERATOR_MODEL: &str = "devstral-small-2:24b";
    pub const GENERATOR_TIMEOUT_SECONDS: u64 = 300;

    pub const BATCH_SIZE: usize = 50;
    pub const PRIORITY_THRESHOLD: f64 = 100.0;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_MAX_FILES: u32 = 7;

    pub const USER_AGENTS: [&str; 5] = [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_sources_are_weighted() {
        let site = SiteConfig::default();
        assert_eq!(site.sources.len(), 5);
        assert_eq!(site.sources[0].name, "bestsellers");
        assert!(site.sources.windows(2).all(|w| w[0].weight >= w[1].weight));
        assert_eq!(
            site.sources[0].root_url(&site.base_url),
            "https://www.amazon.ae/gp/bestsellers"
        );
    }

    #[test]
    fn test_database_url_defaults_under_data_dir() {
        let output = OutputConfig {
            data_dir: PathBuf::from("/tmp/scout"),
            ..OutputConfig::default()
        };
        assert_eq!(output.resolved_database_url(), "sqlite:///tmp/scout/shelf_scout.db");
        assert_eq!(output.ledger_path(), PathBuf::from("/tmp/scout/batch_progress.json"));
    }

    #[tokio::test]
    async fn test_first_load_writes_default_file() -> Result<()> {
        let dir = tempdir()?;
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        let config = manager.load_config().await?;
        assert!(manager.config_path().exists());
        assert_eq!(config.batch.batch_size, defaults::BATCH_SIZE);
        assert_eq!(config.generator.locales, vec![Locale::En, Locale::Ar]);
        Ok(())
    }

    #[tokio::test]
    async fn test_file_values_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"batch": {"batch_size": 7, "max_workers": 3}}"#).await?;

        let config = ConfigManager::with_path(&path).load_config().await?;
        assert_eq!(config.batch.batch_size, 7);
        assert_eq!(config.batch.max_workers, 3);
        assert!((config.batch.priority_threshold - defaults::PRIORITY_THRESHOLD).abs() < f64::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_file_is_backed_up_and_reset() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await?;

        let config = ConfigManager::with_path(&path).load_config().await?;
        assert_eq!(config.batch.batch_size, defaults::BATCH_SIZE);
        assert!(dir.path().join("config.json.corrupted").exists());
        Ok(())
    }
}
