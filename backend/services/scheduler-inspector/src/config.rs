use anyhow::Result;
use sequencing_core::constants::{DEFAULT_BATCH_WIDTH, DEFAULT_CLASSIFICATION_WINDOW};
use sequencing_core::validators::{AGAVE_BAM, FRANKENDANCER, HARMONIC, JITO_LABS};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::InspectorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ClickHouse
    pub clickhouse_url: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    pub clickhouse_database: String,

    // Validator metadata upstreams
    pub validators_app_url: String,
    pub validators_app_token: Option<String>,
    pub bam_validators_url: String,
    pub http_timeout_ms: u64,
    pub validator_cache_ttl_secs: u64,

    // HTTP service
    pub port: u16,

    // Classification
    pub batch_width: usize,
    pub classification_window: usize,

    // Transition analytics
    pub transition_cache_ttl_secs: u64,
    pub transition_default_hours: i64,
    pub tracked_accounts: Vec<String>,
    pub tracked_types: Vec<String>,
    pub reference_type: String,

    // Dashboard
    pub dashboard_default_hours: i64,
    pub dashboard_cache_ttl_secs: u64,

    // Prop-AMM win rates
    pub prop_amm_recent_hours: u32,
    pub prop_amm_recent_chunk_slots: u64,
    pub prop_amm_epoch_chunk_slots: u64,
    pub prop_amm_cache_ttl_secs: u64,
    pub prop_amm_max_custom_slots: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the TOML file when it exists, otherwise the environment
    /// (after loading a `.env` file if one is present).
    pub fn resolve(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) if Path::new(path).exists() => Self::load(path),
            _ => {
                dotenv::dotenv().ok();
                Self::from_env()
            }
        }
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        let config = Config {
            clickhouse_url: env::var("CLICKHOUSE_URL").unwrap_or(defaults.clickhouse_url),
            clickhouse_user: env::var("CLICKHOUSE_USER").unwrap_or(defaults.clickhouse_user),
            clickhouse_password: env::var("CLICKHOUSE_PASSWORD").unwrap_or(defaults.clickhouse_password),
            clickhouse_database: env::var("CLICKHOUSE_DATABASE").unwrap_or(defaults.clickhouse_database),

            validators_app_url: env::var("VALIDATORS_APP_URL").unwrap_or(defaults.validators_app_url),
            validators_app_token: env::var("VALIDATORS_APP_TOKEN").ok().filter(|t| !t.is_empty()),
            bam_validators_url: env::var("BAM_VALIDATORS_URL").unwrap_or(defaults.bam_validators_url),
            http_timeout_ms: parse_env("HTTP_TIMEOUT_MS", defaults.http_timeout_ms)?,
            validator_cache_ttl_secs: parse_env("VALIDATOR_CACHE_TTL_SECS", defaults.validator_cache_ttl_secs)?,

            port: parse_env("PORT", defaults.port)?,

            batch_width: parse_env("BATCH_WIDTH", defaults.batch_width)?,
            classification_window: parse_env("CLASSIFICATION_WINDOW", defaults.classification_window)?,

            transition_cache_ttl_secs: parse_env("TRANSITION_CACHE_TTL_SECS", defaults.transition_cache_ttl_secs)?,
            transition_default_hours: parse_env("TRANSITION_DEFAULT_HOURS", defaults.transition_default_hours)?,
            tracked_accounts: env::var("TRACKED_ACCOUNTS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.tracked_accounts),
            tracked_types: env::var("TRACKED_TYPES")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.tracked_types),
            reference_type: env::var("REFERENCE_TYPE").unwrap_or(defaults.reference_type),

            dashboard_default_hours: parse_env("DASHBOARD_DEFAULT_HOURS", defaults.dashboard_default_hours)?,
            dashboard_cache_ttl_secs: parse_env("DASHBOARD_CACHE_TTL_SECS", defaults.dashboard_cache_ttl_secs)?,

            prop_amm_recent_hours: parse_env("PROP_AMM_RECENT_HOURS", defaults.prop_amm_recent_hours)?,
            prop_amm_recent_chunk_slots: parse_env("PROP_AMM_RECENT_CHUNK_SLOTS", defaults.prop_amm_recent_chunk_slots)?,
            prop_amm_epoch_chunk_slots: parse_env("PROP_AMM_EPOCH_CHUNK_SLOTS", defaults.prop_amm_epoch_chunk_slots)?,
            prop_amm_cache_ttl_secs: parse_env("PROP_AMM_CACHE_TTL_SECS", defaults.prop_amm_cache_ttl_secs)?,
            prop_amm_max_custom_slots: parse_env("PROP_AMM_MAX_CUSTOM_SLOTS", defaults.prop_amm_max_custom_slots)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.batch_width == 0 {
            return Err(InspectorError::Config("batch_width must be at least 1".into()));
        }
        if self.classification_window == 0 {
            return Err(InspectorError::Config("classification_window must be at least 1".into()));
        }
        if self.tracked_types.is_empty() {
            return Err(InspectorError::Config("tracked_types must not be empty".into()));
        }
        if self.transition_default_hours <= 0 {
            return Err(InspectorError::Config("transition_default_hours must be positive".into()));
        }
        if self.dashboard_default_hours <= 0 {
            return Err(InspectorError::Config("dashboard_default_hours must be positive".into()));
        }
        if self.prop_amm_recent_chunk_slots == 0 || self.prop_amm_epoch_chunk_slots == 0 {
            return Err(InspectorError::Config("prop-AMM chunk sizes must be at least 1".into()));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn validator_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.validator_cache_ttl_secs)
    }

    pub fn transition_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.transition_cache_ttl_secs)
    }

    pub fn dashboard_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dashboard_cache_ttl_secs)
    }

    pub fn prop_amm_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.prop_amm_cache_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clickhouse_url: "http://localhost:8123".to_string(),
            clickhouse_user: "default".to_string(),
            clickhouse_password: String::new(),
            clickhouse_database: "bam".to_string(),

            validators_app_url: "https://www.validators.app/api/v1/validators/mainnet.json".to_string(),
            validators_app_token: None,
            bam_validators_url: "https://explorer.bam.dev/api/v1/validators".to_string(),
            http_timeout_ms: 15_000,
            validator_cache_ttl_secs: 30 * 60,

            port: 8090,

            batch_width: DEFAULT_BATCH_WIDTH,
            classification_window: DEFAULT_CLASSIFICATION_WINDOW,

            transition_cache_ttl_secs: 10 * 60,
            transition_default_hours: 2,
            tracked_accounts: Vec::new(),
            tracked_types: [AGAVE_BAM, FRANKENDANCER, JITO_LABS, HARMONIC]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reference_type: AGAVE_BAM.to_string(),

            dashboard_default_hours: 6,
            dashboard_cache_ttl_secs: 60,

            prop_amm_recent_hours: 6,
            prop_amm_recent_chunk_slots: 2_000,
            prop_amm_epoch_chunk_slots: 1_000,
            prop_amm_cache_ttl_secs: 5 * 60,
            prop_amm_max_custom_slots: 50_000,
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => Ok(raw.trim().parse()?),
        Err(_) => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
