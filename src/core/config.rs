use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// Largest page the CoinGecko markets endpoint serves.
pub const MAX_PAGE_SIZE: usize = 250;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    #[serde(default = "default_coingecko_url")]
    pub base_url: String,
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
}

impl Default for CoinGeckoProviderConfig {
    fn default() -> Self {
        CoinGeckoProviderConfig {
            base_url: default_coingecko_url(),
            vs_currency: default_vs_currency(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BinanceProviderConfig {
    #[serde(default = "default_binance_url")]
    pub base_url: String,
}

impl Default for BinanceProviderConfig {
    fn default() -> Self {
        BinanceProviderConfig {
            base_url: default_binance_url(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub coingecko: CoinGeckoProviderConfig,
    #[serde(default)]
    pub binance: BinanceProviderConfig,
}

/// Rate limit policy for the upstream providers.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ThrottleConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_coin_delay_ms")]
    pub coin_delay_ms: u64,
}

impl ThrottleConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn coin_delay(&self) -> Duration {
        Duration::from_millis(self.coin_delay_ms)
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        ThrottleConfig {
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
            coin_delay_ms: default_coin_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CsvSinkConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SheetsSinkConfig {
    pub spreadsheet_id: String,
    #[serde(default = "default_sheet_range")]
    pub range: String,
    /// Name of the environment variable holding the OAuth bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_sheets_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SinksConfig {
    pub csv: Option<CsvSinkConfig>,
    pub sheets: Option<SheetsSinkConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_coin_limit")]
    pub coin_limit: usize,
    #[serde(default = "default_history_bars")]
    pub history_bars: usize,
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// CoinGecko id to exchange ticker. Coins missing here are left out of the snapshot.
    #[serde(default)]
    pub symbols: BTreeMap<String, String>,
    #[serde(default)]
    pub sinks: SinksConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            coin_limit: default_coin_limit(),
            history_bars: default_history_bars(),
            ema_period: default_ema_period(),
            quote_asset: default_quote_asset(),
            request_timeout_secs: default_request_timeout_secs(),
            throttle: ThrottleConfig::default(),
            providers: ProvidersConfig::default(),
            symbols: BTreeMap::new(),
            sinks: SinksConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "emasnap", "emasnap")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.coin_limit == 0 {
            bail!("coin_limit must be positive");
        }
        if self.history_bars == 0 {
            bail!("history_bars must be positive");
        }
        if self.ema_period == 0 {
            bail!("ema_period must be positive");
        }
        if self.throttle.page_size == 0 || self.throttle.page_size > MAX_PAGE_SIZE {
            bail!("throttle.page_size must be between 1 and {MAX_PAGE_SIZE}");
        }
        if self.quote_asset.trim().is_empty() {
            bail!("quote_asset must not be empty");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_binance_url() -> String {
    "https://api.binance.com/api/v3".to_string()
}

fn default_sheets_url() -> String {
    "https://sheets.googleapis.com".to_string()
}

fn default_sheet_range() -> String {
    "Sheet1".to_string()
}

fn default_token_env() -> String {
    "GOOGLE_SHEETS_TOKEN".to_string()
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_page_delay_ms() -> u64 {
    1000
}

fn default_coin_delay_ms() -> u64 {
    500
}

fn default_coin_limit() -> usize {
    100
}

fn default_history_bars() -> usize {
    300
}

fn default_ema_period() -> usize {
    200
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}
