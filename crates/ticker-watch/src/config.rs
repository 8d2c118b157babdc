use anyhow::{bail, Context, Result};
use social_client::AccountCredentials;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    // Polling accounts and target
    pub accounts: Vec<AccountCredentials>,
    pub target_user_id: String,       // 818071
    pub page_size: usize,             // 20 posts per request

    // Timing
    pub fetch_delay_seconds: u64,     // 60 between requests
    pub sweep_interval_seconds: u64,  // 3600 (hourly expiry sweep)
    pub request_timeout_seconds: u64, // 30
    pub retention_days: i64,          // 3
    pub alert_drain_timeout_seconds: u64, // 30 (wait for in-flight alerts at shutdown)

    // Social API
    pub social_api_base_url: String,
    pub session_dir: Option<PathBuf>,

    // Storage
    pub database_url: String,
    pub seen_ids_file: PathBuf,
}

impl WatchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let accounts = match lookup("ACCOUNTS_JSON").filter(|v| !v.trim().is_empty()) {
            Some(json) => {
                AccountCredentials::parse_list(&json).context("Failed to parse ACCOUNTS_JSON")?
            }
            None => Vec::new(),
        };

        let config = Self {
            accounts,
            target_user_id: get("TARGET_USER_ID", "818071"),
            page_size: get("PAGE_SIZE", "20")
                .parse()
                .context("PAGE_SIZE must be a positive integer")?,

            fetch_delay_seconds: get("FETCH_DELAY", "60")
                .parse()
                .context("FETCH_DELAY must be a whole number of seconds")?,
            sweep_interval_seconds: get("SWEEP_INTERVAL", "3600")
                .parse()
                .context("SWEEP_INTERVAL must be a whole number of seconds")?,
            request_timeout_seconds: get("REQUEST_TIMEOUT", "30")
                .parse()
                .context("REQUEST_TIMEOUT must be a whole number of seconds")?,
            retention_days: get("TICKER_RETENTION_DAYS", "3")
                .parse()
                .context("TICKER_RETENTION_DAYS must be a whole number of days")?,
            alert_drain_timeout_seconds: get("ALERT_DRAIN_TIMEOUT", "30")
                .parse()
                .context("ALERT_DRAIN_TIMEOUT must be a whole number of seconds")?,

            social_api_base_url: lookup("SOCIAL_API_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .context("SOCIAL_API_BASE_URL not set")?,
            session_dir: lookup("SESSION_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),

            database_url: get("DATABASE_URL", "sqlite:tickers.db"),
            seen_ids_file: PathBuf::from(get("SEEN_IDS_FILE", "seen_ids.txt")),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("PAGE_SIZE must be greater than zero");
        }
        if self.sweep_interval_seconds == 0 {
            bail!("SWEEP_INTERVAL must be greater than zero");
        }
        if self.request_timeout_seconds == 0 {
            bail!("REQUEST_TIMEOUT must be greater than zero");
        }
        if self.retention_days <= 0 {
            bail!("TICKER_RETENTION_DAYS must be greater than zero");
        }
        Ok(())
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_secs(self.fetch_delay_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn alert_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.alert_drain_timeout_seconds)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }

    /// Log the non-secret settings.
    pub fn log_summary(&self) {
        tracing::info!("  Accounts configured: {}", self.accounts.len());
        tracing::info!("  Target user: {}", self.target_user_id);
        tracing::info!("  Page size: {}", self.page_size);
        tracing::info!("  Fetch delay: {}s", self.fetch_delay_seconds);
        tracing::info!("  Sweep interval: {}s", self.sweep_interval_seconds);
        tracing::info!("  Ticker retention: {} day(s)", self.retention_days);
        tracing::info!("  Database: {}", self.database_url);
        tracing::info!("  Seen-id ledger: {}", self.seen_ids_file.display());
    }
}
