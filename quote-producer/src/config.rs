use std::time::Duration;

use stream_core::PipelineError;

pub(crate) const DEFAULT_STREAM: &str = "stocks-stream";
pub(crate) const DEFAULT_LOG_SERVER: &str = "127.0.0.1:4567";
pub(crate) const DEFAULT_REGION: &str = "US";

/// Итераций fetch → publish за один вызов `run`
pub(crate) const DEFAULT_ITERATIONS: u32 = 3;
/// Пауза между итерациями
pub(crate) const DEFAULT_PAUSE: Duration = Duration::from_secs(10);

pub(crate) const DEFAULT_MARKET_OPEN: &str = "14:30";
pub(crate) const DEFAULT_MARKET_CLOSE: &str = "21:00";

pub(crate) const DEFAULT_SYNTH_SYMBOLS: &str = "MSFT,AMZN";
pub(crate) const DEFAULT_SYNTH_BATCH: usize = 20;
pub(crate) const DEFAULT_SYNTH_TICK: Duration = Duration::from_millis(250);

pub(crate) const ENV_API_KEY: &str = "MARKET_DATA_API_KEY";
pub(crate) const ENV_API_HOST: &str = "MARKET_DATA_API_HOST";
pub(crate) const ENV_QUOTES_URL: &str = "MARKET_DATA_QUOTES_URL";
pub(crate) const ENV_CHART_URL: &str = "MARKET_DATA_CHART_URL";
pub(crate) const ENV_SUMMARY_URL: &str = "MARKET_DATA_SUMMARY_URL";
pub(crate) const ENV_REGION: &str = "MARKET_DATA_REGION";

/// Доступ к market-data API.
#[derive(Debug, Clone)]
pub(crate) struct MarketDataConfig {
    pub(crate) api_key: String,
    pub(crate) api_host: String,
    pub(crate) region: String,
    pub(crate) quotes_url: String,
    pub(crate) chart_url: Option<String>,
    pub(crate) summary_url: Option<String>,
}

impl MarketDataConfig {
    pub(crate) fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `lookup` подменяется в тестах вместо чтения окружения
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| PipelineError::ConfigUnavailable(format!("{key} is not set")))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_key: required(ENV_API_KEY)?,
            api_host: required(ENV_API_HOST)?,
            region: optional(ENV_REGION).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            quotes_url: required(ENV_QUOTES_URL)?,
            chart_url: optional(ENV_CHART_URL),
            summary_url: optional(ENV_SUMMARY_URL),
        })
    }
}
