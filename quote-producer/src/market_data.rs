use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use stream_core::PipelineError;

use crate::config::MarketDataConfig;

const API_KEY_HEADER: &str = "x-rapidapi-key";
const API_HOST_HEADER: &str = "x-rapidapi-host";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// --- модели ответа ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuoteResponseEnvelope {
    pub(crate) quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteResponse {
    #[serde(default)]
    pub(crate) result: Vec<RawQuote>,
}

/// Сырой результат по символу; любое поле может отсутствовать.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawQuote {
    pub(crate) symbol: Option<String>,
    pub(crate) short_name: Option<String>,
    pub(crate) regular_market_time: Option<i64>,
    pub(crate) quote_source_name: Option<String>,
    pub(crate) regular_market_price: Option<f64>,
    pub(crate) regular_market_day_low: Option<f64>,
    pub(crate) regular_market_day_high: Option<f64>,
    pub(crate) regular_market_open: Option<f64>,
    pub(crate) regular_market_previous_close: Option<f64>,
    pub(crate) fifty_two_week_low: Option<f64>,
    pub(crate) fifty_two_week_high: Option<f64>,
    /// bid/ask в запись стрима не попадают, только в вывод `fetch`
    pub(crate) bid: Option<f64>,
    pub(crate) ask: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartEnvelope {
    pub(crate) chart: Chart,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Chart {
    #[serde(default)]
    pub(crate) result: Vec<ChartResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResult {
    pub(crate) meta: ChartMeta,
    #[serde(default)]
    pub(crate) timestamp: Vec<i64>,
    pub(crate) indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartMeta {
    pub(crate) symbol: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartIndicators {
    #[serde(default)]
    pub(crate) quote: Vec<ChartQuote>,
}

/// Массивы OHLC; `null` там, где за интервал не было сделок
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChartQuote {
    #[serde(default)]
    pub(crate) low: Vec<Option<f64>>,
    #[serde(default)]
    pub(crate) high: Vec<Option<f64>>,
    #[serde(default)]
    pub(crate) open: Vec<Option<f64>>,
    #[serde(default)]
    pub(crate) close: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ChartInterval {
    #[value(name = "5m")]
    FiveMinutes,
    #[value(name = "15m")]
    FifteenMinutes,
    #[value(name = "1d")]
    Day,
    #[value(name = "1wk")]
    Week,
}

impl ChartInterval {
    pub(crate) fn as_param(self) -> &'static str {
        match self {
            ChartInterval::FiveMinutes => "5m",
            ChartInterval::FifteenMinutes => "15m",
            ChartInterval::Day => "1d",
            ChartInterval::Week => "1wk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ChartRange {
    #[value(name = "1d")]
    Day,
    #[value(name = "5d")]
    FiveDays,
    #[value(name = "3mo")]
    ThreeMonths,
    #[value(name = "6mo")]
    SixMonths,
}

impl ChartRange {
    pub(crate) fn as_param(self) -> &'static str {
        match self {
            ChartRange::Day => "1d",
            ChartRange::FiveDays => "5d",
            ChartRange::ThreeMonths => "3mo",
            ChartRange::SixMonths => "6mo",
        }
    }
}

/// Источник котировок для producer.
pub(crate) trait QuoteSource {
    fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<RawQuote>, PipelineError>;
}

/// HTTP-клиент market-data API. Создаётся один раз в `main`.
pub(crate) struct MarketDataClient {
    http: Client,
    cfg: MarketDataConfig,
}

impl MarketDataClient {
    pub(crate) fn new(cfg: MarketDataConfig) -> Result<Self, PipelineError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::ConfigUnavailable(format!("http client: {e}")))?;
        Ok(Self { http, cfg })
    }

    /// Тот же клиент используется для загрузки списка символов
    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn fetch_chart(
        &self,
        symbol: &str,
        interval: ChartInterval,
        range: ChartRange,
    ) -> Result<ChartEnvelope, PipelineError> {
        let url = self.cfg.chart_url.as_deref().ok_or_else(|| {
            PipelineError::ConfigUnavailable("chart url is not configured".into())
        })?;
        self.get_json(
            url,
            &[
                ("region", self.cfg.region.as_str()),
                ("symbol", symbol),
                ("interval", interval.as_param()),
                ("range", range.as_param()),
            ],
        )
    }

    /// Summary отдаём как есть: структура ответа нам не нужна
    pub(crate) fn fetch_summary(&self, symbols: &[String]) -> Result<serde_json::Value, PipelineError> {
        let url = self.cfg.summary_url.as_deref().ok_or_else(|| {
            PipelineError::ConfigUnavailable("summary url is not configured".into())
        })?;
        let joined = symbols.join(",");
        self.get_json(
            url,
            &[("region", self.cfg.region.as_str()), ("symbols", joined.as_str())],
        )
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T, PipelineError> {
        debug!("GET {url} params={params:?}");

        self.http
            .get(url)
            .header(API_KEY_HEADER, &self.cfg.api_key)
            .header(API_HOST_HEADER, &self.cfg.api_host)
            .query(params)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::FetchFailed(format!("GET {url}: {e}")))?
            .json::<T>()
            .map_err(|e| PipelineError::FetchFailed(format!("decode {url}: {e}")))
    }
}

impl QuoteSource for MarketDataClient {
    fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<RawQuote>, PipelineError> {
        let joined = symbols.join(",");
        let env: QuoteResponseEnvelope = self.get_json(
            &self.cfg.quotes_url,
            &[("region", self.cfg.region.as_str()), ("symbols", joined.as_str())],
        )?;
        Ok(env.quote_response.result)
    }
}
