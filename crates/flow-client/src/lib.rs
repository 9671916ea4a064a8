//! HTTP client for the vendor's capital-flow and quote endpoints.
//!
//! Implements both collaborator seams the scan needs: the per-code flow
//! repository (cache-first, `NoData` distinguished from transient failures)
//! and the batch market snapshot source with its health probe.

pub mod cache;
mod pacer;

pub use cache::MemoryFlowCache;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;

use pacer::RequestPacer;
use scan_core::{
    CapitalFlowRepository, FlowCache, FlowRecord, FlowSeries, HealthStatus, MarketSnap,
    MarketSnapshotSource, ScanError,
};

/// Codes per quote request; the vendor caps the list length.
const QUOTE_BATCH_SIZE: usize = 50;

pub struct FlowApiClient {
    base_url: String,
    client: Client,
    pacer: RequestPacer,
    cache: Arc<dyn FlowCache>,
}

impl FlowApiClient {
    pub fn new(base_url: String) -> Self {
        Self::with_cache(base_url, Arc::new(MemoryFlowCache::new()))
    }

    pub fn with_cache(base_url: String, cache: Arc<dyn FlowCache>) -> Self {
        // Default 120 req/min; quota-limited keys should set FLOW_API_RATE_LIMIT.
        let rate_limit: usize = std::env::var("FLOW_API_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url,
            client,
            pacer: RequestPacer::new(rate_limit, Duration::from_secs(60)),
            cache,
        }
    }

    /// Paced GET with automatic 429 retry.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ScanError> {
        for attempt in 0..3u32 {
            self.pacer.acquire().await;
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ScanError::Upstream(e.to_string()))?;

            if response.status().as_u16() == 429 {
                let wait_secs = 5u64 * (attempt as u64 + 1);
                tracing::warn!(
                    "flow api rate limited, waiting {}s before retry {}/3",
                    wait_secs,
                    attempt + 1
                );
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                continue;
            }
            if !response.status().is_success() {
                return Err(ScanError::Upstream(format!(
                    "flow api returned {}",
                    response.status()
                )));
            }
            return response
                .json::<T>()
                .await
                .map_err(|e| ScanError::InvalidData(format!("flow api payload: {}", e)));
        }
        Err(ScanError::Upstream(
            "flow api rate limited after 3 retries".to_string(),
        ))
    }

    /// Assemble the series from cache alone. Requires a same-day hit, which
    /// short-circuits the remote call entirely.
    fn assemble_cached(
        &self,
        code: &str,
        today: NaiveDate,
        lookback_days: u32,
    ) -> Option<FlowSeries> {
        self.cache.get(code, today)?;

        let mut records = Vec::new();
        for offset in (0..=i64::from(lookback_days)).rev() {
            let date = today - chrono::Duration::days(offset);
            if let Some(record) = self.cache.get(code, date) {
                records.push(record);
            }
        }
        FlowSeries::new(records).ok()
    }
}

#[derive(Debug, Deserialize)]
struct FlowEnvelope {
    data: Option<FlowData>,
}

#[derive(Debug, Deserialize)]
struct FlowData {
    klines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    data: Vec<QuoteRow>,
}

#[derive(Debug, Deserialize)]
struct QuoteRow {
    code: String,
    name: String,
    price: f64,
    prev_close: f64,
    turnover: f64,
    volume: f64,
    avg_volume_5d: Option<f64>,
    float_cap: Option<f64>,
}

impl QuoteRow {
    fn into_snap(self) -> MarketSnap {
        MarketSnap {
            name: self.name,
            last_price: self.price,
            prev_close: self.prev_close,
            turnover: self.turnover,
            volume: self.volume,
            avg_volume_5d: self.avg_volume_5d,
            float_market_cap: self.float_cap,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthPayload {
    connected: bool,
    live_data: bool,
    degraded: bool,
}

/// One kline row: `date,xl_net,l_net,m_net,s_net[,pct_change]`, flow fields
/// in thousand CNY.
fn parse_kline(line: &str) -> Result<FlowRecord, ScanError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 5 {
        return Err(ScanError::InvalidData(format!(
            "flow kline has {} fields: {:?}",
            fields.len(),
            line
        )));
    }

    let date = fields[0]
        .parse::<NaiveDate>()
        .map_err(|e| ScanError::InvalidData(format!("flow kline date {:?}: {}", fields[0], e)))?;
    let number = |index: usize| -> Result<f64, ScanError> {
        fields[index].parse::<f64>().map_err(|e| {
            ScanError::InvalidData(format!("flow kline field {}: {}", index, e))
        })
    };

    Ok(FlowRecord {
        date,
        xl_net: number(1)?,
        l_net: number(2)?,
        m_net: number(3)?,
        s_net: number(4)?,
        pct_change: fields.get(5).and_then(|f| f.parse::<f64>().ok()),
    })
}

#[async_trait]
impl CapitalFlowRepository for FlowApiClient {
    async fn fetch(&self, code: &str, lookback_days: u32) -> Result<FlowSeries, ScanError> {
        let today = Utc::now().date_naive();
        if let Some(series) = self.assemble_cached(code, today, lookback_days) {
            tracing::debug!("flow cache hit for {} ({} sessions)", code, series.len());
            return Ok(series);
        }

        let url = format!(
            "{}/api/flow/daykline?code={}&days={}",
            self.base_url, code, lookback_days
        );
        let envelope: FlowEnvelope = self.get_json(&url).await?;
        let data = envelope
            .data
            .ok_or_else(|| ScanError::NoData(format!("no flow history for {}", code)))?;
        if data.klines.is_empty() {
            return Err(ScanError::NoData(format!("empty flow history for {}", code)));
        }

        let records: Vec<FlowRecord> = data
            .klines
            .iter()
            .map(|line| parse_kline(line))
            .collect::<Result<_, _>>()?;
        for record in &records {
            self.cache.put(code, record.date, record.clone());
        }
        FlowSeries::new(records)
    }
}

#[async_trait]
impl MarketSnapshotSource for FlowApiClient {
    async fn batch_snapshot(
        &self,
        codes: &[String],
    ) -> Result<HashMap<String, MarketSnap>, ScanError> {
        let mut snaps = HashMap::new();
        let mut failed_batches = 0usize;

        for chunk in codes.chunks(QUOTE_BATCH_SIZE) {
            let url = format!("{}/api/quotes?codes={}", self.base_url, chunk.join(","));
            match self.get_json::<QuoteEnvelope>(&url).await {
                Ok(envelope) => {
                    for row in envelope.data {
                        let code = row.code.clone();
                        snaps.insert(code, row.into_snap());
                    }
                }
                Err(e) => {
                    failed_batches += 1;
                    tracing::warn!("quote batch of {} codes failed: {}", chunk.len(), e);
                }
            }
        }

        if snaps.is_empty() && failed_batches > 0 {
            return Err(ScanError::Upstream(format!(
                "all {} quote batches failed",
                failed_batches
            )));
        }
        Ok(snaps)
    }

    async fn health_status(&self) -> HealthStatus {
        let url = format!("{}/api/health", self.base_url);
        match self.get_json::<HealthPayload>(&url).await {
            Ok(payload) => HealthStatus {
                connected: payload.connected,
                live_data: payload.live_data,
                degraded: payload.degraded,
            },
            Err(e) => {
                tracing::warn!("health probe failed: {}", e);
                HealthStatus {
                    connected: false,
                    live_data: false,
                    degraded: true,
                }
            }
        }
    }
}
