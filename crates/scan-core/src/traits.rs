use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::error::ScanError;
use crate::flow::{FlowRecord, FlowSeries};
use crate::types::{HealthStatus, MarketSnap};

/// Supplies the chronologically ordered daily net-inflow series for one
/// code. `NoData` means the code has no flow history; `Upstream` is a
/// transient failure (the retry policy lives behind this trait).
#[async_trait]
pub trait CapitalFlowRepository: Send + Sync {
    async fn fetch(&self, code: &str, lookback_days: u32) -> Result<FlowSeries, ScanError>;
}

/// Per-(code, date) flow cache. Values are a pure function of the key, so
/// concurrent last-write-wins puts are safe.
pub trait FlowCache: Send + Sync {
    fn get(&self, code: &str, date: NaiveDate) -> Option<FlowRecord>;
    fn put(&self, code: &str, date: NaiveDate, record: FlowRecord);
}

/// Batch quote source for the scan universe.
#[async_trait]
pub trait MarketSnapshotSource: Send + Sync {
    async fn batch_snapshot(
        &self,
        codes: &[String],
    ) -> Result<HashMap<String, MarketSnap>, ScanError>;

    /// Gates whether intraday scans may run at all.
    async fn health_status(&self) -> HealthStatus;
}
