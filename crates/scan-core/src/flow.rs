//! Daily capital-flow series.
//!
//! All flow values are thousand-CNY. Turnover and market caps elsewhere in
//! the model are plain CNY; the inflow ratio conversion is explicit at the
//! call site.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// One session's net inflow, split by order size tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub date: NaiveDate,
    /// Extra-large order net inflow (thousand CNY)
    pub xl_net: f64,
    /// Large order net inflow
    pub l_net: f64,
    /// Medium order net inflow
    pub m_net: f64,
    /// Small order net inflow
    pub s_net: f64,
    /// Same-session price change percent, when the vendor supplies it
    #[serde(default)]
    pub pct_change: Option<f64>,
}

impl FlowRecord {
    /// Extra-large plus large order net inflow.
    pub fn institutional_net(&self) -> f64 {
        self.xl_net + self.l_net
    }

    /// Medium plus small order net inflow.
    pub fn retail_net(&self) -> f64 {
        self.m_net + self.s_net
    }
}

/// Chronologically ordered flow records, oldest first.
///
/// The constructor enforces strictly increasing dates, so `latest()` is
/// always the max-date session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSeries {
    records: Vec<FlowRecord>,
}

impl FlowSeries {
    pub fn new(records: Vec<FlowRecord>) -> Result<Self, ScanError> {
        if records.is_empty() {
            return Err(ScanError::NoData("empty flow series".to_string()));
        }
        for pair in records.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(ScanError::InvalidData(format!(
                    "flow series dates not strictly increasing: {} then {}",
                    pair[0].date, pair[1].date
                )));
            }
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FlowRecord] {
        &self.records
    }

    /// Most recent session.
    pub fn latest(&self) -> &FlowRecord {
        // Non-empty is a constructor invariant.
        self.records.last().unwrap()
    }

    /// Days between `date` and the latest session. Used as the decay anchor
    /// so replayed runs age patterns identically to live runs.
    pub fn age_days(&self, date: NaiveDate) -> i64 {
        (self.latest().date - date).num_days()
    }

    /// Institutional net summed over the trailing `sessions` sessions,
    /// clamped to the available history.
    pub fn institutional_sum(&self, sessions: usize) -> f64 {
        let start = self.records.len().saturating_sub(sessions);
        self.records[start..]
            .iter()
            .map(|r| r.institutional_net())
            .sum()
    }

    /// Trailing institutional sum, or `None` when fewer than `sessions`
    /// sessions exist. Callers that must not silently shorten the window use
    /// this variant.
    pub fn institutional_sum_exact(&self, sessions: usize) -> Option<f64> {
        if self.records.len() < sessions {
            return None;
        }
        Some(self.institutional_sum(sessions))
    }

    /// Institutional sum over the `sessions` sessions ending at `index`
    /// (inclusive), clamped at the series start.
    pub fn institutional_sum_as_of(&self, index: usize, sessions: usize) -> f64 {
        let end = index + 1;
        let start = end.saturating_sub(sessions);
        self.records[start..end]
            .iter()
            .map(|r| r.institutional_net())
            .sum()
    }

    /// Population standard deviation of institutional net over the trailing
    /// `sessions` sessions. `None` when history is shorter than the window.
    pub fn institutional_volatility(&self, sessions: usize) -> Option<f64> {
        if self.records.len() < sessions || sessions == 0 {
            return None;
        }
        let window = &self.records[self.records.len() - sessions..];
        let mean = window.iter().map(|r| r.institutional_net()).sum::<f64>() / sessions as f64;
        let variance = window
            .iter()
            .map(|r| (r.institutional_net() - mean).powi(2))
            .sum::<f64>()
            / sessions as f64;
        Some(variance.sqrt())
    }

    /// Nearest-rank percentile of daily institutional net over every session
    /// except the latest. `None` when fewer than two sessions exist.
    pub fn institutional_percentile(&self, pct: f64) -> Option<f64> {
        if self.records.len() < 2 {
            return None;
        }
        let mut values: Vec<f64> = self.records[..self.records.len() - 1]
            .iter()
            .map(|r| r.institutional_net())
            .collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rank = ((pct * values.len() as f64).ceil() as usize).clamp(1, values.len());
        Some(values[rank - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(day: u32, inst: f64) -> FlowRecord {
        FlowRecord {
            date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            xl_net: inst / 2.0,
            l_net: inst / 2.0,
            m_net: -inst / 4.0,
            s_net: -inst / 4.0,
            pct_change: None,
        }
    }

    #[test]
    fn rejects_out_of_order_dates() {
        let result = FlowSeries::new(vec![record(5, 100.0), record(5, 200.0)]);
        assert!(matches!(result, Err(ScanError::InvalidData(_))));

        let result = FlowSeries::new(vec![record(6, 100.0), record(5, 200.0)]);
        assert!(matches!(result, Err(ScanError::InvalidData(_))));
    }

    #[test]
    fn rejects_empty_series() {
        assert!(matches!(FlowSeries::new(vec![]), Err(ScanError::NoData(_))));
    }

    #[test]
    fn trailing_sums_clamp_to_history() {
        let series =
            FlowSeries::new(vec![record(1, 100.0), record(2, 200.0), record(3, 300.0)]).unwrap();

        assert_eq!(series.institutional_sum(2), 500.0);
        assert_eq!(series.institutional_sum(10), 600.0);
        assert_eq!(series.institutional_sum_exact(3), Some(600.0));
        assert_eq!(series.institutional_sum_exact(4), None);
    }

    #[test]
    fn sums_as_of_earlier_index() {
        let series =
            FlowSeries::new(vec![record(1, 100.0), record(2, 200.0), record(3, 300.0)]).unwrap();

        assert_eq!(series.institutional_sum_as_of(1, 2), 300.0);
        assert_eq!(series.institutional_sum_as_of(0, 5), 100.0);
    }

    #[test]
    fn volatility_requires_full_window() {
        let series =
            FlowSeries::new(vec![record(1, 100.0), record(2, 100.0), record(3, 100.0)]).unwrap();

        assert_eq!(series.institutional_volatility(3), Some(0.0));
        assert_eq!(series.institutional_volatility(4), None);
    }

    #[test]
    fn percentile_excludes_latest_session() {
        let records: Vec<FlowRecord> = (1..=11).map(|d| record(d, d as f64 * 10.0)).collect();
        let series = FlowSeries::new(records).unwrap();

        // Distribution is 10..=100 over the first ten sessions.
        let p90 = series.institutional_percentile(0.90).unwrap();
        assert_eq!(p90, 90.0);
        assert!(series.latest().institutional_net() > p90);
    }

    #[test]
    fn age_is_anchored_to_latest_session() {
        let series = FlowSeries::new(vec![record(1, 1.0), record(30, 1.0)]).unwrap();
        assert_eq!(series.age_days(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()), 29);
        assert_eq!(series.age_days(series.latest().date), 0);
    }
}
