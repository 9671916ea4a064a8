//! Pattern scans and risk-score aggregation.

use scan_core::{FlowSeries, ScanError, Severity, TrapConfig, TrapKind, TrapSignal};

use crate::models::TrapReport;

/// Per-signal count bonus in the aggregated score.
const COUNT_BONUS: f64 = 0.05;

/// Time-decay weight by trigger-day age, anchored to the series' latest
/// session so replays decay identically.
fn decay_weight(age_days: i64) -> f64 {
    match age_days {
        d if d <= 30 => 1.00,
        d if d <= 60 => 0.70,
        _ => 0.30,
    }
}

pub struct TrapDetector {
    config: TrapConfig,
}

impl TrapDetector {
    pub fn new(config: TrapConfig) -> Self {
        Self { config }
    }

    /// Run every pattern scan and aggregate the risk score.
    pub fn detect(&self, series: &FlowSeries) -> Result<TrapReport, ScanError> {
        let mut signals = self.scan_pump_and_dump(series);
        signals.extend(self.scan_hot_money_raid(series));
        signals.extend(self.scan_self_trade(series));

        let risk_score = self.aggregate_risk(series, &signals)?;
        Ok(TrapReport {
            signals,
            risk_score,
        })
    }

    /// Pump-and-dump: a qualifying institutional inflow on day t reversed on
    /// day t+1 while the trailing 5- and 10-session sums as of t+1 stay
    /// non-positive. At most `max_pump_dump_signals` strongest instances are
    /// retained.
    fn scan_pump_and_dump(&self, series: &FlowSeries) -> Vec<TrapSignal> {
        let records = series.records();
        let mut found: Vec<(f64, TrapSignal)> = Vec::new();

        for t in 0..records.len().saturating_sub(1) {
            let inflow = records[t].institutional_net();
            if inflow < self.config.pump_inflow_min {
                continue;
            }
            let next = records[t + 1].institutional_net();
            if next >= 0.0 {
                continue;
            }
            let dump_ratio = next.abs() / inflow;
            if dump_ratio < self.config.dump_ratio_min {
                continue;
            }
            if series.institutional_sum_as_of(t + 1, 5) > 0.0
                || series.institutional_sum_as_of(t + 1, 10) > 0.0
            {
                continue;
            }

            let trigger_date = records[t + 1].date;
            let decay = decay_weight(series.age_days(trigger_date));
            let mut confidence = 0.70 * decay;
            if dump_ratio >= 1.0 {
                confidence += 0.15;
            }
            if Severity::from_magnitude(inflow) == Severity::Critical {
                confidence += 0.05;
            }

            found.push((
                inflow,
                TrapSignal {
                    kind: TrapKind::PumpAndDump,
                    confidence,
                    severity: Severity::from_magnitude(inflow),
                    decay_weight: decay,
                    trigger_date,
                    evidence: format!(
                        "inflow +{:.0}k on {} dumped {:.0}k next session (ratio {:.2})",
                        inflow,
                        records[t].date,
                        next.abs(),
                        dump_ratio
                    ),
                },
            ));
        }

        // Keep the strongest instances, then restore chronological order.
        found.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        found.truncate(self.config.max_pump_dump_signals);
        let mut signals: Vec<TrapSignal> = found.into_iter().map(|(_, s)| s).collect();
        signals.sort_by_key(|s| s.trigger_date);
        signals
    }

    /// Hot-money raid: a sustained outflow across the trailing window filled
    /// back by one strong inflow on the last session. Evaluated once at the
    /// series tail.
    fn scan_hot_money_raid(&self, series: &FlowSeries) -> Option<TrapSignal> {
        let records = series.records();
        if records.len() < 2 {
            return None;
        }

        let window = self.config.raid_window_sessions.min(records.len());
        let tail = &records[records.len() - window..];
        let last = tail.last()?;
        let prior_sum: f64 = tail[..tail.len() - 1]
            .iter()
            .map(|r| r.institutional_net())
            .sum();

        if prior_sum > -self.config.raid_prior_outflow_min {
            return None;
        }
        let last_net = last.institutional_net();
        if last_net < self.config.raid_last_inflow_min {
            return None;
        }
        let fill_ratio = last_net / prior_sum.abs();
        if fill_ratio <= self.config.fill_ratio_min {
            return None;
        }

        let span = 1.0 - self.config.fill_ratio_min;
        let scaled = ((fill_ratio - self.config.fill_ratio_min) / span).clamp(0.0, 1.0);
        let decay = decay_weight(series.age_days(last.date));
        let mut confidence = (0.65 + scaled * 0.30) * decay;
        if Severity::from_magnitude(last_net) >= Severity::High {
            confidence += 0.03;
        }

        Some(TrapSignal {
            kind: TrapKind::HotMoneyRaid,
            confidence,
            severity: Severity::from_magnitude(last_net),
            decay_weight: decay,
            trigger_date: last.date,
            evidence: format!(
                "{:.0}k outflow over {} sessions filled by +{:.0}k (fill ratio {:.2})",
                prior_sum.abs(),
                window - 1,
                last_net,
                fill_ratio
            ),
        })
    }

    /// Self-trading risk: the latest session's institutional flow dominated
    /// by extra-large orders, optionally with retail leaning the other way.
    fn scan_self_trade(&self, series: &FlowSeries) -> Option<TrapSignal> {
        let latest = series.latest();
        let institutional = latest.institutional_net();
        if institutional == 0.0 {
            return None;
        }

        let xl = latest.xl_net;
        if xl.abs() <= self.config.self_trade_magnitude_min {
            return None;
        }
        let ratio = xl.abs() / institutional.abs();
        if ratio <= self.config.self_trade_ratio_min {
            return None;
        }

        let span = 1.0 - self.config.self_trade_ratio_min;
        let scaled = ((ratio - self.config.self_trade_ratio_min) / span).clamp(0.0, 1.0);
        let decay = decay_weight(series.age_days(latest.date));
        let mut confidence = (0.60 + scaled * 0.25) * decay;
        let retail_opposes = latest.retail_net() * institutional < 0.0;
        if retail_opposes {
            confidence += 0.10;
        }

        Some(TrapSignal {
            kind: TrapKind::SelfTradeRisk,
            confidence,
            severity: Severity::from_magnitude(xl),
            decay_weight: decay,
            trigger_date: latest.date,
            evidence: format!(
                "extra-large {:.0}k is {:.0}% of institutional flow{}",
                xl,
                ratio * 100.0,
                if retail_opposes { ", retail opposing" } else { "" }
            ),
        })
    }

    /// Aggregated risk score in [0, 1]. Only signals inside the recency
    /// window contribute; the current flow trend can push the score in
    /// either direction before clamping.
    pub fn aggregate_risk(
        &self,
        series: &FlowSeries,
        signals: &[TrapSignal],
    ) -> Result<f64, ScanError> {
        let in_window: Vec<&TrapSignal> = signals
            .iter()
            .filter(|s| series.age_days(s.trigger_date) <= self.config.risk_window_days)
            .collect();
        if in_window.is_empty() {
            return Ok(0.0);
        }

        let base: f64 = in_window
            .iter()
            .map(|s| s.confidence * s.severity.weight())
            .sum();
        if base <= 0.0 {
            // Non-zero components must not aggregate to nothing.
            return Err(ScanError::Inconsistency(format!(
                "risk score base is {} from {} in-window signal(s)",
                base,
                in_window.len()
            )));
        }

        let mut score = base + COUNT_BONUS * (in_window.len() - 1) as f64;

        let sum_5 = series.institutional_sum(5);
        let sum_20 = series.institutional_sum(20);
        if sum_5 > 0.0 && sum_20 > 0.0 {
            score -= 0.40;
        } else if sum_5 > 0.0 {
            score -= 0.20;
        } else if sum_5 < self.config.heavy_outflow_floor {
            score += 0.30;
        }

        Ok(score.clamp(0.0, 1.0))
    }
}
