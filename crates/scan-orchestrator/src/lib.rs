//! Funnel orchestration.
//!
//! Drives the three-stage funnel over the universe: technical screen,
//! per-candidate flow classification, and the decision gate, then partitions
//! the results into the opportunity / watch / rejection buckets and emits a
//! write-once scan snapshot with a state fingerprint.

pub mod fingerprint;
pub mod screen;


use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use capital_classifier::CapitalClassifier;
use decision_gate::{decide, GateInput};
use scan_core::{
    Bucket, BucketSummary, Candidate, CapitalFlowRepository, DecisionRecord, DropCounts,
    FlowSeries, MarketSnapshotSource, ScanConfig, ScanError, ScanMode, ScanSnapshot,
};
use scenario_classifier::{ScenarioClassifier, SectorContext};
use trap_detector::TrapDetector;

pub use fingerprint::fingerprint;
pub use screen::{build_candidate, rejection, ScreenThresholds};

/// One scan's outcome. `repeat_of_previous` marks a no-op re-scan whose
/// snapshot write the caller should suppress.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub snapshot: ScanSnapshot,
    pub repeat_of_previous: bool,
}

pub struct FunnelOrchestrator {
    repository: Arc<dyn CapitalFlowRepository>,
    snapshots: Arc<dyn MarketSnapshotSource>,
    config: ScanConfig,
    capital_classifier: CapitalClassifier,
    trap_detector: TrapDetector,
    scenario_classifier: ScenarioClassifier,
    last_fingerprint: Mutex<Option<String>>,
}

impl FunnelOrchestrator {
    /// Configuration is validated here: thresholds are safety-critical, so a
    /// bad config never produces an orchestrator.
    pub fn new(
        config: ScanConfig,
        repository: Arc<dyn CapitalFlowRepository>,
        snapshots: Arc<dyn MarketSnapshotSource>,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            capital_classifier: CapitalClassifier::new(config.capital.clone()),
            trap_detector: TrapDetector::new(config.trap.clone()),
            scenario_classifier: ScenarioClassifier::new(&config),
            repository,
            snapshots,
            config,
            last_fingerprint: Mutex::new(None),
        })
    }

    /// Run one scan over `universe`. Per-candidate failures drop only that
    /// candidate; structural failures abort the whole scan.
    pub async fn run_scan(
        &self,
        universe: &[String],
        mode: ScanMode,
        sectors: &HashMap<String, SectorContext>,
    ) -> Result<ScanReport, ScanError> {
        let health = self.snapshots.health_status().await;
        if mode == ScanMode::Intraday && !(health.connected && health.live_data) {
            return Err(ScanError::Upstream(
                "intraday scan refused: snapshot source is not live".to_string(),
            ));
        }
        let mut degraded = health.degraded || !health.connected;

        tracing::info!(
            "starting {} scan over {} codes (source degraded: {})",
            mode.as_str(),
            universe.len(),
            degraded
        );

        let snaps = match self.snapshots.batch_snapshot(universe).await {
            Ok(snaps) => snaps,
            Err(e) => {
                // Total outage: the scan completes in degraded mode rather
                // than pretending full confidence.
                tracing::warn!("snapshot source unavailable, degrading scan: {}", e);
                degraded = true;
                HashMap::new()
            }
        };

        let mut dropped = DropCounts::default();
        let thresholds = ScreenThresholds::freeze(&self.config.technical);
        let mut survivors: Vec<Candidate> = Vec::new();

        let mut sorted_universe: Vec<&String> = universe.iter().collect();
        sorted_universe.sort();
        for code in sorted_universe {
            let Some(snap) = snaps.get(code) else {
                if !snaps.is_empty() {
                    dropped.record(&ScanError::Upstream(code.clone()));
                    tracing::warn!("no quote for {}, skipping", code);
                }
                continue;
            };
            let Some(candidate) = build_candidate(code, snap, &thresholds) else {
                dropped.record(&ScanError::InvalidData(code.clone()));
                tracing::warn!("unusable quote for {}, skipping", code);
                continue;
            };
            match rejection(&candidate, &thresholds) {
                Some(reason) => tracing::debug!("{} screened out: {}", code, reason),
                None => survivors.push(candidate),
            }
        }
        let screened = survivors.len();
        tracing::info!("technical screen kept {}/{} codes", screened, universe.len());

        let records = self
            .classify_survivors(survivors, sectors, &mut dropped)
            .await?;

        let snapshot = self.build_snapshot(
            mode,
            degraded,
            universe.len(),
            screened,
            records,
            dropped,
        );

        let mut last = self
            .last_fingerprint
            .lock()
            .map_err(|_| ScanError::Inconsistency("fingerprint lock poisoned".to_string()))?;
        let repeat_of_previous = last.as_deref() == Some(snapshot.fingerprint.as_str());
        *last = Some(snapshot.fingerprint.clone());

        tracing::info!(
            "scan complete: {} opportunity / {} watch / {} rejected, {} dropped{}",
            snapshot.opportunity.count,
            snapshot.watch.count,
            snapshot.rejected.count,
            snapshot.dropped.total(),
            if repeat_of_previous { " (repeat)" } else { "" }
        );

        Ok(ScanReport {
            snapshot,
            repeat_of_previous,
        })
    }

    /// Stage two and three: fetch each survivor's flow history under bounded
    /// concurrency, classify, and gate. Order-independent by construction —
    /// results are re-sorted by code before anything downstream sees them.
    async fn classify_survivors(
        &self,
        survivors: Vec<Candidate>,
        sectors: &HashMap<String, SectorContext>,
        dropped: &mut DropCounts,
    ) -> Result<Vec<DecisionRecord>, ScanError> {
        let survivor_count = survivors.len();
        let semaphore = Arc::new(Semaphore::new(self.config.orchestrator.fetch_concurrency));
        let mut tasks = JoinSet::new();

        for candidate in survivors {
            let repository = Arc::clone(&self.repository);
            let semaphore = Arc::clone(&semaphore);
            let lookback_days = self.config.flow.lookback_days;
            tasks.spawn(async move {
                let series = match semaphore.acquire_owned().await {
                    Ok(_permit) => repository.fetch(&candidate.code, lookback_days).await,
                    Err(_) => Err(ScanError::Upstream("fetch semaphore closed".to_string())),
                };
                (candidate, series)
            });
        }

        let mut records = Vec::new();
        let mut upstream_fetch_failures = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((candidate, Ok(series))) => {
                    let sector = sectors.get(&candidate.code);
                    let code = candidate.code.clone();
                    match self.evaluate(candidate, &series, sector) {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            dropped.record(&e);
                            tracing::warn!("classification failed for {}: {}", code, e);
                        }
                    }
                }
                Ok((candidate, Err(e))) => {
                    if matches!(e, ScanError::Upstream(_)) {
                        upstream_fetch_failures += 1;
                    }
                    dropped.record(&e);
                    tracing::warn!("flow fetch failed for {}: {}", candidate.code, e);
                }
                Err(e) => {
                    dropped.record(&ScanError::Upstream(e.to_string()));
                    tracing::error!("candidate task error: {}", e);
                }
            }
        }

        // Every single fetch failing transiently is a repository outage, not
        // a per-candidate problem.
        if survivor_count > 0 && upstream_fetch_failures == survivor_count {
            return Err(ScanError::Upstream(format!(
                "flow repository unreachable for all {} candidates",
                survivor_count
            )));
        }

        records.sort_by(|a, b| a.candidate.code.cmp(&b.candidate.code));
        Ok(records)
    }

    /// Classifier, detector and scenario run independently on the same
    /// series; the gate combines them.
    fn evaluate(
        &self,
        candidate: Candidate,
        series: &FlowSeries,
        sector: Option<&SectorContext>,
    ) -> Result<DecisionRecord, ScanError> {
        let capital = self.capital_classifier.classify(series);
        let report = self.trap_detector.detect(series)?;
        let scenario = self.scenario_classifier.classify(
            series,
            &capital,
            &report.signals,
            report.risk_score,
            sector,
        );

        let ratio = inflow_ratio_pct(series, &candidate);
        let gate_input = GateInput {
            ratio_pct: ratio,
            risk_score: report.risk_score,
            trap_count: report.signals.len(),
            price_up_capital_lagging: price_up_capital_lagging(series),
        };
        let decision = decide(&self.config.gate, &gate_input);

        Ok(DecisionRecord {
            candidate,
            risk_score: report.risk_score,
            inflow_ratio_pct: ratio,
            trap_signals: report.signals,
            capital,
            scenario,
            decision: decision.tag,
            bucket: decision.tag.bucket(),
        })
    }

    fn build_snapshot(
        &self,
        mode: ScanMode,
        degraded: bool,
        universe_size: usize,
        screened: usize,
        records: Vec<DecisionRecord>,
        dropped: DropCounts,
    ) -> ScanSnapshot {
        let summary = |bucket: Bucket| BucketSummary {
            count: records.iter().filter(|r| r.bucket == bucket).count(),
            codes: records
                .iter()
                .filter(|r| r.bucket == bucket)
                .map(|r| r.candidate.code.clone())
                .collect(),
        };

        let exposure_ceiling = if degraded {
            self.config.orchestrator.degraded_exposure_ceiling
        } else {
            self.config.orchestrator.normal_exposure_ceiling
        };

        ScanSnapshot {
            timestamp: Utc::now(),
            mode,
            degraded,
            exposure_ceiling,
            universe_size,
            screened,
            opportunity: summary(Bucket::Opportunity),
            watch: summary(Bucket::Watch),
            rejected: summary(Bucket::Rejected),
            fingerprint: fingerprint(&records),
            records,
            dropped,
        }
    }
}

/// Latest institutional net (thousand CNY) over float market cap (CNY), as a
/// percentage. Undefined when the cap is unknown or nonsensical.
fn inflow_ratio_pct(series: &FlowSeries, candidate: &Candidate) -> Option<f64> {
    let cap = candidate.float_market_cap.filter(|c| *c > 0.0)?;
    Some(series.latest().institutional_net() * 1_000.0 / cap * 100.0)
}

/// Three sessions of rising price while institutional flow stays flat or
/// negative. Sessions without a vendor price change cannot claim "price up".
fn price_up_capital_lagging(series: &FlowSeries) -> bool {
    let records = series.records();
    if records.len() < 3 {
        return false;
    }
    let all_up = records[records.len() - 3..]
        .iter()
        .all(|r| r.pct_change.is_some_and(|p| p > 0.0));
    all_up && series.institutional_sum(3) <= 0.0
}
