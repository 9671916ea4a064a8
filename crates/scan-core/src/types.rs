use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Float market-cap tier, used to pick the volume-ratio screen threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapTier {
    /// Float cap below the small/mid boundary
    Small,
    /// Between the small/mid and mid/large boundaries
    Mid,
    /// At or above the mid/large boundary
    Large,
    /// Float cap not supplied by the snapshot source
    Unknown,
}

impl CapTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapTier::Small => "small",
            CapTier::Mid => "mid",
            CapTier::Large => "large",
            CapTier::Unknown => "unknown",
        }
    }
}

/// One instrument at scan time. Created by the technical screen, read-only
/// afterwards, discarded once the scan snapshot is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub name: String,
    pub last_price: f64,
    pub prev_close: f64,
    /// Derived percent change against previous close
    pub pct_change: f64,
    /// Session turnover in CNY
    pub turnover: f64,
    /// Session traded volume in shares
    pub volume: f64,
    /// Session volume over trailing 5-session average volume. `None` when
    /// fewer than 5 sessions of history exist — never defaulted to a number.
    pub volume_ratio: Option<f64>,
    /// Float market capitalization in CNY, when known
    pub float_market_cap: Option<f64>,
    pub cap_tier: CapTier,
}

/// One entry of the vendor's batch quote payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnap {
    pub name: String,
    pub last_price: f64,
    pub prev_close: f64,
    pub turnover: f64,
    pub volume: f64,
    /// Trailing 5-session average volume, absent for newly listed codes
    pub avg_volume_5d: Option<f64>,
    pub float_market_cap: Option<f64>,
}

/// Whether a scan runs against live intraday quotes or the closed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    Intraday,
    EndOfDay,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Intraday => "intraday",
            ScanMode::EndOfDay => "end_of_day",
        }
    }
}

/// Snapshot source health, gating whether intraday scans may run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthStatus {
    pub connected: bool,
    pub live_data: bool,
    pub degraded: bool,
}

/// Detected manipulation pattern kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrapKind {
    PumpAndDump,
    HotMoneyRaid,
    SelfTradeRisk,
}

impl TrapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrapKind::PumpAndDump => "pump_and_dump",
            TrapKind::HotMoneyRaid => "hot_money_raid",
            TrapKind::SelfTradeRisk => "self_trade_risk",
        }
    }
}

/// Severity tier, derived from the inflow magnitude behind a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Tier from inflow magnitude in thousand CNY.
    pub fn from_magnitude(magnitude: f64) -> Self {
        match magnitude.abs() {
            m if m >= 10_000.0 => Severity::Critical,
            m if m >= 5_000.0 => Severity::High,
            m if m >= 3_000.0 => Severity::Medium,
            _ => Severity::Low,
        }
    }

    /// Contribution weight in the aggregated risk score.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 0.3,
            Severity::High => 0.2,
            Severity::Medium => 0.1,
            Severity::Low => 0.05,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// One detected pattern instance. Signals accumulate; they are never merged
/// or overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrapSignal {
    pub kind: TrapKind,
    /// Confidence in [0, 1], already decayed
    pub confidence: f64,
    pub severity: Severity,
    /// Time-decay weight applied to the confidence (1.00 / 0.70 / 0.30)
    pub decay_weight: f64,
    /// Session that triggered the pattern
    pub trigger_date: NaiveDate,
    pub evidence: String,
}

/// Dominant capital actor behind recent flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapitalClass {
    LongTerm,
    Institutional,
    HotMoney,
    Unclear,
}

impl CapitalClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapitalClass::LongTerm => "long_term",
            CapitalClass::Institutional => "institutional",
            CapitalClass::HotMoney => "hot_money",
            CapitalClass::Unclear => "unclear",
        }
    }
}

/// Capital-origin label with confidence and evidence. Stateless, recomputed
/// every scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalClassification {
    pub class: CapitalClass,
    pub confidence: f64,
    pub evidence: String,
}

/// Scenario label. Priority: TrapPumpDump > TailRally > MainlineRally >
/// Uncertain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scenario {
    MainlineRally,
    TrapPumpDump,
    TailRally,
    Uncertain,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::MainlineRally => "mainline_rally",
            Scenario::TrapPumpDump => "trap_pump_dump",
            Scenario::TailRally => "tail_rally",
            Scenario::Uncertain => "uncertain",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScenarioFlags {
    pub is_potential_mainline: bool,
    pub is_trap_suspect: bool,
    pub is_tail_rally: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: Scenario,
    pub confidence: f64,
    pub flags: ScenarioFlags,
    pub reasons: Vec<String>,
}

/// Final gate decision tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionTag {
    AcceptFocus,
    AcceptWatch,
    RejectPass,
    RejectTrap,
    RejectBlock,
}

impl DecisionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionTag::AcceptFocus => "accept_focus",
            DecisionTag::AcceptWatch => "accept_watch",
            DecisionTag::RejectPass => "reject_pass",
            DecisionTag::RejectTrap => "reject_trap",
            DecisionTag::RejectBlock => "reject_block",
        }
    }

    pub fn bucket(&self) -> Bucket {
        match self {
            DecisionTag::AcceptFocus => Bucket::Opportunity,
            DecisionTag::AcceptWatch => Bucket::Watch,
            DecisionTag::RejectPass | DecisionTag::RejectTrap | DecisionTag::RejectBlock => {
                Bucket::Rejected
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket {
    Opportunity,
    Watch,
    Rejected,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Opportunity => "opportunity",
            Bucket::Watch => "watch",
            Bucket::Rejected => "rejected",
        }
    }
}

/// Write-once per-candidate output. Exactly one per screen-surviving
/// candidate per scan; the buckets partition the candidate set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub candidate: Candidate,
    pub risk_score: f64,
    /// Latest institutional net over float market cap, in percent
    pub inflow_ratio_pct: Option<f64>,
    pub trap_signals: Vec<TrapSignal>,
    pub capital: CapitalClassification,
    pub scenario: ScenarioResult,
    pub decision: DecisionTag,
    pub bucket: Bucket,
}

/// Dropped-candidate counts by error category. Silent data loss is
/// disallowed, so every completed scan reports these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    pub insufficient_data: usize,
    pub invalid_data: usize,
    pub no_data: usize,
    pub upstream: usize,
    pub inconsistency: usize,
}

impl DropCounts {
    pub fn record(&mut self, err: &ScanError) {
        match err {
            ScanError::InsufficientData(_) => self.insufficient_data += 1,
            ScanError::InvalidData(_) => self.invalid_data += 1,
            ScanError::NoData(_) => self.no_data += 1,
            ScanError::Upstream(_) => self.upstream += 1,
            ScanError::Inconsistency(_) => self.inconsistency += 1,
            // Configuration errors abort the scan before any counting.
            ScanError::Configuration(_) => {}
        }
    }

    pub fn total(&self) -> usize {
        self.insufficient_data + self.invalid_data + self.no_data + self.upstream
            + self.inconsistency
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketSummary {
    pub count: usize,
    pub codes: Vec<String>,
}

/// Write-once scan output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub timestamp: DateTime<Utc>,
    pub mode: ScanMode,
    pub degraded: bool,
    /// Conservative exposure recommendation; lowered in degraded mode
    pub exposure_ceiling: f64,
    pub universe_size: usize,
    pub screened: usize,
    pub opportunity: BucketSummary,
    pub watch: BucketSummary,
    pub rejected: BucketSummary,
    pub records: Vec<DecisionRecord>,
    pub dropped: DropCounts,
    /// Stable hash over bucket contents; identical consecutive fingerprints
    /// mark a no-op re-scan
    pub fingerprint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ladder() {
        assert_eq!(Severity::from_magnitude(12_000.0), Severity::Critical);
        assert_eq!(Severity::from_magnitude(-12_000.0), Severity::Critical);
        assert_eq!(Severity::from_magnitude(6_000.0), Severity::High);
        assert_eq!(Severity::from_magnitude(3_500.0), Severity::Medium);
        assert_eq!(Severity::from_magnitude(500.0), Severity::Low);
    }

    #[test]
    fn decision_tags_partition_into_buckets() {
        assert_eq!(DecisionTag::AcceptFocus.bucket(), Bucket::Opportunity);
        assert_eq!(DecisionTag::AcceptWatch.bucket(), Bucket::Watch);
        assert_eq!(DecisionTag::RejectPass.bucket(), Bucket::Rejected);
        assert_eq!(DecisionTag::RejectTrap.bucket(), Bucket::Rejected);
        assert_eq!(DecisionTag::RejectBlock.bucket(), Bucket::Rejected);
    }

    #[test]
    fn drop_counts_by_category() {
        let mut counts = DropCounts::default();
        counts.record(&ScanError::NoData("x".into()));
        counts.record(&ScanError::Upstream("x".into()));
        counts.record(&ScanError::Upstream("y".into()));
        counts.record(&ScanError::Inconsistency("x".into()));

        assert_eq!(counts.no_data, 1);
        assert_eq!(counts.upstream, 2);
        assert_eq!(counts.inconsistency, 1);
        assert_eq!(counts.total(), 4);
    }
}
