//! Scenario classification.
//!
//! Combines multi-day flow, the capital-origin label, trap detection output
//! and optional sector context into one scenario label. The checks live in an
//! explicit ordered table so "first match wins" is structural, not a
//! convention buried in an if/else chain.

use serde::{Deserialize, Serialize};

use scan_core::{
    CapitalClass, CapitalClassification, FlowSeries, ScanConfig, Scenario, ScenarioConfig,
    ScenarioFlags, ScenarioResult, TrapSignal,
};

const BASE_CONFIDENCE: f64 = 0.60;
const CONFIDENCE_CAP: f64 = 0.95;
const UNCERTAIN_CONFIDENCE: f64 = 0.40;

/// Optional sector backdrop for a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorContext {
    pub name: String,
    /// Whether the sector is currently leading the market
    pub is_leading: bool,
}

/// Everything a check may look at, precomputed once per classification.
struct CheckContext<'a> {
    series: &'a FlowSeries,
    capital: &'a CapitalClassification,
    trap_signals: &'a [TrapSignal],
    risk_score: f64,
    sector: Option<&'a SectorContext>,
    sum_5: f64,
    sum_20: f64,
}

struct CheckHit {
    confidence: f64,
    flags: ScenarioFlags,
    reasons: Vec<String>,
}

type CheckFn = fn(&ScenarioClassifier, &CheckContext<'_>) -> Option<CheckHit>;

/// Ordered scenario checks. The order IS the priority contract:
/// trap-pump-dump > tail-rally > mainline-rally, with uncertain as the
/// fallthrough.
const CHECKS: [(Scenario, CheckFn); 3] = [
    (Scenario::TrapPumpDump, ScenarioClassifier::check_trap_pump_dump),
    (Scenario::TailRally, ScenarioClassifier::check_tail_rally),
    (Scenario::MainlineRally, ScenarioClassifier::check_mainline_rally),
];

pub struct ScenarioClassifier {
    config: ScenarioConfig,
    super_large_ratio_min: f64,
    pump_inflow_min: f64,
    dump_ratio_min: f64,
}

impl ScenarioClassifier {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            config: config.scenario.clone(),
            super_large_ratio_min: config.flow.super_large_ratio_min,
            pump_inflow_min: config.trap.pump_inflow_min,
            dump_ratio_min: config.trap.dump_ratio_min,
        }
    }

    /// Classify one candidate. Pure function of the inputs.
    pub fn classify(
        &self,
        series: &FlowSeries,
        capital: &CapitalClassification,
        trap_signals: &[TrapSignal],
        risk_score: f64,
        sector: Option<&SectorContext>,
    ) -> ScenarioResult {
        let ctx = CheckContext {
            series,
            capital,
            trap_signals,
            risk_score,
            sector,
            sum_5: series.institutional_sum(5),
            sum_20: series.institutional_sum(20),
        };

        for (scenario, check) in CHECKS {
            if let Some(hit) = check(self, &ctx) {
                return ScenarioResult {
                    scenario,
                    confidence: hit.confidence.min(CONFIDENCE_CAP),
                    flags: hit.flags,
                    reasons: hit.reasons,
                };
            }
        }

        ScenarioResult {
            scenario: Scenario::Uncertain,
            confidence: UNCERTAIN_CONFIDENCE,
            flags: ScenarioFlags::default(),
            reasons: vec!["no scenario check matched".to_string()],
        }
    }

    /// Trap: any detected signal, an excessive risk score, an extra-large
    /// dominated session, or a pump-shaped reversal at the series tail. Any
    /// one condition is enough; extra ones corroborate.
    fn check_trap_pump_dump(&self, ctx: &CheckContext<'_>) -> Option<CheckHit> {
        let mut reasons = Vec::new();

        if !ctx.trap_signals.is_empty() {
            reasons.push(format!("{} trap signal(s) detected", ctx.trap_signals.len()));
        }
        if ctx.risk_score > self.config.risk_score_ceiling {
            reasons.push(format!(
                "risk score {:.2} above ceiling {:.2}",
                ctx.risk_score, self.config.risk_score_ceiling
            ));
        }
        if let Some(share) = latest_extra_large_share(ctx.series) {
            if share > self.super_large_ratio_min {
                reasons.push(format!(
                    "extra-large orders are {:.0}% of institutional flow",
                    share * 100.0
                ));
            }
        }
        if self.has_tail_reversal(ctx.series) {
            reasons.push("next-session reversal after a pump-shaped inflow".to_string());
        }

        if reasons.is_empty() {
            return None;
        }
        Some(CheckHit {
            confidence: BASE_CONFIDENCE + 0.10 * (reasons.len() - 1) as f64,
            flags: ScenarioFlags {
                is_trap_suspect: true,
                ..Default::default()
            },
            reasons,
        })
    }

    /// Tail rally: hot money spiking into a name still under heavy
    /// cumulative outflow. All conditions are required.
    fn check_tail_rally(&self, ctx: &CheckContext<'_>) -> Option<CheckHit> {
        if ctx.sum_20 >= self.config.tail_outflow_floor {
            return None;
        }
        let latest = ctx.series.latest().institutional_net();
        if latest <= 0.0 {
            return None;
        }
        let percentile = ctx
            .series
            .institutional_percentile(self.config.tail_percentile)?;
        if latest <= percentile {
            return None;
        }
        if ctx.capital.class != CapitalClass::HotMoney {
            return None;
        }

        let mut confidence = BASE_CONFIDENCE;
        let mut reasons = vec![
            format!("20-session net {:.0}k under the outflow floor", ctx.sum_20),
            format!(
                "latest inflow +{:.0}k above the {:.0}th percentile",
                latest,
                self.config.tail_percentile * 100.0
            ),
            "hot-money capital".to_string(),
        ];
        if ctx.capital.confidence >= 0.75 {
            confidence += 0.10;
            reasons.push("high-confidence capital label".to_string());
        }
        if ctx.sum_20 < 2.0 * self.config.tail_outflow_floor {
            confidence += 0.10;
            reasons.push("outflow depth well past the floor".to_string());
        }

        Some(CheckHit {
            confidence,
            flags: ScenarioFlags {
                is_tail_rally: true,
                ..Default::default()
            },
            reasons,
        })
    }

    /// Mainline rally: sustained, clean accumulation with nothing pushing
    /// against it. All conditions are required.
    fn check_mainline_rally(&self, ctx: &CheckContext<'_>) -> Option<CheckHit> {
        if ctx.sum_5 < self.config.mainline_floor_5 || ctx.sum_20 < self.config.mainline_floor_20 {
            return None;
        }
        if ctx.risk_score > self.config.mainline_risk_max {
            return None;
        }
        if !ctx.trap_signals.is_empty() {
            return None;
        }
        if ctx.capital.class == CapitalClass::HotMoney {
            return None;
        }

        let mut confidence = BASE_CONFIDENCE;
        let mut reasons = vec![format!(
            "5/20-session nets {:.0}k / {:.0}k with risk {:.2} and no trap signals",
            ctx.sum_5, ctx.sum_20, ctx.risk_score
        )];
        if ctx.sum_5 > 0.0 && ctx.sum_20 > 0.0 {
            confidence += 0.10;
            reasons.push("both windows net positive".to_string());
        }
        if matches!(
            ctx.capital.class,
            CapitalClass::LongTerm | CapitalClass::Institutional
        ) {
            confidence += 0.10;
            reasons.push(format!("{} capital behind the move", ctx.capital.class.as_str()));
        }
        if let Some(sector) = ctx.sector {
            if sector.is_leading {
                confidence += 0.05;
                reasons.push(format!("leading sector: {}", sector.name));
            }
        }

        Some(CheckHit {
            confidence,
            flags: ScenarioFlags {
                is_potential_mainline: true,
                ..Default::default()
            },
            reasons,
        })
    }

    /// Pump-shaped inflow on the second-to-last session dumped on the last.
    fn has_tail_reversal(&self, series: &FlowSeries) -> bool {
        let records = series.records();
        if records.len() < 2 {
            return false;
        }
        let prev = records[records.len() - 2].institutional_net();
        let last = records[records.len() - 1].institutional_net();
        prev >= self.pump_inflow_min && last < 0.0 && last.abs() / prev >= self.dump_ratio_min
    }
}

/// Extra-large share of the latest session's institutional flow, when that
/// flow is non-zero.
fn latest_extra_large_share(series: &FlowSeries) -> Option<f64> {
    let latest = series.latest();
    let institutional = latest.institutional_net();
    if institutional == 0.0 {
        return None;
    }
    Some(latest.xl_net.abs() / institutional.abs())
}
