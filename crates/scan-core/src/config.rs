//! Configuration surface.
//!
//! Every threshold used by the screen, the detectors and the gate is sourced
//! here so live and replayed runs share parameters. Deserialization is
//! strict: a missing threshold is a startup failure, never an implicit
//! default.

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::types::CapTier;

/// Volume-ratio screen thresholds, tiered by float market cap (CNY).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeRatioTiers {
    /// Upper bound (exclusive) of the small-cap tier
    pub small_cap_max: f64,
    /// Upper bound (exclusive) of the mid-cap tier
    pub mid_cap_max: f64,
    pub small: f64,
    pub mid: f64,
    pub large: f64,
}

impl VolumeRatioTiers {
    pub fn tier_for(&self, float_market_cap: Option<f64>) -> CapTier {
        match float_market_cap {
            None => CapTier::Unknown,
            Some(cap) if cap < self.small_cap_max => CapTier::Small,
            Some(cap) if cap < self.mid_cap_max => CapTier::Mid,
            Some(_) => CapTier::Large,
        }
    }

    /// Threshold for a tier. Unknown caps are screened against the strictest
    /// tier; the gate rejects them later anyway (undefined ratio).
    pub fn threshold_for(&self, tier: CapTier) -> f64 {
        match tier {
            CapTier::Small | CapTier::Unknown => self.small,
            CapTier::Mid => self.mid,
            CapTier::Large => self.large,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TechnicalConfig {
    /// Minimum absolute percent change
    pub change_floor_pct: f64,
    /// Minimum session turnover in CNY
    pub turnover_floor: f64,
    pub volume_ratio_tiers: VolumeRatioTiers,
    /// Board prefixes excluded from scanning (e.g. new listings board)
    pub excluded_board_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    /// Calendar days of flow history requested per candidate
    pub lookback_days: u32,
    /// Extra-large share of institutional flow treated as suspicious
    pub super_large_ratio_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapitalConfig {
    /// Sessions required before anything other than "unclear" is labeled
    pub min_sessions: usize,
    /// Day-t institutional inflow opening a bait pair (thousand CNY)
    pub bait_inflow_min: f64,
    /// Day-t+1 institutional net closing a bait pair (thousand CNY)
    pub bait_next_outflow_max: f64,
    /// 20-session sum qualifying long-term capital (thousand CNY)
    pub long_term_sum_min: f64,
    /// 10-session volatility ceiling for long-term capital
    pub long_term_vol_max: f64,
    /// 10-session sum qualifying institutional capital (thousand CNY)
    pub institutional_sum_min: f64,
    /// 10-session volatility ceiling for institutional capital
    pub institutional_vol_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrapConfig {
    /// Minimum day-t institutional inflow for a pump leg (thousand CNY)
    pub pump_inflow_min: f64,
    /// Minimum |dump| / inflow for the dump leg
    pub dump_ratio_min: f64,
    /// Trailing window scanned for the hot-money raid shape
    pub raid_window_sessions: usize,
    /// Minimum cumulative outflow before the raid session (thousand CNY)
    pub raid_prior_outflow_min: f64,
    /// Minimum raid-session inflow (thousand CNY)
    pub raid_last_inflow_min: f64,
    /// Minimum raid-session inflow over |prior cumulative outflow|
    pub fill_ratio_min: f64,
    /// Minimum extra-large share of institutional flow for self-trade risk
    pub self_trade_ratio_min: f64,
    /// Minimum extra-large magnitude for self-trade risk (thousand CNY)
    pub self_trade_magnitude_min: f64,
    /// Pump-and-dump signals retained, by inflow magnitude
    pub max_pump_dump_signals: usize,
    /// Signals older than this contribute nothing to the risk score
    pub risk_window_days: i64,
    /// 5-session outflow below which the risk score is pushed up
    pub heavy_outflow_floor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// "Not meaningfully negative" floor for the 5-session sum (thousand CNY)
    pub mainline_floor_5: f64,
    /// Same floor for the 20-session sum
    pub mainline_floor_20: f64,
    pub mainline_risk_max: f64,
    /// 20-session cumulative outflow below which a rally is a tail rally
    pub tail_outflow_floor: f64,
    /// Percentile of the trailing daily distribution the latest inflow must
    /// exceed for a tail rally
    pub tail_percentile: f64,
    /// Risk score above which the scenario is a trap regardless of signals
    pub risk_score_ceiling: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    pub ratio_lower_pct: f64,
    pub ratio_upper_pct: f64,
    /// Ratio above which the inflow itself is implausible
    pub ratio_reject_pct: f64,
    pub risk_score_block: f64,
    pub risk_score_watch: f64,
    /// Ratio below which the divergence flag rejects
    pub divergence_ratio_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Concurrent flow fetches
    pub fetch_concurrency: usize,
    pub normal_exposure_ceiling: f64,
    pub degraded_exposure_ceiling: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    pub technical: TechnicalConfig,
    pub flow: FlowConfig,
    pub capital: CapitalConfig,
    pub trap: TrapConfig,
    pub scenario: ScenarioConfig,
    pub gate: GateConfig,
    pub orchestrator: OrchestratorConfig,
}

impl ScanConfig {
    /// Strict parse: any missing or unknown key fails, surfaced as a
    /// configuration error.
    pub fn from_json_str(raw: &str) -> Result<Self, ScanError> {
        let config: ScanConfig = serde_json::from_str(raw)
            .map_err(|e| ScanError::Configuration(format!("scan config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field sanity checks beyond what serde can express.
    pub fn validate(&self) -> Result<(), ScanError> {
        let t = &self.technical.volume_ratio_tiers;
        if t.small_cap_max >= t.mid_cap_max {
            return Err(ScanError::Configuration(
                "volume_ratio_tiers: small_cap_max must be below mid_cap_max".to_string(),
            ));
        }
        if self.gate.ratio_lower_pct >= self.gate.ratio_upper_pct {
            return Err(ScanError::Configuration(
                "gate: ratio_lower_pct must be below ratio_upper_pct".to_string(),
            ));
        }
        if self.gate.ratio_upper_pct >= self.gate.ratio_reject_pct {
            return Err(ScanError::Configuration(
                "gate: ratio_upper_pct must be below ratio_reject_pct".to_string(),
            ));
        }
        if self.gate.risk_score_watch > self.gate.risk_score_block {
            return Err(ScanError::Configuration(
                "gate: risk_score_watch must not exceed risk_score_block".to_string(),
            ));
        }
        if self.capital.min_sessions < 10 {
            return Err(ScanError::Configuration(
                "capital: min_sessions must cover the 10-session volatility window".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.scenario.tail_percentile) {
            return Err(ScanError::Configuration(
                "scenario: tail_percentile must be in [0, 1]".to_string(),
            ));
        }
        if self.orchestrator.fetch_concurrency == 0 {
            return Err(ScanError::Configuration(
                "orchestrator: fetch_concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Canonical parameter set. Shared by live runs, replays and tests; the
    /// values document the contract.
    pub fn baseline() -> Self {
        Self {
            technical: TechnicalConfig {
                change_floor_pct: 3.0,
                turnover_floor: 30_000_000.0,
                volume_ratio_tiers: VolumeRatioTiers {
                    small_cap_max: 8_000_000_000.0,
                    mid_cap_max: 20_000_000_000.0,
                    small: 2.0,
                    mid: 1.5,
                    large: 1.3,
                },
                excluded_board_prefixes: vec!["688".to_string(), "8".to_string()],
            },
            flow: FlowConfig {
                lookback_days: 90,
                super_large_ratio_min: 0.70,
            },
            capital: CapitalConfig {
                min_sessions: 10,
                bait_inflow_min: 5_000.0,
                bait_next_outflow_max: -2_500.0,
                long_term_sum_min: 10_000.0,
                long_term_vol_max: 3_000.0,
                institutional_sum_min: 5_000.0,
                institutional_vol_max: 2_000.0,
            },
            trap: TrapConfig {
                pump_inflow_min: 1_000.0,
                dump_ratio_min: 0.80,
                raid_window_sessions: 30,
                raid_prior_outflow_min: 2_000.0,
                raid_last_inflow_min: 2_000.0,
                fill_ratio_min: 0.30,
                self_trade_ratio_min: 0.70,
                self_trade_magnitude_min: 3_000.0,
                max_pump_dump_signals: 5,
                risk_window_days: 60,
                heavy_outflow_floor: -10_000.0,
            },
            scenario: ScenarioConfig {
                mainline_floor_5: -1_000.0,
                mainline_floor_20: -2_000.0,
                mainline_risk_max: 0.5,
                tail_outflow_floor: -10_000.0,
                tail_percentile: 0.90,
                risk_score_ceiling: 0.75,
            },
            gate: GateConfig {
                ratio_lower_pct: 0.5,
                ratio_upper_pct: 50.0,
                ratio_reject_pct: 500.0,
                risk_score_block: 0.6,
                risk_score_watch: 0.4,
                divergence_ratio_pct: 1.0,
            },
            orchestrator: OrchestratorConfig {
                fetch_concurrency: 8,
                normal_exposure_ceiling: 1.0,
                degraded_exposure_ceiling: 0.3,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_validates() {
        assert!(ScanConfig::baseline().validate().is_ok());
    }

    #[test]
    fn missing_threshold_is_fatal() {
        let mut value: serde_json::Value =
            serde_json::to_value(ScanConfig::baseline()).unwrap();
        value["gate"]
            .as_object_mut()
            .unwrap()
            .remove("risk_score_block");
        let result = ScanConfig::from_json_str(&value.to_string());
        assert!(matches!(result, Err(ScanError::Configuration(_))));
    }

    #[test]
    fn unknown_key_is_fatal() {
        let mut value: serde_json::Value =
            serde_json::to_value(ScanConfig::baseline()).unwrap();
        value["gate"]["risk_ceiling_typo"] = serde_json::json!(0.5);
        let result = ScanConfig::from_json_str(&value.to_string());
        assert!(matches!(result, Err(ScanError::Configuration(_))));
    }

    #[test]
    fn inverted_gate_bounds_rejected() {
        let mut config = ScanConfig::baseline();
        config.gate.ratio_lower_pct = 60.0;
        assert!(matches!(config.validate(), Err(ScanError::Configuration(_))));
    }

    #[test]
    fn cap_tiers_resolve_thresholds() {
        let tiers = ScanConfig::baseline().technical.volume_ratio_tiers;

        assert_eq!(tiers.tier_for(Some(5_000_000_000.0)), CapTier::Small);
        assert_eq!(tiers.tier_for(Some(10_000_000_000.0)), CapTier::Mid);
        assert_eq!(tiers.tier_for(Some(30_000_000_000.0)), CapTier::Large);
        assert_eq!(tiers.tier_for(None), CapTier::Unknown);

        assert_eq!(tiers.threshold_for(CapTier::Small), 2.0);
        assert_eq!(tiers.threshold_for(CapTier::Mid), 1.5);
        assert_eq!(tiers.threshold_for(CapTier::Large), 1.3);
        // Unknown caps get the strictest tier.
        assert_eq!(tiers.threshold_for(CapTier::Unknown), 2.0);
    }
}
