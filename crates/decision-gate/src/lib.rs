//! Decision gate.
//!
//! Maps (inflow ratio, risk score, trap count, divergence flag) to the final
//! decision tag through an ordered rule table. The order is a contract:
//! re-ordering changes outcomes and requires a `GATE_RULESET_VERSION` bump.

use serde::{Deserialize, Serialize};

use scan_core::{DecisionTag, GateConfig};

/// Bumped whenever a rule, its order, or its semantics change.
/// v2: accept-focus upper ratio bound widened to the configured 50%.
pub const GATE_RULESET_VERSION: u32 = 2;

/// Gate input, assembled by the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateInput {
    /// Latest institutional net over float market cap, in percent. `None`
    /// when either side is unavailable.
    pub ratio_pct: Option<f64>,
    pub risk_score: f64,
    pub trap_count: usize,
    /// Three sessions of rising price without institutional flow following
    pub price_up_capital_lagging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub tag: DecisionTag,
    /// Name of the rule that fired, for the scan snapshot
    pub rule: &'static str,
}

struct GateRule {
    name: &'static str,
    tag: DecisionTag,
    applies: fn(&GateConfig, &GateInput) -> bool,
}

fn ratio_undefined_or_negligible(config: &GateConfig, input: &GateInput) -> bool {
    match input.ratio_pct {
        None => true,
        Some(ratio) => (0.0..config.ratio_lower_pct).contains(&ratio),
    }
}

fn ratio_implausible(config: &GateConfig, input: &GateInput) -> bool {
    matches!(input.ratio_pct, Some(ratio) if ratio > config.ratio_reject_pct)
}

fn trapped_with_elevated_risk(config: &GateConfig, input: &GateInput) -> bool {
    input.trap_count > 0 && input.risk_score >= config.risk_score_block
}

fn price_up_capital_lagging(config: &GateConfig, input: &GateInput) -> bool {
    input.price_up_capital_lagging
        && matches!(input.ratio_pct, Some(ratio) if ratio < config.divergence_ratio_pct)
}

fn clean_focus_band(config: &GateConfig, input: &GateInput) -> bool {
    let in_band = matches!(
        input.ratio_pct,
        Some(ratio) if ratio >= config.ratio_lower_pct && ratio <= config.ratio_upper_pct
    );
    in_band && input.risk_score < config.risk_score_block && input.trap_count == 0
}

fn low_risk_watch(config: &GateConfig, input: &GateInput) -> bool {
    input.risk_score < config.risk_score_watch && input.trap_count == 0
}

/// Rules 1–6, evaluated in order; rule 7 is the fallthrough in `decide`.
const RULES: [GateRule; 6] = [
    GateRule {
        name: "ratio_undefined_or_negligible",
        tag: DecisionTag::RejectPass,
        applies: ratio_undefined_or_negligible,
    },
    GateRule {
        name: "ratio_implausible",
        tag: DecisionTag::RejectTrap,
        applies: ratio_implausible,
    },
    GateRule {
        name: "trapped_with_elevated_risk",
        tag: DecisionTag::RejectBlock,
        applies: trapped_with_elevated_risk,
    },
    GateRule {
        name: "price_up_capital_lagging",
        tag: DecisionTag::RejectTrap,
        applies: price_up_capital_lagging,
    },
    GateRule {
        name: "clean_focus_band",
        tag: DecisionTag::AcceptFocus,
        applies: clean_focus_band,
    },
    GateRule {
        name: "low_risk_watch",
        tag: DecisionTag::AcceptWatch,
        applies: low_risk_watch,
    },
];

/// Evaluate the gate. Pure; first matching rule wins.
pub fn decide(config: &GateConfig, input: &GateInput) -> GateDecision {
    for rule in &RULES {
        if (rule.applies)(config, input) {
            return GateDecision {
                tag: rule.tag,
                rule: rule.name,
            };
        }
    }
    // Rule 7: everything else is rejected without prejudice.
    GateDecision {
        tag: DecisionTag::RejectPass,
        rule: "fallthrough_pass",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::ScanConfig;

    fn config() -> GateConfig {
        ScanConfig::baseline().gate
    }

    fn input(ratio_pct: Option<f64>, risk_score: f64, trap_count: usize) -> GateInput {
        GateInput {
            ratio_pct,
            risk_score,
            trap_count,
            price_up_capital_lagging: false,
        }
    }

    #[test]
    fn negligible_ratio_short_circuits_everything() {
        // 0.3% always passes through, no matter how bad the rest looks.
        let decision = decide(&config(), &input(Some(0.3), 0.95, 5));
        assert_eq!(decision.tag, DecisionTag::RejectPass);
        assert_eq!(decision.rule, "ratio_undefined_or_negligible");
    }

    #[test]
    fn undefined_ratio_is_a_pass() {
        let decision = decide(&config(), &input(None, 0.0, 0));
        assert_eq!(decision.tag, DecisionTag::RejectPass);
        assert_eq!(decision.rule, "ratio_undefined_or_negligible");
    }

    #[test]
    fn implausible_ratio_short_circuits_risk() {
        // 600% is a trap flag regardless of a clean risk profile.
        let decision = decide(&config(), &input(Some(600.0), 0.0, 0));
        assert_eq!(decision.tag, DecisionTag::RejectTrap);
        assert_eq!(decision.rule, "ratio_implausible");
    }

    #[test]
    fn trap_with_elevated_risk_blocks() {
        let decision = decide(&config(), &input(Some(10.0), 0.6, 1));
        assert_eq!(decision.tag, DecisionTag::RejectBlock);
    }

    #[test]
    fn trap_below_block_threshold_falls_through() {
        let decision = decide(&config(), &input(Some(10.0), 0.5, 1));
        assert_eq!(decision.tag, DecisionTag::RejectPass);
        assert_eq!(decision.rule, "fallthrough_pass");
    }

    #[test]
    fn divergence_with_thin_ratio_rejects() {
        let mut gate_input = input(Some(0.8), 0.1, 0);
        gate_input.price_up_capital_lagging = true;

        let decision = decide(&config(), &gate_input);
        assert_eq!(decision.tag, DecisionTag::RejectTrap);
        assert_eq!(decision.rule, "price_up_capital_lagging");
    }

    #[test]
    fn divergence_with_healthy_ratio_can_still_focus() {
        let mut gate_input = input(Some(5.0), 0.1, 0);
        gate_input.price_up_capital_lagging = true;

        let decision = decide(&config(), &gate_input);
        assert_eq!(decision.tag, DecisionTag::AcceptFocus);
    }

    #[test]
    fn clean_band_accepts_focus() {
        let decision = decide(&config(), &input(Some(10.0), 0.3, 0));
        assert_eq!(decision.tag, DecisionTag::AcceptFocus);
        assert_eq!(decision.rule, "clean_focus_band");
    }

    #[test]
    fn band_edges_are_inclusive() {
        assert_eq!(
            decide(&config(), &input(Some(0.5), 0.0, 0)).tag,
            DecisionTag::AcceptFocus
        );
        assert_eq!(
            decide(&config(), &input(Some(50.0), 0.0, 0)).tag,
            DecisionTag::AcceptFocus
        );
    }

    #[test]
    fn above_band_low_risk_watches() {
        let decision = decide(&config(), &input(Some(60.0), 0.3, 0));
        assert_eq!(decision.tag, DecisionTag::AcceptWatch);
    }

    #[test]
    fn above_band_moderate_risk_falls_through() {
        let decision = decide(&config(), &input(Some(60.0), 0.5, 0));
        assert_eq!(decision.tag, DecisionTag::RejectPass);
        assert_eq!(decision.rule, "fallthrough_pass");
    }

    #[test]
    fn outflow_ratio_reaches_the_watch_rule() {
        // Negative ratios skip the negligible band by contract and land in
        // the watch rule when risk is low.
        let decision = decide(&config(), &input(Some(-2.0), 0.1, 0));
        assert_eq!(decision.tag, DecisionTag::AcceptWatch);
    }

    #[test]
    fn identical_inputs_identical_decisions() {
        let gate_input = input(Some(12.5), 0.41, 0);
        let first = decide(&config(), &gate_input);
        let second = decide(&config(), &gate_input);
        assert_eq!(first, second);
    }
}
