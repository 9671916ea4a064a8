//! Technical screen.
//!
//! The first funnel stage: cheap, quote-only filters that cut the universe
//! down before any flow history is fetched.

use scan_core::{Candidate, MarketSnap, TechnicalConfig, VolumeRatioTiers};

/// Screen thresholds resolved once per scan. Candidate processing runs
/// concurrently afterwards, so nothing here may change mid-scan.
#[derive(Debug, Clone)]
pub struct ScreenThresholds {
    pub change_floor_pct: f64,
    pub turnover_floor: f64,
    pub tiers: VolumeRatioTiers,
    pub excluded_board_prefixes: Vec<String>,
}

impl ScreenThresholds {
    pub fn freeze(config: &TechnicalConfig) -> Self {
        Self {
            change_floor_pct: config.change_floor_pct,
            turnover_floor: config.turnover_floor,
            tiers: config.volume_ratio_tiers.clone(),
            excluded_board_prefixes: config.excluded_board_prefixes.clone(),
        }
    }
}

/// Build a candidate from a quote row. `None` when the quote itself is
/// unusable (no previous close to derive a change from).
pub fn build_candidate(
    code: &str,
    snap: &MarketSnap,
    thresholds: &ScreenThresholds,
) -> Option<Candidate> {
    if snap.prev_close <= 0.0 {
        return None;
    }
    let pct_change = (snap.last_price - snap.prev_close) / snap.prev_close * 100.0;
    // Undefined stays undefined: a thin history never becomes a ratio of 0.
    let volume_ratio = snap
        .avg_volume_5d
        .filter(|avg| *avg > 0.0)
        .map(|avg| snap.volume / avg);

    Some(Candidate {
        code: code.to_string(),
        name: snap.name.clone(),
        last_price: snap.last_price,
        prev_close: snap.prev_close,
        pct_change,
        turnover: snap.turnover,
        volume: snap.volume,
        volume_ratio,
        float_market_cap: snap.float_market_cap,
        cap_tier: thresholds.tiers.tier_for(snap.float_market_cap),
    })
}

/// Why the screen rejects a candidate, or `None` when it survives.
pub fn rejection(candidate: &Candidate, thresholds: &ScreenThresholds) -> Option<&'static str> {
    if candidate.name.contains("ST") {
        return Some("special_treatment");
    }
    if thresholds
        .excluded_board_prefixes
        .iter()
        .any(|prefix| candidate.code.starts_with(prefix.as_str()))
    {
        return Some("excluded_board");
    }
    if candidate.pct_change.abs() < thresholds.change_floor_pct {
        return Some("change_below_floor");
    }
    if candidate.turnover < thresholds.turnover_floor {
        return Some("turnover_below_floor");
    }
    match candidate.volume_ratio {
        // <5 sessions of volume history: excluded, never defaulted.
        None => Some("volume_history_missing"),
        Some(ratio) if ratio < thresholds.tiers.threshold_for(candidate.cap_tier) => {
            Some("volume_ratio_below_tier")
        }
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{CapTier, ScanConfig};

    fn thresholds() -> ScreenThresholds {
        ScreenThresholds::freeze(&ScanConfig::baseline().technical)
    }

    fn snap() -> MarketSnap {
        MarketSnap {
            name: "Example Co".to_string(),
            last_price: 11.0,
            prev_close: 10.0,
            turnover: 50_000_000.0,
            volume: 2_000_000.0,
            avg_volume_5d: Some(500_000.0),
            float_market_cap: Some(5_000_000_000.0),
        }
    }

    #[test]
    fn healthy_candidate_survives() {
        let t = thresholds();
        let candidate = build_candidate("600001", &snap(), &t).unwrap();

        assert_eq!(candidate.cap_tier, CapTier::Small);
        assert_eq!(candidate.volume_ratio, Some(4.0));
        assert!((candidate.pct_change - 10.0).abs() < 1e-9);
        assert_eq!(rejection(&candidate, &t), None);
    }

    #[test]
    fn special_treatment_names_are_excluded() {
        let t = thresholds();
        let mut quote = snap();
        quote.name = "*ST Example".to_string();
        let candidate = build_candidate("600001", &quote, &t).unwrap();

        assert_eq!(rejection(&candidate, &t), Some("special_treatment"));
    }

    #[test]
    fn excluded_board_prefix_is_rejected() {
        let t = thresholds();
        let candidate = build_candidate("688001", &snap(), &t).unwrap();

        assert_eq!(rejection(&candidate, &t), Some("excluded_board"));
    }

    #[test]
    fn small_move_is_rejected() {
        let t = thresholds();
        let mut quote = snap();
        quote.last_price = 10.1;
        let candidate = build_candidate("600001", &quote, &t).unwrap();

        assert_eq!(rejection(&candidate, &t), Some("change_below_floor"));
    }

    #[test]
    fn thin_turnover_is_rejected() {
        let t = thresholds();
        let mut quote = snap();
        quote.turnover = 10_000_000.0;
        let candidate = build_candidate("600001", &quote, &t).unwrap();

        assert_eq!(rejection(&candidate, &t), Some("turnover_below_floor"));
    }

    #[test]
    fn missing_volume_history_is_excluded_not_defaulted() {
        let t = thresholds();
        let mut quote = snap();
        quote.avg_volume_5d = None;
        let candidate = build_candidate("600001", &quote, &t).unwrap();

        assert_eq!(candidate.volume_ratio, None);
        assert_eq!(rejection(&candidate, &t), Some("volume_history_missing"));
    }

    #[test]
    fn volume_ratio_threshold_follows_cap_tier() {
        let t = thresholds();
        let mut quote = snap();
        quote.volume = 700_000.0; // ratio 1.4

        // 1.4 fails the small-cap tier (2.0)...
        let candidate = build_candidate("600001", &quote, &t).unwrap();
        assert_eq!(rejection(&candidate, &t), Some("volume_ratio_below_tier"));

        // ...but passes the large-cap tier (1.3).
        quote.float_market_cap = Some(30_000_000_000.0);
        let candidate = build_candidate("600001", &quote, &t).unwrap();
        assert_eq!(rejection(&candidate, &t), None);
    }

    #[test]
    fn unknown_cap_uses_the_strictest_tier() {
        let t = thresholds();
        let mut quote = snap();
        quote.float_market_cap = None;
        quote.volume = 800_000.0; // ratio 1.6

        let candidate = build_candidate("600001", &quote, &t).unwrap();
        assert_eq!(candidate.cap_tier, CapTier::Unknown);
        assert_eq!(rejection(&candidate, &t), Some("volume_ratio_below_tier"));
    }

    #[test]
    fn zero_prev_close_yields_no_candidate() {
        let t = thresholds();
        let mut quote = snap();
        quote.prev_close = 0.0;

        assert!(build_candidate("600001", &quote, &t).is_none());
    }
}
