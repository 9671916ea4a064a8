//! Capital-origin classifier.
//!
//! Labels the dominant actor behind a flow series: long-term capital,
//! institutional accumulation, hot money, or unclear. Pure function of the
//! series plus thresholds; recomputed every scan.

use scan_core::{CapitalClass, CapitalClassification, CapitalConfig, FlowSeries};

pub struct CapitalClassifier {
    config: CapitalConfig,
}

impl CapitalClassifier {
    pub fn new(config: CapitalConfig) -> Self {
        Self { config }
    }

    /// Classify the dominant capital actor. First match wins: hot money,
    /// then long-term, then institutional, else unclear.
    pub fn classify(&self, series: &FlowSeries) -> CapitalClassification {
        if series.len() < self.config.min_sessions {
            return CapitalClassification {
                class: CapitalClass::Unclear,
                confidence: 0.0,
                evidence: format!(
                    "insufficient history: {} sessions (need {})",
                    series.len(),
                    self.config.min_sessions
                ),
            };
        }

        let sum_5 = series.institutional_sum(5);
        let sum_10 = series.institutional_sum(10);
        let sum_20 = series.institutional_sum_exact(20);
        // min_sessions >= 10 is validated at startup, so the window is full.
        let volatility = series.institutional_volatility(10).unwrap_or(0.0);

        let bait_count = self.count_bait_pairs(series);
        if bait_count > 0 {
            let confidence = (0.75 + 0.05 * bait_count as f64).min(0.95);
            return CapitalClassification {
                class: CapitalClass::HotMoney,
                confidence,
                evidence: format!(
                    "{} bait pair(s): inflow above {:.0}k followed by outflow below {:.0}k",
                    bait_count, self.config.bait_inflow_min, self.config.bait_next_outflow_max
                ),
            };
        }

        if let Some(sum_20) = sum_20 {
            if sum_20 > self.config.long_term_sum_min
                && volatility < self.config.long_term_vol_max
            {
                return CapitalClassification {
                    class: CapitalClass::LongTerm,
                    confidence: 0.70,
                    evidence: format!(
                        "20-session net +{:.0}k with 10-session volatility {:.0}k",
                        sum_20, volatility
                    ),
                };
            }
        }

        if sum_10 > self.config.institutional_sum_min
            && volatility < self.config.institutional_vol_max
        {
            return CapitalClassification {
                class: CapitalClass::Institutional,
                confidence: 0.65,
                evidence: format!(
                    "10-session net +{:.0}k with 10-session volatility {:.0}k",
                    sum_10, volatility
                ),
            };
        }

        CapitalClassification {
            class: CapitalClass::Unclear,
            confidence: 0.40,
            evidence: format!(
                "no dominant pattern (5s {:.0}k, 10s {:.0}k, vol {:.0}k)",
                sum_5, sum_10, volatility
            ),
        }
    }

    /// Adjacent-day bait pairs: a strong institutional inflow immediately
    /// reversed into a strong outflow.
    fn count_bait_pairs(&self, series: &FlowSeries) -> usize {
        series
            .records()
            .windows(2)
            .filter(|pair| {
                pair[0].institutional_net() > self.config.bait_inflow_min
                    && pair[1].institutional_net() < self.config.bait_next_outflow_max
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use scan_core::{FlowRecord, ScanConfig};

    fn classifier() -> CapitalClassifier {
        CapitalClassifier::new(ScanConfig::baseline().capital)
    }

    fn series(daily_inst: &[f64]) -> FlowSeries {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let records = daily_inst
            .iter()
            .enumerate()
            .map(|(i, inst)| FlowRecord {
                date: start + chrono::Duration::days(i as i64),
                xl_net: inst / 2.0,
                l_net: inst / 2.0,
                m_net: 0.0,
                s_net: 0.0,
                pct_change: None,
            })
            .collect();
        FlowSeries::new(records).unwrap()
    }

    #[test]
    fn nine_sessions_is_always_unclear() {
        // Values that would otherwise classify as institutional.
        let result = classifier().classify(&series(&[10_000.0; 9]));

        assert_eq!(result.class, CapitalClass::Unclear);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn bait_pair_wins_over_everything() {
        // Steady accumulation that would read long-term, plus one bait pair.
        let mut daily = vec![1_000.0; 20];
        daily[10] = 6_000.0;
        daily[11] = -3_000.0;

        let result = classifier().classify(&series(&daily));

        assert_eq!(result.class, CapitalClass::HotMoney);
        assert!((result.confidence - 0.80).abs() < 1e-9);
    }

    #[test]
    fn bait_confidence_caps_at_095() {
        // Alternating bait pairs, five of them.
        let mut daily = Vec::new();
        for _ in 0..5 {
            daily.push(6_000.0);
            daily.push(-3_000.0);
        }
        let result = classifier().classify(&series(&daily));

        assert_eq!(result.class, CapitalClass::HotMoney);
        assert!((result.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn steady_accumulation_is_long_term() {
        // 20 sessions at +600 each: sum 12,000 with volatility 0.
        let result = classifier().classify(&series(&[600.0; 20]));

        assert_eq!(result.class, CapitalClass::LongTerm);
        assert!((result.confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn ten_session_accumulation_is_institutional() {
        // Too short for the 20-session rule, strong enough for the 10-session one.
        let result = classifier().classify(&series(&[600.0; 12]));

        assert_eq!(result.class, CapitalClass::Institutional);
        assert!((result.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn choppy_flow_is_unclear() {
        let daily: Vec<f64> = (0..20)
            .map(|i| if i % 2 == 0 { 4_000.0 } else { -4_000.0 })
            .collect();
        let result = classifier().classify(&series(&daily));

        assert_eq!(result.class, CapitalClass::Unclear);
        assert!((result.confidence - 0.40).abs() < 1e-9);
    }
}
