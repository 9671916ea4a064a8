//! Scan state fingerprint.
//!
//! A stable hash over bucket contents, used to detect no-op re-scans and
//! suppress redundant snapshot writes. The hash covers sorted codes, risk
//! scores rounded to fingerprint granularity, each record's bucket, and the
//! bucket sizes — and deliberately nothing order- or clock-dependent.

use sha2::{Digest, Sha256};

use scan_core::{Bucket, DecisionRecord};

/// Risk-score changes below this granularity do not change the fingerprint.
const RISK_GRANULARITY: f64 = 1e-4;

pub fn fingerprint(records: &[DecisionRecord]) -> String {
    let mut rows: Vec<(String, i64, &'static str)> = records
        .iter()
        .map(|r| {
            (
                r.candidate.code.clone(),
                (r.risk_score / RISK_GRANULARITY).round() as i64,
                r.bucket.as_str(),
            )
        })
        .collect();
    rows.sort();

    let count_of = |bucket: Bucket| records.iter().filter(|r| r.bucket == bucket).count();

    let mut hasher = Sha256::new();
    for (code, risk, bucket) in &rows {
        hasher.update(format!("{}|{}|{};", code, risk, bucket).as_bytes());
    }
    hasher.update(
        format!(
            "opportunity={};watch={};rejected={}",
            count_of(Bucket::Opportunity),
            count_of(Bucket::Watch),
            count_of(Bucket::Rejected)
        )
        .as_bytes(),
    );
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{
        CapTier, Candidate, CapitalClass, CapitalClassification, DecisionTag, Scenario,
        ScenarioFlags, ScenarioResult,
    };

    fn record(code: &str, risk_score: f64, tag: DecisionTag) -> DecisionRecord {
        DecisionRecord {
            candidate: Candidate {
                code: code.to_string(),
                name: "Example".to_string(),
                last_price: 10.0,
                prev_close: 9.5,
                pct_change: 5.26,
                turnover: 50_000_000.0,
                volume: 1_000_000.0,
                volume_ratio: Some(2.5),
                float_market_cap: Some(5_000_000_000.0),
                cap_tier: CapTier::Small,
            },
            risk_score,
            inflow_ratio_pct: Some(1.0),
            trap_signals: Vec::new(),
            capital: CapitalClassification {
                class: CapitalClass::Unclear,
                confidence: 0.4,
                evidence: String::new(),
            },
            scenario: ScenarioResult {
                scenario: Scenario::Uncertain,
                confidence: 0.4,
                flags: ScenarioFlags::default(),
                reasons: Vec::new(),
            },
            decision: tag,
            bucket: tag.bucket(),
        }
    }

    #[test]
    fn independent_of_record_order() {
        let a = record("600001", 0.2, DecisionTag::AcceptFocus);
        let b = record("600002", 0.5, DecisionTag::RejectPass);

        assert_eq!(
            fingerprint(&[a.clone(), b.clone()]),
            fingerprint(&[b, a])
        );
    }

    #[test]
    fn risk_change_beyond_granularity_changes_it() {
        let base = fingerprint(&[record("600001", 0.2000, DecisionTag::AcceptFocus)]);
        let nudged = fingerprint(&[record("600001", 0.2002, DecisionTag::AcceptFocus)]);
        let same = fingerprint(&[record("600001", 0.200004, DecisionTag::AcceptFocus)]);

        assert_ne!(base, nudged);
        assert_eq!(base, same);
    }

    #[test]
    fn bucket_move_changes_it() {
        let focus = fingerprint(&[record("600001", 0.2, DecisionTag::AcceptFocus)]);
        let watch = fingerprint(&[record("600001", 0.2, DecisionTag::AcceptWatch)]);

        assert_ne!(focus, watch);
    }
}
