use serde::{Deserialize, Serialize};

use scan_core::TrapSignal;

/// Detector output for one candidate: every retained signal plus the
/// aggregated risk score in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrapReport {
    pub signals: Vec<TrapSignal>,
    pub risk_score: f64,
}

impl TrapReport {
    pub fn trap_count(&self) -> usize {
        self.signals.len()
    }

    pub fn has_signals(&self) -> bool {
        !self.signals.is_empty()
    }
}
