use chrono::{DateTime, Utc};
use decom_core::types::{Connectivity, PowerState};
use serde::{Deserialize, Serialize};

/// Record of one safety gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub ready: bool,
    /// Every failing condition; empty when `ready`.
    pub reasons: Vec<String>,
    pub connectivity: Connectivity,
    pub power_state: PowerState,
    pub evaluated_at: DateTime<Utc>,
}

impl GateDecision {
    /// Reasons joined for a single report cell.
    pub fn reason_text(&self) -> String {
        self.reasons.join("; ")
    }
}
