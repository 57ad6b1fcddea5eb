use chrono::Utc;
use decom_core::types::{Connectivity, PowerState};

use super::decision::GateDecision;

/// Guard for destructive directory and DNS removal.
///
/// Ready iff the host does not answer the reachability probe AND the
/// platform reports its VM powered off. Pure: callers must feed it freshly
/// observed inputs every time, never a value cached from discovery.
pub struct SafetyGate;

impl SafetyGate {
    pub fn evaluate(&self, connectivity: Connectivity, power_state: PowerState) -> GateDecision {
        let mut reasons = Vec::new();

        match connectivity {
            Connectivity::Unreachable => {}
            Connectivity::Reachable => reasons.push("responds to network probe".to_string()),
            Connectivity::Unknown => reasons.push("network probe result unknown".to_string()),
        }

        match power_state {
            PowerState::PoweredOff => {}
            PowerState::PoweredOn => reasons.push("platform reports powered on".to_string()),
            PowerState::Unknown => reasons.push("platform power state unknown".to_string()),
        }

        GateDecision {
            ready: reasons.is_empty(),
            reasons,
            connectivity,
            power_state,
            evaluated_at: Utc::now(),
        }
    }
}
