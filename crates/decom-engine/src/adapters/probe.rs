use decom_core::traits::ReachabilityProbe;
use decom_core::types::Connectivity;

use super::powershell::PowerShell;

/// Echo-request probe via `Test-Connection -Quiet`.
///
/// A probe that cannot run at all reports `Unknown`, which keeps the safety
/// gate closed.
pub struct IcmpProbe {
    shell: PowerShell,
    count: u32,
}

impl IcmpProbe {
    pub fn new(shell: PowerShell) -> Self {
        Self { shell, count: 2 }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count.max(1);
        self
    }
}

impl ReachabilityProbe for IcmpProbe {
    fn probe(&self, name: &str) -> Connectivity {
        let count = self.count.to_string();
        let result = self.shell.run_json::<bool>(
            "[bool](Test-Connection -ComputerName $env:DECOM_PROBE_HOST -Count ([int]$env:DECOM_PROBE_COUNT) -Quiet -ErrorAction SilentlyContinue) | ConvertTo-Json",
            &[("DECOM_PROBE_HOST", name), ("DECOM_PROBE_COUNT", count.as_str())],
        );
        match result {
            Ok(true) => Connectivity::Reachable,
            Ok(false) => Connectivity::Unreachable,
            Err(err) => {
                tracing::warn!(host = name, error = %err, "reachability probe failed");
                Connectivity::Unknown
            }
        }
    }
}
