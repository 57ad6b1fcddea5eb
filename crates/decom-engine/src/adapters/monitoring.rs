use decom_core::traits::{CollabResult, MonitoringAgent, MonitoringService};

use super::powershell::PowerShell;

const PRELUDE: &str = r#"
Import-Module OperationsManager -ErrorAction Stop
try {
    $connection = @{ ComputerName = $env:DECOM_SCOM_SERVER }
    if ($cred) { $connection.Credential = $cred }
    New-SCOMManagementGroupConnection @connection | Out-Null
} catch {
    [Console]::Error.WriteLine($_.Exception.Message)
    exit 3
}
function Find-DecomAgent([string]$name) {
    $agent = Get-SCOMAgent -DNSHostName $name -ErrorAction SilentlyContinue | Select-Object -First 1
    if (-not $agent -and -not $name.Contains('.')) {
        $agent = Get-SCOMAgent | Where-Object {
            $_.DisplayName -eq $name -or $_.DisplayName -like "$name.*"
        } | Select-Object -First 1
    }
    $agent
}
"#;

/// SCOM through the `OperationsManager` module.
pub struct ScomMonitoring {
    shell: PowerShell,
    server: String,
}

impl ScomMonitoring {
    pub fn new(shell: PowerShell, server: &str) -> Self {
        Self {
            shell,
            server: server.to_string(),
        }
    }
}

impl MonitoringService for ScomMonitoring {
    fn find_agent(&self, name: &str) -> CollabResult<Option<MonitoringAgent>> {
        let body = format!(
            r#"{PRELUDE}
$agent = Find-DecomAgent $env:DECOM_AGENT
if (-not $agent) {{ return }}
[pscustomobject]@{{ id = $agent.Id.ToString(); display_name = $agent.DisplayName }} | ConvertTo-Json -Compress
"#
        );
        Ok(self.shell.run_json(
            &body,
            &[
                ("DECOM_SCOM_SERVER", self.server.as_str()),
                ("DECOM_AGENT", name),
            ],
        )?)
    }

    fn remove_agent(&self, agent: &MonitoringAgent) -> CollabResult<()> {
        // Agent deletion is only exposed on the management group
        // administration object, and it takes a typed list.
        let body = format!(
            r#"{PRELUDE}
$agent = Find-DecomAgent $env:DECOM_AGENT
if (-not $agent) {{
    [Console]::Error.WriteLine("agent $($env:DECOM_AGENT) not registered")
    exit 4
}}
$admin = (Get-SCOMManagementGroup).GetAdministration()
$list = New-Object 'System.Collections.Generic.List[Microsoft.EnterpriseManagement.Administration.AgentManagedComputer]'
$list.Add($agent)
$admin.DeleteAgentManagedComputers($list)
"#
        );
        self.shell.run(
            &body,
            &[
                ("DECOM_SCOM_SERVER", self.server.as_str()),
                ("DECOM_AGENT", agent.display_name.as_str()),
            ],
        )?;
        Ok(())
    }
}
