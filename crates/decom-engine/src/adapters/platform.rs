use chrono::{DateTime, Utc};
use decom_core::traits::{
    AffinityChange, AffinityRule, CollabResult, ComputePlatform, VmRecord,
};
use decom_core::types::PowerState;

use super::powershell::PowerShell;

const CONNECT: &str = r#"
Import-Module VMware.PowerCLI -ErrorAction Stop | Out-Null
Set-PowerCLIConfiguration -InvalidCertificateAction Ignore -Scope Session -Confirm:$false | Out-Null
try {
    Connect-VIServer -Server $env:DECOM_PLATFORM_SERVER -Credential $cred | Out-Null
} catch {
    [Console]::Error.WriteLine($_.Exception.Message)
    exit 3
}
"#;

const VM_BY_ID: &str = r#"
$vm = Get-VM -Id $env:DECOM_VM_ID -ErrorAction SilentlyContinue
if (-not $vm) {
    [Console]::Error.WriteLine("VM $($env:DECOM_VM_ID) not found")
    exit 4
}
"#;

const VM_JSON: &str = r#"
[pscustomobject]@{
    id             = $vm.Id
    name           = $vm.Name
    power_state    = switch ([string]$vm.PowerState) { 'PoweredOn' { 'PoweredOn' } 'PoweredOff' { 'PoweredOff' } default { 'Unknown' } }
    guest_hostname = $vm.Guest.HostName
    tools_status   = switch ([string]$vm.ExtensionData.Guest.ToolsStatus) {
        'toolsOk' { 'Ok' } 'toolsOld' { 'Old' } 'toolsNotRunning' { 'NotRunning' } 'toolsNotInstalled' { 'NotInstalled' } default { 'Unknown' }
    }
    guest_family   = switch -Wildcard ([string]$vm.ExtensionData.Guest.GuestFamily) {
        'windows*' { 'Windows' } 'linux*' { 'Linux' } '' { 'Unknown' } default { 'Other' }
    }
    notes          = [string]$vm.Notes
} | ConvertTo-Json -Compress
"#;

/// VMware vCenter through PowerCLI. Every call opens its own session.
pub struct PowerCliPlatform {
    shell: PowerShell,
    server: String,
}

impl PowerCliPlatform {
    pub fn new(shell: PowerShell, server: &str) -> Self {
        Self {
            shell,
            server: server.to_string(),
        }
    }

    fn script(&self, body: &str) -> String {
        format!("{CONNECT}\n{body}")
    }

    fn on_vm(&self, vm: &VmRecord, body: &str) -> CollabResult<String> {
        let script = self.script(&format!("{VM_BY_ID}\n{body}"));
        Ok(self.shell.run(
            &script,
            &[("DECOM_PLATFORM_SERVER", self.server.as_str()), ("DECOM_VM_ID", vm.id.as_str())],
        )?)
    }
}

impl ComputePlatform for PowerCliPlatform {
    fn connect(&self) -> CollabResult<()> {
        let script = self.script("$global:DefaultVIServer.Name | ConvertTo-Json -Compress");
        let server: Option<String> = self
            .shell
            .run_json(&script, &[("DECOM_PLATFORM_SERVER", self.server.as_str())])?;
        tracing::info!(server = server.as_deref().unwrap_or(self.server.as_str()), "connected to platform");
        Ok(())
    }

    fn disconnect(&self) -> CollabResult<()> {
        let script = self.script(
            "Disconnect-VIServer -Server $env:DECOM_PLATFORM_SERVER -Force -Confirm:$false",
        );
        self.shell
            .run(&script, &[("DECOM_PLATFORM_SERVER", self.server.as_str())])?;
        Ok(())
    }

    fn find_vm(&self, name: &str) -> CollabResult<Option<VmRecord>> {
        let body = format!(
            "$vm = Get-VM -Name $env:DECOM_VM_NAME -ErrorAction SilentlyContinue | Select-Object -First 1\nif (-not $vm) {{ return }}\n{VM_JSON}"
        );
        Ok(self.shell.run_json(
            &self.script(&body),
            &[("DECOM_PLATFORM_SERVER", self.server.as_str()), ("DECOM_VM_NAME", name)],
        )?)
    }

    fn power_state(&self, vm: &VmRecord) -> CollabResult<PowerState> {
        let stdout = self.on_vm(vm, VM_JSON)?;
        let fresh: VmRecord = super::powershell::parse_json(&stdout)?;
        Ok(fresh.power_state)
    }

    fn shutdown_guest(&self, vm: &VmRecord) -> CollabResult<()> {
        self.on_vm(vm, "Stop-VMGuest -VM $vm -Confirm:$false | Out-Null")?;
        Ok(())
    }

    fn force_power_off(&self, vm: &VmRecord) -> CollabResult<()> {
        self.on_vm(vm, "Stop-VM -VM $vm -Kill -Confirm:$false | Out-Null")?;
        Ok(())
    }

    fn set_notes(&self, vm: &VmRecord, text: &str) -> CollabResult<()> {
        let script = self.script(&format!(
            "{VM_BY_ID}\nSet-VM -VM $vm -Notes $env:DECOM_TEXT -Confirm:$false | Out-Null"
        ));
        self.shell.run(
            &script,
            &[
                ("DECOM_PLATFORM_SERVER", self.server.as_str()),
                ("DECOM_VM_ID", vm.id.as_str()),
                ("DECOM_TEXT", text),
            ],
        )?;
        Ok(())
    }

    fn rename(&self, vm: &VmRecord, new_name: &str) -> CollabResult<()> {
        let script = self.script(&format!(
            "{VM_BY_ID}\nSet-VM -VM $vm -Name $env:DECOM_TEXT -Confirm:$false | Out-Null"
        ));
        self.shell.run(
            &script,
            &[
                ("DECOM_PLATFORM_SERVER", self.server.as_str()),
                ("DECOM_VM_ID", vm.id.as_str()),
                ("DECOM_TEXT", new_name),
            ],
        )?;
        Ok(())
    }

    fn remove_all_tags(&self, vm: &VmRecord) -> CollabResult<usize> {
        let stdout = self.on_vm(
            vm,
            r#"
$assigned = @(Get-TagAssignment -Entity $vm)
if ($assigned.Count -gt 0) { $assigned | Remove-TagAssignment -Confirm:$false }
$assigned.Count | ConvertTo-Json -Compress
"#,
        )?;
        Ok(super::powershell::parse_json::<Option<usize>>(&stdout)?.unwrap_or(0))
    }

    fn list_affinity_rules(&self, vm: &VmRecord) -> CollabResult<Vec<AffinityRule>> {
        let stdout = self.on_vm(
            vm,
            r#"
$cluster = Get-Cluster -VM $vm -ErrorAction SilentlyContinue
$rules = @()
if ($cluster) {
    $rules = @(Get-DrsRule -Cluster $cluster -VM $vm | ForEach-Object {
        [pscustomobject]@{
            name    = $_.Name
            cluster = $cluster.Name
            members = @(Get-VM -Id $_.VMIds | ForEach-Object { $_.Name })
        }
    })
}
ConvertTo-Json -InputObject $rules -Depth 4 -Compress
"#,
        )?;
        Ok(super::powershell::parse_json::<Option<Vec<AffinityRule>>>(&stdout)?.unwrap_or_default())
    }

    fn remove_or_shrink_affinity_rule(
        &self,
        rule: &AffinityRule,
        vm: &VmRecord,
    ) -> CollabResult<AffinityChange> {
        let change = if rule.removal_deletes_rule(&vm.name) {
            AffinityChange::Removed
        } else {
            AffinityChange::Shrunk
        };
        let mode = match change {
            AffinityChange::Removed => "remove",
            AffinityChange::Shrunk => "shrink",
        };
        let script = self.script(&format!(
            r#"{VM_BY_ID}
$cluster = Get-Cluster -Name $env:DECOM_CLUSTER
$rule = Get-DrsRule -Cluster $cluster -Name $env:DECOM_RULE
if (-not $rule) {{ return }}
if ($env:DECOM_MODE -eq 'remove') {{
    Remove-DrsRule -Rule $rule -Confirm:$false
}} else {{
    $keep = @(Get-VM -Id $rule.VMIds | Where-Object {{ $_.Id -ne $vm.Id }})
    Set-DrsRule -Rule $rule -VM $keep -Confirm:$false | Out-Null
}}
"#
        ));
        self.shell.run(
            &script,
            &[
                ("DECOM_PLATFORM_SERVER", self.server.as_str()),
                ("DECOM_VM_ID", vm.id.as_str()),
                ("DECOM_CLUSTER", rule.cluster.as_str()),
                ("DECOM_RULE", rule.name.as_str()),
                ("DECOM_MODE", mode),
            ],
        )?;
        Ok(change)
    }

    fn delete_permanently(&self, vm: &VmRecord) -> CollabResult<()> {
        self.on_vm(vm, "Remove-VM -VM $vm -DeletePermanently -Confirm:$false")?;
        Ok(())
    }

    fn power_off_event(&self, vm: &VmRecord) -> CollabResult<Option<DateTime<Utc>>> {
        let stdout = self.on_vm(
            vm,
            r#"
$event = Get-VIEvent -Entity $vm -MaxSamples 10000 |
    Where-Object { $_ -is [VMware.Vim.VmPoweredOffEvent] } |
    Sort-Object CreatedTime -Descending |
    Select-Object -First 1
if ($event) { $event.CreatedTime.ToUniversalTime().ToString('o') | ConvertTo-Json -Compress }
"#,
        )?;
        Ok(super::powershell::parse_json(&stdout)?)
    }
}
