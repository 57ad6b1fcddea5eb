use decom_core::traits::{CollabResult, DnsRecord, DnsService};
use decom_core::types::DnsRecordType;

use super::powershell::PowerShell;

const PRELUDE: &str = r#"
Import-Module DnsServer -ErrorAction Stop
$session = $null
if ($cred) { $session = New-CimSession -ComputerName $env:DECOM_DNS_SERVER -Credential $cred }
$target = @{ ZoneName = $env:DECOM_ZONE; Name = $env:DECOM_NAME; RRType = $env:DECOM_RRTYPE }
if ($session) { $target.CimSession = $session } else { $target.ComputerName = $env:DECOM_DNS_SERVER }
"#;

/// Windows DNS Server through the `DnsServer` module.
pub struct WindowsDns {
    shell: PowerShell,
    server: String,
}

impl WindowsDns {
    pub fn new(shell: PowerShell, server: &str) -> Self {
        Self {
            shell,
            server: server.to_string(),
        }
    }

    fn run(
        &self,
        body: &str,
        zone: &str,
        name: &str,
        record_type: DnsRecordType,
    ) -> CollabResult<String> {
        let rr = match record_type {
            DnsRecordType::A => "A",
            DnsRecordType::Ptr => "Ptr",
        };
        Ok(self.shell.run(
            &format!("{PRELUDE}\n{body}"),
            &[
                ("DECOM_DNS_SERVER", self.server.as_str()),
                ("DECOM_ZONE", zone),
                ("DECOM_NAME", name),
                ("DECOM_RRTYPE", rr),
            ],
        )?)
    }
}

impl DnsService for WindowsDns {
    fn query_record(
        &self,
        zone: &str,
        name: &str,
        record_type: DnsRecordType,
    ) -> CollabResult<Option<DnsRecord>> {
        let stdout = self.run(
            r#"
$record = Get-DnsServerResourceRecord @target -ErrorAction SilentlyContinue | Select-Object -First 1
if (-not $record) { return }
$data = if ($env:DECOM_RRTYPE -eq 'A') { $record.RecordData.IPv4Address.IPAddressToString } else { $record.RecordData.PtrDomainName }
[pscustomobject]@{
    zone        = $env:DECOM_ZONE
    name        = $record.HostName
    record_type = $env:DECOM_RRTYPE
    data        = [string]$data
} | ConvertTo-Json -Compress
"#,
            zone,
            name,
            record_type,
        )?;
        Ok(super::powershell::parse_json(&stdout)?)
    }

    fn remove_record(
        &self,
        zone: &str,
        name: &str,
        record_type: DnsRecordType,
    ) -> CollabResult<()> {
        self.run(
            r#"
$record = Get-DnsServerResourceRecord @target -ErrorAction SilentlyContinue
if (-not $record) {
    [Console]::Error.WriteLine("$($env:DECOM_RRTYPE) $($env:DECOM_NAME) not in $($env:DECOM_ZONE)")
    exit 4
}
Remove-DnsServerResourceRecord @target -Force
"#,
            zone,
            name,
            record_type,
        )?;
        Ok(())
    }
}
