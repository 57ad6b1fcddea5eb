use decom_core::traits::{CollabResult, DirectoryRecord, DirectoryService};

use super::powershell::PowerShell;

const PRELUDE: &str = r#"
Import-Module ActiveDirectory -ErrorAction Stop
$server = @{}
if ($env:DECOM_DC) { $server.Server = $env:DECOM_DC }
if ($cred) { $server.Credential = $cred }
"#;

const COMPUTER_BY_DN: &str = r#"
try {
    $computer = Get-ADComputer -Identity $env:DECOM_DN @server
} catch [Microsoft.ActiveDirectory.Management.ADIdentityNotFoundException] {
    [Console]::Error.WriteLine("computer $($env:DECOM_DN) not found")
    exit 4
}
"#;

/// Active Directory through the RSAT `ActiveDirectory` module.
pub struct AdDirectory {
    shell: PowerShell,
    domain_controller: Option<String>,
}

impl AdDirectory {
    pub fn new(shell: PowerShell) -> Self {
        Self {
            shell,
            domain_controller: None,
        }
    }

    /// Pin every query to one domain controller.
    pub fn with_server(mut self, server: &str) -> Self {
        self.domain_controller = Some(server.to_string());
        self
    }

    fn run(&self, body: &str, env: &[(&str, &str)]) -> CollabResult<String> {
        let mut all: Vec<(&str, &str)> = env.to_vec();
        if let Some(dc) = &self.domain_controller {
            all.push(("DECOM_DC", dc.as_str()));
        }
        Ok(self.shell.run(&format!("{PRELUDE}\n{body}"), &all)?)
    }
}

impl DirectoryService for AdDirectory {
    fn find_computer(&self, name: &str) -> CollabResult<Option<DirectoryRecord>> {
        let stdout = self.run(
            r#"
try {
    $computer = Get-ADComputer -Identity $env:DECOM_NAME -Properties DNSHostName @server
} catch [Microsoft.ActiveDirectory.Management.ADIdentityNotFoundException] {
    return
}
[pscustomobject]@{
    name               = $computer.Name
    distinguished_name = $computer.DistinguishedName
    dns_host_name      = $computer.DNSHostName
} | ConvertTo-Json -Compress
"#,
            &[("DECOM_NAME", name)],
        )?;
        Ok(super::powershell::parse_json(&stdout)?)
    }

    fn remove_computer(&self, record: &DirectoryRecord) -> CollabResult<()> {
        // Computer objects often carry leaf children (BitLocker, Hyper-V), so a
        // plain Remove-ADComputer fails; the recursive object removal does not.
        self.run(
            &format!("{COMPUTER_BY_DN}\nRemove-ADObject -Identity $computer -Recursive -Confirm:$false @server"),
            &[("DECOM_DN", record.distinguished_name.as_str())],
        )?;
        Ok(())
    }

    fn group_memberships(
        &self,
        record: &DirectoryRecord,
        pattern: &str,
    ) -> CollabResult<Vec<String>> {
        let stdout = self.run(
            &format!(
                r#"{COMPUTER_BY_DN}
$groups = @(Get-ADPrincipalGroupMembership -Identity $computer @server |
    Where-Object {{ $_.Name -like $env:DECOM_PATTERN }} |
    ForEach-Object {{ $_.Name }})
ConvertTo-Json -InputObject $groups -Compress
"#
            ),
            &[
                ("DECOM_DN", record.distinguished_name.as_str()),
                ("DECOM_PATTERN", pattern),
            ],
        )?;
        Ok(super::powershell::parse_json::<Option<Vec<String>>>(&stdout)?.unwrap_or_default())
    }

    fn remove_from_group(&self, record: &DirectoryRecord, group: &str) -> CollabResult<()> {
        self.run(
            &format!(
                "{COMPUTER_BY_DN}\nRemove-ADGroupMember -Identity $env:DECOM_GROUP -Members $computer -Confirm:$false @server"
            ),
            &[
                ("DECOM_DN", record.distinguished_name.as_str()),
                ("DECOM_GROUP", group),
            ],
        )?;
        Ok(())
    }
}
