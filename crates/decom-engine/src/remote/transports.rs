//! PowerShell-backed transports. Both run the work script inside a child
//! process spawned with `kill_on_drop`, so an aborted task takes the child
//! down with it.

use async_trait::async_trait;
use decom_core::errors::RemoteError;
use decom_core::traits::{Credential, RemoteOutput, WorkDescriptor};
use tokio::process::Command;

use super::RemoteTransport;
use crate::adapters::powershell::{PowerShell, EXIT_UNREACHABLE};

const WINRM_SCRIPT: &str = r#"
try {
    $session = New-PSSession -ComputerName $env:DECOM_REMOTE_HOST -Credential $cred
} catch {
    [Console]::Error.WriteLine($_.Exception.Message)
    exit 3
}
try {
    $block = [scriptblock]::Create($env:DECOM_REMOTE_SCRIPT)
    Invoke-Command -Session $session -ScriptBlock $block
} catch {
    [Console]::Error.WriteLine($_.Exception.Message)
    exit 1
} finally {
    Remove-PSSession $session -ErrorAction SilentlyContinue
}
"#;

const GUEST_OPS_SCRIPT: &str = r#"
Import-Module VMware.PowerCLI -ErrorAction Stop | Out-Null
try {
    $platformSecure = ConvertTo-SecureString $env:DECOM_PLATFORM_SECRET -AsPlainText -Force
    $platformCred = New-Object System.Management.Automation.PSCredential($env:DECOM_PLATFORM_USER, $platformSecure)
    Connect-VIServer -Server $env:DECOM_PLATFORM_SERVER -Credential $platformCred | Out-Null
    $vm = Get-VM -Name $env:DECOM_REMOTE_HOST
} catch {
    [Console]::Error.WriteLine($_.Exception.Message)
    exit 3
}
try {
    $result = Invoke-VMScript -VM $vm -ScriptText $env:DECOM_REMOTE_SCRIPT -GuestCredential $cred -ScriptType Powershell
    if ($result.ExitCode -ne 0) {
        [Console]::Error.WriteLine($result.ScriptOutput)
        exit 1
    }
    $result.ScriptOutput
} catch {
    [Console]::Error.WriteLine($_.Exception.Message)
    exit 1
} finally {
    Disconnect-VIServer -Server $env:DECOM_PLATFORM_SERVER -Confirm:$false -ErrorAction SilentlyContinue
}
"#;

/// Primary transport: a PowerShell remoting session over WinRM.
pub struct WinRmTransport {
    program: String,
}

impl WinRmTransport {
    pub fn new(shell: &PowerShell) -> Self {
        Self {
            program: shell.program().to_string(),
        }
    }
}

#[async_trait]
impl RemoteTransport for WinRmTransport {
    fn name(&self) -> &str {
        "winrm"
    }

    async fn execute(
        &self,
        host: &str,
        credential: &Credential,
        work: &WorkDescriptor,
    ) -> Result<RemoteOutput, RemoteError> {
        let shell = PowerShell::new(Some(credential.clone())).with_program(&self.program);
        let env = shell.environment(&[
            ("DECOM_REMOTE_HOST", host),
            ("DECOM_REMOTE_SCRIPT", work.script.as_str()),
        ]);
        spawn(&self.program, WINRM_SCRIPT, env, host, self.name()).await
    }
}

/// Fallback transport: the platform's guest-operations channel, which needs
/// no network path to the guest itself.
pub struct GuestOpsTransport {
    program: String,
    platform_server: String,
    platform_credential: Credential,
}

impl GuestOpsTransport {
    pub fn new(shell: &PowerShell, platform_server: &str, platform_credential: Credential) -> Self {
        Self {
            program: shell.program().to_string(),
            platform_server: platform_server.to_string(),
            platform_credential,
        }
    }
}

#[async_trait]
impl RemoteTransport for GuestOpsTransport {
    fn name(&self) -> &str {
        "guest-ops"
    }

    async fn execute(
        &self,
        host: &str,
        credential: &Credential,
        work: &WorkDescriptor,
    ) -> Result<RemoteOutput, RemoteError> {
        let shell = PowerShell::new(Some(credential.clone())).with_program(&self.program);
        let env = shell.environment(&[
            ("DECOM_REMOTE_HOST", host),
            ("DECOM_REMOTE_SCRIPT", work.script.as_str()),
            ("DECOM_PLATFORM_SERVER", self.platform_server.as_str()),
            ("DECOM_PLATFORM_USER", self.platform_credential.username.as_str()),
            ("DECOM_PLATFORM_SECRET", self.platform_credential.secret()),
        ]);
        spawn(&self.program, GUEST_OPS_SCRIPT, env, host, self.name()).await
    }
}

async fn spawn(
    program: &str,
    script: &str,
    env: Vec<(String, String)>,
    host: &str,
    transport: &str,
) -> Result<RemoteOutput, RemoteError> {
    let output = Command::new(program)
        .args(PowerShell::args(script))
        .envs(env)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| RemoteError::ConnectFailure {
            host: host.to_string(),
            reason: format!("cannot start {program}: {e}"),
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(0) => Ok(RemoteOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            transport: transport.to_string(),
        }),
        Some(EXIT_UNREACHABLE) => Err(RemoteError::ConnectFailure {
            host: host.to_string(),
            reason: stderr,
        }),
        _ => Err(RemoteError::RemoteScript {
            host: host.to_string(),
            message: stderr,
        }),
    }
}
