//! In-guest power-plan enforcement over a host list.
//!
//! Targets are screened on the platform first (found, powered on, Windows
//! guest, answering probes); the rest receive a [`power_plan_work`] unit
//! through the remote runner built by [`guest_runner`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use decom_core::config::RunConfig;
use decom_core::target::Target;
use decom_core::traits::{ComputePlatform, Credential, ReachabilityProbe, WorkDescriptor};
use decom_core::types::{Connectivity, GuestFamily, PowerState};
use serde::{Deserialize, Serialize};

use crate::adapters::powershell::{parse_json, PowerShell};
use crate::remote::transports::{GuestOpsTransport, WinRmTransport};
use crate::remote::RemoteRunner;
use crate::retry::RetryPolicy;
use crate::state::atomic_write;

pub const HIGH_PERFORMANCE_GUID: &str = "8c5e7fda-e8bf-4a96-9a85-a6e23a8c635c";
pub const BALANCED_GUID: &str = "381b4222-f694-41f0-9685-ff5bb260df2e";
pub const POWER_PLAN_PREFIX: &str = "power-plan";

/// The scheme to make active inside the guest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PowerScheme {
    #[default]
    HighPerformance,
    Balanced,
    Custom(String),
}

impl PowerScheme {
    pub fn guid(&self) -> &str {
        match self {
            PowerScheme::HighPerformance => HIGH_PERFORMANCE_GUID,
            PowerScheme::Balanced => BALANCED_GUID,
            PowerScheme::Custom(guid) => guid,
        }
    }
}

fn is_guid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    groups.len() == lengths.len()
        && groups
            .iter()
            .zip(lengths)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

impl FromStr for PowerScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim().to_ascii_lowercase();
        match value.as_str() {
            "high-performance" | "high" | HIGH_PERFORMANCE_GUID => Ok(PowerScheme::HighPerformance),
            "balanced" | BALANCED_GUID => Ok(PowerScheme::Balanced),
            guid if is_guid(guid) => Ok(PowerScheme::Custom(guid.to_string())),
            _ => bail!("unknown power scheme '{s}': expected high-performance, balanced, or a GUID"),
        }
    }
}

impl fmt::Display for PowerScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerScheme::HighPerformance => write!(f, "high-performance"),
            PowerScheme::Balanced => write!(f, "balanced"),
            PowerScheme::Custom(guid) => write!(f, "{guid}"),
        }
    }
}

const WORK_TEMPLATE: &str = r#"
$ErrorActionPreference = 'Stop'
$target = '__SCHEME__'
function Get-ActiveScheme {
    $line = powercfg /getactivescheme | Out-String
    if ($LASTEXITCODE -ne 0) { throw "powercfg /getactivescheme failed with $LASTEXITCODE" }
    if ($line -match '([0-9a-fA-F-]{36})\s+\((.+)\)') {
        return @{ guid = $Matches[1].ToLower(); name = $Matches[2].Trim() }
    }
    return @{ guid = $null; name = $null }
}
$before = Get-ActiveScheme
$changed = $false
if ($before.guid -ne $target) {
    $schemes = powercfg /list
    if ($LASTEXITCODE -ne 0) { throw "powercfg /list failed with $LASTEXITCODE" }
    $listed = $schemes | Select-String -SimpleMatch $target
    if (-not $listed) {
        powercfg -duplicatescheme $target $target | Out-Null
        if ($LASTEXITCODE -ne 0) { throw "powercfg -duplicatescheme $target failed with $LASTEXITCODE" }
    }
    powercfg /setactive $target
    if ($LASTEXITCODE -ne 0) { throw "powercfg /setactive $target failed with $LASTEXITCODE" }
    $changed = $true
}
$after = Get-ActiveScheme
[pscustomobject]@{
    before_guid = $before.guid
    before_name = $before.name
    after_guid  = $after.guid
    after_name  = $after.name
    changed     = $changed
} | ConvertTo-Json -Compress
"#;

/// Self-contained work unit that activates `scheme` in the guest,
/// registering it first when the guest does not list it.
pub fn power_plan_work(scheme: &PowerScheme) -> WorkDescriptor {
    WorkDescriptor {
        name: format!("power-plan:{scheme}"),
        script: WORK_TEMPLATE.replace("__SCHEME__", scheme.guid()),
    }
}

/// What the guest reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerPlanOutcome {
    pub before_guid: Option<String>,
    pub before_name: Option<String>,
    pub after_guid: Option<String>,
    pub after_name: Option<String>,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerPlanStatus {
    Changed,
    AlreadyActive,
    Skipped(String),
    Failed(String),
}

impl fmt::Display for PowerPlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerPlanStatus::Changed => write!(f, "Changed"),
            PowerPlanStatus::AlreadyActive => write!(f, "Already active"),
            PowerPlanStatus::Skipped(why) => write!(f, "Skipped: {why}"),
            PowerPlanStatus::Failed(e) => write!(f, "Error: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerPlanRow {
    pub host: String,
    pub status: PowerPlanStatus,
    pub outcome: Option<PowerPlanOutcome>,
    pub transport: Option<String>,
}

impl PowerPlanRow {
    fn skipped(host: &str, why: &str) -> Self {
        Self {
            host: host.to_string(),
            status: PowerPlanStatus::Skipped(why.to_string()),
            outcome: None,
            transport: None,
        }
    }

    fn failed(host: &str, error: impl fmt::Display) -> Self {
        Self {
            host: host.to_string(),
            status: PowerPlanStatus::Failed(error.to_string()),
            outcome: None,
            transport: None,
        }
    }
}

/// Runner for power-plan work: the platform's guest-execution channel
/// first, WinRM when the platform cannot reach the guest.
pub fn guest_runner(
    shell: &PowerShell,
    config: &RunConfig,
    credential: &Credential,
) -> Result<RemoteRunner> {
    let runner = RemoteRunner::new(Arc::new(GuestOpsTransport::new(
        shell,
        &config.platform_server,
        credential.clone(),
    )))?;
    Ok(runner.with_fallback(
        Arc::new(WinRmTransport::new(shell)),
        RetryPolicy::fixed(
            config.fallback_attempts,
            Duration::from_secs(config.fallback_delay_secs),
        ),
    ))
}

pub struct PowerPlanEnforcer<'a> {
    pub platform: &'a dyn ComputePlatform,
    pub probe: &'a dyn ReachabilityProbe,
    pub runner: &'a RemoteRunner,
    pub credential: &'a Credential,
    pub timeout: Duration,
    pub scheme: PowerScheme,
}

impl PowerPlanEnforcer<'_> {
    pub fn enforce_all(&self, targets: &[Target]) -> Vec<PowerPlanRow> {
        targets.iter().map(|t| self.enforce(t)).collect()
    }

    pub fn enforce(&self, target: &Target) -> PowerPlanRow {
        let host = target.key.as_str();
        let vm = match self.platform.find_vm(&target.name) {
            Ok(Some(vm)) => vm,
            Ok(None) => return PowerPlanRow::skipped(host, "VM not found"),
            Err(e) => return PowerPlanRow::failed(host, e),
        };
        if vm.power_state != PowerState::PoweredOn {
            return PowerPlanRow::skipped(host, "not powered on");
        }
        if vm.guest_family != GuestFamily::Windows {
            return PowerPlanRow::skipped(host, "guest is not Windows");
        }
        if self.probe.probe(host) != Connectivity::Reachable {
            return PowerPlanRow::skipped(host, "not reachable");
        }

        let work = power_plan_work(&self.scheme);
        let output = match self.runner.run(host, self.credential, &work, self.timeout) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(host, error = %e, "power plan work failed");
                return PowerPlanRow::failed(host, e);
            }
        };
        let outcome: PowerPlanOutcome = match parse_json(&output.stdout) {
            Ok(outcome) => outcome,
            Err(e) => return PowerPlanRow::failed(host, e),
        };
        tracing::info!(
            host,
            before = outcome.before_guid.as_deref().unwrap_or("?"),
            after = outcome.after_guid.as_deref().unwrap_or("?"),
            changed = outcome.changed,
            "power plan enforced"
        );
        PowerPlanRow {
            host: host.to_string(),
            status: if outcome.changed {
                PowerPlanStatus::Changed
            } else {
                PowerPlanStatus::AlreadyActive
            },
            outcome: Some(outcome),
            transport: Some(output.transport),
        }
    }
}

#[derive(Serialize)]
struct PowerPlanLine<'a> {
    host: &'a str,
    status: String,
    before_guid: &'a str,
    before_name: &'a str,
    after_guid: &'a str,
    after_name: &'a str,
    transport: &'a str,
}

fn text(value: Option<&String>) -> &str {
    value.map(String::as_str).unwrap_or_default()
}

pub fn power_plan_csv(rows: &[PowerPlanRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        let outcome = row.outcome.as_ref();
        writer.serialize(PowerPlanLine {
            host: &row.host,
            status: row.status.to_string(),
            before_guid: text(outcome.and_then(|o| o.before_guid.as_ref())),
            before_name: text(outcome.and_then(|o| o.before_name.as_ref())),
            after_guid: text(outcome.and_then(|o| o.after_guid.as_ref())),
            after_name: text(outcome.and_then(|o| o.after_name.as_ref())),
            transport: text(row.transport.as_ref()),
        })?;
    }
    writer.into_inner().context("cannot finish CSV buffer")
}

pub fn export_power_plan(dir: &Path, stamp: &str, rows: &[PowerPlanRow]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create output directory {}", dir.display()))?;
    let path = dir.join(format!("{POWER_PLAN_PREFIX}-{stamp}.csv"));
    atomic_write(&path, &power_plan_csv(rows)?)?;
    Ok(path)
}
