use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a run may mutate external systems.
///
/// Fixed for the lifetime of a run and stamped on every result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    #[default]
    DryRun,
    Destructive,
}

impl RunMode {
    pub fn is_dry_run(self) -> bool {
        self == RunMode::DryRun
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::DryRun => write!(f, "DryRun"),
            RunMode::Destructive => write!(f, "Destructive"),
        }
    }
}

/// Result of a network reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    Reachable,
    Unreachable,
    #[default]
    Unknown,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Reachable => write!(f, "Reachable"),
            Connectivity::Unreachable => write!(f, "Unreachable"),
            Connectivity::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Power state as reported by the compute platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    #[default]
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::PoweredOn => write!(f, "PoweredOn"),
            PowerState::PoweredOff => write!(f, "PoweredOff"),
            PowerState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Health of the in-guest tools used for graceful shutdown and guest execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GuestToolsStatus {
    Ok,
    Old,
    NotRunning,
    NotInstalled,
    #[default]
    Unknown,
}

impl GuestToolsStatus {
    /// Graceful shutdown is only attempted when the tools respond.
    pub fn is_healthy(self) -> bool {
        matches!(self, GuestToolsStatus::Ok | GuestToolsStatus::Old)
    }
}

impl fmt::Display for GuestToolsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestToolsStatus::Ok => write!(f, "toolsOk"),
            GuestToolsStatus::Old => write!(f, "toolsOld"),
            GuestToolsStatus::NotRunning => write!(f, "toolsNotRunning"),
            GuestToolsStatus::NotInstalled => write!(f, "toolsNotInstalled"),
            GuestToolsStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Operating system family reported by the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GuestFamily {
    Windows,
    Linux,
    Other,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
    Ptr,
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsRecordType::A => write!(f, "A"),
            DnsRecordType::Ptr => write!(f, "PTR"),
        }
    }
}

/// The six pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepId {
    Discover,
    Monitoring,
    Shutdown,
    DirectoryDns,
    AgeTriage,
    DiskRemoval,
}

impl StepId {
    pub const ALL: [StepId; 6] = [
        StepId::Discover,
        StepId::Monitoring,
        StepId::Shutdown,
        StepId::DirectoryDns,
        StepId::AgeTriage,
        StepId::DiskRemoval,
    ];

    pub fn number(self) -> u8 {
        match self {
            StepId::Discover => 1,
            StepId::Monitoring => 2,
            StepId::Shutdown => 3,
            StepId::DirectoryDns => 4,
            StepId::AgeTriage => 5,
            StepId::DiskRemoval => 6,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        StepId::ALL.into_iter().find(|s| s.number() == n)
    }

    /// Steps 1..=5; deletion is never part of "run all".
    pub fn run_all() -> &'static [StepId] {
        &StepId::ALL[..5]
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepId::Discover => "discover",
            StepId::Monitoring => "monitoring",
            StepId::Shutdown => "shutdown",
            StepId::DirectoryDns => "directory-dns",
            StepId::AgeTriage => "age-triage",
            StepId::DiskRemoval => "disk-removal",
        };
        write!(f, "{name}")
    }
}
