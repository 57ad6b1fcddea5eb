use std::fmt;

use serde::{Deserialize, Serialize};

use crate::target::Target;
use crate::types::{Connectivity, PowerState, RunMode};

/// Prefix on every would-be action so dry-run and destructive reports share
/// one schema.
pub const DRY_RUN_MARKER: &str = "[DRY-RUN] ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringStatus {
    Removed,
    WouldRemove,
    NotRegistered,
    Failed(String),
}

impl fmt::Display for MonitoringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitoringStatus::Removed => write!(f, "Removed"),
            MonitoringStatus::WouldRemove => write!(f, "Would remove"),
            MonitoringStatus::NotRegistered => write!(f, "Not registered"),
            MonitoringStatus::Failed(e) => write!(f, "Error: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownStatus {
    AlreadyOff,
    ShutDown,
    ForcedOff,
    WouldShutDown,
    VmNotFound,
    StillRunning,
    Failed(String),
}

impl ShutdownStatus {
    pub fn is_off(&self) -> bool {
        matches!(
            self,
            ShutdownStatus::AlreadyOff | ShutdownStatus::ShutDown | ShutdownStatus::ForcedOff
        )
    }
}

impl fmt::Display for ShutdownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownStatus::AlreadyOff => write!(f, "Already powered off"),
            ShutdownStatus::ShutDown => write!(f, "Shut down"),
            ShutdownStatus::ForcedOff => write!(f, "Forced off"),
            ShutdownStatus::WouldShutDown => write!(f, "Would shut down"),
            ShutdownStatus::VmNotFound => write!(f, "VM not found"),
            ShutdownStatus::StillRunning => write!(f, "Still running"),
            ShutdownStatus::Failed(e) => write!(f, "Error: {e}"),
        }
    }
}

/// Outcome of a gated removal (directory object, DNS records, patch groups).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalStatus {
    Removed,
    /// Memberships that disappeared with the computer object itself.
    RemovedWithComputer,
    WouldRemove,
    NotFound,
    Blocked,
    Failed(String),
}

impl RemovalStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, RemovalStatus::Failed(_))
    }
}

impl fmt::Display for RemovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalStatus::Removed => write!(f, "Removed"),
            RemovalStatus::RemovedWithComputer => write!(f, "Removed with computer account"),
            RemovalStatus::WouldRemove => write!(f, "Would remove"),
            RemovalStatus::NotFound => write!(f, "Not found"),
            RemovalStatus::Blocked => write!(f, "Blocked"),
            RemovalStatus::Failed(e) => write!(f, "Error: {e}"),
        }
    }
}

/// Overall decommission readiness of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    Ready,
    NotYetSafe(Vec<String>),
    Decommissioned,
    PartiallyDecommissioned,
    AlreadyDecommissioned,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready => write!(f, "Ready for decommission"),
            Readiness::NotYetSafe(reasons) => write!(f, "Not yet safe: {}", reasons.join("; ")),
            Readiness::Decommissioned => write!(f, "Decommissioned"),
            Readiness::PartiallyDecommissioned => write!(f, "Partially decommissioned"),
            Readiness::AlreadyDecommissioned => write!(f, "Already decommissioned"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskStatus {
    Deleted,
    WouldDelete,
    SkippedNotOff,
    Declined,
    Failed(String),
}

impl fmt::Display for DiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskStatus::Deleted => write!(f, "Deleted"),
            DiskStatus::WouldDelete => write!(f, "Would delete"),
            DiskStatus::SkippedNotOff => write!(f, "Skipped: not powered off"),
            DiskStatus::Declined => write!(f, "Declined by operator"),
            DiskStatus::Failed(e) => write!(f, "Error: {e}"),
        }
    }
}

/// Per-target accumulator of step outcomes.
///
/// Step fields are set through the `record_*` methods: a later step that
/// produces a different value for an already-set field leaves a note saying
/// so. Power state and FQDN are refreshable without a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub host: String,
    pub key: String,
    pub change_ticket: Option<String>,
    pub mode: RunMode,
    pub vm_found: Option<bool>,
    pub fqdn: Option<String>,
    pub connectivity: Option<Connectivity>,
    pub power_state: Option<PowerState>,
    pub days_powered_off: Option<i64>,
    pub monitoring: Option<MonitoringStatus>,
    pub shutdown: Option<ShutdownStatus>,
    pub directory: Option<RemovalStatus>,
    pub dns: Option<RemovalStatus>,
    pub patch_groups: Option<RemovalStatus>,
    pub readiness: Option<Readiness>,
    pub stale: Option<bool>,
    pub disk: Option<DiskStatus>,
    pub notes: Vec<String>,
    pub actions: Vec<String>,
    pub processing_errors: Vec<String>,
}

macro_rules! recorder {
    ($fn_name:ident, $field:ident, $ty:ty, $label:literal) => {
        pub fn $fn_name(&mut self, value: $ty) {
            if let Some(previous) = &self.$field {
                if *previous != value {
                    self.notes.push(format!(
                        concat!($label, " changed from {:?} to {:?}"),
                        previous, value
                    ));
                }
            }
            self.$field = Some(value);
        }
    };
}

impl ResultRow {
    pub fn new(target: &Target, mode: RunMode) -> Self {
        Self {
            host: target.name.clone(),
            key: target.key.clone(),
            change_ticket: target.change_ticket.clone(),
            mode,
            vm_found: None,
            fqdn: None,
            connectivity: None,
            power_state: None,
            days_powered_off: None,
            monitoring: None,
            shutdown: None,
            directory: None,
            dns: None,
            patch_groups: None,
            readiness: None,
            stale: None,
            disk: None,
            notes: Vec::new(),
            actions: Vec::new(),
            processing_errors: Vec::new(),
        }
    }

    recorder!(record_vm_found, vm_found, bool, "vm_found");
    recorder!(record_connectivity, connectivity, Connectivity, "connectivity");
    recorder!(record_days_powered_off, days_powered_off, i64, "days_powered_off");
    recorder!(record_monitoring, monitoring, MonitoringStatus, "monitoring");
    recorder!(record_shutdown, shutdown, ShutdownStatus, "shutdown");
    recorder!(record_directory, directory, RemovalStatus, "directory");
    recorder!(record_dns, dns, RemovalStatus, "dns");
    recorder!(record_patch_groups, patch_groups, RemovalStatus, "patch_groups");
    recorder!(record_readiness, readiness, Readiness, "readiness");
    recorder!(record_stale, stale, bool, "stale");
    recorder!(record_disk, disk, DiskStatus, "disk");

    /// Power state may legitimately change after a state-changing action.
    pub fn refresh_power_state(&mut self, state: PowerState) {
        self.power_state = Some(state);
    }

    pub fn refresh_fqdn(&mut self, fqdn: String) {
        self.fqdn = Some(fqdn);
    }

    /// Log an action, marking it as hypothetical in dry-run mode.
    pub fn action(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if self.mode.is_dry_run() {
            self.actions.push(format!("{DRY_RUN_MARKER}{text}"));
        } else {
            self.actions.push(text.to_string());
        }
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
    }

    pub fn error(&mut self, step: &str, text: impl fmt::Display) {
        self.processing_errors.push(format!("[{step}] {text}"));
    }

    pub fn has_errors(&self) -> bool {
        !self.processing_errors.is_empty()
    }

    pub fn is_discovered(&self) -> bool {
        self.vm_found.is_some()
    }
}
