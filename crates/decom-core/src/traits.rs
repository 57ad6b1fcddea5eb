use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CollaboratorError;
use crate::types::{Connectivity, DnsRecordType, GuestFamily, GuestToolsStatus, PowerState};

pub type CollabResult<T> = Result<T, CollaboratorError>;

/// A VM as seen in the compute platform inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    pub id: String,
    pub name: String,
    pub power_state: PowerState,
    #[serde(default)]
    pub guest_hostname: Option<String>,
    #[serde(default)]
    pub tools_status: GuestToolsStatus,
    #[serde(default)]
    pub guest_family: GuestFamily,
    #[serde(default)]
    pub notes: String,
}

/// A platform affinity (DRS) rule and the VMs it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityRule {
    pub name: String,
    pub cluster: String,
    pub members: Vec<String>,
}

impl AffinityRule {
    /// A rule left with fewer than two members constrains nothing, so it is
    /// removed rather than shrunk.
    pub fn removal_deletes_rule(&self, vm_name: &str) -> bool {
        self.members.iter().filter(|m| *m != vm_name).count() < 2
    }
}

/// What happened to an affinity rule when a VM was taken out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AffinityChange {
    Removed,
    Shrunk,
}

/// Compute platform capability (VM inventory, power, metadata).
pub trait ComputePlatform {
    fn connect(&self) -> CollabResult<()>;
    fn disconnect(&self) -> CollabResult<()>;
    fn find_vm(&self, name: &str) -> CollabResult<Option<VmRecord>>;
    fn power_state(&self, vm: &VmRecord) -> CollabResult<PowerState>;
    fn shutdown_guest(&self, vm: &VmRecord) -> CollabResult<()>;
    fn force_power_off(&self, vm: &VmRecord) -> CollabResult<()>;
    fn set_notes(&self, vm: &VmRecord, text: &str) -> CollabResult<()>;
    fn rename(&self, vm: &VmRecord, new_name: &str) -> CollabResult<()>;
    /// Returns the number of tag assignments removed.
    fn remove_all_tags(&self, vm: &VmRecord) -> CollabResult<usize>;
    fn list_affinity_rules(&self, vm: &VmRecord) -> CollabResult<Vec<AffinityRule>>;
    fn remove_or_shrink_affinity_rule(
        &self,
        rule: &AffinityRule,
        vm: &VmRecord,
    ) -> CollabResult<AffinityChange>;
    fn delete_permanently(&self, vm: &VmRecord) -> CollabResult<()>;
    /// Timestamp of the most recent power-off event, if the history has one.
    fn power_off_event(&self, vm: &VmRecord) -> CollabResult<Option<DateTime<Utc>>>;
}

/// A computer object in the enterprise directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub name: String,
    pub distinguished_name: String,
    #[serde(default)]
    pub dns_host_name: Option<String>,
}

/// Directory service capability.
pub trait DirectoryService {
    fn find_computer(&self, name: &str) -> CollabResult<Option<DirectoryRecord>>;
    fn remove_computer(&self, record: &DirectoryRecord) -> CollabResult<()>;
    fn group_memberships(&self, record: &DirectoryRecord, pattern: &str)
        -> CollabResult<Vec<String>>;
    fn remove_from_group(&self, record: &DirectoryRecord, group: &str) -> CollabResult<()>;
}

/// A single DNS resource record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub zone: String,
    pub name: String,
    pub record_type: DnsRecordType,
    pub data: String,
}

impl DnsRecord {
    /// IPv4 address carried by an A record.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        match self.record_type {
            DnsRecordType::A => self.data.trim().parse().ok(),
            DnsRecordType::Ptr => None,
        }
    }
}

/// DNS zone capability.
pub trait DnsService {
    fn query_record(
        &self,
        zone: &str,
        name: &str,
        record_type: DnsRecordType,
    ) -> CollabResult<Option<DnsRecord>>;
    fn remove_record(&self, zone: &str, name: &str, record_type: DnsRecordType)
        -> CollabResult<()>;
}

/// A monitoring agent registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringAgent {
    pub id: String,
    pub display_name: String,
}

/// Monitoring server capability.
///
/// `find_agent` accepts either an FQDN (exact match) or a short name, which
/// adapters match against the first label of registered names.
pub trait MonitoringService {
    fn find_agent(&self, name: &str) -> CollabResult<Option<MonitoringAgent>>;
    fn remove_agent(&self, agent: &MonitoringAgent) -> CollabResult<()>;
}

/// Network reachability probe (ICMP or equivalent).
pub trait ReachabilityProbe {
    fn probe(&self, name: &str) -> Connectivity;
}

/// Account used for every remote call in a run. Collected once, read-only.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A named, self-contained unit of work to run on a remote host.
///
/// The script must not depend on anything from the caller beyond its own
/// text; results are expected as a single JSON document on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDescriptor {
    pub name: String,
    pub script: String,
}

/// Raw output of a remote work unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteOutput {
    pub stdout: String,
    pub transport: String,
}
