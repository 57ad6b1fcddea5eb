//! In-memory estate implementing every collaborator trait.
//!
//! One `FakeEstate` is cloned into each `Services` slot; all clones share
//! the same state, so a VM powered off through the platform stops answering
//! the probe and tests can assert on the shared call log.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use decom_core::config::{RetrySettings, RunConfig};
use decom_core::errors::CollaboratorError;
use decom_core::hostname::{lookup_key, ptr_location};
use decom_core::traits::{
    AffinityChange, AffinityRule, CollabResult, ComputePlatform, DirectoryRecord,
    DirectoryService, DnsRecord, DnsService, MonitoringAgent, MonitoringService,
    ReachabilityProbe, VmRecord,
};
use decom_core::types::{
    Connectivity, DnsRecordType, GuestFamily, GuestToolsStatus, PowerState,
};
use decom_engine::pipeline::Services;

pub const DOMAIN: &str = "corp.example";
pub const PATCH_GROUP: &str = "WSUS-Patch-Ring-2";
pub const EXCEPTION_GROUP: &str = "WSUS-Patch-Exceptions";

/// Operations that change the estate.
const MUTATING: &[&str] = &[
    "shutdown_guest",
    "force_power_off",
    "set_notes",
    "rename",
    "remove_all_tags",
    "remove_or_shrink_affinity_rule",
    "delete_permanently",
    "remove_computer",
    "remove_from_group",
    "remove_record",
    "remove_agent",
];

#[derive(Default)]
pub struct Estate {
    pub vms: Vec<VmRecord>,
    pub tags: HashMap<String, usize>,
    pub rules: Vec<AffinityRule>,
    pub power_off_events: HashMap<String, DateTime<Utc>>,
    pub probe_overrides: HashMap<String, Connectivity>,
    pub computers: Vec<(DirectoryRecord, Vec<String>)>,
    pub dns: Vec<DnsRecord>,
    pub agents: Vec<MonitoringAgent>,
    pub failures: HashSet<String>,
    pub connect_fails: bool,
    pub guest_ignores_shutdown: bool,
    pub calls: Vec<String>,
    next_id: u32,
}

#[derive(Clone, Default)]
pub struct FakeEstate(Arc<Mutex<Estate>>);

pub fn test_config() -> RunConfig {
    let mut config = RunConfig::for_servers(
        "vcenter01.corp.example",
        DOMAIN,
        "dns01.corp.example",
        DOMAIN,
        "scom01.corp.example",
    );
    config.shutdown_grace = RetrySettings {
        attempts: 3,
        delay_secs: 0,
        backoff: 1.0,
        max_delay_secs: None,
    };
    config.exception_groups = vec![EXCEPTION_GROUP.to_string()];
    config.operator = "ops-test".to_string();
    config
}

fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let value = value.to_ascii_lowercase();
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, last) = match parts.as_slice() {
        [only] => return *only == value,
        [first, .., last] => (*first, *last),
        [] => return false,
    };
    let Some(mut rest) = value.strip_prefix(first) else {
        return false;
    };
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

impl FakeEstate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Estate> {
        self.0.lock().unwrap()
    }

    pub fn services(&self) -> Services {
        Services {
            platform: Box::new(self.clone()),
            directory: Box::new(self.clone()),
            dns: Box::new(self.clone()),
            monitoring: Box::new(self.clone()),
            probe: Box::new(self.clone()),
        }
    }

    pub fn add_vm(&self, name: &str, power: PowerState, tools: GuestToolsStatus) -> String {
        let mut e = self.lock();
        e.next_id += 1;
        let id = format!("VirtualMachine-vm-{}", e.next_id);
        e.vms.push(VmRecord {
            id: id.clone(),
            name: name.to_string(),
            power_state: power,
            guest_hostname: Some(format!("{}.{DOMAIN}", name.to_ascii_lowercase())),
            tools_status: tools,
            guest_family: GuestFamily::Windows,
            notes: String::new(),
        });
        e.tags.insert(id.clone(), 2);
        id
    }

    /// A fully registered Windows server: VM, computer object with one
    /// patch group and one exception group, A and PTR records, and a
    /// monitoring agent.
    pub fn add_server(&self, name: &str, ip: Ipv4Addr, power: PowerState) -> String {
        let id = self.add_vm(name, power, GuestToolsStatus::Ok);
        let key = lookup_key(name, None);
        let fqdn = format!("{}.{DOMAIN}", key.to_ascii_lowercase());
        let ptr = ptr_location(ip);
        let mut e = self.lock();
        e.computers.push((
            DirectoryRecord {
                name: key.clone(),
                distinguished_name: format!("CN={key},OU=Servers,DC=corp,DC=example"),
                dns_host_name: Some(fqdn.clone()),
            },
            vec![PATCH_GROUP.to_string(), EXCEPTION_GROUP.to_string()],
        ));
        e.dns.push(DnsRecord {
            zone: DOMAIN.to_string(),
            name: key.clone(),
            record_type: DnsRecordType::A,
            data: ip.to_string(),
        });
        e.dns.push(DnsRecord {
            zone: ptr.zone,
            name: ptr.name,
            record_type: DnsRecordType::Ptr,
            data: format!("{fqdn}."),
        });
        e.agents.push(MonitoringAgent {
            id: format!("agent-{key}"),
            display_name: fqdn,
        });
        id
    }

    pub fn powered_off_days_ago(&self, vm_id: &str, days: i64) {
        self.lock()
            .power_off_events
            .insert(vm_id.to_string(), Utc::now() - Duration::days(days));
    }

    pub fn override_probe(&self, name: &str, connectivity: Connectivity) {
        self.lock()
            .probe_overrides
            .insert(name.to_ascii_uppercase(), connectivity);
    }

    /// Make `op` fail for `subject` (a VM name, computer name, record name
    /// or agent name).
    pub fn fail(&self, op: &str, subject: &str) {
        self.lock()
            .failures
            .insert(format!("{op} {}", subject.to_ascii_uppercase()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATING.iter().any(|m| c.split(' ').next() == Some(*m)))
            .collect()
    }

    pub fn position(&self, call_prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(call_prefix))
    }

    pub fn vm(&self, name_prefix: &str) -> Option<VmRecord> {
        self.lock()
            .vms
            .iter()
            .find(|v| v.name.starts_with(name_prefix))
            .cloned()
    }

    pub fn has_computer(&self, name: &str) -> bool {
        self.lock()
            .computers
            .iter()
            .any(|(c, _)| c.name.eq_ignore_ascii_case(name))
    }

    pub fn dns_count(&self) -> usize {
        self.lock().dns.len()
    }

    pub fn agent_count(&self) -> usize {
        self.lock().agents.len()
    }

    fn record(&self, op: &str, subject: &str) -> CollabResult<()> {
        let mut e = self.lock();
        e.calls.push(format!("{op} {subject}"));
        if e.failures.contains(&format!("{op} {}", subject.to_ascii_uppercase())) {
            return Err(CollaboratorError::Failed(format!("{op} refused for {subject}")));
        }
        Ok(())
    }

    fn with_vm<T>(&self, vm: &VmRecord, f: impl FnOnce(&mut Estate, usize) -> T) -> CollabResult<T> {
        let mut e = self.lock();
        match e.vms.iter().position(|v| v.id == vm.id) {
            Some(i) => Ok(f(&mut e, i)),
            None => Err(CollaboratorError::NotFound(format!("VM {}", vm.name))),
        }
    }
}

impl ComputePlatform for FakeEstate {
    fn connect(&self) -> CollabResult<()> {
        self.record("connect", "platform")?;
        if self.lock().connect_fails {
            return Err(CollaboratorError::Unreachable("vcenter01.corp.example".into()));
        }
        Ok(())
    }

    fn disconnect(&self) -> CollabResult<()> {
        self.record("disconnect", "platform")
    }

    fn find_vm(&self, name: &str) -> CollabResult<Option<VmRecord>> {
        self.record("find_vm", name)?;
        Ok(self
            .lock()
            .vms
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn power_state(&self, vm: &VmRecord) -> CollabResult<PowerState> {
        self.record("power_state", &vm.name)?;
        self.with_vm(vm, |e, i| e.vms[i].power_state)
    }

    fn shutdown_guest(&self, vm: &VmRecord) -> CollabResult<()> {
        self.record("shutdown_guest", &vm.name)?;
        self.with_vm(vm, |e, i| {
            if !e.guest_ignores_shutdown {
                e.vms[i].power_state = PowerState::PoweredOff;
                let id = e.vms[i].id.clone();
                e.power_off_events.insert(id, Utc::now());
            }
        })
    }

    fn force_power_off(&self, vm: &VmRecord) -> CollabResult<()> {
        self.record("force_power_off", &vm.name)?;
        self.with_vm(vm, |e, i| {
            e.vms[i].power_state = PowerState::PoweredOff;
            let id = e.vms[i].id.clone();
            e.power_off_events.insert(id, Utc::now());
        })
    }

    fn set_notes(&self, vm: &VmRecord, text: &str) -> CollabResult<()> {
        self.record("set_notes", &vm.name)?;
        self.with_vm(vm, |e, i| e.vms[i].notes = text.to_string())
    }

    fn rename(&self, vm: &VmRecord, new_name: &str) -> CollabResult<()> {
        self.record("rename", &vm.name)?;
        self.with_vm(vm, |e, i| e.vms[i].name = new_name.to_string())
    }

    fn remove_all_tags(&self, vm: &VmRecord) -> CollabResult<usize> {
        self.record("remove_all_tags", &vm.name)?;
        self.with_vm(vm, |e, i| {
            let id = e.vms[i].id.clone();
            e.tags.insert(id, 0).unwrap_or(0)
        })
    }

    fn list_affinity_rules(&self, vm: &VmRecord) -> CollabResult<Vec<AffinityRule>> {
        self.record("list_affinity_rules", &vm.name)?;
        Ok(self
            .lock()
            .rules
            .iter()
            .filter(|r| r.members.iter().any(|m| m == &vm.name))
            .cloned()
            .collect())
    }

    fn remove_or_shrink_affinity_rule(
        &self,
        rule: &AffinityRule,
        vm: &VmRecord,
    ) -> CollabResult<AffinityChange> {
        self.record("remove_or_shrink_affinity_rule", &rule.name)?;
        let mut e = self.lock();
        let Some(i) = e.rules.iter().position(|r| r.name == rule.name) else {
            return Err(CollaboratorError::NotFound(format!("rule {}", rule.name)));
        };
        if e.rules[i].removal_deletes_rule(&vm.name) {
            e.rules.remove(i);
            Ok(AffinityChange::Removed)
        } else {
            e.rules[i].members.retain(|m| m != &vm.name);
            Ok(AffinityChange::Shrunk)
        }
    }

    fn delete_permanently(&self, vm: &VmRecord) -> CollabResult<()> {
        self.record("delete_permanently", &vm.name)?;
        let mut e = self.lock();
        let before = e.vms.len();
        e.vms.retain(|v| v.id != vm.id);
        if e.vms.len() == before {
            return Err(CollaboratorError::NotFound(format!("VM {}", vm.name)));
        }
        Ok(())
    }

    fn power_off_event(&self, vm: &VmRecord) -> CollabResult<Option<DateTime<Utc>>> {
        self.record("power_off_event", &vm.name)?;
        Ok(self.lock().power_off_events.get(&vm.id).copied())
    }
}

impl DirectoryService for FakeEstate {
    fn find_computer(&self, name: &str) -> CollabResult<Option<DirectoryRecord>> {
        self.record("find_computer", name)?;
        Ok(self
            .lock()
            .computers
            .iter()
            .find(|(c, _)| c.name.eq_ignore_ascii_case(name))
            .map(|(c, _)| c.clone()))
    }

    fn remove_computer(&self, record: &DirectoryRecord) -> CollabResult<()> {
        self.record("remove_computer", &record.name)?;
        let mut e = self.lock();
        let before = e.computers.len();
        e.computers
            .retain(|(c, _)| c.distinguished_name != record.distinguished_name);
        if e.computers.len() == before {
            return Err(CollaboratorError::NotFound(record.name.clone()));
        }
        Ok(())
    }

    fn group_memberships(&self, record: &DirectoryRecord, pattern: &str) -> CollabResult<Vec<String>> {
        self.record("group_memberships", &record.name)?;
        Ok(self
            .lock()
            .computers
            .iter()
            .find(|(c, _)| c.distinguished_name == record.distinguished_name)
            .map(|(_, groups)| {
                groups
                    .iter()
                    .filter(|g| wildcard_match(pattern, g))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn remove_from_group(&self, record: &DirectoryRecord, group: &str) -> CollabResult<()> {
        self.record("remove_from_group", &record.name)?;
        let mut e = self.lock();
        match e
            .computers
            .iter_mut()
            .find(|(c, _)| c.distinguished_name == record.distinguished_name)
        {
            Some((_, groups)) => {
                groups.retain(|g| g != group);
                Ok(())
            }
            None => Err(CollaboratorError::NotFound(record.name.clone())),
        }
    }
}

impl DnsService for FakeEstate {
    fn query_record(
        &self,
        zone: &str,
        name: &str,
        record_type: DnsRecordType,
    ) -> CollabResult<Option<DnsRecord>> {
        self.record("query_record", name)?;
        Ok(self
            .lock()
            .dns
            .iter()
            .find(|r| {
                r.zone.eq_ignore_ascii_case(zone)
                    && r.name.eq_ignore_ascii_case(name)
                    && r.record_type == record_type
            })
            .cloned())
    }

    fn remove_record(&self, zone: &str, name: &str, record_type: DnsRecordType) -> CollabResult<()> {
        self.record("remove_record", name)?;
        let mut e = self.lock();
        let before = e.dns.len();
        e.dns.retain(|r| {
            !(r.zone.eq_ignore_ascii_case(zone)
                && r.name.eq_ignore_ascii_case(name)
                && r.record_type == record_type)
        });
        if e.dns.len() == before {
            return Err(CollaboratorError::NotFound(format!("{record_type} {name}")));
        }
        Ok(())
    }
}

impl MonitoringService for FakeEstate {
    fn find_agent(&self, name: &str) -> CollabResult<Option<MonitoringAgent>> {
        self.record("find_agent", name)?;
        let short = !name.contains('.');
        Ok(self
            .lock()
            .agents
            .iter()
            .find(|a| {
                a.display_name.eq_ignore_ascii_case(name)
                    || (short
                        && a.display_name
                            .split('.')
                            .next()
                            .is_some_and(|label| label.eq_ignore_ascii_case(name)))
            })
            .cloned())
    }

    fn remove_agent(&self, agent: &MonitoringAgent) -> CollabResult<()> {
        self.record("remove_agent", &agent.display_name)?;
        let mut e = self.lock();
        let before = e.agents.len();
        e.agents.retain(|a| a.id != agent.id);
        if e.agents.len() == before {
            return Err(CollaboratorError::NotFound(agent.display_name.clone()));
        }
        Ok(())
    }
}

impl ReachabilityProbe for FakeEstate {
    /// Overrides win; otherwise a host answers while its VM is powered on.
    fn probe(&self, name: &str) -> Connectivity {
        let key = lookup_key(name, None);
        let mut e = self.lock();
        e.calls.push(format!("probe {name}"));
        if let Some(c) = e.probe_overrides.get(&key) {
            return *c;
        }
        let on = e
            .vms
            .iter()
            .any(|v| lookup_key(&v.name, None) == key && v.power_state == PowerState::PoweredOn);
        if on {
            Connectivity::Reachable
        } else {
            Connectivity::Unreachable
        }
    }
}
