use decom_core::errors::DecomError;
use decom_core::hostname::{ptr_location, PtrLocation};
use decom_core::state::{Readiness, RemovalStatus, ResultRow};
use decom_core::target::Target;
use decom_core::traits::{DirectoryRecord, DnsRecord};
use decom_core::types::DnsRecordType;

use super::StepContext;

/// What is still registered for a target, read before anything is removed.
#[derive(Debug, Default)]
struct Remnants {
    computer: Option<DirectoryRecord>,
    a_record: Option<DnsRecord>,
    ptr: Option<PtrLocation>,
    groups: Vec<String>,
}

impl Remnants {
    fn is_empty(&self) -> bool {
        self.computer.is_none() && self.a_record.is_none() && self.ptr.is_none()
    }

    fn has_dns(&self) -> bool {
        self.a_record.is_some() || self.ptr.is_some()
    }

    fn dns_detail(&self) -> String {
        let mut parts = Vec::new();
        if let Some(a) = &self.a_record {
            parts.push(format!("A {}", a.data));
        }
        if let Some(ptr) = &self.ptr {
            parts.push(format!("PTR {}.{}", ptr.name, ptr.zone));
        }
        parts.join(", ")
    }
}

fn read_remnants(
    ctx: &StepContext<'_>,
    target: &Target,
    row: &mut ResultRow,
) -> Result<Remnants, DecomError> {
    let services = ctx.services;
    let zone = &ctx.config.dns_zone;

    let computer = services.directory.find_computer(&target.key)?;
    let a_record = services
        .dns
        .query_record(zone, &target.key, DnsRecordType::A)?;

    let mut ptr = None;
    if let Some(ip) = a_record.as_ref().and_then(DnsRecord::ipv4) {
        let location = ptr_location(ip);
        if services
            .dns
            .query_record(&location.zone, &location.name, DnsRecordType::Ptr)?
            .is_some()
        {
            ptr = Some(location);
        }
    }

    let mut groups = Vec::new();
    if let Some(record) = &computer {
        for group in services
            .directory
            .group_memberships(record, &ctx.config.patch_group_pattern)?
        {
            if ctx.config.is_exception_group(&group) {
                row.note(format!("kept exception group {group}"));
            } else {
                groups.push(group);
            }
        }
    }

    Ok(Remnants {
        computer,
        a_record,
        ptr,
        groups,
    })
}

/// Step 4: directory object, DNS A/PTR and patch groups, behind a freshly
/// evaluated safety gate.
pub(crate) fn run(
    ctx: &StepContext<'_>,
    target: &mut Target,
    row: &mut ResultRow,
) -> Result<(), DecomError> {
    let remnants = read_remnants(ctx, target, row)?;

    // Gone from the platform and from every record; there is no VM left
    // to gate on.
    if target.vm.is_none() && remnants.is_empty() {
        record_already_decommissioned(target, row);
        return Ok(());
    }

    let decision = ctx.evaluate_gate(target);
    row.record_connectivity(decision.connectivity);
    row.refresh_power_state(decision.power_state);

    if !decision.ready {
        let blocked = DecomError::SafetyGateBlocked(decision.reasons.clone());
        tracing::info!(host = %target.key, %blocked, "destructive cleanup held back");
        row.record_directory(RemovalStatus::Blocked);
        row.record_dns(RemovalStatus::Blocked);
        row.record_patch_groups(RemovalStatus::Blocked);
        row.record_readiness(Readiness::NotYetSafe(decision.reasons));
        return Ok(());
    }

    if remnants.is_empty() {
        record_already_decommissioned(target, row);
        return Ok(());
    }

    if ctx.dry_run() {
        plan(target, row, &remnants);
        row.record_readiness(Readiness::Ready);
        return Ok(());
    }

    let failures = remove(ctx, target, row, &remnants);
    if failures.is_empty() {
        row.record_readiness(Readiness::Decommissioned);
        Ok(())
    } else {
        row.record_readiness(Readiness::PartiallyDecommissioned);
        Err(DecomError::PartialFailure {
            step: "directory-dns".to_string(),
            errors: failures,
        })
    }
}

fn record_already_decommissioned(target: &Target, row: &mut ResultRow) {
    row.record_directory(RemovalStatus::NotFound);
    row.record_dns(RemovalStatus::NotFound);
    row.record_patch_groups(RemovalStatus::NotFound);
    row.record_readiness(Readiness::AlreadyDecommissioned);
    tracing::info!(host = %target.key, "nothing left in directory or DNS");
}

fn plan(target: &Target, row: &mut ResultRow, remnants: &Remnants) {
    match &remnants.computer {
        Some(computer) => {
            row.record_directory(RemovalStatus::WouldRemove);
            row.action(format!(
                "Would remove AD computer account {}",
                computer.distinguished_name
            ));
        }
        None => row.record_directory(RemovalStatus::NotFound),
    }

    if remnants.has_dns() {
        row.record_dns(RemovalStatus::WouldRemove);
        row.action(format!(
            "Would remove DNS A/PTR for {} ({})",
            target.key,
            remnants.dns_detail()
        ));
    } else {
        row.record_dns(RemovalStatus::NotFound);
    }

    if remnants.groups.is_empty() {
        row.record_patch_groups(RemovalStatus::NotFound);
    } else {
        row.record_patch_groups(RemovalStatus::WouldRemove);
        for group in &remnants.groups {
            row.action(format!("Would remove {} from patch group {group}", target.key));
        }
    }
}

/// Returns the sub-actions that failed. Each one runs regardless of the
/// others.
fn remove(
    ctx: &StepContext<'_>,
    target: &Target,
    row: &mut ResultRow,
    remnants: &Remnants,
) -> Vec<String> {
    let services = ctx.services;
    let mut failures = Vec::new();

    let mut computer_removed = false;
    match &remnants.computer {
        Some(computer) => match services.directory.remove_computer(computer) {
            Ok(()) => {
                computer_removed = true;
                row.record_directory(RemovalStatus::Removed);
                row.action(format!(
                    "Removed AD computer account {}",
                    computer.distinguished_name
                ));
            }
            Err(e) if e.is_not_found() => row.record_directory(RemovalStatus::NotFound),
            Err(e) => {
                failures.push(format!("directory: {e}"));
                row.record_directory(RemovalStatus::Failed(e.to_string()));
            }
        },
        None => row.record_directory(RemovalStatus::NotFound),
    }

    let mut dns_errors = Vec::new();
    let mut dns_removed = Vec::new();
    if remnants.a_record.is_some() {
        match services
            .dns
            .remove_record(&ctx.config.dns_zone, &target.key, DnsRecordType::A)
        {
            Ok(()) => dns_removed.push("A"),
            Err(e) if e.is_not_found() => {}
            Err(e) => dns_errors.push(format!("A record: {e}")),
        }
    }
    if let Some(ptr) = &remnants.ptr {
        match services
            .dns
            .remove_record(&ptr.zone, &ptr.name, DnsRecordType::Ptr)
        {
            Ok(()) => dns_removed.push("PTR"),
            Err(e) if e.is_not_found() => {}
            Err(e) => dns_errors.push(format!("PTR record: {e}")),
        }
    }
    if !dns_removed.is_empty() {
        row.action(format!(
            "Removed DNS {} for {}",
            dns_removed.join("/"),
            target.key
        ));
    }
    if !dns_errors.is_empty() {
        row.record_dns(RemovalStatus::Failed(dns_errors.join("; ")));
        failures.extend(dns_errors.into_iter().map(|e| format!("dns: {e}")));
    } else if dns_removed.is_empty() {
        row.record_dns(RemovalStatus::NotFound);
    } else {
        row.record_dns(RemovalStatus::Removed);
    }

    if remnants.groups.is_empty() {
        row.record_patch_groups(RemovalStatus::NotFound);
    } else if computer_removed {
        // Memberships are held on the computer object and went with it.
        row.record_patch_groups(RemovalStatus::RemovedWithComputer);
        for group in &remnants.groups {
            row.action(format!(
                "Removed {} from patch group {group} with its computer account",
                target.key
            ));
        }
    } else if let Some(computer) = &remnants.computer {
        let mut group_errors = Vec::new();
        for group in &remnants.groups {
            match services.directory.remove_from_group(computer, group) {
                Ok(()) => row.action(format!("Removed {} from patch group {group}", target.key)),
                Err(e) if e.is_not_found() => {}
                Err(e) => group_errors.push(format!("{group}: {e}")),
            }
        }
        if group_errors.is_empty() {
            row.record_patch_groups(RemovalStatus::Removed);
        } else {
            row.record_patch_groups(RemovalStatus::Failed(group_errors.join("; ")));
            failures.extend(group_errors.into_iter().map(|e| format!("patch group {e}")));
        }
    }

    failures
}
