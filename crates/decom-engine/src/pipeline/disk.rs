use decom_core::errors::DecomError;
use decom_core::state::{DiskStatus, ResultRow};
use decom_core::target::Target;
use decom_core::types::PowerState;

use super::StepContext;

/// Step 6: permanently delete stale VMs that are still powered off.
///
/// Only reached once the operator has typed the deletion token (or in
/// dry-run, where nothing is deleted).
pub(crate) fn run(
    ctx: &StepContext<'_>,
    target: &mut Target,
    row: &mut ResultRow,
) -> Result<(), DecomError> {
    if row.stale != Some(true) {
        return Ok(());
    }
    let Some(vm) = target.vm.clone() else {
        return Ok(());
    };

    let platform = &ctx.services.platform;
    let power = platform.power_state(&vm).map_err(|e| {
        row.record_disk(DiskStatus::Failed(e.to_string()));
        DecomError::from(e)
    })?;
    row.refresh_power_state(power);
    if power != PowerState::PoweredOff {
        row.record_disk(DiskStatus::SkippedNotOff);
        return Ok(());
    }

    if ctx.dry_run() {
        row.record_disk(DiskStatus::WouldDelete);
        row.action(format!("Would permanently delete VM {} and its disks", vm.name));
        return Ok(());
    }

    match platform.delete_permanently(&vm) {
        Ok(()) => {
            tracing::warn!(host = %target.key, vm = %vm.name, "VM deleted from disk");
            row.record_disk(DiskStatus::Deleted);
            row.action(format!("Deleted VM {} and its disks", vm.name));
            target.vm = None;
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            row.record_disk(DiskStatus::Deleted);
            row.note(format!("VM {} was already gone", vm.name));
            target.vm = None;
            Ok(())
        }
        Err(e) => {
            row.record_disk(DiskStatus::Failed(e.to_string()));
            Err(e.into())
        }
    }
}

/// Step 6 without confirmation: every candidate is recorded as declined.
pub(crate) fn decline(
    _ctx: &StepContext<'_>,
    target: &mut Target,
    row: &mut ResultRow,
) -> Result<(), DecomError> {
    if row.stale == Some(true) && target.vm.is_some() {
        row.record_disk(DiskStatus::Declined);
    }
    Ok(())
}
