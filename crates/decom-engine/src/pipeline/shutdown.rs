use chrono::Local;
use decom_core::config::RunConfig;
use decom_core::errors::{CollaboratorError, DecomError};
use decom_core::hostname::{has_ticket_suffix, ticketed_name};
use decom_core::state::{ResultRow, ShutdownStatus};
use decom_core::target::Target;
use decom_core::traits::{AffinityChange, CollabResult, VmRecord};
use decom_core::types::PowerState;

use super::StepContext;

/// A VM notes line starting with this marks an earlier annotation.
pub(crate) const NOTES_MARKER: &str = "Decommissioned";

pub(crate) fn decommission_note(config: &RunConfig, ticket: Option<&str>) -> String {
    let stamp = Local::now().format("%Y-%m-%d %H:%M");
    match ticket {
        Some(ticket) => format!("{NOTES_MARKER} {stamp} by {} ({ticket})", config.operator),
        None => format!("{NOTES_MARKER} {stamp} by {}", config.operator),
    }
}

fn has_decommission_note(notes: &str) -> bool {
    notes.lines().any(|line| line.trim_start().starts_with(NOTES_MARKER))
}

/// Step 3: power the VM off, then annotate, rename, untag and drop it from
/// affinity rules.
pub(crate) fn run(
    ctx: &StepContext<'_>,
    target: &mut Target,
    row: &mut ResultRow,
) -> Result<(), DecomError> {
    let Some(vm) = target.vm.clone() else {
        row.record_shutdown(ShutdownStatus::VmNotFound);
        return Ok(());
    };

    let power = ctx.services.platform.power_state(&vm).map_err(|e| {
        row.record_shutdown(ShutdownStatus::Failed(e.to_string()));
        DecomError::from(e)
    })?;
    row.refresh_power_state(power);

    match power {
        PowerState::PoweredOff => row.record_shutdown(ShutdownStatus::AlreadyOff),
        PowerState::Unknown => {
            row.record_shutdown(ShutdownStatus::Failed("power state unknown".to_string()));
            row.error("shutdown", format!("platform reports unknown power state for {}", vm.name));
            return Ok(());
        }
        PowerState::PoweredOn if ctx.dry_run() => {
            row.record_shutdown(ShutdownStatus::WouldShutDown);
            if vm.tools_status.is_healthy() {
                row.action(format!("Would shut down guest OS on {}", vm.name));
            } else {
                row.action(format!(
                    "Would force power off {} (guest tools {})",
                    vm.name, vm.tools_status
                ));
            }
        }
        PowerState::PoweredOn => {
            let status = match power_down(ctx, &vm, row) {
                Ok(status) => status,
                Err(e) => {
                    row.record_shutdown(ShutdownStatus::Failed(e.to_string()));
                    return Err(e.into());
                }
            };
            let off = status.is_off();
            row.record_shutdown(status);
            if !off {
                row.error("shutdown", format!("{} still running after forced power off", vm.name));
                return Ok(());
            }
        }
    }

    let failures = clean_metadata(ctx, target, row);
    if failures.is_empty() {
        Ok(())
    } else {
        Err(DecomError::PartialFailure {
            step: "shutdown".to_string(),
            errors: failures,
        })
    }
}

/// Graceful shutdown when guest tools allow it, forced power-off otherwise
/// or when the grace period runs out.
fn power_down(
    ctx: &StepContext<'_>,
    vm: &VmRecord,
    row: &mut ResultRow,
) -> CollabResult<ShutdownStatus> {
    let platform = &ctx.services.platform;

    if vm.tools_status.is_healthy() {
        match platform.shutdown_guest(vm) {
            Ok(()) => {
                row.action(format!("Requested guest shutdown of {}", vm.name));
                let stopped = ctx
                    .shutdown_grace
                    .poll_until(|| Ok::<_, CollaboratorError>(platform.power_state(vm)? == PowerState::PoweredOff))?;
                if stopped {
                    tracing::info!(vm = %vm.name, "guest shut down");
                    row.refresh_power_state(PowerState::PoweredOff);
                    return Ok(ShutdownStatus::ShutDown);
                }
                row.note(format!(
                    "guest still running after {}s grace",
                    ctx.shutdown_grace.total_wait().as_secs()
                ));
            }
            Err(e) => row.note(format!("graceful shutdown failed: {e}")),
        }
    } else {
        row.note(format!("guest tools {}, skipped graceful shutdown", vm.tools_status));
    }

    tracing::warn!(vm = %vm.name, "forcing power off");
    platform.force_power_off(vm)?;
    row.action(format!("Forced power off {}", vm.name));
    let power = platform.power_state(vm)?;
    row.refresh_power_state(power);
    Ok(if power == PowerState::PoweredOff {
        ShutdownStatus::ForcedOff
    } else {
        ShutdownStatus::StillRunning
    })
}

/// Returns the sub-actions that failed; each is independent of the others.
fn clean_metadata(ctx: &StepContext<'_>, target: &mut Target, row: &mut ResultRow) -> Vec<String> {
    let platform = &ctx.services.platform;
    let dry = ctx.dry_run();
    let ticket = target.change_ticket.clone();
    let Some(vm) = target.vm.as_mut() else {
        return Vec::new();
    };
    let mut failures = Vec::new();

    if !has_decommission_note(&vm.notes) {
        let note = decommission_note(ctx.config, ticket.as_deref());
        let notes = if vm.notes.trim().is_empty() {
            note.clone()
        } else {
            format!("{}\n{note}", vm.notes.trim_end())
        };
        if dry {
            row.action(format!("Would annotate {}: {note}", vm.name));
        } else {
            match platform.set_notes(vm, &notes) {
                Ok(()) => {
                    vm.notes = notes;
                    row.action(format!("Annotated {}: {note}", vm.name));
                }
                Err(e) => failures.push(format!("notes: {e}")),
            }
        }
    }

    if let Some(ticket) = ticket.as_deref() {
        if !has_ticket_suffix(&vm.name, ticket) {
            let new_name = ticketed_name(&vm.name, ticket);
            if dry {
                row.action(format!("Would rename {} to {new_name}", vm.name));
            } else {
                match platform.rename(vm, &new_name) {
                    Ok(()) => {
                        row.action(format!("Renamed {} to {new_name}", vm.name));
                        vm.name = new_name;
                    }
                    Err(e) => failures.push(format!("rename: {e}")),
                }
            }
        }
    }

    if dry {
        row.action(format!("Would remove all tag assignments from {}", vm.name));
    } else {
        match platform.remove_all_tags(vm) {
            Ok(0) => {}
            Ok(n) => row.action(format!("Removed {n} tag assignment(s) from {}", vm.name)),
            Err(e) => failures.push(format!("tags: {e}")),
        }
    }

    match platform.list_affinity_rules(vm) {
        Ok(rules) => {
            for rule in rules {
                let deletes = rule.removal_deletes_rule(&vm.name);
                if dry {
                    if deletes {
                        row.action(format!("Would remove affinity rule {}", rule.name));
                    } else {
                        row.action(format!("Would remove {} from affinity rule {}", vm.name, rule.name));
                    }
                    continue;
                }
                match platform.remove_or_shrink_affinity_rule(&rule, vm) {
                    Ok(AffinityChange::Removed) => {
                        row.action(format!("Removed affinity rule {}", rule.name));
                    }
                    Ok(AffinityChange::Shrunk) => {
                        row.action(format!("Removed {} from affinity rule {}", vm.name, rule.name));
                    }
                    Err(e) => failures.push(format!("affinity rule {}: {e}", rule.name)),
                }
            }
        }
        Err(e) => failures.push(format!("affinity rules: {e}")),
    }

    failures
}
