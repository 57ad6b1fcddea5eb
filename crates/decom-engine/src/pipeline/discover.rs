use chrono::Utc;
use decom_core::errors::DecomError;
use decom_core::hostname::ticketed_name;
use decom_core::state::ResultRow;
use decom_core::target::Target;
use decom_core::types::PowerState;

use super::StepContext;

/// Step 1: resolve the VM, probe the host, and age powered-off VMs.
pub(crate) fn run(
    ctx: &StepContext<'_>,
    target: &mut Target,
    row: &mut ResultRow,
) -> Result<(), DecomError> {
    let platform = &ctx.services.platform;

    // A VM renamed by an earlier shutdown step carries the ticket suffix.
    let mut candidates = vec![target.name.clone()];
    if !target.key.eq_ignore_ascii_case(&target.name) {
        candidates.push(target.key.clone());
    }
    if let Some(ticket) = &target.change_ticket {
        candidates.push(ticketed_name(&target.key, ticket));
    }
    let mut vm = None;
    for name in &candidates {
        vm = platform.find_vm(name)?;
        if vm.is_some() {
            break;
        }
    }

    let connectivity = ctx.services.probe.probe(&target.key);
    row.record_connectivity(connectivity);

    let Some(vm) = vm else {
        row.record_vm_found(false);
        row.note("VM not found on platform");
        target.vm = None;
        tracing::info!(host = %target.key, ?connectivity, "no VM on platform");
        return Ok(());
    };

    row.record_vm_found(true);
    row.refresh_power_state(vm.power_state);
    tracing::info!(
        host = %target.key,
        vm = %vm.name,
        power = ?vm.power_state,
        ?connectivity,
        "discovered"
    );

    let powered_off = vm.power_state == PowerState::PoweredOff;
    let vm = target.vm.insert(vm);
    if powered_off {
        match platform.power_off_event(vm)? {
            Some(at) => {
                let days = (Utc::now() - at).num_days().max(0);
                row.record_days_powered_off(days);
            }
            None => row.note("no power-off event in platform history"),
        }
    }
    Ok(())
}
