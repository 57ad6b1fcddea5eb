use decom_core::errors::DecomError;
use decom_core::hostname::constructed_fqdn;
use decom_core::state::{MonitoringStatus, ResultRow};
use decom_core::target::Target;

use super::StepContext;

/// FQDN for lookups: directory record, then the guest-reported hostname,
/// then `<key>.<domain suffix>`.
pub(crate) fn resolve_fqdn(ctx: &StepContext<'_>, target: &Target, row: &mut ResultRow) -> String {
    match ctx.services.directory.find_computer(&target.key) {
        Ok(Some(record)) => {
            if let Some(fqdn) = record.dns_host_name.filter(|n| !n.trim().is_empty()) {
                return fqdn.trim().to_ascii_lowercase();
            }
        }
        Ok(None) => {}
        Err(e) => row.note(format!("directory lookup for FQDN failed: {e}")),
    }

    let guest = target
        .vm
        .as_ref()
        .and_then(|vm| vm.guest_hostname.as_deref())
        .map(str::trim)
        .filter(|h| h.contains('.'));
    if let Some(hostname) = guest {
        return hostname.to_ascii_lowercase();
    }

    constructed_fqdn(&target.key, &ctx.config.domain_suffix)
}

/// Step 2: find the monitoring agent by FQDN, then by short name, and
/// deregister it.
pub(crate) fn run(
    ctx: &StepContext<'_>,
    target: &mut Target,
    row: &mut ResultRow,
) -> Result<(), DecomError> {
    let fqdn = resolve_fqdn(ctx, target, row);
    row.refresh_fqdn(fqdn.clone());

    let monitoring = &ctx.services.monitoring;
    let found = match monitoring.find_agent(&fqdn) {
        Ok(None) => monitoring.find_agent(&target.key),
        other => other,
    };
    let agent = match found {
        Ok(Some(agent)) => agent,
        Ok(None) => {
            row.record_monitoring(MonitoringStatus::NotRegistered);
            return Ok(());
        }
        Err(e) => {
            row.record_monitoring(MonitoringStatus::Failed(e.to_string()));
            return Err(e.into());
        }
    };

    if ctx.dry_run() {
        row.record_monitoring(MonitoringStatus::WouldRemove);
        row.action(format!("Would remove monitoring agent {}", agent.display_name));
        return Ok(());
    }

    match monitoring.remove_agent(&agent) {
        Ok(()) => {
            tracing::info!(host = %target.key, agent = %agent.display_name, "monitoring agent removed");
            row.record_monitoring(MonitoringStatus::Removed);
            row.action(format!("Removed monitoring agent {}", agent.display_name));
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            row.record_monitoring(MonitoringStatus::NotRegistered);
            Ok(())
        }
        Err(e) => {
            row.record_monitoring(MonitoringStatus::Failed(e.to_string()));
            Err(e.into())
        }
    }
}
