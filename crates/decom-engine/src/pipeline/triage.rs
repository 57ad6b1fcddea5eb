use decom_core::errors::DecomError;
use decom_core::state::ResultRow;
use decom_core::target::Target;

use super::StepContext;

/// Step 5: flag VMs powered off for longer than the stale threshold.
pub(crate) fn run(
    ctx: &StepContext<'_>,
    target: &mut Target,
    row: &mut ResultRow,
) -> Result<(), DecomError> {
    let threshold = ctx.config.stale_after_days;
    let stale = row.days_powered_off.is_some_and(|days| days > threshold);
    row.record_stale(stale);
    if stale {
        tracing::info!(
            host = %target.key,
            days = row.days_powered_off.unwrap_or_default(),
            threshold,
            "stale VM"
        );
    }
    Ok(())
}
