//! The decommission sequencer.
//!
//! Steps run batch-over-targets: every target goes through step N before any
//! target starts step N+1. Each step records its outcome on the target's row
//! and never lets one target's failure stop the batch.

mod cleanup;
mod discover;
mod disk;
mod monitoring;
mod shutdown;
mod triage;

use decom_core::config::RunConfig;
use decom_core::errors::DecomError;
use decom_core::state::ResultRow;
use decom_core::target::Target;
use decom_core::traits::{
    ComputePlatform, DirectoryService, DnsService, MonitoringService, ReachabilityProbe,
};
use decom_core::types::{PowerState, RunMode, StepId};

use crate::gates::{GateDecision, SafetyGate};
use crate::retry::RetryPolicy;
use crate::state::Summary;

/// The external systems a run talks to.
pub struct Services {
    pub platform: Box<dyn ComputePlatform>,
    pub directory: Box<dyn DirectoryService>,
    pub dns: Box<dyn DnsService>,
    pub monitoring: Box<dyn MonitoringService>,
    pub probe: Box<dyn ReachabilityProbe>,
}

/// Read-only state every step function sees.
pub(crate) struct StepContext<'a> {
    pub config: &'a RunConfig,
    pub mode: RunMode,
    pub services: &'a Services,
    pub gate: &'a SafetyGate,
    pub shutdown_grace: RetryPolicy,
}

impl StepContext<'_> {
    pub fn dry_run(&self) -> bool {
        self.mode.is_dry_run()
    }

    /// Fresh probe and fresh power-state query; never reuses earlier values.
    /// A failed power query counts as `Unknown`, which keeps the gate shut.
    pub fn evaluate_gate(&self, target: &Target) -> GateDecision {
        let connectivity = self.services.probe.probe(&target.key);
        let power_state = match &target.vm {
            Some(vm) => self.services.platform.power_state(vm).unwrap_or_else(|e| {
                tracing::warn!(host = %target.key, error = %e, "power state query failed");
                PowerState::Unknown
            }),
            None => PowerState::Unknown,
        };
        self.gate.evaluate(connectivity, power_state)
    }
}

type StepFn = fn(&StepContext<'_>, &mut Target, &mut ResultRow) -> Result<(), DecomError>;

/// Drives the batch through the steps and owns the result rows.
pub struct Sequencer {
    config: RunConfig,
    mode: RunMode,
    services: Services,
    gate: SafetyGate,
    targets: Vec<Target>,
    rows: Vec<ResultRow>,
    connected: bool,
}

impl Sequencer {
    pub fn new(config: RunConfig, mode: RunMode, services: Services, targets: Vec<Target>) -> Self {
        let rows = targets.iter().map(|t| ResultRow::new(t, mode)).collect();
        Self {
            config,
            mode,
            services,
            gate: SafetyGate,
            targets,
            rows,
            connected: false,
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn into_rows(mut self) -> Vec<ResultRow> {
        std::mem::take(&mut self.rows)
    }

    /// Rows step 6 would delete: flagged stale by step 5.
    pub fn deletion_candidates(&self) -> Vec<&ResultRow> {
        self.rows.iter().filter(|r| r.stale == Some(true)).collect()
    }

    pub fn summary(&self) -> Summary {
        Summary::tally(self.mode, &self.rows)
    }

    /// Open the platform session. Failure aborts the run before any target
    /// is touched.
    pub fn connect(&mut self) -> Result<(), DecomError> {
        self.services.platform.connect().map_err(|e| {
            DecomError::Fatal(format!(
                "cannot connect to platform {}: {e}",
                self.config.platform_server
            ))
        })?;
        self.connected = true;
        tracing::info!(
            server = %self.config.platform_server,
            mode = %self.mode,
            targets = self.targets.len(),
            "platform session open"
        );
        Ok(())
    }

    /// Close the platform session. Safe to call more than once.
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        if let Err(e) = self.services.platform.disconnect() {
            tracing::warn!(server = %self.config.platform_server, error = %e, "platform disconnect failed");
        }
        self.connected = false;
    }

    /// Steps 1 through 5.
    pub fn run_all(&mut self) -> Result<(), DecomError> {
        for step in StepId::run_all() {
            self.run_step(*step)?;
        }
        Ok(())
    }

    /// Run one step over the batch. Step 6 without a confirmation token is
    /// recorded as declined for every candidate.
    pub fn run_step(&mut self, step: StepId) -> Result<(), DecomError> {
        match step {
            StepId::DiskRemoval => self.remove_disks(None),
            _ => self.run_batch(step, None),
        }
    }

    /// Step 6. `confirmation` must equal the configured deletion token.
    pub fn remove_disks(&mut self, confirmation: Option<&str>) -> Result<(), DecomError> {
        self.run_batch(StepId::DiskRemoval, confirmation)
    }

    fn run_batch(&mut self, step: StepId, confirmation: Option<&str>) -> Result<(), DecomError> {
        if !self.connected {
            return Err(DecomError::Fatal("platform session is not connected".to_string()));
        }
        if step != StepId::Discover {
            self.discover_missing();
        }

        let confirmed = self.mode.is_dry_run()
            || confirmation.is_some_and(|c| c.trim() == self.config.deletion_confirmation);
        let func: StepFn = match step {
            StepId::Discover => discover::run,
            StepId::Monitoring => monitoring::run,
            StepId::Shutdown => shutdown::run,
            StepId::DirectoryDns => cleanup::run,
            StepId::AgeTriage => triage::run,
            StepId::DiskRemoval if confirmed => disk::run,
            StepId::DiskRemoval => disk::decline,
        };

        tracing::info!(step = %step, number = step.number(), mode = %self.mode, "step started");
        let ctx = StepContext {
            config: &self.config,
            mode: self.mode,
            services: &self.services,
            gate: &self.gate,
            shutdown_grace: self.config.shutdown_grace.into(),
        };
        let step_name = step.to_string();
        for (target, row) in self.targets.iter_mut().zip(self.rows.iter_mut()) {
            if let Err(e) = func(&ctx, target, row) {
                tracing::warn!(host = %target.key, step = %step_name, error = %e, "step failed for target");
                row.error(&step_name, &e);
            }
        }
        tracing::info!(step = %step, "step finished");
        Ok(())
    }

    /// Discovery for targets never discovered in this run.
    fn discover_missing(&mut self) {
        let ctx = StepContext {
            config: &self.config,
            mode: self.mode,
            services: &self.services,
            gate: &self.gate,
            shutdown_grace: self.config.shutdown_grace.into(),
        };
        for (target, row) in self.targets.iter_mut().zip(self.rows.iter_mut()) {
            if row.is_discovered() {
                continue;
            }
            tracing::debug!(host = %target.key, "discovering before later step");
            if let Err(e) = discover::run(&ctx, target, row) {
                row.error("discover", &e);
            }
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.disconnect();
    }
}
