//! The operator session: step menu, exports and the deletion gate.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use decom_core::errors::DecomError;
use decom_core::types::StepId;
use decom_engine::pipeline::Sequencer;
use decom_engine::state::report::{export_discovery, export_results};

use crate::credentials;

/// One line of menu input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Step(StepId),
    All,
    Report,
    Export,
    Quit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Ok(n) = input.parse::<u8>() {
            return StepId::from_number(n).map(MenuChoice::Step);
        }
        match input.to_ascii_uppercase().as_str() {
            "A" => Some(MenuChoice::All),
            "R" => Some(MenuChoice::Report),
            "E" => Some(MenuChoice::Export),
            "Q" => Some(MenuChoice::Quit),
            _ => None,
        }
    }
}

const MENU: &str = "\
  1  Discover VMs, connectivity and power-off age
  2  Remove monitoring agents
  3  Shut down guests and clean VM metadata
  4  Remove directory, DNS and patch-group entries (safety gated)
  5  Flag stale VMs
  6  Permanently delete stale VMs
  A  Run steps 1-5
  R  Show summary
  E  Export CSVs
  Q  Export and quit";

/// A connected sequencer plus where its artifacts go.
pub struct Session {
    seq: Sequencer,
    stamp: String,
    out_dir: PathBuf,
    delete_token: Option<String>,
}

impl Session {
    pub fn new(seq: Sequencer, stamp: &str, delete_token: Option<String>) -> Self {
        let out_dir = seq.config().output_dir.clone();
        Self {
            seq,
            stamp: stamp.to_string(),
            out_dir,
            delete_token,
        }
    }

    pub fn run_all(&mut self) -> Result<()> {
        self.seq.run_all()?;
        self.export_discovery()
    }

    pub fn run_step(&mut self, step: StepId) -> Result<()> {
        match step {
            StepId::DiskRemoval => self.remove_disks()?,
            StepId::Discover => {
                self.seq.run_step(step)?;
                self.export_discovery()?;
            }
            _ => self.seq.run_step(step)?,
        }
        Ok(())
    }

    /// Step 6. Destructive mode needs the deletion token, typed or passed in.
    fn remove_disks(&mut self) -> Result<()> {
        if self.seq.rows().iter().all(|r| r.stale.is_none()) {
            self.seq.run_step(StepId::AgeTriage)?;
        }
        if self.seq.mode().is_dry_run() {
            self.seq.remove_disks(None)?;
            return Ok(());
        }

        let candidates: Vec<String> = self
            .seq
            .deletion_candidates()
            .iter()
            .map(|r| match r.days_powered_off {
                Some(days) => format!("    {} (off {days} days)", r.host),
                None => format!("    {}", r.host),
            })
            .collect();
        if candidates.is_empty() {
            println!("No stale VMs to delete.");
            return Ok(());
        }

        let expected = self.seq.config().deletion_confirmation.clone();
        let prompt = format!(
            "The following VMs and their disks will be permanently deleted:\n{}",
            candidates.join("\n")
        );
        match credentials::confirm(&prompt, &expected, self.delete_token.as_deref()) {
            Ok(()) => self.seq.remove_disks(Some(&expected))?,
            Err(DecomError::Cancelled) => {
                println!("Deletion declined.");
                self.seq.remove_disks(None)?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn export_discovery(&self) -> Result<()> {
        let path = export_discovery(&self.out_dir, &self.stamp, self.seq.targets(), self.seq.rows())?;
        tracing::info!(path = %path.display(), "discovery exported");
        Ok(())
    }

    pub fn export(&self) -> Result<()> {
        let path = export_results(&self.out_dir, &self.stamp, self.seq.rows())?;
        tracing::info!(path = %path.display(), "results exported");
        println!("Results written to {}", path.display());
        Ok(())
    }

    pub fn print_summary(&self) {
        println!("{}", self.seq.summary());
    }

    /// Export, print the summary and close the platform session.
    pub fn finish(mut self) -> Result<()> {
        let exported = self.export();
        self.print_summary();
        self.seq.disconnect();
        exported
    }

    /// Read choices until `Q` or end of input.
    pub fn menu(mut self) -> Result<()> {
        loop {
            println!("\n[{}] {} target(s)\n{MENU}", self.seq.mode(), self.seq.targets().len());
            print!("> ");
            io::stdout().flush()?;
            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                break;
            }
            let Some(choice) = MenuChoice::parse(&line) else {
                println!("Unknown choice: {}", line.trim());
                continue;
            };
            let outcome = match choice {
                MenuChoice::Step(step) => self.run_step(step),
                MenuChoice::All => self.run_all(),
                MenuChoice::Report => {
                    self.print_summary();
                    Ok(())
                }
                MenuChoice::Export => self.export(),
                MenuChoice::Quit => break,
            };
            if let Err(e) = outcome {
                if is_fatal(&e) {
                    let _ = self.export();
                    return Err(e);
                }
                tracing::error!(error = %e, "menu action failed");
            }
        }
        self.finish()
    }
}

fn is_fatal(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<DecomError>(),
        Some(DecomError::Fatal(_)) | Some(DecomError::Cancelled)
    )
}
