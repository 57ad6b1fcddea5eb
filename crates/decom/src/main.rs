#![forbid(unsafe_code)]

mod console;
mod credentials;
mod logging;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use decom_core::config::{load_config, RunConfig};
use decom_core::errors::IssueLevel;
use decom_core::target::{load_target_list, Target};
use decom_core::traits::{ComputePlatform, Credential};
use decom_core::types::{RunMode, StepId};
use decom_engine::adapters::{
    AdDirectory, IcmpProbe, PowerCliPlatform, PowerShell, ScomMonitoring, WindowsDns,
};
use decom_engine::pipeline::{Sequencer, Services};
use decom_engine::power_plan::{export_power_plan, guest_runner, PowerPlanEnforcer, PowerScheme};
use decom_engine::state::RunLog;

use console::Session;

#[derive(Parser)]
#[command(
    name = "decom",
    version,
    about = "Staged, safety-gated decommissioning of Windows VMs."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the decommission steps over a host list (dry-run unless --destructive).
    Run {
        /// Host list: one `HOST` or `HOST,TICKET` per line.
        #[arg(long)]
        hosts: String,

        /// Run configuration JSON.
        #[arg(long)]
        config: String,

        /// Make real changes. Requires the destructive confirmation token.
        #[arg(long)]
        destructive: bool,

        /// Run only these steps (1-6, repeatable) instead of the menu.
        #[arg(long = "step", value_parser = clap::value_parser!(u8).range(1..=6))]
        steps: Vec<u8>,

        /// Run steps 1-5 without the menu.
        #[arg(long, conflicts_with = "steps")]
        all: bool,

        /// Override the configured output directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Destructive confirmation token, for unattended runs.
        #[arg(long)]
        confirm: Option<String>,

        /// Deletion confirmation token for step 6, for unattended runs.
        #[arg(long)]
        confirm_delete: Option<String>,

        /// Account used for every collaborator (DOMAIN\user).
        #[arg(long, env = "DECOM_USER")]
        username: Option<String>,
    },

    /// Set the active power plan inside running Windows guests.
    PowerPlan {
        /// Host list: one `HOST` or `HOST,TICKET` per line.
        #[arg(long)]
        hosts: String,

        /// Run configuration JSON.
        #[arg(long)]
        config: String,

        /// high-performance, balanced, or a scheme GUID.
        #[arg(long, default_value = "high-performance")]
        scheme: PowerScheme,

        /// Override the configured output directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Account used for the platform and the guests (DOMAIN\user).
        #[arg(long, env = "DECOM_USER")]
        username: Option<String>,
    },

    /// Validate a run configuration file.
    CheckConfig {
        /// Path to the configuration JSON.
        file: String,

        /// Output the report as JSON.
        #[arg(long)]
        json: bool,

        /// Treat warnings as failures.
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Run {
            hosts,
            config,
            destructive,
            steps,
            all,
            output_dir,
            confirm,
            confirm_delete,
            username,
        } => {
            let mode = if destructive {
                RunMode::Destructive
            } else {
                RunMode::DryRun
            };
            cmd_run(RunArgs {
                hosts,
                config,
                mode,
                steps,
                all,
                output_dir,
                confirm,
                confirm_delete,
                username,
            })
        }
        Cmd::PowerPlan {
            hosts,
            config,
            scheme,
            output_dir,
            username,
        } => cmd_power_plan(&hosts, &config, scheme, output_dir, username.as_deref()),
        Cmd::CheckConfig { file, json, strict } => cmd_check_config(&file, json, strict),
    }
}

struct RunArgs {
    hosts: String,
    config: String,
    mode: RunMode,
    steps: Vec<u8>,
    all: bool,
    output_dir: Option<PathBuf>,
    confirm: Option<String>,
    confirm_delete: Option<String>,
    username: Option<String>,
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config = prepare_config(&args.config, args.output_dir)?;
    let targets = read_targets(&args.hosts)?;

    if args.mode == RunMode::Destructive {
        let prompt = format!(
            "DESTRUCTIVE run over {} target(s): VMs will be shut down and directory, DNS and monitoring entries removed.",
            targets.len()
        );
        credentials::confirm(&prompt, &config.destructive_confirmation, args.confirm.as_deref())?;
    }

    let stamp = run_stamp();
    let run_log = RunLog::for_run(&config, &stamp);
    let log_path = run_log.path().to_path_buf();
    logging::init(Some(run_log));
    tracing::info!(mode = %args.mode, targets = targets.len(), log = %log_path.display(), "run started");

    let credential = credentials::collect(args.username.as_deref())?;
    let services = build_services(&config, &credential);
    let mut seq = Sequencer::new(config, args.mode, services, targets);
    seq.connect()?;

    let mut session = Session::new(seq, &stamp, args.confirm_delete);
    if args.all {
        session.run_all()?;
    } else if !args.steps.is_empty() {
        for n in &args.steps {
            let step = StepId::from_number(*n).with_context(|| format!("no step {n}"))?;
            session.run_step(step)?;
        }
    } else {
        return session.menu();
    }
    session.finish()
}

fn cmd_power_plan(
    hosts: &str,
    config: &str,
    scheme: PowerScheme,
    output_dir: Option<PathBuf>,
    username: Option<&str>,
) -> Result<()> {
    let config = prepare_config(config, output_dir)?;
    let targets = read_targets(hosts)?;

    let stamp = run_stamp();
    logging::init(Some(RunLog::for_run(&config, &stamp)));
    let credential = credentials::collect(username)?;

    let shell = PowerShell::new(Some(credential.clone()));
    let platform = PowerCliPlatform::new(shell.clone(), &config.platform_server);
    let probe = IcmpProbe::new(shell.clone());
    let runner = guest_runner(&shell, &config, &credential)?;

    platform
        .connect()
        .with_context(|| format!("cannot connect to platform {}", config.platform_server))?;
    let enforcer = PowerPlanEnforcer {
        platform: &platform,
        probe: &probe,
        runner: &runner,
        credential: &credential,
        timeout: config.remote_timeout(),
        scheme,
    };
    let rows = enforcer.enforce_all(&targets);
    if let Err(e) = platform.disconnect() {
        tracing::warn!(error = %e, "platform disconnect failed");
    }

    for row in &rows {
        println!("  {:<20} {}", row.host, row.status);
    }
    let path = export_power_plan(&config.output_dir, &stamp, &rows)?;
    println!("Results written to {}", path.display());
    Ok(())
}

fn cmd_check_config(file: &str, json_out: bool, strict: bool) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("cannot read {file}"))?;
    let data: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("{file}: invalid JSON"))?;

    let report = decom_core::schema::check(&data, file);
    let warned = report.issues.iter().any(|i| i.level == IssueLevel::Warning);
    let pass = report.pass && !(strict && warned);

    if json_out {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if pass {
            eprintln!("  ok  {file}");
        } else {
            eprintln!("  FAIL {file}");
        }
        for issue in &report.issues {
            let label = match issue.level {
                IssueLevel::Error => "error",
                IssueLevel::Warning => "warn ",
            };
            eprintln!(
                "  {label} {}: {} {}",
                issue.code,
                issue.message,
                issue.path.as_deref().unwrap_or("")
            );
        }
    }

    if !pass {
        bail!("check failed for {file}");
    }
    Ok(())
}

fn prepare_config(path: &str, output_dir: Option<PathBuf>) -> Result<RunConfig> {
    let mut config = load_config(path)?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("cannot create {}", config.output_dir.display()))?;
    Ok(config)
}

fn read_targets(path: &str) -> Result<Vec<Target>> {
    let list = load_target_list(path)?;
    for warning in &list.warnings {
        eprintln!("  warn  {warning}");
    }
    if list.targets.is_empty() {
        bail!("{path}: no targets");
    }
    Ok(list.targets)
}

fn build_services(config: &RunConfig, credential: &Credential) -> Services {
    let shell = PowerShell::new(Some(credential.clone()));
    Services {
        platform: Box::new(PowerCliPlatform::new(shell.clone(), &config.platform_server)),
        directory: Box::new(AdDirectory::new(shell.clone())),
        dns: Box::new(WindowsDns::new(shell.clone(), &config.dns_server)),
        monitoring: Box::new(ScomMonitoring::new(shell.clone(), &config.monitoring_server)),
        probe: Box::new(IcmpProbe::new(shell)),
    }
}

fn run_stamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}
