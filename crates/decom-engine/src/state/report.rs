//! CSV exports and the end-of-run tally.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use decom_core::state::ResultRow;
use decom_core::target::Target;
use decom_core::types::RunMode;
use serde::Serialize;

use super::lock::atomic_write;

pub const DISCOVERY_PREFIX: &str = "discovery";
pub const RESULTS_PREFIX: &str = "decom-results";

const LIST_SEPARATOR: &str = "; ";
const NOT_EVALUATED: &str = "Not evaluated";

fn show<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn show_debug<T: fmt::Debug>(value: &Option<T>) -> String {
    value.as_ref().map(|v| format!("{v:?}")).unwrap_or_default()
}

fn yes_no(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "Yes",
        Some(false) => "No",
        None => "",
    }
}

/// Pre-action inventory snapshot, one line per target.
#[derive(Debug, Serialize)]
struct DiscoveryLine<'a> {
    host: &'a str,
    vm_name: &'a str,
    lookup_key: &'a str,
    change_ticket: &'a str,
    connectivity: String,
    power_state: String,
    days_powered_off: String,
    guest_hostname: &'a str,
    guest_tools: String,
}

#[derive(Debug, Serialize)]
struct ResultLine<'a> {
    host: &'a str,
    lookup_key: &'a str,
    change_ticket: &'a str,
    mode: String,
    vm_found: &'static str,
    fqdn: &'a str,
    connectivity: String,
    power_state: String,
    days_powered_off: String,
    monitoring: String,
    shutdown: String,
    directory: String,
    dns: String,
    patch_groups: String,
    decommission_status: String,
    stale: &'static str,
    disk: String,
    notes: String,
    actions_needed: String,
    processing_errors: String,
}

impl<'a> From<&'a ResultRow> for ResultLine<'a> {
    fn from(row: &'a ResultRow) -> Self {
        Self {
            host: &row.host,
            lookup_key: &row.key,
            change_ticket: row.change_ticket.as_deref().unwrap_or_default(),
            mode: row.mode.to_string(),
            vm_found: yes_no(row.vm_found),
            fqdn: row.fqdn.as_deref().unwrap_or_default(),
            connectivity: show_debug(&row.connectivity),
            power_state: show_debug(&row.power_state),
            days_powered_off: show(&row.days_powered_off),
            monitoring: show(&row.monitoring),
            shutdown: show(&row.shutdown),
            directory: show(&row.directory),
            dns: show(&row.dns),
            patch_groups: show(&row.patch_groups),
            decommission_status: show(&row.readiness),
            stale: yes_no(row.stale),
            disk: show(&row.disk),
            notes: row.notes.join(LIST_SEPARATOR),
            actions_needed: row.actions.join(LIST_SEPARATOR),
            processing_errors: row.processing_errors.join(LIST_SEPARATOR),
        }
    }
}

fn to_csv<S: Serialize>(lines: impl IntoIterator<Item = S>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for line in lines {
        writer.serialize(line)?;
    }
    writer.into_inner().context("cannot finish CSV buffer")
}

/// Discovery snapshot as CSV bytes. `targets` and `rows` are index-aligned.
pub fn discovery_csv(targets: &[Target], rows: &[ResultRow]) -> Result<Vec<u8>> {
    to_csv(targets.iter().zip(rows).map(|(target, row)| {
        let vm = target.vm.as_ref();
        DiscoveryLine {
            host: &target.name,
            vm_name: vm.map(|v| v.name.as_str()).unwrap_or_default(),
            lookup_key: &target.key,
            change_ticket: target.change_ticket.as_deref().unwrap_or_default(),
            connectivity: show_debug(&row.connectivity),
            power_state: show_debug(&row.power_state),
            days_powered_off: show(&row.days_powered_off),
            guest_hostname: vm
                .and_then(|v| v.guest_hostname.as_deref())
                .unwrap_or_default(),
            guest_tools: vm.map(|v| format!("{:?}", v.tools_status)).unwrap_or_default(),
        }
    }))
}

pub fn results_csv(rows: &[ResultRow]) -> Result<Vec<u8>> {
    to_csv(rows.iter().map(ResultLine::from))
}

fn export(dir: &Path, prefix: &str, stamp: &str, content: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create output directory {}", dir.display()))?;
    let path = dir.join(format!("{prefix}-{stamp}.csv"));
    atomic_write(&path, content)?;
    Ok(path)
}

pub fn export_discovery(
    dir: &Path,
    stamp: &str,
    targets: &[Target],
    rows: &[ResultRow],
) -> Result<PathBuf> {
    export(dir, DISCOVERY_PREFIX, stamp, &discovery_csv(targets, rows)?)
}

pub fn export_results(dir: &Path, stamp: &str, rows: &[ResultRow]) -> Result<PathBuf> {
    export(dir, RESULTS_PREFIX, stamp, &results_csv(rows)?)
}

/// Counts by decommission status category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub mode: RunMode,
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub with_errors: usize,
    pub stale: usize,
}

impl Summary {
    pub fn tally(mode: RunMode, rows: &[ResultRow]) -> Self {
        let mut by_status = BTreeMap::new();
        for row in rows {
            let category = match &row.readiness {
                Some(readiness) => status_category(&readiness.to_string()),
                None => NOT_EVALUATED.to_string(),
            };
            *by_status.entry(category).or_insert(0) += 1;
        }
        Self {
            mode,
            total: rows.len(),
            by_status,
            with_errors: rows.iter().filter(|r| r.has_errors()).count(),
            stale: rows.iter().filter(|r| r.stale == Some(true)).count(),
        }
    }

    pub fn count(&self, status: &str) -> usize {
        self.by_status.get(status).copied().unwrap_or(0)
    }
}

/// "Not yet safe: <reasons>" groups under one category.
fn status_category(status: &str) -> String {
    match status.split_once(':') {
        Some((head, _)) => head.to_string(),
        None => status.to_string(),
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run mode: {}", self.mode)?;
        writeln!(f, "Targets:  {}", self.total)?;
        for (status, count) in &self.by_status {
            writeln!(f, "  {status:<28} {count}")?;
        }
        writeln!(f, "With processing errors: {}", self.with_errors)?;
        write!(f, "Stale (powered off too long): {}", self.stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decom_core::state::Readiness;

    fn row(name: &str, readiness: Option<Readiness>) -> ResultRow {
        let mut r = ResultRow::new(&Target::new(name, Some("CHG0092018")), RunMode::DryRun);
        if let Some(readiness) = readiness {
            r.record_readiness(readiness);
        }
        r
    }

    #[test]
    fn results_csv_joins_list_fields() {
        let mut r = row("UKPRAP216", Some(Readiness::Ready));
        r.action("Would remove AD computer account");
        r.action("Would remove DNS A/PTR for UKPRAP216");
        let bytes = results_csv(&[r]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("host,lookup_key,change_ticket,mode"));
        let body = lines.next().unwrap();
        assert!(body.contains("Ready for decommission"));
        assert!(body.contains(
            "[DRY-RUN] Would remove AD computer account; [DRY-RUN] Would remove DNS A/PTR for UKPRAP216"
        ));
    }

    #[test]
    fn tally_groups_not_yet_safe_reasons() {
        let rows = vec![
            row("A", Some(Readiness::Ready)),
            row("B", Some(Readiness::NotYetSafe(vec!["responds to network probe".into()]))),
            row("C", Some(Readiness::NotYetSafe(vec!["platform reports powered on".into()]))),
            row("D", None),
        ];
        let summary = Summary::tally(RunMode::DryRun, &rows);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.count("Ready for decommission"), 1);
        assert_eq!(summary.count("Not yet safe"), 2);
        assert_eq!(summary.count(NOT_EVALUATED), 1);
        assert!(summary.to_string().contains("Targets:  4"));
    }

    #[test]
    fn exports_land_in_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let targets = vec![Target::new("UKPRAP216", None)];
        let rows = vec![row("UKPRAP216", None)];
        let discovery = export_discovery(&out, "20261019-101500", &targets, &rows).unwrap();
        let results = export_results(&out, "20261019-101500", &rows).unwrap();
        assert!(discovery.ends_with("discovery-20261019-101500.csv"));
        assert!(results.ends_with("decom-results-20261019-101500.csv"));
        let snapshot = std::fs::read_to_string(discovery).unwrap();
        assert!(snapshot.lines().nth(1).unwrap().starts_with("UKPRAP216,,UKPRAP216,"));
    }
}
