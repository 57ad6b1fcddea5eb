use std::collections::HashSet;

use anyhow::{Context, Result};

use crate::hostname::lookup_key;
use crate::traits::VmRecord;

/// One decommission candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// Name as supplied by the operator; used for platform lookup and display.
    pub name: String,
    /// Short name used for directory, DNS and monitoring lookups.
    pub key: String,
    pub change_ticket: Option<String>,
    /// Resolved during discovery; owned by the sequencer for the run.
    pub vm: Option<VmRecord>,
}

impl Target {
    pub fn new(name: &str, change_ticket: Option<&str>) -> Self {
        let change_ticket = change_ticket
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_ascii_uppercase);
        Self {
            name: name.trim().to_string(),
            key: lookup_key(name, change_ticket.as_deref()),
            change_ticket,
            vm: None,
        }
    }
}

/// Parsed target list plus any lines that were dropped.
#[derive(Debug, Default)]
pub struct TargetList {
    pub targets: Vec<Target>,
    pub warnings: Vec<String>,
}

/// Parse `HOST` / `HOST,TICKET` lines.
///
/// Blank lines and `#` comments are skipped. Duplicates by lookup key are
/// dropped; the first occurrence wins and keeps its position.
pub fn parse_target_list(content: &str) -> TargetList {
    let mut list = TargetList::default();
    let mut seen = HashSet::new();

    for (i, raw) in content.lines().enumerate() {
        let line = raw.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.splitn(2, ',');
        let name = fields.next().unwrap_or_default().trim();
        let ticket = fields.next();
        if name.is_empty() {
            list.warnings
                .push(format!("line {}: missing host name", i + 1));
            continue;
        }

        let target = Target::new(name, ticket);
        if target.key.is_empty() {
            list.warnings
                .push(format!("line {}: '{name}' has no usable host name", i + 1));
            continue;
        }
        if !seen.insert(target.key.clone()) {
            list.warnings.push(format!(
                "line {}: duplicate of {} ignored",
                i + 1,
                target.key
            ));
            continue;
        }
        list.targets.push(target);
    }
    list
}

/// Read and parse a target list file.
pub fn load_target_list(path: &str) -> Result<TargetList> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read host list {path}"))?;
    Ok(parse_target_list(&content))
}
