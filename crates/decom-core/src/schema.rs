use anyhow::{bail, Context, Result};
use jsonschema::Validator;
use serde_json::Value;

use crate::errors::{CheckIssue, CheckReport, IssueLevel};

const RUN_CONFIG_SCHEMA: &str = include_str!("../schema/run-config.schema.json");

/// Compile the embedded run-configuration schema.
pub fn validator() -> Result<Validator> {
    let schema: Value =
        serde_json::from_str(RUN_CONFIG_SCHEMA).context("embedded schema is invalid JSON")?;
    Validator::new(&schema).map_err(|e| anyhow::anyhow!("schema compilation failed: {e}"))
}

/// Validate a configuration value, failing with every schema violation.
pub fn validate(data: &Value) -> Result<()> {
    let v = validator()?;
    if v.is_valid(data) {
        return Ok(());
    }
    let mut msgs: Vec<String> = Vec::new();
    for error in v.iter_errors(data) {
        let path = error.instance_path.to_string();
        let loc = if path.is_empty() {
            "(root)".into()
        } else {
            path
        };
        msgs.push(format!("  {loc}: {error}"));
    }
    bail!("validation failed:\n{}", msgs.join("\n"));
}

/// Full check producing a structured report (for `decom check-config --json`).
pub fn check(data: &Value, file: &str) -> CheckReport {
    let mut issues = Vec::new();

    match validator() {
        Ok(v) => {
            for error in v.iter_errors(data) {
                let path = error.instance_path.to_string();
                issues.push(CheckIssue {
                    level: IssueLevel::Error,
                    code: "E001".to_string(),
                    message: error.to_string(),
                    path: Some(if path.is_empty() {
                        "$(root)".to_string()
                    } else {
                        format!("${path}")
                    }),
                });
            }
        }
        Err(e) => issues.push(CheckIssue {
            level: IssueLevel::Error,
            code: "E000".to_string(),
            message: e.to_string(),
            path: None,
        }),
    }

    lint_checks(data, &mut issues);

    let pass = !issues.iter().any(|i| i.level == IssueLevel::Error);
    CheckReport {
        file: file.to_string(),
        pass,
        issues,
    }
}

fn lint_checks(data: &Value, issues: &mut Vec<CheckIssue>) {
    let destructive = data
        .get("destructive_confirmation")
        .and_then(Value::as_str);
    let deletion = data.get("deletion_confirmation").and_then(Value::as_str);
    if destructive.is_some() && destructive == deletion {
        issues.push(CheckIssue {
            level: IssueLevel::Warning,
            code: "W001".to_string(),
            message: "destructive and deletion confirmations should differ".to_string(),
            path: Some("$/deletion_confirmation".to_string()),
        });
    }

    if let Some(days) = data.get("stale_after_days").and_then(Value::as_u64) {
        if days < 7 {
            issues.push(CheckIssue {
                level: IssueLevel::Warning,
                code: "W002".to_string(),
                message: format!("stale_after_days={days} marks recently stopped VMs for deletion"),
                path: Some("$/stale_after_days".to_string()),
            });
        }
    }

    let pattern = data.get("patch_group_pattern").and_then(Value::as_str);
    if matches!(pattern, Some("*")) {
        issues.push(CheckIssue {
            level: IssueLevel::Warning,
            code: "W003".to_string(),
            message: "patch_group_pattern '*' removes every group membership".to_string(),
            path: Some("$/patch_group_pattern".to_string()),
        });
    }
}
