//! CLI integration: config checking and the checks that run before any
//! collaborator is contacted.

use test_helpers::{decom, decom_json, stderr, write, VALID_CONFIG};

// ── check-config ────────────────────────────────────────────────

#[test]
fn valid_config_passes() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    let out = decom(dir.path(), &["check-config", "decom.json"], 0);
    assert!(stderr(&out).contains("ok  decom.json"));
}

#[test]
fn valid_config_json_report() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    let v = decom_json(dir.path(), &["check-config", "decom.json", "--json"], 0);
    assert_eq!(v["pass"], true);
    assert_eq!(v["file"], "decom.json");
    assert_eq!(v["issues"].as_array().unwrap().len(), 0);
}

#[test]
fn missing_server_fails_with_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "broken.json",
        r#"{"platform_server": "vcenter01", "domain_suffix": "corp.example.com"}"#,
    );
    let v = decom_json(dir.path(), &["check-config", "broken.json", "--json"], 1);
    assert_eq!(v["pass"], false);
    let issues = v["issues"].as_array().unwrap();
    assert!(issues.iter().any(|i| i["code"] == "E001" && i["level"] == "error"));
}

#[test]
fn unknown_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = VALID_CONFIG.replace("\"stale_after_days\"", "\"stale_days\"");
    write(dir.path(), "typo.json", &config);
    let out = decom(dir.path(), &["check-config", "typo.json"], 1);
    let err = stderr(&out);
    assert!(err.contains("FAIL typo.json"), "{err}");
    assert!(err.contains("error E001"), "{err}");
}

#[test]
fn warnings_fail_only_when_strict() {
    let dir = tempfile::tempdir().unwrap();
    let config = VALID_CONFIG.replace("\"stale_after_days\": 30", "\"stale_after_days\": 2");
    write(dir.path(), "eager.json", &config);

    let v = decom_json(dir.path(), &["check-config", "eager.json", "--json"], 0);
    assert_eq!(v["pass"], true);
    assert!(v["issues"]
        .as_array()
        .unwrap()
        .iter()
        .any(|i| i["code"] == "W002"));

    decom(dir.path(), &["check-config", "eager.json", "--strict"], 1);
}

#[test]
fn unreadable_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = decom(dir.path(), &["check-config", "absent.json"], 1);
    assert!(stderr(&out).contains("cannot read absent.json"));
}

// ── run: argument and input checks ──────────────────────────────

#[test]
fn missing_hosts_file_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    let out = decom(
        dir.path(),
        &["run", "--hosts", "hosts.txt", "--config", "decom.json", "--all"],
        1,
    );
    assert!(stderr(&out).contains("hosts.txt"));
}

#[test]
fn host_list_without_targets_fails() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    write(dir.path(), "hosts.txt", "# nothing to do\n\n");
    let out = decom(
        dir.path(),
        &["run", "--hosts", "hosts.txt", "--config", "decom.json", "--all"],
        1,
    );
    assert!(stderr(&out).contains("no targets"));
}

#[test]
fn step_out_of_range_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    write(dir.path(), "hosts.txt", "UKPRAP216,CHG0092018\n");
    decom(
        dir.path(),
        &["run", "--hosts", "hosts.txt", "--config", "decom.json", "--step", "7"],
        2,
    );
}

#[test]
fn all_and_step_conflict() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    write(dir.path(), "hosts.txt", "UKPRAP216\n");
    decom(
        dir.path(),
        &[
            "run", "--hosts", "hosts.txt", "--config", "decom.json", "--all", "--step", "1",
        ],
        2,
    );
}

#[test]
fn wrong_destructive_token_cancels() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    write(dir.path(), "hosts.txt", "UKPRAP216,CHG0092018\n");
    let out = decom(
        dir.path(),
        &[
            "run",
            "--hosts",
            "hosts.txt",
            "--config",
            "decom.json",
            "--destructive",
            "--confirm",
            "yes",
            "--all",
        ],
        1,
    );
    assert!(stderr(&out).contains("cancelled by operator"));
}

#[test]
fn unattended_destructive_run_without_token_cancels() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    write(dir.path(), "hosts.txt", "UKPRAP216\n");
    let out = decom(
        dir.path(),
        &[
            "run", "--hosts", "hosts.txt", "--config", "decom.json", "--destructive", "--all",
        ],
        1,
    );
    assert!(stderr(&out).contains("cancelled by operator"));
}

#[test]
fn unattended_run_needs_a_username() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    write(dir.path(), "hosts.txt", "UKPRAP216\n");
    let out = decom(
        dir.path(),
        &["run", "--hosts", "hosts.txt", "--config", "decom.json", "--all"],
        1,
    );
    assert!(stderr(&out).contains("username required"));
}

#[test]
fn unattended_run_needs_a_secret() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    write(dir.path(), "hosts.txt", "UKPRAP216\n");
    let out = decom(
        dir.path(),
        &[
            "run", "--hosts", "hosts.txt", "--config", "decom.json", "--all", "--username",
            "CORP\\svc-decom",
        ],
        1,
    );
    assert!(stderr(&out).contains("DECOM_SECRET"));
}

#[test]
fn unknown_power_scheme_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "decom.json", VALID_CONFIG);
    write(dir.path(), "hosts.txt", "UKPRAP216\n");
    decom(
        dir.path(),
        &[
            "power-plan", "--hosts", "hosts.txt", "--config", "decom.json", "--scheme", "turbo",
        ],
        2,
    );
}
