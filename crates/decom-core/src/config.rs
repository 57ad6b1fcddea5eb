use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Bounded retry parameters, shared by every polling call site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_grace_attempts")]
    pub attempts: u32,
    #[serde(default = "default_grace_delay")]
    pub delay_secs: u64,
    #[serde(default = "default_backoff")]
    pub backoff: f64,
    #[serde(default)]
    pub max_delay_secs: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: default_grace_attempts(),
            delay_secs: default_grace_delay(),
            backoff: default_backoff(),
            max_delay_secs: None,
        }
    }
}

/// Everything a run needs to know about the estate.
///
/// Built once at start-up and handed to the sequencer; nothing reads
/// process-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub platform_server: String,
    pub domain_suffix: String,
    pub dns_server: String,
    pub dns_zone: String,
    pub monitoring_server: String,

    #[serde(default = "default_patch_pattern")]
    pub patch_group_pattern: String,

    #[serde(default)]
    pub exception_groups: Vec<String>,

    #[serde(default = "default_stale_days")]
    pub stale_after_days: i64,

    #[serde(default)]
    pub shutdown_grace: RetrySettings,

    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,

    #[serde(default = "default_fallback_attempts")]
    pub fallback_attempts: u32,

    #[serde(default = "default_fallback_delay")]
    pub fallback_delay_secs: u64,

    #[serde(default = "default_log_attempts")]
    pub log_lock_attempts: u32,

    #[serde(default = "default_log_delay")]
    pub log_lock_delay_ms: u64,

    #[serde(default = "default_destructive_confirmation")]
    pub destructive_confirmation: String,

    #[serde(default = "default_deletion_confirmation")]
    pub deletion_confirmation: String,

    #[serde(default = "default_operator")]
    pub operator: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl RunConfig {
    /// Config with the given servers and every other field defaulted.
    pub fn for_servers(
        platform_server: &str,
        domain_suffix: &str,
        dns_server: &str,
        dns_zone: &str,
        monitoring_server: &str,
    ) -> Self {
        Self {
            platform_server: platform_server.to_string(),
            domain_suffix: domain_suffix.to_string(),
            dns_server: dns_server.to_string(),
            dns_zone: dns_zone.to_string(),
            monitoring_server: monitoring_server.to_string(),
            patch_group_pattern: default_patch_pattern(),
            exception_groups: Vec::new(),
            stale_after_days: default_stale_days(),
            shutdown_grace: RetrySettings::default(),
            remote_timeout_secs: default_remote_timeout(),
            fallback_attempts: default_fallback_attempts(),
            fallback_delay_secs: default_fallback_delay(),
            log_lock_attempts: default_log_attempts(),
            log_lock_delay_ms: default_log_delay(),
            destructive_confirmation: default_destructive_confirmation(),
            deletion_confirmation: default_deletion_confirmation(),
            operator: default_operator(),
            output_dir: default_output_dir(),
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn is_exception_group(&self, group: &str) -> bool {
        self.exception_groups
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group.trim()))
    }
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str, origin: &str) -> Result<RunConfig> {
    let data: serde_json::Value =
        serde_json::from_str(content).with_context(|| format!("{origin}: invalid JSON"))?;
    crate::schema::validate(&data).with_context(|| format!("{origin}: invalid config"))?;
    serde_json::from_value(data).with_context(|| format!("{origin}: cannot load config"))
}

/// Load a configuration file from disk.
pub fn load_config(path: &str) -> Result<RunConfig> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?;
    parse_config(&content, path)
}

fn default_patch_pattern() -> String {
    "*Patch*".to_string()
}

fn default_stale_days() -> i64 {
    30
}

fn default_grace_attempts() -> u32 {
    12
}

fn default_grace_delay() -> u64 {
    10
}

fn default_backoff() -> f64 {
    1.0
}

fn default_remote_timeout() -> u64 {
    120
}

fn default_fallback_attempts() -> u32 {
    2
}

fn default_fallback_delay() -> u64 {
    5
}

fn default_log_attempts() -> u32 {
    5
}

fn default_log_delay() -> u64 {
    200
}

fn default_destructive_confirmation() -> String {
    "DECOMMISSION".to_string()
}

fn default_deletion_confirmation() -> String {
    "DELETE".to_string()
}

fn default_operator() -> String {
    "decom".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
