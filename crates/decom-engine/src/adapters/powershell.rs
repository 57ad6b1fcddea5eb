//! Minimal PowerShell host used by every adapter.
//!
//! Each call spawns a fresh `powershell -NoProfile -NonInteractive` process,
//! hands it the script on the command line, and secrets through environment
//! variables so they never appear in process listings.

use std::process::{Command, Stdio};

use decom_core::errors::CollaboratorError;
use decom_core::traits::Credential;
use serde::de::DeserializeOwned;

/// Exit code scripts use to signal that the target could not be reached.
pub const EXIT_UNREACHABLE: i32 = 3;
/// Exit code scripts use to signal that the requested object does not exist.
pub const EXIT_NOT_FOUND: i32 = 4;

/// Prelude that turns `DECOM_USER`/`DECOM_SECRET` into `$cred`.
pub const CREDENTIAL_PRELUDE: &str = r#"
$ErrorActionPreference = 'Stop'
$ProgressPreference = 'SilentlyContinue'
$cred = $null
if ($env:DECOM_USER) {
    $secure = ConvertTo-SecureString $env:DECOM_SECRET -AsPlainText -Force
    $cred = New-Object System.Management.Automation.PSCredential($env:DECOM_USER, $secure)
}
"#;

#[derive(Debug, thiserror::Error)]
pub enum PsError {
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("script exited with {code}: {stderr}")]
    Exit { code: i32, stderr: String },
    #[error("cannot parse script output: {0}")]
    Parse(String),
}

impl From<PsError> for CollaboratorError {
    fn from(err: PsError) -> Self {
        match err {
            PsError::Exit { code, stderr } if code == EXIT_UNREACHABLE => {
                CollaboratorError::Unreachable(stderr)
            }
            PsError::Exit { code, stderr } if code == EXIT_NOT_FOUND => {
                CollaboratorError::NotFound(stderr)
            }
            other => CollaboratorError::Failed(other.to_string()),
        }
    }
}

/// Launcher configuration shared by the adapters.
#[derive(Debug, Clone)]
pub struct PowerShell {
    program: String,
    credential: Option<Credential>,
}

impl PowerShell {
    pub fn new(credential: Option<Credential>) -> Self {
        let program = if cfg!(windows) { "powershell" } else { "pwsh" };
        Self {
            program: program.to_string(),
            credential,
        }
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Full script text: credential prelude, then the body.
    pub fn compose(body: &str) -> String {
        format!("{CREDENTIAL_PRELUDE}\n{body}")
    }

    /// Environment handed to the child process.
    pub fn environment(&self, extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(cred) = &self.credential {
            env.push(("DECOM_USER".to_string(), cred.username.clone()));
            env.push(("DECOM_SECRET".to_string(), cred.secret().to_string()));
        }
        env.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        env
    }

    pub fn args(body: &str) -> Vec<String> {
        vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-ExecutionPolicy".to_string(),
            "Bypass".to_string(),
            "-Command".to_string(),
            Self::compose(body),
        ]
    }

    /// Run a script to completion and return its stdout.
    pub fn run(&self, body: &str, extra_env: &[(&str, &str)]) -> Result<String, PsError> {
        tracing::trace!(program = %self.program, "spawning powershell");
        let output = Command::new(&self.program)
            .args(Self::args(body))
            .envs(self.environment(extra_env))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| PsError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(PsError::Exit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Run a script whose last statement emits `ConvertTo-Json`.
    ///
    /// Empty output deserializes as JSON `null`, so `Option<T>` targets read
    /// "nothing found" naturally.
    pub fn run_json<T: DeserializeOwned>(
        &self,
        body: &str,
        extra_env: &[(&str, &str)],
    ) -> Result<T, PsError> {
        let stdout = self.run(body, extra_env)?;
        parse_json(&stdout)
    }
}

/// Parse PowerShell JSON output, treating blank output as `null`.
pub fn parse_json<T: DeserializeOwned>(stdout: &str) -> Result<T, PsError> {
    let trimmed = stdout.trim().trim_start_matches('\u{feff}');
    let text = if trimmed.is_empty() { "null" } else { trimmed };
    serde_json::from_str(text).map_err(|e| PsError::Parse(format!("{e}: {text}")))
}

/// Quote a value as a single-quoted PowerShell literal.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_doubles_single_quotes() {
        assert_eq!(ps_quote("O'Brien"), "'O''Brien'");
        assert_eq!(ps_quote("plain"), "'plain'");
    }

    #[test]
    fn blank_output_is_null() {
        let v: Option<u32> = parse_json("  \r\n").unwrap();
        assert_eq!(v, None);
        let v: Option<u32> = parse_json("7").unwrap();
        assert_eq!(v, Some(7));
    }

    #[test]
    fn secrets_travel_in_environment_only() {
        let ps = PowerShell::new(Some(Credential::new("CORP\\svc", "s3cret")));
        let args = PowerShell::args("Get-Date");
        assert!(args.iter().all(|a| !a.contains("s3cret")));
        let env = ps.environment(&[("DECOM_TARGET", "UKPRAP080")]);
        assert!(env.contains(&("DECOM_SECRET".to_string(), "s3cret".to_string())));
        assert!(env.contains(&("DECOM_TARGET".to_string(), "UKPRAP080".to_string())));
    }

    #[test]
    fn exit_codes_map_to_taxonomy() {
        let unreachable: CollaboratorError = PsError::Exit {
            code: EXIT_UNREACHABLE,
            stderr: "no route".into(),
        }
        .into();
        assert_eq!(unreachable, CollaboratorError::Unreachable("no route".into()));

        let missing: CollaboratorError = PsError::Exit {
            code: EXIT_NOT_FOUND,
            stderr: "gone".into(),
        }
        .into();
        assert!(missing.is_not_found());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let ps = PowerShell::new(None).with_program("definitely-not-a-real-shell-binary");
        let err = ps.run("Get-Date", &[]).unwrap_err();
        assert!(matches!(err, PsError::Spawn { .. }));
    }
}
