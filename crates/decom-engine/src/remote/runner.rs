use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use decom_core::errors::RemoteError;
use decom_core::traits::{Credential, RemoteOutput, WorkDescriptor};
use tokio::runtime::Runtime;

use super::registry::TaskRegistry;
use super::RemoteTransport;
use crate::retry::RetryPolicy;

/// Default hard deadline for one unit of remote work.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long to wait for an aborted task to unwind before giving up on it.
const ABORT_GRACE: Duration = Duration::from_secs(2);

/// Blocking facade over the async transports.
///
/// Each call spawns the work on a background task and races it against the
/// deadline; on timeout the task is aborted (killing the child process) and
/// the caller gets `RemoteError::Timeout`. A `ConnectFailure` from the
/// primary transport switches to the fallback, retried per policy.
pub struct RemoteRunner {
    runtime: Runtime,
    primary: Arc<dyn RemoteTransport>,
    fallback: Option<(Arc<dyn RemoteTransport>, RetryPolicy)>,
    registry: TaskRegistry,
}

impl RemoteRunner {
    pub fn new(primary: Arc<dyn RemoteTransport>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("decom-remote")
            .enable_all()
            .build()
            .context("cannot start remote execution runtime")?;
        Ok(Self {
            runtime,
            primary,
            fallback: None,
            registry: TaskRegistry::new(),
        })
    }

    pub fn with_fallback(mut self, transport: Arc<dyn RemoteTransport>, policy: RetryPolicy) -> Self {
        self.fallback = Some((transport, policy));
        self
    }

    /// Transport names in the order they are tried.
    pub fn transport_names(&self) -> Vec<&str> {
        let mut names = vec![self.primary.name()];
        names.extend(self.fallback.iter().map(|(t, _)| t.name()));
        names
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Run `work` on `host`, never blocking longer than `timeout` per
    /// transport attempt (plus a small abort grace).
    pub fn run(
        &self,
        host: &str,
        credential: &Credential,
        work: &WorkDescriptor,
        timeout: Duration,
    ) -> Result<RemoteOutput, RemoteError> {
        let primary = self.run_once(&self.primary, host, credential, work, timeout);

        let (reason, (fallback, policy)) = match (primary, &self.fallback) {
            (Err(RemoteError::ConnectFailure { reason, .. }), Some(fallback)) => (reason, fallback),
            (result, _) => return result,
        };

        tracing::warn!(
            host,
            work = %work.name,
            transport = fallback.name(),
            %reason,
            "primary transport could not connect, using fallback"
        );
        // Only a failed connection is worth another attempt; the work itself
        // must never run twice.
        policy.retry_while(
            |attempt| {
                tracing::debug!(host, attempt, transport = fallback.name(), "fallback attempt");
                self.run_once(fallback, host, credential, work, timeout)
            },
            |e| matches!(e, RemoteError::ConnectFailure { .. }),
        )
    }

    fn run_once(
        &self,
        transport: &Arc<dyn RemoteTransport>,
        host: &str,
        credential: &Credential,
        work: &WorkDescriptor,
        timeout: Duration,
    ) -> Result<RemoteOutput, RemoteError> {
        let task_transport = Arc::clone(transport);
        let task_host = host.to_string();
        let task_credential = credential.clone();
        let task_work = work.clone();

        let mut handle = self.runtime.spawn(async move {
            task_transport
                .execute(&task_host, &task_credential, &task_work)
                .await
        });
        let _guard = self.registry.register(handle.abort_handle());

        self.runtime.block_on(async {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) if join_err.is_cancelled() => Err(RemoteError::Cancelled {
                    host: host.to_string(),
                }),
                Ok(Err(join_err)) => Err(RemoteError::RemoteScript {
                    host: host.to_string(),
                    message: format!("remote task panicked: {join_err}"),
                }),
                Err(_) => {
                    handle.abort();
                    let _ = tokio::time::timeout(ABORT_GRACE, &mut handle).await;
                    tracing::warn!(
                        host,
                        work = %work.name,
                        transport = transport.name(),
                        timeout_secs = timeout.as_secs(),
                        "remote work timed out, task aborted"
                    );
                    Err(RemoteError::Timeout {
                        host: host.to_string(),
                        after: timeout,
                    })
                }
            }
        })
    }
}
