//! Remote execution under a hard wall-clock deadline.

pub mod registry;
pub mod runner;
pub mod transports;

use async_trait::async_trait;
use decom_core::errors::RemoteError;
use decom_core::traits::{Credential, RemoteOutput, WorkDescriptor};

pub use registry::TaskRegistry;
pub use runner::RemoteRunner;

/// A way of getting a work unit onto a host (WinRM, guest operations, ...).
///
/// Implementations must stop their underlying process when the returned
/// future is dropped; that is how the runner enforces its deadline.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        host: &str,
        credential: &Credential,
        work: &WorkDescriptor,
    ) -> Result<RemoteOutput, RemoteError>;
}
