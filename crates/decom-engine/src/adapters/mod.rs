//! PowerShell-module adapters for the external collaborators.
//!
//! VMware PowerCLI for the compute platform, the ActiveDirectory and
//! DnsServer modules for directory and DNS, OperationsManager for
//! monitoring, `Test-Connection` for reachability.

pub mod directory;
pub mod dns;
pub mod monitoring;
pub mod platform;
pub mod powershell;
pub mod probe;

pub use directory::AdDirectory;
pub use dns::WindowsDns;
pub use monitoring::ScomMonitoring;
pub use platform::PowerCliPlatform;
pub use powershell::PowerShell;
pub use probe::IcmpProbe;
