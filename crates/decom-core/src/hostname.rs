//! Name rules shared by the monitoring, directory and DNS steps.
//!
//! Platform inventory names carry decoration that directory and DNS never
//! see: a descriptive suffix after `" - "`, or the change ticket appended when
//! the VM was renamed during a previous run. Lookups use the bare short name;
//! reports keep the original.

use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator between a hostname and a free-text description in VM names.
pub const DESCRIPTION_SEPARATOR: &str = " - ";

/// Ticket-shaped suffixes stripped even without a supplied ticket. Short
/// numbers like `APP-CR01` are legitimate host names and stay.
static TICKET_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)-(CHG|RITM|REQ|INC|TASK)\d{5,}$").expect("ticket suffix pattern is valid")
});

/// Derive the directory/DNS lookup key from a platform or operator name.
///
/// `ticket` is the target's own change ticket, stripped when present as a
/// `-<ticket>` suffix; otherwise any well-known ticket suffix is stripped.
pub fn lookup_key(name: &str, ticket: Option<&str>) -> String {
    let mut key = name.trim();

    if let Some((head, _)) = key.split_once(DESCRIPTION_SEPARATOR) {
        key = head.trim_end();
    }
    if let Some((head, _)) = key.split_once('.') {
        key = head;
    }

    let mut key = key.to_string();
    if let Some(ticket) = ticket.map(str::trim).filter(|t| !t.is_empty()) {
        let suffix = format!("-{}", ticket.to_ascii_uppercase());
        if key.to_ascii_uppercase().ends_with(&suffix) {
            key.truncate(key.len() - suffix.len());
        }
    }
    let key = TICKET_SUFFIX.replace(&key, "");
    key.trim().to_ascii_uppercase()
}

/// Whether `name` already embeds `ticket` as a suffix.
pub fn has_ticket_suffix(name: &str, ticket: &str) -> bool {
    name.to_ascii_uppercase()
        .ends_with(&format!("-{}", ticket.trim().to_ascii_uppercase()))
}

/// Name a VM is renamed to once the change ticket is embedded.
pub fn ticketed_name(name: &str, ticket: &str) -> String {
    if has_ticket_suffix(name, ticket) {
        name.to_string()
    } else {
        format!("{}-{}", name.trim(), ticket.trim().to_ascii_uppercase())
    }
}

/// Fully qualified name built from a short key when nothing better is known.
pub fn constructed_fqdn(key: &str, domain_suffix: &str) -> String {
    let suffix = domain_suffix.trim().trim_start_matches('.');
    if suffix.is_empty() {
        key.to_ascii_lowercase()
    } else {
        format!("{}.{}", key.to_ascii_lowercase(), suffix.to_ascii_lowercase())
    }
}

/// Location of a PTR record inside its /24 reverse zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtrLocation {
    pub zone: String,
    pub name: String,
}

/// Reverse the first three octets into the `/24` zone; the last octet names
/// the record.
pub fn ptr_location(ip: Ipv4Addr) -> PtrLocation {
    let [a, b, c, d] = ip.octets();
    PtrLocation {
        zone: format!("{c}.{b}.{a}.in-addr.arpa"),
        name: d.to_string(),
    }
}
