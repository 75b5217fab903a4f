//! Host address classification and short-name derivation.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use super::ssh_config::HostOverrides;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// What kind of literal the user supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// IPv4 or IPv6 literal.
    Ip,
    /// Dotted name that is not an IP address.
    Fqdn,
    /// Bare name without dots.
    Hostname,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKind::Ip => write!(f, "ip"),
            HostKind::Fqdn => write!(f, "fqdn"),
            HostKind::Hostname => write!(f, "hostname"),
        }
    }
}

/// Canonical connection target for one host.
///
/// `short_name` is derived from the literal input only and is the key used
/// for every per-host file (`<short_name>.hostkey`, `<short_name>.rsc`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    /// What the user provided (e.g. `router1`, `192.168.1.1:2222`).
    pub original: String,

    /// Classification of the literal.
    pub kind: HostKind,

    /// Hostname or IP to dial.
    pub hostname: String,

    /// Port to dial.
    pub port: u16,

    /// User from the per-host overrides, if any.
    pub user: Option<String>,

    /// Storage key for this host.
    pub short_name: String,

    /// Private key to authenticate with.
    pub identity_file: Option<PathBuf>,

    pub identities_only: Option<String>,
    pub forward_agent: Option<String>,
    pub hostkey_algorithms: Option<String>,
    pub pubkey_accepted_algorithms: Option<String>,

    /// Whether the literal carried its own `:port`.
    explicit_port: bool,
}

impl HostAddress {
    /// Classify a literal host string. Never fails.
    pub fn parse(input: &str) -> Self {
        let (host_part, port) = split_host_port(input);

        let (kind, short_name) = if host_part.parse::<IpAddr>().is_ok() {
            (HostKind::Ip, host_part.to_string())
        } else if host_part.contains('.') {
            let short = match host_part.find('.') {
                Some(idx) if idx > 0 => &host_part[..idx],
                _ => host_part,
            };
            (HostKind::Fqdn, short.to_string())
        } else {
            (HostKind::Hostname, host_part.to_string())
        };

        Self {
            original: input.to_string(),
            kind,
            hostname: host_part.to_string(),
            port: port.unwrap_or(DEFAULT_PORT),
            user: None,
            short_name,
            identity_file: None,
            identities_only: None,
            forward_agent: None,
            hostkey_algorithms: None,
            pubkey_accepted_algorithms: None,
            explicit_port: port.is_some(),
        }
    }

    /// Whether the port came from the literal input.
    pub fn has_explicit_port(&self) -> bool {
        self.explicit_port
    }

    /// Merge per-host overrides.
    ///
    /// A configured `HostName` becomes the dial target; a configured port
    /// applies only when the literal had none; remaining fields fill gaps.
    /// `short_name` is never touched.
    pub fn enrich(&mut self, overrides: HostOverrides) {
        if let Some(hostname) = overrides.hostname {
            self.hostname = hostname;
        }
        if !self.explicit_port {
            if let Some(port) = overrides.port {
                self.port = port;
            }
        }
        fill(&mut self.user, overrides.user);
        fill(&mut self.identity_file, overrides.identity_file);
        fill(&mut self.identities_only, overrides.identities_only);
        fill(&mut self.forward_agent, overrides.forward_agent);
        fill(&mut self.hostkey_algorithms, overrides.hostkey_algorithms);
        fill(
            &mut self.pubkey_accepted_algorithms,
            overrides.pubkey_accepted_algorithms,
        );
    }

    /// `host:port` form for dialing.
    pub fn socket_addr(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Split an optional trailing `:port`.
///
/// Bracketed IPv6 (`[::1]:2222`) is supported; a bare IPv6 literal has
/// several colons and is returned whole. A port that is not a valid `u16`
/// leaves the input unsplit.
fn split_host_port(input: &str) -> (&str, Option<u16>) {
    if let Some(rest) = input.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let host = &rest[..end];
            let tail = &rest[end + 1..];
            if tail.is_empty() {
                return (host, None);
            }
            if let Some(port) = tail.strip_prefix(':').and_then(|p| p.parse().ok()) {
                return (host, Some(port));
            }
        }
        return (input, None);
    }

    match input.split_once(':') {
        Some((host, port)) if !port.contains(':') && !host.is_empty() => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (input, None),
        },
        _ => (input, None),
    }
}
