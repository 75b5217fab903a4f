//! Host address resolution.
//!
//! Turns a user-supplied host string into a [`HostAddress`], enriched with
//! any per-host settings from the OpenSSH client configuration.

mod address;
mod discovery;
pub mod ssh_config;

pub use address::{DEFAULT_PORT, HostAddress, HostKind};
pub use discovery::{check_unique_short_names, discover_hosts, parse_hosts};
pub use ssh_config::{HostOverrides, SshClientConfig};

use std::path::PathBuf;

use log::debug;

/// Resolves host strings into connection targets.
#[derive(Debug, Clone, Default)]
pub struct HostResolver {
    overrides: Option<SshClientConfig>,
}

impl HostResolver {
    /// Resolver without any override source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver backed by an already parsed configuration.
    pub fn with_config(config: SshClientConfig) -> Self {
        Self {
            overrides: Some(config),
        }
    }

    /// Resolver backed by `~/.ssh/config`.
    ///
    /// A missing or unreadable file leaves the resolver without overrides.
    pub fn from_user_config() -> Self {
        let Some(path) = Self::user_config_path() else {
            debug!("no home directory, skipping ssh_config overrides");
            return Self::new();
        };

        match SshClientConfig::load(&path) {
            Ok(config) => Self::with_config(config),
            Err(e) => {
                debug!("ssh_config {} not used: {}", path.display(), e);
                Self::new()
            }
        }
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ssh").join("config"))
    }

    /// Classify `input` and merge per-host overrides. Never fails.
    pub fn resolve(&self, input: &str) -> HostAddress {
        let mut address = HostAddress::parse(input);
        if let Some(config) = &self.overrides {
            // Lookups use the literal without any port, like `ssh host`.
            let overrides = config.lookup(&address.hostname);
            address.enrich(overrides);
        }
        debug!(
            "resolved '{}' as {} -> {} (short name '{}')",
            input,
            address.kind,
            address.socket_addr(),
            address.short_name
        );
        address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_overrides() {
        let resolver = HostResolver::new();
        let addr = resolver.resolve("router1.home.local");
        assert_eq!(addr.hostname, "router1.home.local");
        assert_eq!(addr.port, 22);
        assert_eq!(addr.user, None);
    }

    #[test]
    fn test_resolve_with_overrides() {
        let config = SshClientConfig::parse(
            "Host router1\n  HostName 10.0.0.1\n  User admin\n\
             Host router2\n  HostName 10.0.0.2\n  Port 8022\n  User netadmin\n",
        );
        let resolver = HostResolver::with_config(config);

        let addr = resolver.resolve("router1");
        assert_eq!(addr.hostname, "10.0.0.1");
        assert_eq!(addr.user.as_deref(), Some("admin"));
        assert_eq!(addr.short_name, "router1");

        let addr = resolver.resolve("router2");
        assert_eq!(addr.socket_addr(), "10.0.0.2:8022");

        let addr = resolver.resolve("router2:2222");
        assert_eq!(addr.socket_addr(), "10.0.0.2:2222");
    }

    #[test]
    fn test_unmatched_host_keeps_defaults() {
        let resolver = HostResolver::with_config(SshClientConfig::parse("Host other\n  Port 1\n"));
        let addr = resolver.resolve("test-host");
        assert_eq!(addr.hostname, "test-host");
        assert_eq!(addr.port, 22);
        assert_eq!(addr.user, None);
    }
}
