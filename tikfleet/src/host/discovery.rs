//! Host list parsing and discovery from exported configuration files.

use std::collections::HashMap;
use std::path::Path;

use super::address::HostAddress;
use crate::error::{ConfigError, Result};

/// Split a comma-separated host list, trimming and dropping empty entries.
pub fn parse_hosts(hosts: &str) -> Vec<String> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(String::from)
        .collect()
}

/// File name pattern of exported router configurations.
pub const DISCOVERY_PATTERN: &str = "router*.rsc";

/// Discover hosts from `router*.rsc` files in `dir`.
///
/// Each file yields `<stem>.home`, sorted by file name.
pub fn discover_hosts(dir: &Path) -> Result<Vec<String>> {
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        DISCOVERY_PATTERN
    );
    let paths = glob::glob(&pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut stems: Vec<String> = paths
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter_map(|path| Some(path.file_stem()?.to_str()?.to_string()))
        .collect();

    if stems.is_empty() {
        return Err(ConfigError::NoHosts.into());
    }

    stems.sort();
    Ok(stems.into_iter().map(|stem| format!("{}.home", stem)).collect())
}

/// Reject host lists in which two inputs share a short name, since they
/// would overwrite each other's host-key and export files.
pub fn check_unique_short_names(hosts: &[String]) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for host in hosts {
        let short_name = HostAddress::parse(host).short_name;
        if let Some(first) = seen.get(&short_name) {
            return Err(ConfigError::DuplicateShortName {
                first: first.to_string(),
                second: host.clone(),
                short_name,
            }
            .into());
        }
        seen.insert(short_name, host);
    }
    Ok(())
}
