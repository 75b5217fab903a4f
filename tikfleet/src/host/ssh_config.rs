//! Per-host overrides read from an OpenSSH client configuration file.
//!
//! Only the subset of `ssh_config(5)` needed to reach a device is
//! understood: `Host` blocks with `*`, `?` and `!` patterns, and the
//! `HostName`, `Port`, `User`, `IdentityFile`, `IdentitiesOnly`,
//! `ForwardAgent`, `HostKeyAlgorithms` and `PubkeyAcceptedAlgorithms`
//! keywords. As in OpenSSH, the first value obtained for a keyword wins.
//! `Match` blocks are skipped.

use std::io;
use std::path::{Path, PathBuf};

use glob::Pattern;
use indexmap::IndexMap;

/// Overrides that apply to one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOverrides {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub identities_only: Option<String>,
    pub forward_agent: Option<String>,
    pub hostkey_algorithms: Option<String>,
    pub pubkey_accepted_algorithms: Option<String>,
}

/// One entry of a `Host` line.
#[derive(Debug, Clone)]
struct HostPattern {
    negated: bool,
    pattern: Pattern,
}

impl HostPattern {
    /// Compile an ssh_config pattern. `*` and `?` are wildcards, brackets
    /// are literal.
    fn parse(text: &str) -> Option<Self> {
        let (negated, text) = match text.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let mut escaped = String::with_capacity(text.len());
        for c in text.to_ascii_lowercase().chars() {
            match c {
                '[' | ']' => {
                    escaped.push('[');
                    escaped.push(c);
                    escaped.push(']');
                }
                c => escaped.push(c),
            }
        }

        Pattern::new(&escaped)
            .ok()
            .map(|pattern| Self { negated, pattern })
    }
}

#[derive(Debug, Clone)]
struct HostBlock {
    patterns: Vec<HostPattern>,
    /// Lowercased keyword -> value, first occurrence in the block.
    options: IndexMap<String, String>,
}

impl HostBlock {
    fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let mut matched = false;
        for p in &self.patterns {
            if p.pattern.matches(&host) {
                if p.negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

/// Parsed client configuration.
#[derive(Debug, Clone, Default)]
pub struct SshClientConfig {
    blocks: Vec<HostBlock>,
}

impl SshClientConfig {
    /// Parse configuration text. Unknown keywords and malformed lines are
    /// ignored.
    pub fn parse(text: &str) -> Self {
        // Options before the first Host line apply to every host.
        let mut blocks = vec![HostBlock {
            patterns: HostPattern::parse("*").into_iter().collect(),
            options: IndexMap::new(),
        }];

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((keyword, value)) = split_keyword(line) else {
                continue;
            };
            let keyword = keyword.to_ascii_lowercase();

            match keyword.as_str() {
                "host" => blocks.push(HostBlock {
                    patterns: value
                        .split_whitespace()
                        .filter_map(|p| HostPattern::parse(unquote(p)))
                        .collect(),
                    options: IndexMap::new(),
                }),
                // A block with no patterns never matches.
                "match" => blocks.push(HostBlock {
                    patterns: Vec::new(),
                    options: IndexMap::new(),
                }),
                _ => {
                    if let Some(block) = blocks.last_mut() {
                        block
                            .options
                            .entry(keyword)
                            .or_insert_with(|| unquote(value).to_string());
                    }
                }
            }
        }

        Self { blocks }
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Collect the overrides that apply to `host`.
    pub fn lookup(&self, host: &str) -> HostOverrides {
        let mut merged: IndexMap<&str, &str> = IndexMap::new();
        for block in self.blocks.iter().filter(|b| b.matches(host)) {
            for (keyword, value) in &block.options {
                merged.entry(keyword.as_str()).or_insert(value.as_str());
            }
        }

        let get = |key: &str| merged.get(key).map(|v| v.to_string());

        HostOverrides {
            hostname: get("hostname").map(|h| h.replace("%h", host)),
            port: merged
                .get("port")
                .and_then(|p| p.parse::<u16>().ok())
                .filter(|p| *p != 0),
            user: get("user"),
            identity_file: get("identityfile").map(|p| expand_home(&p)),
            identities_only: get("identitiesonly"),
            forward_agent: get("forwardagent"),
            hostkey_algorithms: get("hostkeyalgorithms"),
            pubkey_accepted_algorithms: get("pubkeyacceptedalgorithms"),
        }
    }
}

/// Split `Keyword value` or `Keyword=value`.
fn split_keyword(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let keyword = &line[..end];
    let rest = line[end..].trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    if keyword.is_empty() || rest.is_empty() {
        return None;
    }
    Some((keyword, rest))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
# Lab routers
Host testhost
    HostName 192.168.1.100
    User admin
    IdentityFile testdata/ssh_keys/test_key

Host encrypted-host
    HostName=192.168.1.101
    User root
    Port 2222
    IdentityFile "testdata/ssh_keys/encrypted_key"

Host router*
    HostName %h.home
    User admin
"#;

    const WILDCARDS: &str = r#"
Host dev-*
    HostName %h.internal.net
    User devops

Host * !bastion
    User default-user
    IdentityFile testdata/ssh_keys/test_key
"#;

    #[test]
    fn test_exact_host_block() {
        let config = SshClientConfig::parse(VALID);
        let o = config.lookup("testhost");
        assert_eq!(o.hostname.as_deref(), Some("192.168.1.100"));
        assert_eq!(o.user.as_deref(), Some("admin"));
        assert_eq!(o.port, None);
        assert_eq!(
            o.identity_file,
            Some(PathBuf::from("testdata/ssh_keys/test_key"))
        );
    }

    #[test]
    fn test_equals_syntax_and_quotes() {
        let config = SshClientConfig::parse(VALID);
        let o = config.lookup("encrypted-host");
        assert_eq!(o.hostname.as_deref(), Some("192.168.1.101"));
        assert_eq!(o.port, Some(2222));
        assert_eq!(
            o.identity_file,
            Some(PathBuf::from("testdata/ssh_keys/encrypted_key"))
        );
    }

    #[test]
    fn test_percent_h_expansion() {
        let config = SshClientConfig::parse(VALID);
        let o = config.lookup("routerTest");
        assert_eq!(o.hostname.as_deref(), Some("routerTest.home"));
    }

    #[test]
    fn test_first_value_wins_across_blocks() {
        let config = SshClientConfig::parse(WILDCARDS);
        let o = config.lookup("dev-server1");
        assert_eq!(o.hostname.as_deref(), Some("dev-server1.internal.net"));
        assert_eq!(o.user.as_deref(), Some("devops"));
        assert_eq!(
            o.identity_file,
            Some(PathBuf::from("testdata/ssh_keys/test_key"))
        );
    }

    #[test]
    fn test_catch_all_and_negation() {
        let config = SshClientConfig::parse(WILDCARDS);
        let o = config.lookup("unknown-host");
        assert_eq!(o.hostname, None);
        assert_eq!(o.user.as_deref(), Some("default-user"));

        let o = config.lookup("bastion");
        assert_eq!(o, HostOverrides::default());
    }

    #[test]
    fn test_empty_config() {
        let config = SshClientConfig::parse("");
        assert_eq!(config.lookup("any-host"), HostOverrides::default());
    }

    #[test]
    fn test_match_block_is_ignored() {
        let config = SshClientConfig::parse("Match user admin\n    Port 2222\n");
        assert_eq!(config.lookup("router1").port, None);
    }

    #[test]
    fn test_invalid_port_is_dropped() {
        let config = SshClientConfig::parse("Host r1\n  Port 0\nHost r2\n  Port abc\n");
        assert_eq!(config.lookup("r1").port, None);
        assert_eq!(config.lookup("r2").port, None);
    }

    #[test]
    fn test_host_patterns() {
        let matches = |pattern: &str, host: &str| {
            HostPattern::parse(pattern).unwrap().pattern.matches(host)
        };
        assert!(matches("*", "anything"));
        assert!(matches("router?", "router1"));
        assert!(!matches("router?", "router12"));
        assert!(matches("r*r*1", "router1"));
        assert!(!matches("dev-*", "prod-1"));
        assert!(matches("ROUTER*", "router1"));
        assert!(matches("lab[1]", "lab[1]"));
        assert!(!matches("lab[1]", "lab1"));
        assert!(HostPattern::parse("!bastion").unwrap().negated);
    }
}
