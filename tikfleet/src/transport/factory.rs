//! Session factory enforcing host-key pinning.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};

use super::SessionFactory;
use super::credentials::CredentialVault;
use super::ssh::SshSession;
use crate::error::Result;
use crate::host::HostResolver;
use crate::hostkey::{HostKeyStore, TofuPolicy, TrustMode};

/// Time allowed for TCP connect, key exchange and the host-key check.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens SSH sessions with the configured credentials and trust mode.
#[derive(Debug, Clone)]
pub struct SshSessionFactory {
    credentials: Arc<CredentialVault>,
    resolver: HostResolver,
    store: HostKeyStore,
    trust: TrustMode,
    dial_timeout: Duration,
}

impl SshSessionFactory {
    /// Start building a factory around `credentials`.
    pub fn builder(credentials: CredentialVault) -> SessionFactoryBuilder {
        SessionFactoryBuilder::new(credentials)
    }

    /// The trust mode applied to every connection.
    pub fn trust_mode(&self) -> TrustMode {
        self.trust
    }

    /// A factory sharing everything but the trust mode.
    pub fn with_trust_mode(&self, trust: TrustMode) -> Self {
        Self {
            trust,
            ..self.clone()
        }
    }

    /// The host-key store consulted on connect.
    pub fn store(&self) -> &HostKeyStore {
        &self.store
    }

    /// The resolver used for host input.
    pub fn resolver(&self) -> &HostResolver {
        &self.resolver
    }

    /// The username supplied on the command line.
    pub fn user(&self) -> &str {
        self.credentials.user()
    }
}

impl SessionFactory for SshSessionFactory {
    type Session = SshSession;

    async fn connect(&self, host: &str) -> Result<SshSession> {
        let address = self.resolver.resolve(host);

        // Credential problems fail before any network traffic
        let plan = self.credentials.auth_plan(&address)?;
        debug!(
            "creating SSH connection to {} as {}",
            address.socket_addr(),
            plan.user
        );

        let policy = TofuPolicy::new(self.store.clone(), self.trust);
        SshSession::connect(&address, plan, policy, self.dial_timeout)
            .await
            .inspect_err(|e| error!("failed to create SSH connection to {}: {}", host, e))
    }
}

/// Builder for [`SshSessionFactory`].
///
/// # Example
///
/// ```rust,no_run
/// use tikfleet::transport::{CredentialVault, SessionFactory, SshSessionFactory};
/// use tikfleet::hostkey::TrustMode;
///
/// # async fn example() -> Result<(), tikfleet::Error> {
/// let factory = SshSessionFactory::builder(CredentialVault::new("admin", "secret", ""))
///     .hostkey_dir("/var/lib/tikfleet")
///     .trust_mode(TrustMode::strict())
///     .build();
///
/// let session = factory.connect("router1.home").await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionFactoryBuilder {
    credentials: CredentialVault,
    resolver: Option<HostResolver>,
    hostkey_dir: PathBuf,
    trust: TrustMode,
    dial_timeout: Duration,
}

impl SessionFactoryBuilder {
    /// Create a new builder.
    pub fn new(credentials: CredentialVault) -> Self {
        Self {
            credentials,
            resolver: None,
            hostkey_dir: PathBuf::from("."),
            trust: TrustMode::strict(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    /// Set the host resolver (default: backed by `~/.ssh/config`).
    pub fn resolver(mut self, resolver: HostResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the directory holding `.hostkey` files (default: current directory).
    pub fn hostkey_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.hostkey_dir = dir.into();
        self
    }

    /// Set the trust mode (default: strict).
    pub fn trust_mode(mut self, trust: TrustMode) -> Self {
        self.trust = trust;
        self
    }

    /// Set the dial timeout.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Build the factory.
    pub fn build(self) -> SshSessionFactory {
        SshSessionFactory {
            credentials: Arc::new(self.credentials),
            resolver: self.resolver.unwrap_or_else(HostResolver::from_user_config),
            store: HostKeyStore::new(self.hostkey_dir),
            trust: self.trust,
            dial_timeout: self.dial_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};

    fn factory(credentials: CredentialVault) -> SshSessionFactory {
        SshSessionFactory::builder(credentials)
            .resolver(HostResolver::new())
            .dial_timeout(Duration::from_secs(2))
            .build()
    }

    #[tokio::test]
    async fn test_no_credentials_fails_before_dialing() {
        // Port 9 on TEST-NET-1 would hang if a dial were attempted
        let factory = factory(CredentialVault::new("admin", "", ""));
        let err = factory.connect("192.0.2.1:9").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_refused_connection_is_connectivity_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let factory = factory(CredentialVault::new("admin", "secret", ""));
        let err = factory
            .connect(&format!("127.0.0.1:{}", port))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert!(err.is_retryable());
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_with_trust_mode_keeps_store() {
        let factory = SshSessionFactory::builder(CredentialVault::new("admin", "pw", ""))
            .resolver(HostResolver::new())
            .hostkey_dir("/tmp/keys")
            .build();
        let enrolling = factory.with_trust_mode(TrustMode::enrollment());
        assert_eq!(enrolling.trust_mode(), TrustMode::enrollment());
        assert_eq!(factory.trust_mode(), TrustMode::strict());
        assert_eq!(enrolling.store().dir(), factory.store().dir());
        assert_eq!(enrolling.user(), "admin");
    }
}
