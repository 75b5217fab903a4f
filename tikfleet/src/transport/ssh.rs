//! SSH transport implementation using russh.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, warn};
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};

use super::RemoteSession;
use super::credentials::AuthPlan;
use super::output::clean_output;
use crate::error::{AuthError, Result, TransportError, TrustError};
use crate::host::HostAddress;
use crate::hostkey::TofuPolicy;

/// An authenticated SSH connection to one device.
///
/// Every command runs on its own exec channel.
pub struct SshSession {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// Short name of the connected host, for logging.
    short_name: String,

    closed: bool,
}

impl SshSession {
    /// Dial, run the host-key check and authenticate.
    pub(crate) async fn connect(
        address: &HostAddress,
        plan: AuthPlan<'_>,
        policy: TofuPolicy,
        dial_timeout: Duration,
    ) -> Result<Self> {
        let ssh_config = Arc::new(client::Config::default());

        let trust_error: Arc<Mutex<Option<TrustError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: address.original.clone(),
            policy,
            trust_error: trust_error.clone(),
        };

        let mut session = tokio::time::timeout(
            dial_timeout,
            client::connect(
                ssh_config,
                (address.hostname.as_str(), address.port),
                handler,
            ),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            host: address.hostname.clone(),
            port: address.port,
            timeout: dial_timeout,
        })?
        .map_err(|e| {
            // The handler's detailed verdict replaces russh's generic UnknownKey
            if let Some(trust) = trust_error.lock().ok().and_then(|mut slot| slot.take()) {
                return trust.into();
            }
            match e {
                russh::Error::IO(source) => TransportError::ConnectionFailed {
                    host: address.hostname.clone(),
                    port: address.port,
                    source,
                }
                .into(),
                other => crate::Error::from(TransportError::Ssh(other)),
            }
        })?;

        Self::authenticate(&mut session, plan).await?;

        Ok(Self {
            session,
            short_name: address.short_name.clone(),
            closed: false,
        })
    }

    /// Authenticate with the server, key first, then password.
    async fn authenticate(session: &mut Handle<SshHandler>, plan: AuthPlan<'_>) -> Result<()> {
        let mut success = false;

        if let Some((path, key)) = plan.key {
            debug!("offering private key {}", path.display());

            // Get the best RSA hash algorithm supported by the server
            let hash_alg = session
                .best_supported_rsa_hash()
                .await
                .map_err(TransportError::Ssh)?
                .flatten();

            success = session
                .authenticate_publickey(
                    &plan.user,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(TransportError::Ssh)?
                .success();
        }

        if !success {
            if let Some(password) = plan.password {
                success = session
                    .authenticate_password(&plan.user, password)
                    .await
                    .map_err(TransportError::Ssh)?
                    .success();
            }
        }

        if !success {
            return Err(AuthError::Rejected { user: plan.user }.into());
        }

        Ok(())
    }
}

impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<String> {
        if self.closed || self.session.is_closed() {
            return Err(TransportError::Disconnected.into());
        }

        debug!("[{}] running '{}'", self.short_name, command);

        let mut channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;
        channel
            .exec(true, command)
            .await
            .map_err(TransportError::Ssh)?;

        let mut stdout = BytesMut::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        match exit_status {
            Some(code) if code != 0 => Err(TransportError::CommandFailed {
                command: command.to_string(),
                message: format!("exit status {}", code),
            }
            .into()),
            _ => Ok(clean_output(&stdout)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // The device may already have torn the link down
        if self.session.is_closed() {
            return Ok(());
        }

        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// SSH client handler for russh.
struct SshHandler {
    /// Host as the user typed it.
    host: String,
    policy: TofuPolicy,
    /// Stores the trust verdict so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    trust_error: Arc<Mutex<Option<TrustError>>>,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.policy.check(&self.host, server_public_key) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("rejecting host key for {}: {}", self.host, e);
                if let Ok(mut slot) = self.trust_error.lock() {
                    *slot = Some(e);
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::host::HostResolver;
    use crate::hostkey::{HostKeyStore, TrustMode, key_fingerprint, test_key};
    use crate::transport::{CredentialVault, SessionFactory, SshSessionFactory};
    use russh::keys::PrivateKey;
    use russh::keys::ssh_key::private::Ed25519Keypair;
    use russh::server::{self, Auth, Msg, Session};
    use russh::{Channel, ChannelId, CryptoVec};

    /// Minimal device: accepts any password and answers every exec request.
    struct Device;

    impl server::Handler for Device {
        type Error = russh::Error;

        async fn auth_password(&mut self, _: &str, _: &str) -> std::result::Result<Auth, Self::Error> {
            Ok(Auth::Accept)
        }

        async fn channel_open_session(
            &mut self,
            _: Channel<Msg>,
            _: &mut Session,
        ) -> std::result::Result<bool, Self::Error> {
            Ok(true)
        }

        async fn exec_request(
            &mut self,
            channel: ChannelId,
            data: &[u8],
            session: &mut Session,
        ) -> std::result::Result<(), Self::Error> {
            session.channel_success(channel)?;
            if data == b"/system/identity/print" {
                session.data(channel, CryptoVec::from_slice(b"\x1b[1mname:\x1b[0m router1\n"))?;
                session.exit_status_request(channel, 0)?;
            } else {
                session.exit_status_request(channel, 1)?;
            }
            session.eof(channel)?;
            session.close(channel)?;
            Ok(())
        }
    }

    fn host_key(seed: u8) -> PrivateKey {
        PrivateKey::from(Ed25519Keypair::from_seed(&[seed; 32]))
    }

    /// Serve SSH on a loopback port with `key` as the host key.
    async fn serve(key: PrivateKey) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = server::Config::default();
        config.keys.push(key);
        config.auth_rejection_time = Duration::from_millis(10);
        let config = Arc::new(config);

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let config = config.clone();
                tokio::spawn(async move {
                    if let Ok(session) = server::run_stream(config, socket, Device).await {
                        let _ = session.await;
                    }
                });
            }
        });

        format!("127.0.0.1:{}", port)
    }

    fn factory(dir: &std::path::Path, trust: TrustMode) -> SshSessionFactory {
        SshSessionFactory::builder(CredentialVault::new("admin", "secret", ""))
            .resolver(HostResolver::new())
            .hostkey_dir(dir)
            .trust_mode(trust)
            .dial_timeout(Duration::from_secs(5))
            .build()
    }

    #[tokio::test]
    async fn test_enrollment_pins_presented_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = host_key(1);
        let host = serve(key.clone()).await;

        let mut session = factory(dir.path(), TrustMode::enrollment())
            .connect(&host)
            .await
            .unwrap();
        session.close().await.unwrap();

        let store = HostKeyStore::new(dir.path());
        assert!(dir.path().join("127.0.0.1.hostkey").is_file());
        let record = store.load_record("127.0.0.1").unwrap();
        assert_eq!(record.host, host);
        assert_eq!(record.fingerprint, key_fingerprint(key.public_key()).unwrap());

        // The pinned key now passes strict verification
        let mut session = factory(dir.path(), TrustMode::strict())
            .connect(&host)
            .await
            .unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_key_in_strict_mode_is_not_enrolled() {
        let dir = tempfile::tempdir().unwrap();
        let host = serve(host_key(2)).await;

        let err = factory(dir.path(), TrustMode::strict())
            .connect(&host)
            .await
            .err()
            .unwrap();

        assert_eq!(err.kind(), ErrorKind::NotEnrolled);
        assert!(!err.is_retryable());
        assert!(!HostKeyStore::new(dir.path()).exists("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_changed_key_is_trust_violation() {
        let dir = tempfile::tempdir().unwrap();
        let store = HostKeyStore::new(dir.path());
        store.capture("127.0.0.1", &test_key(9)).unwrap();
        let host = serve(host_key(3)).await;

        for trust in [TrustMode::strict(), TrustMode::enrollment()] {
            let err = factory(dir.path(), trust).connect(&host).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::TrustViolation);
            assert!(!err.is_retryable());
        }
        store.verify("127.0.0.1", &test_key(9)).unwrap();
    }

    #[tokio::test]
    async fn test_run_strips_escapes_and_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let host = serve(host_key(4)).await;

        let mut session = factory(dir.path(), TrustMode::insecure())
            .connect(&host)
            .await
            .unwrap();

        let output = session.run("/system/identity/print").await.unwrap();
        assert_eq!(output, "name: router1\n");

        let err = session.run("/bogus").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VendorReported);

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.run("/system/identity/print").await.is_err());
    }
}
