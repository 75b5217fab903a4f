//! Connection-time trust decision.

use log::{info, warn};
use russh::keys::PublicKey;

use super::store::HostKeyStore;
use crate::error::{HostKeyError, TrustError};
use crate::host::HostAddress;

/// How strictly presented host keys are checked.
///
/// Enrollment mode and the explicit skip flag are the only two switches
/// that weaken pinning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustMode {
    /// Capture the key of a host with no record on file.
    pub enrollment: bool,

    /// Accept any key without checking. Insecure.
    pub skip_verification: bool,
}

impl TrustMode {
    /// Verify known hosts, reject unknown ones.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Verify known hosts, capture unknown ones.
    pub fn enrollment() -> Self {
        Self {
            enrollment: true,
            skip_verification: false,
        }
    }

    /// Accept every key.
    pub fn insecure() -> Self {
        Self {
            enrollment: false,
            skip_verification: true,
        }
    }
}

/// Outcome of the trust decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TofuDecision {
    /// Verification explicitly disabled.
    AcceptUnverified,
    /// Compare against the pinned key.
    Verify,
    /// Pin the presented key.
    Capture,
    /// Unknown host outside enrollment mode.
    Reject,
}

impl TofuDecision {
    /// Decide what to do with a presented key.
    pub fn decide(key_on_file: bool, mode: TrustMode) -> Self {
        match (mode.skip_verification, key_on_file, mode.enrollment) {
            (true, _, _) => TofuDecision::AcceptUnverified,
            (false, true, _) => TofuDecision::Verify,
            (false, false, true) => TofuDecision::Capture,
            (false, false, false) => TofuDecision::Reject,
        }
    }
}

/// Applies the trust decision against a [`HostKeyStore`].
#[derive(Debug, Clone)]
pub struct TofuPolicy {
    store: HostKeyStore,
    mode: TrustMode,
}

impl TofuPolicy {
    pub fn new(store: HostKeyStore, mode: TrustMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> TrustMode {
        self.mode
    }

    pub fn store(&self) -> &HostKeyStore {
        &self.store
    }

    /// Accept or reject `key` presented by `host`.
    ///
    /// Every failure is final: there is no fallback to accepting the key.
    pub fn check(&self, host: &str, key: &PublicKey) -> Result<(), TrustError> {
        let short_name = HostAddress::parse(host).short_name;
        let short_name = short_name.as_str();
        let decision = TofuDecision::decide(self.store.exists(short_name), self.mode);

        match decision {
            TofuDecision::AcceptUnverified => {
                warn!(
                    "host key verification disabled for {}; the connection is not protected against impersonation",
                    host
                );
                Ok(())
            }
            TofuDecision::Verify => self
                .store
                .verify(short_name, key)
                .map_err(|e| match e {
                    HostKeyError::Mismatch {
                        host,
                        stored,
                        presented,
                    } => TrustError::HostKeyChanged {
                        host,
                        stored,
                        presented,
                    },
                    other => TrustError::Store(other),
                }),
            TofuDecision::Capture => {
                let record = self.store.capture(host, key).map_err(TrustError::Store)?;
                info!("enrolled host key for {}: {}", host, record.fingerprint);
                Ok(())
            }
            TofuDecision::Reject => Err(TrustError::NotEnrolled {
                host: host.to_string(),
            }),
        }
    }
}
