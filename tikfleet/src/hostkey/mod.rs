//! Trust-on-first-use host-key pinning.
//!
//! Each device's SSH host key is pinned in its own JSON file named after
//! the device's short name. [`HostKeyStore`] persists and checks the
//! records; [`TofuPolicy`] decides, at connection time, whether a presented
//! key is accepted, captured or rejected.

mod policy;
mod record;
mod rotate;
mod store;

pub use policy::{TofuDecision, TofuPolicy, TrustMode};
pub use record::{HostKeyRecord, encode_key, fingerprint, key_fingerprint};
pub use rotate::KeyRotation;
pub use store::HostKeyStore;

#[cfg(test)]
pub(crate) fn test_key(seed: u8) -> russh::keys::PublicKey {
    use russh::keys::ssh_key::public::{Ed25519PublicKey, KeyData};

    let mut bytes = [seed; 32];
    bytes[0] = 0x42;
    russh::keys::PublicKey::from(KeyData::Ed25519(Ed25519PublicKey(bytes)))
}
