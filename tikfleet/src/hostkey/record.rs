//! On-disk host-key record and fingerprints.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use russh::keys::PublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::HostKeyError;

/// The single trusted key for one short name, stored as JSON in
/// `<short_name>.hostkey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostKeyRecord {
    /// Host the key was captured for.
    pub host: String,

    /// Capture time (RFC 3339, UTC).
    pub captured_at: DateTime<Utc>,

    /// Key algorithm, e.g. `ssh-ed25519`.
    pub algorithm: String,

    /// Informational only; trust decisions compare raw key bytes.
    pub fingerprint: String,

    /// Base64 of the wire-format public key.
    pub public_key: String,
}

impl HostKeyRecord {
    /// Build a record for `key`, captured now.
    pub fn new(host: impl Into<String>, key: &PublicKey) -> Result<Self, HostKeyError> {
        let raw = encode_key(key)?;
        Ok(Self {
            host: host.into(),
            captured_at: Utc::now(),
            algorithm: key.algorithm().as_str().to_string(),
            fingerprint: fingerprint(&raw),
            public_key: STANDARD.encode(&raw),
        })
    }

    /// Decode the embedded key into its raw wire bytes, checking that they
    /// parse as a public key of a supported algorithm.
    pub fn decode_key(&self) -> Result<(Vec<u8>, PublicKey), String> {
        let raw = STANDARD
            .decode(self.public_key.as_bytes())
            .map_err(|e| format!("failed to decode public key: {}", e))?;
        let key = PublicKey::from_bytes(&raw)
            .map_err(|e| format!("failed to parse public key: {}", e))?;
        Ok((raw, key))
    }
}

/// Wire-format bytes of a public key.
pub fn encode_key(key: &PublicKey) -> Result<Vec<u8>, HostKeyError> {
    key.to_bytes()
        .map_err(|e| HostKeyError::Encode(e.to_string()))
}

/// `SHA256:` followed by the padded base64 SHA-256 digest of `raw`.
pub fn fingerprint(raw: &[u8]) -> String {
    let digest = Sha256::digest(raw);
    format!("SHA256:{}", STANDARD.encode(digest))
}

/// Fingerprint of a public key.
pub fn key_fingerprint(key: &PublicKey) -> Result<String, HostKeyError> {
    encode_key(key).map(|raw| fingerprint(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hostkey::test_key;

    #[test]
    fn test_fingerprint_is_stable() {
        let key = test_key(7);
        let first = key_fingerprint(&key).unwrap();
        let second = key_fingerprint(&key).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("SHA256:"));
        // 32-byte digest -> 44 base64 characters including padding
        assert_eq!(first.len(), "SHA256:".len() + 44);
        assert!(first.ends_with('='));
    }

    #[test]
    fn test_distinct_keys_have_distinct_fingerprints() {
        assert_ne!(
            key_fingerprint(&test_key(1)).unwrap(),
            key_fingerprint(&test_key(2)).unwrap()
        );
    }

    #[test]
    fn test_record_fields() {
        let key = test_key(3);
        let record = HostKeyRecord::new("router1", &key).unwrap();
        assert_eq!(record.host, "router1");
        assert_eq!(record.algorithm, "ssh-ed25519");
        assert_eq!(record.fingerprint, key_fingerprint(&key).unwrap());

        let (raw, decoded) = record.decode_key().unwrap();
        assert_eq!(raw, encode_key(&key).unwrap());
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_json_field_names() {
        let record = HostKeyRecord::new("router1", &test_key(4)).unwrap();
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        for field in ["host", "capturedAt", "algorithm", "fingerprint", "publicKey"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut record = HostKeyRecord::new("router1", &test_key(5)).unwrap();
        record.public_key = "not base64!!".to_string();
        assert!(record.decode_key().unwrap_err().contains("decode"));

        record.public_key = STANDARD.encode(b"definitely not a key");
        assert!(record.decode_key().unwrap_err().contains("parse"));
    }
}
