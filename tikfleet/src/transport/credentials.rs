//! Credential holder that never hands out raw secrets.

use std::fmt;
use std::path::PathBuf;

use russh::keys::{PrivateKey, load_secret_key};
use secrecy::{ExposeSecret, SecretString};

use crate::error::AuthError;
use crate::host::HostAddress;

/// Username, password and key passphrase for the fleet.
///
/// Secrets stay inside this value: callers can read the username and open
/// connections through a session factory, nothing else. Empty strings mean
/// "not supplied".
pub struct CredentialVault {
    user: String,
    password: Option<SecretString>,
    passphrase: Option<SecretString>,
}

impl CredentialVault {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: non_empty(password.into()),
            passphrase: non_empty(passphrase.into()),
        }
    }

    /// The globally supplied username.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Work out how to authenticate against `address` before dialing.
    ///
    /// A private key is used when a passphrase was supplied; it is loaded
    /// from the host's `IdentityFile` and any failure to read or unlock it
    /// is fatal. The password, when present, is offered after the key.
    pub(crate) fn auth_plan(&self, address: &HostAddress) -> Result<AuthPlan<'_>, AuthError> {
        if self.password.is_none() && self.passphrase.is_none() {
            return Err(AuthError::NoMethod);
        }

        let user = address.user.clone().unwrap_or_else(|| self.user.clone());

        let key = match &self.passphrase {
            Some(passphrase) => {
                let path = address.identity_file.clone().unwrap_or_default();
                let key = load_secret_key(&path, Some(passphrase.expose_secret())).map_err(
                    |e| AuthError::KeyUnlock {
                        path: path.clone(),
                        message: e.to_string(),
                    },
                )?;
                Some((path, key))
            }
            None => None,
        };

        Ok(AuthPlan {
            user,
            key,
            password: self.password.as_ref().map(|p| p.expose_secret()),
        })
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn non_empty(value: String) -> Option<SecretString> {
    if value.is_empty() {
        None
    } else {
        Some(SecretString::from(value))
    }
}

/// Resolved authentication inputs for one connection attempt.
pub(crate) struct AuthPlan<'a> {
    pub(crate) user: String,
    pub(crate) key: Option<(PathBuf, PrivateKey)>,
    pub(crate) password: Option<&'a str>,
}
