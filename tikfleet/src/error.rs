//! Error types for tikfleet.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for tikfleet operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Host identity (TOFU) errors raised while connecting
    #[error("Host key verification failed: {0}")]
    Trust(#[from] TrustError),

    /// Host-key store errors
    #[error("Host key store error: {0}")]
    HostKey(#[from] HostKeyError),

    /// Errors reported by, or parsed from, the device itself
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Invalid invocation or local input files
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse classification of failures, used to decide retry and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Dial failure or timeout. Retryable inside the reboot-survival loop only.
    Connectivity,
    /// No usable credential, key unlock failure or server rejection.
    Authentication,
    /// The presented host key differs from the pinned one.
    TrustViolation,
    /// No key on file and enrollment mode is off.
    NotEnrolled,
    /// The device reported a failure status or a command exited non-zero.
    VendorReported,
    /// An expected token was missing from device output.
    Parse,
    /// Host-key or backup file I/O.
    Storage,
    /// Local configuration or input problem.
    Config,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(TransportError::CommandFailed { .. }) => ErrorKind::VendorReported,
            Error::Transport(_) => ErrorKind::Connectivity,
            Error::Auth(_) => ErrorKind::Authentication,
            Error::Trust(TrustError::NotEnrolled { .. }) => ErrorKind::NotEnrolled,
            Error::Trust(TrustError::HostKeyChanged { .. }) => ErrorKind::TrustViolation,
            Error::Trust(TrustError::Store(HostKeyError::Mismatch { .. })) => {
                ErrorKind::TrustViolation
            }
            Error::Trust(TrustError::Store(_)) => ErrorKind::Storage,
            Error::HostKey(HostKeyError::Mismatch { .. }) => ErrorKind::TrustViolation,
            Error::HostKey(_) => ErrorKind::Storage,
            Error::Device(DeviceError::VendorReported { .. }) => ErrorKind::VendorReported,
            Error::Device(DeviceError::Parse { .. }) => ErrorKind::Parse,
            Error::Device(DeviceError::Script { source, .. }) => source.kind(),
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether an automatic retry may be attempted.
    ///
    /// Only connectivity errors qualify; trust and authentication failures
    /// are never retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }
}

/// Transport layer errors (dial, SSH protocol, remote command execution).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Dial did not complete in time
    #[error("Connection to {host}:{port} timed out after {timeout:?}")]
    Timeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// A remote command could not be run or exited with a failure status
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,
}

/// Authentication errors. Never retried.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Neither a password nor a private key with passphrase was supplied
    #[error("no authentication method provided (need password or SSH key with passphrase)")]
    NoMethod,

    /// The private key could not be read or unlocked
    #[error("unable to load private key {path}: {message}")]
    KeyUnlock { path: PathBuf, message: String },

    /// The server rejected every offered method
    #[error("Authentication failed for user '{user}'")]
    Rejected { user: String },
}

/// Host identity errors raised by the TOFU check during the handshake.
#[derive(Error, Debug)]
pub enum TrustError {
    /// The presented key differs from the pinned key
    #[error("host key for '{host}' changed (stored {stored}, presented {presented}); refusing to connect")]
    HostKeyChanged {
        host: String,
        stored: String,
        presented: String,
    },

    /// No key on file outside enrollment mode
    #[error(
        "no host key on file for '{host}'; enroll the device first or pass --insecure-skip-host-key-check"
    )]
    NotEnrolled { host: String },

    /// The trust store could not be read or written during the check
    #[error("{0}")]
    Store(HostKeyError),
}

/// Host-key store errors.
#[derive(Error, Debug)]
pub enum HostKeyError {
    /// No record on file
    #[error("host key file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    /// Record exists but cannot be decoded into a public key
    #[error("host key file {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Candidate key differs from the stored key
    #[error("host key mismatch for '{host}': stored={stored} remote={presented}")]
    Mismatch {
        host: String,
        stored: String,
        presented: String,
    },

    /// Filesystem failure on a record or backup file
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The presented key could not be encoded
    #[error("failed to encode host key: {0}")]
    Encode(String),
}

/// Errors reported by the device or found while parsing its output.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device printed an explicit error status line
    #[error("{subsystem} check failed: {message}")]
    VendorReported { subsystem: String, message: String },

    /// An expected token was absent from the output
    #[error("failed to parse {field}: {subsystem} version not found in output")]
    Parse { subsystem: String, field: String },

    /// A script command failed
    #[error("failed to execute command at line {line} ({command}): {source}")]
    Script {
        line: usize,
        command: String,
        #[source]
        source: Box<Error>,
    },
}

/// Local configuration and input errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No hosts were given and none were discovered
    #[error("no routers specified or discovered")]
    NoHosts,

    /// Two inputs normalize to the same short name
    #[error("hosts '{first}' and '{second}' share the short name '{short_name}'")]
    DuplicateShortName {
        first: String,
        second: String,
        short_name: String,
    },

    /// The command requires exactly one host
    #[error("{command} command requires exactly one host, got {count}")]
    SingleHostRequired { command: String, count: usize },

    /// Key rotation needs host-key checking to pin the new key
    #[error("hostkey rotate cannot pin keys with --insecure-skip-host-key-check")]
    InsecureRotation,

    /// A file name pattern could not be compiled
    #[error("invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A local file could not be read or written
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A batch operation failed on some or all hosts
    #[error("{failed} of {total} host(s) failed")]
    BatchFailed { failed: usize, total: usize },
}

/// Result type alias using tikfleet's Error.
pub type Result<T> = std::result::Result<T, Error>;
