//! # tikfleet
//!
//! Fleet automation for MikroTik RouterOS devices over SSH.
//!
//! tikfleet enrolls devices, checks and applies RouterOS and RouterBoard
//! updates, and exports configuration. Every connection goes through a
//! trust-on-first-use host-key store, so a device that suddenly presents a
//! different key is refused instead of silently accepted.
//!
//! ## Features
//!
//! - Async SSH sessions via russh, one exec channel per command
//! - Per-device host-key pinning with explicit enrollment and rotation
//! - Update orchestration that survives the reboot it triggers
//! - `~/.ssh/config` aware host resolution
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tikfleet::transport::{CredentialVault, SshSessionFactory};
//! use tikfleet::update::{UpdateOptions, UpdateOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tikfleet::Error> {
//!     let factory = SshSessionFactory::builder(CredentialVault::new("admin", "secret", ""))
//!         .hostkey_dir(".")
//!         .build();
//!
//!     let orchestrator = UpdateOrchestrator::new(factory, UpdateOptions { apply: false });
//!     let report = orchestrator.update_host("router1.home").await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod enroll;
pub mod error;
pub mod export;
pub mod host;
pub mod hostkey;
pub mod transport;
pub mod update;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use batch::BatchReport;
pub use enroll::{EnrollOptions, EnrollmentOrchestrator, Script};
pub use error::{Error, ErrorKind, Result};
pub use export::{ConfigExporter, ExportOptions, Exporter};
pub use host::{HostAddress, HostResolver};
pub use hostkey::{HostKeyRecord, HostKeyStore, KeyRotation, TrustMode};
pub use transport::{CredentialVault, RemoteSession, SessionFactory, SshSessionFactory};
pub use update::{RetryPolicy, UpdateOptions, UpdateOrchestrator, Updater};
