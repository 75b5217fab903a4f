//! SSH transport layer wrapping russh.
//!
//! This module provides connection setup with host-key pinning,
//! authentication, and one-shot remote command execution. Orchestrators
//! only see the [`SessionFactory`] and [`RemoteSession`] traits so that
//! tests can substitute their own implementations.

mod credentials;
mod factory;
pub mod output;
mod ssh;

pub use credentials::CredentialVault;
pub use factory::{DEFAULT_DIAL_TIMEOUT, SessionFactoryBuilder, SshSessionFactory};
pub use ssh::SshSession;

use std::future::Future;

use crate::error::Result;

/// A live connection able to run vendor commands.
pub trait RemoteSession: Send {
    /// Run `command` and return its output.
    fn run(&mut self, command: &str) -> impl Future<Output = Result<String>> + Send;

    /// Close the connection. Closing twice is not an error.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Creates sessions to hosts given as user input.
pub trait SessionFactory: Send + Sync {
    type Session: RemoteSession;

    /// Resolve `host`, connect and authenticate.
    fn connect(&self, host: &str) -> impl Future<Output = Result<Self::Session>> + Send;
}
