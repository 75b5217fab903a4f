//! Checking and applying updates across reboots.

use std::future::Future;

use log::{debug, info, warn};

use super::reconnect::{Reconnected, RetryPolicy, reconnect};
use super::report::{DeviceStatus, HostUpdateReport};
use super::status::Subsystem;
use crate::batch::BatchReport;
use crate::error::{DeviceError, Error, Result};
use crate::transport::{RemoteSession, SessionFactory};

/// Behavior of an update run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Install pending updates instead of only reporting them.
    pub apply: bool,
}

/// Anything able to bring one host up to date.
pub trait Updater: Send + Sync {
    fn update(&self, host: &str) -> impl Future<Output = Result<HostUpdateReport>> + Send;
}

/// Drives status checks and update application for one host at a time.
pub struct UpdateOrchestrator<F> {
    factory: F,
    options: UpdateOptions,
    retry: RetryPolicy,
    routeros: Subsystem,
    routerboard: Subsystem,
}

impl<F: SessionFactory> UpdateOrchestrator<F> {
    pub fn new(factory: F, options: UpdateOptions) -> Self {
        Self {
            factory,
            options,
            retry: RetryPolicy::default(),
            routeros: Subsystem::routeros(),
            routerboard: Subsystem::routerboard(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn options(&self) -> UpdateOptions {
        self.options
    }

    /// Probe RouterOS, then RouterBoard.
    pub async fn check_current_status<S: RemoteSession>(&self, session: &mut S) -> Result<DeviceStatus> {
        info!("checking RouterOS update status");
        let routeros = self.routeros.check(session).await?.ok_or_else(|| {
            Error::from(DeviceError::Parse {
                subsystem: self.routeros.name.to_string(),
                field: "installed version".to_string(),
            })
        })?;

        info!("checking RouterBoard update status");
        let routerboard = self.routerboard.check(session).await?;

        Ok(DeviceStatus {
            routeros,
            routerboard,
        })
    }

    /// Check one host and, when enabled, apply what is pending.
    ///
    /// RouterOS goes first. Whether RouterBoard firmware still needs an
    /// upgrade is decided from the status seen after the RouterOS reboot when
    /// that probe succeeded, since the package update often brings the
    /// firmware along.
    pub async fn update_host(&self, host: &str) -> Result<HostUpdateReport> {
        debug!("update of {} with apply={}", host, self.options.apply);
        info!("initializing SSH connection");
        let mut session = self.factory.connect(host).await?;

        let before = match self.check_current_status(&mut session).await {
            Ok(status) => status,
            Err(e) => {
                close_quietly(&mut session, host).await;
                return Err(e);
            }
        };
        let mut report = HostUpdateReport::new(host, before.clone());

        if !self.options.apply || !before.needs_update() {
            close_quietly(&mut session, host).await;
            return Ok(report);
        }

        let mut board = before.routerboard;
        if !before.routeros.is_up_to_date() {
            session = self
                .apply_and_verify(session, host, &self.routeros, &mut report)
                .await?;
            if let Some(after) = &report.after {
                board = after.routerboard.clone();
            }
        }

        if board.is_some_and(|b| !b.is_up_to_date()) {
            session = self
                .apply_and_verify(session, host, &self.routerboard, &mut report)
                .await?;
        }

        close_quietly(&mut session, host).await;
        Ok(report)
    }

    /// Send the apply command, drop the session and wait for the device.
    ///
    /// A failed apply command is fatal and no reconnection is attempted.
    pub async fn apply_and_reconnect(
        &self,
        mut session: F::Session,
        host: &str,
        subsystem: &Subsystem,
    ) -> Result<Reconnected<F::Session>> {
        info!("{} update needed, applying updates", subsystem.name);
        debug!("applying {} updates on router {}", subsystem.name, host);

        let applied = session.run(subsystem.apply_command).await;
        close_quietly(&mut session, host).await;
        drop(session);
        applied?;

        info!("{} update applied on router {}", subsystem.name, host);
        reconnect(&self.factory, host, &self.retry).await
    }

    async fn apply_and_verify(
        &self,
        session: F::Session,
        host: &str,
        subsystem: &Subsystem,
        report: &mut HostUpdateReport,
    ) -> Result<F::Session> {
        let Reconnected {
            mut session,
            attempts,
        } = self.apply_and_reconnect(session, host, subsystem).await?;
        report.applied.push(subsystem.name);
        report.reconnect_attempts += attempts;

        // The update itself succeeded, so a failed probe is only reported.
        // An earlier status no longer describes the device.
        match self.check_current_status(&mut session).await {
            Ok(status) => report.after = Some(status),
            Err(e) => {
                report.after = None;
                warn!(
                    "failed to check status of {} after {} update: {}",
                    host, subsystem.name, e
                );
                report
                    .warnings
                    .push(format!("post-update check after {} failed: {}", subsystem.name, e));
            }
        }
        Ok(session)
    }

    /// Run [`update_host`](Self::update_host) on each host in order.
    pub async fn update_hosts(&self, hosts: &[String]) -> BatchReport<HostUpdateReport> {
        let mut batch = BatchReport::new();
        for host in hosts {
            let result = self.update_host(host).await;
            batch.record(host, result);
        }
        batch
    }
}

impl<F: SessionFactory> Updater for UpdateOrchestrator<F> {
    async fn update(&self, host: &str) -> Result<HostUpdateReport> {
        self.update_host(host).await
    }
}

async fn close_quietly<S: RemoteSession>(session: &mut S, host: &str) {
    if let Err(e) = session.close().await {
        debug!("ignoring close error for {}: {}", host, e);
    }
}
