//! Per-subsystem update status probes.

use std::fmt;
use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;

use crate::error::{DeviceError, Result};
use crate::transport::RemoteSession;

/// Installed and available versions of one subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStatus {
    pub installed: String,
    pub available: String,
}

/// Whether a subsystem needs updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    UpToDate,
    UpdateNeeded,
}

impl UpdateStatus {
    pub fn new(installed: impl Into<String>, available: impl Into<String>) -> Self {
        Self {
            installed: installed.into(),
            available: available.into(),
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.installed == self.available
    }

    pub fn state(&self) -> UpdateState {
        if self.is_up_to_date() {
            UpdateState::UpToDate
        } else {
            UpdateState::UpdateNeeded
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_up_to_date() {
            write!(f, "{}", self.installed)
        } else {
            write!(f, "{} → {}", self.installed, self.available)
        }
    }
}

/// A device component whose version can be probed and updated.
#[derive(Debug, Clone)]
pub struct Subsystem {
    /// Display name, e.g. `RouterOS`.
    pub name: &'static str,

    /// Command printing the status.
    pub status_command: &'static str,

    /// Command applying the pending update. The device reboots afterwards.
    pub apply_command: &'static str,

    installed: Regex,
    available: Regex,
    absent: Option<Regex>,
}

/// Status lines, only the last one is authoritative.
static STATUS_ERROR: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?m)^\s*status:\s*ERROR"));
static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?m)^\s*status:\s*(.+?)[\r\n]*$"));

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("built-in pattern is valid")
}

impl Subsystem {
    /// RouterOS package.
    pub fn routeros() -> Self {
        Self {
            name: "RouterOS",
            status_command: "/system/package/update/check-for-updates",
            apply_command: "/system/package/update/install",
            installed: pattern(r".*installed-version: (\S+)"),
            available: pattern(r".*latest-version: (\S+)"),
            absent: None,
        }
    }

    /// RouterBoard firmware. Absent on virtualized RouterOS.
    pub fn routerboard() -> Self {
        Self {
            name: "RouterBoard",
            status_command: "/system/routerboard/print",
            apply_command: "/system/reboot",
            installed: pattern(r".*current-firmware: (\S+)"),
            available: pattern(r".*upgrade-firmware: (\S+)"),
            absent: Some(pattern(r"(?m)^\s*routerboard:\s*no")),
        }
    }

    /// Interpret status command output.
    ///
    /// Returns `Ok(None)` when the subsystem is not present on the device.
    pub fn parse_status(&self, output: &str) -> std::result::Result<Option<UpdateStatus>, DeviceError> {
        if STATUS_ERROR.is_match(output) {
            let message = STATUS_LINE
                .captures_iter(output)
                .last()
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| "ERROR status".to_string());
            return Err(DeviceError::VendorReported {
                subsystem: self.name.to_string(),
                message,
            });
        }

        if let Some(absent) = &self.absent {
            if absent.is_match(output) {
                return Ok(None);
            }
        }

        let installed = capture(&self.installed, output).ok_or_else(|| DeviceError::Parse {
            subsystem: self.name.to_string(),
            field: "installed version".to_string(),
        })?;
        let available = capture(&self.available, output).ok_or_else(|| DeviceError::Parse {
            subsystem: self.name.to_string(),
            field: "available version".to_string(),
        })?;

        Ok(Some(UpdateStatus::new(installed, available)))
    }

    /// Run the status command and interpret its output.
    pub async fn check<S: RemoteSession>(&self, session: &mut S) -> Result<Option<UpdateStatus>> {
        debug!("SSH cmd is {}", self.status_command);
        let output = session.run(self.status_command).await?;
        let status = self.parse_status(&output)?;

        match &status {
            None => info!("{} not present (virtualized RouterOS)", self.name),
            Some(s) if s.is_up_to_date() => {
                info!("{} already up to date with {} {}", self.name, self.name, s.installed)
            }
            Some(s) => info!(
                "{} update available from version {} to {}",
                self.name, s.installed, s.available
            ),
        }
        Ok(status)
    }
}

fn capture(re: &Regex, output: &str) -> Option<String> {
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
