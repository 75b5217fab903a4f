//! Human-readable update summaries.

use std::fmt;

use super::status::UpdateStatus;

/// Status of every updatable subsystem on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub routeros: UpdateStatus,
    /// `None` on virtualized RouterOS.
    pub routerboard: Option<UpdateStatus>,
}

impl DeviceStatus {
    pub fn needs_update(&self) -> bool {
        !self.routeros.is_up_to_date()
            || self
                .routerboard
                .as_ref()
                .is_some_and(|board| !board.is_up_to_date())
    }
}

/// What happened on one host during an update run.
#[derive(Debug, Clone)]
pub struct HostUpdateReport {
    pub host: String,
    /// Status before any change.
    pub before: DeviceStatus,
    /// Subsystems whose update was applied, in order.
    pub applied: Vec<&'static str>,
    /// Status seen by the final post-update probe, `None` if that probe failed.
    pub after: Option<DeviceStatus>,
    /// Total reconnection attempts across reboots.
    pub reconnect_attempts: u32,
    /// Non-fatal problems, such as a failed post-update probe.
    pub warnings: Vec<String>,
}

impl HostUpdateReport {
    pub fn new(host: impl Into<String>, before: DeviceStatus) -> Self {
        Self {
            host: host.into(),
            before,
            applied: Vec::new(),
            after: None,
            reconnect_attempts: 0,
            warnings: Vec::new(),
        }
    }
}

impl fmt::Display for HostUpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            format_update_result(&self.host, &self.before.routeros, self.before.routerboard.as_ref())
        )?;
        if let Some(after) = &self.after {
            write!(
                f,
                "\n{}",
                format_update_result(&self.host, &after.routeros, after.routerboard.as_ref())
            )?;
        }
        Ok(())
    }
}

/// One-line summary of a host's update status.
///
/// A pending firmware upgrade that depends on the RouterOS update is shown as
/// `→ pending`.
pub fn format_update_result(host: &str, os: &UpdateStatus, board: Option<&UpdateStatus>) -> String {
    let os_up_to_date = os.is_up_to_date();

    let Some(board) = board else {
        return if os_up_to_date {
            format!("✅ {} is up-to-date (RouterOS: {})", host, os.installed)
        } else {
            format!(
                "⚠️  {} upgrade available (RouterOS: {} → {})",
                host, os.installed, os.available
            )
        };
    };

    let board_up_to_date = board.is_up_to_date();
    if os_up_to_date && board_up_to_date {
        return format!(
            "✅ {} is up-to-date (RouterOS: {}, RouterBoard: {})",
            host, os.installed, board.installed
        );
    }

    let board_upgrade = match (board_up_to_date, os_up_to_date) {
        (true, false) => format!("{} → pending", board.installed),
        (true, true) => board.installed.clone(),
        (false, _) => format!("{} → {}", board.installed, board.available),
    };
    format!(
        "⚠️  {} upgrade available (RouterOS: {} → {}, RouterBoard: {})",
        host, os.installed, os.available, board_upgrade
    )
}
