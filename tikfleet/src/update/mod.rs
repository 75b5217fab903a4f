//! RouterOS and RouterBoard update management.
//!
//! A device has two independently updatable subsystems. The RouterOS package
//! is updated with `/system/package/update/install`; RouterBoard firmware is
//! upgraded by the bootloader on the next reboot. Both take the device
//! offline, so the orchestrator reconnects after each one.

mod orchestrator;
mod reconnect;
mod report;
mod status;

pub use orchestrator::{UpdateOptions, UpdateOrchestrator, Updater};
pub use reconnect::{DEFAULT_RECONNECT_DELAY, Reconnected, RetryPolicy, reconnect};
pub use report::{DeviceStatus, HostUpdateReport, format_update_result};
pub use status::{Subsystem, UpdateState, UpdateStatus};
