//! Scripted in-memory device used by orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, TransportError, TrustError};
use crate::transport::{RemoteSession, SessionFactory};

#[derive(Default)]
struct DeviceState {
    responses: HashMap<String, VecDeque<String>>,
    failing: HashMap<String, String>,
    commands: Vec<String>,
    connect_failures: usize,
    outages: HashMap<String, usize>,
    untrusted: bool,
    connects: usize,
    closes: usize,
}

/// A fake device acting as its own session factory.
#[derive(Clone, Default)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap()
    }

    /// Queue output for `command`. The last queued output repeats.
    pub fn respond(&self, command: &str, output: &str) -> &Self {
        self.state()
            .responses
            .entry(command.to_string())
            .or_default()
            .push_back(output.to_string());
        self
    }

    /// Make `command` fail with a non-zero exit.
    pub fn fail(&self, command: &str, message: &str) -> &Self {
        self.state()
            .failing
            .insert(command.to_string(), message.to_string());
        self
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_connects(&self, n: usize) -> &Self {
        self.state().connect_failures = n;
        self
    }

    /// Refuse `n` connections after `command` runs, like a rebooting device.
    pub fn outage_after(&self, command: &str, n: usize) -> &Self {
        self.state().outages.insert(command.to_string(), n);
        self
    }

    /// Reject every connection with a trust violation.
    pub fn untrusted(&self) -> &Self {
        self.state().untrusted = true;
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.state().commands.iter().filter(|c| *c == command).count()
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }
}

pub(crate) struct MockSession {
    device: MockDevice,
    closed: bool,
}

impl RemoteSession for MockSession {
    async fn run(&mut self, command: &str) -> Result<String> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }

        let mut state = self.device.state();
        state.commands.push(command.to_string());
        if let Some(n) = state.outages.get(command).copied() {
            state.connect_failures = n;
        }

        if let Some(message) = state.failing.get(command) {
            return Err(TransportError::CommandFailed {
                command: command.to_string(),
                message: message.clone(),
            }
            .into());
        }

        let output = match state.responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => String::new(),
        };
        Ok(output)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.device.state().closes += 1;
        }
        Ok(())
    }
}

impl SessionFactory for MockDevice {
    type Session = MockSession;

    async fn connect(&self, host: &str) -> Result<MockSession> {
        let mut state = self.state();
        state.connects += 1;

        if state.untrusted {
            return Err(TrustError::NotEnrolled {
                host: host.to_string(),
            }
            .into());
        }

        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(TransportError::ConnectionFailed {
                host: host.to_string(),
                port: 22,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            }
            .into());
        }

        Ok(MockSession {
            device: self.clone(),
            closed: false,
        })
    }
}

pub(crate) const ROUTEROS_CHECK: &str = "/system/package/update/check-for-updates";
pub(crate) const ROUTEROS_INSTALL: &str = "/system/package/update/install";
pub(crate) const ROUTERBOARD_PRINT: &str = "/system/routerboard/print";
pub(crate) const REBOOT: &str = "/system/reboot";

pub(crate) fn routeros_output(installed: &str, latest: &str) -> String {
    format!(
        "            channel: stable\r\n  installed-version: {}\r\n     latest-version: {}\r\n             status: System is already up to date\r\n",
        installed, latest
    )
}

pub(crate) fn routerboard_output(current: &str, upgrade: &str) -> String {
    format!(
        "       routerboard: yes\r\n             model: RB5009UG+S+\r\n  current-firmware: {}\r\n  upgrade-firmware: {}\r\n",
        current, upgrade
    )
}

pub(crate) const NO_ROUTERBOARD: &str = "       routerboard: no\r\n";
