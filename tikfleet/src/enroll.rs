//! First-contact provisioning of a single device.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{ConfigError, DeviceError, Error, Result};
use crate::export::Exporter;
use crate::transport::{RemoteSession, SessionFactory};
use crate::update::{HostUpdateReport, Updater};

/// RouterOS commands read from a file, one per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    /// `(line number, command)` pairs, numbered from 1.
    commands: Vec<(usize, String)>,
}

impl Script {
    /// Parse script text. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Self {
        let commands = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .map(|(n, line)| (n, line.to_string()))
            .collect();
        Self { commands }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn commands(&self) -> &[(usize, String)] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run every command in order, stopping at the first failure.
    pub async fn run<S: RemoteSession>(&self, session: &mut S) -> Result<usize> {
        for (line, command) in &self.commands {
            debug!("executing command (line {}): {}", line, command);
            session
                .run(command)
                .await
                .map_err(|source| DeviceError::Script {
                    line: *line,
                    command: command.clone(),
                    source: Box::new(source),
                })?;
        }
        Ok(self.commands.len())
    }
}

/// What to do while enrolling.
#[derive(Debug, Clone, Default)]
pub struct EnrollOptions {
    /// System identity to set on the device.
    pub identity: String,
    pub pre_script: Option<Script>,
    pub post_script: Option<Script>,
    pub skip_updates: bool,
    pub skip_export: bool,
}

/// Result of a non-fatal enrollment step.
#[derive(Debug)]
pub enum StepOutcome<T> {
    Done(T),
    Skipped,
    Failed(Error),
}

impl<T> StepOutcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// Summary of a completed enrollment.
#[derive(Debug)]
pub struct EnrollmentReport {
    pub host: String,
    pub identity: String,
    /// Script commands executed, pre and post combined.
    pub commands_run: usize,
    pub update: StepOutcome<HostUpdateReport>,
    pub export: StepOutcome<PathBuf>,
}

/// Sequences the enrollment of one device.
///
/// The factory must be in enrollment trust mode so the host key is pinned on
/// first contact. Updates and export go through the injected [`Updater`] and
/// [`Exporter`], which open their own sessions.
pub struct EnrollmentOrchestrator<F, U, E> {
    factory: F,
    updater: U,
    exporter: E,
}

impl<F, U, E> EnrollmentOrchestrator<F, U, E>
where
    F: SessionFactory,
    U: Updater,
    E: Exporter,
{
    pub fn new(factory: F, updater: U, exporter: E) -> Self {
        Self {
            factory,
            updater,
            exporter,
        }
    }

    /// Enroll `host`. Any failure outside updates and export aborts.
    pub async fn enroll(&self, host: &str, options: &EnrollOptions) -> Result<EnrollmentReport> {
        info!("step 1: connecting to router {}", host);
        let mut session = self.factory.connect(host).await?;

        let provisioned = self.provision(&mut session, options).await;
        if let Err(e) = session.close().await {
            debug!("ignoring close error for {}: {}", host, e);
        }
        let mut commands_run = provisioned?;

        let update = if options.skip_updates {
            info!("step 4: skipping updates");
            StepOutcome::Skipped
        } else {
            info!("step 4: checking and applying updates");
            match self.updater.update(host).await {
                Ok(report) => StepOutcome::Done(report),
                Err(e) => {
                    warn!("failed to apply updates: {}", e);
                    StepOutcome::Failed(e)
                }
            }
        };

        let export = if options.skip_export {
            info!("step 5: skipping export");
            StepOutcome::Skipped
        } else {
            info!("step 5: exporting final configuration");
            match self.exporter.export(host).await {
                Ok(path) => StepOutcome::Done(path),
                Err(e) => {
                    warn!("failed to export configuration: {}", e);
                    StepOutcome::Failed(e)
                }
            }
        };

        if let Some(script) = options.post_script.as_ref().filter(|s| !s.is_empty()) {
            info!("step 6: applying post-enrollment script");
            let mut session = self.factory.connect(host).await?;
            let ran = script.run(&mut session).await;
            if let Err(e) = session.close().await {
                debug!("ignoring close error for {}: {}", host, e);
            }
            commands_run += ran?;
        }

        Ok(EnrollmentReport {
            host: host.to_string(),
            identity: options.identity.clone(),
            commands_run,
            update,
            export,
        })
    }

    async fn provision(&self, session: &mut F::Session, options: &EnrollOptions) -> Result<usize> {
        let mut commands_run = 0;
        if let Some(script) = &options.pre_script {
            info!("step 2: applying configuration script");
            commands_run += script.run(session).await?;
        }

        info!("step 3: setting router identity");
        let command = identity_command(&options.identity);
        debug!("setting identity with command: {}", command);
        session.run(&command).await?;
        Ok(commands_run)
    }
}

pub fn identity_command(identity: &str) -> String {
    format!("/system identity set name={}", identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportError};
    use crate::testing::MockDevice;
    use crate::update::{DeviceStatus, UpdateStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeUpdater {
        fail: bool,
        calls: AtomicUsize,
    }

    impl Updater for FakeUpdater {
        async fn update(&self, host: &str) -> Result<HostUpdateReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TransportError::Disconnected.into());
            }
            Ok(HostUpdateReport::new(
                host,
                DeviceStatus {
                    routeros: UpdateStatus::new("7.12.1", "7.12.1"),
                    routerboard: None,
                },
            ))
        }
    }

    #[derive(Default)]
    struct FakeExporter {
        fail: bool,
        calls: AtomicUsize,
    }

    impl Exporter for FakeExporter {
        async fn export(&self, host: &str) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TransportError::Disconnected.into());
            }
            Ok(PathBuf::from(format!("{}.rsc", host)))
        }
    }

    fn options(pre: &str) -> EnrollOptions {
        EnrollOptions {
            identity: "router1".to_string(),
            pre_script: Some(Script::parse(pre)),
            ..Default::default()
        }
    }

    #[test]
    fn test_script_skips_blanks_and_comments() {
        let script = Script::parse("# base config\n\n/ip dns set servers=1.1.1.1\n   \n  /system clock set time-zone-name=UTC  \n");
        assert_eq!(
            script.commands(),
            &[
                (3, "/ip dns set servers=1.1.1.1".to_string()),
                (5, "/system clock set time-zone-name=UTC".to_string()),
            ]
        );
    }

    #[test]
    fn test_script_load_missing_file() {
        let err = Script::load(Path::new("/nonexistent/setup.rsc")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_full_sequence() {
        let device = MockDevice::new();
        let updater = FakeUpdater::default();
        let exporter = FakeExporter::default();
        let orchestrator = EnrollmentOrchestrator::new(device.clone(), updater, exporter);

        let mut opts = options("/ip dns set servers=1.1.1.1\n");
        opts.post_script = Some(Script::parse("/user remove admin\n"));
        let report = orchestrator.enroll("192.168.88.1", &opts).await.unwrap();

        assert_eq!(
            device.commands(),
            vec![
                "/ip dns set servers=1.1.1.1",
                "/system identity set name=router1",
                "/user remove admin",
            ]
        );
        assert_eq!(report.commands_run, 2);
        assert!(matches!(report.update, StepOutcome::Done(_)));
        assert!(matches!(report.export, StepOutcome::Done(_)));
        assert_eq!(device.connects(), 2);
        assert_eq!(device.closes(), 2);
    }

    #[tokio::test]
    async fn test_pre_script_failure_names_line() {
        let device = MockDevice::new();
        device.fail("/interface bridge add name=br0", "exit status 1");
        let orchestrator =
            EnrollmentOrchestrator::new(device.clone(), FakeUpdater::default(), FakeExporter::default());

        let err = orchestrator
            .enroll("192.168.88.1", &options("# setup\n/interface bridge add name=br0\n"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("line 2"));
        assert_eq!(device.count("/system identity set name=router1"), 0);
        assert_eq!(orchestrator.updater.calls.load(Ordering::SeqCst), 0);
        assert_eq!(device.closes(), 1);
    }

    #[tokio::test]
    async fn test_update_and_export_failures_are_not_fatal() {
        let device = MockDevice::new();
        let updater = FakeUpdater {
            fail: true,
            ..Default::default()
        };
        let exporter = FakeExporter {
            fail: true,
            ..Default::default()
        };
        let orchestrator = EnrollmentOrchestrator::new(device.clone(), updater, exporter);

        let report = orchestrator.enroll("router1", &options("")).await.unwrap();
        assert!(report.update.is_failed());
        assert!(report.export.is_failed());
    }

    #[tokio::test]
    async fn test_skipped_steps() {
        let device = MockDevice::new();
        let orchestrator =
            EnrollmentOrchestrator::new(device.clone(), FakeUpdater::default(), FakeExporter::default());

        let mut opts = options("");
        opts.skip_updates = true;
        opts.skip_export = true;
        let report = orchestrator.enroll("router1", &opts).await.unwrap();

        assert!(matches!(report.update, StepOutcome::Skipped));
        assert!(matches!(report.export, StepOutcome::Skipped));
        assert_eq!(orchestrator.updater.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.exporter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_untrusted_host_aborts() {
        let device = MockDevice::new();
        device.untrusted();
        let orchestrator =
            EnrollmentOrchestrator::new(device.clone(), FakeUpdater::default(), FakeExporter::default());

        let err = orchestrator.enroll("router1", &options("")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotEnrolled);
        assert!(device.commands().is_empty());
    }
}
