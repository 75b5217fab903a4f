//! Configuration export to `.rsc` files.

use std::future::Future;
use std::path::PathBuf;

use log::{debug, info};

use crate::batch::BatchReport;
use crate::error::{ConfigError, Result};
use crate::host::HostAddress;
use crate::transport::output::normalize_line_endings;
use crate::transport::{RemoteSession, SessionFactory};

/// Behavior of an export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Include passwords and keys in the export.
    pub show_sensitive: bool,
    /// Directory receiving `<short name>.rsc`.
    pub output_dir: PathBuf,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            show_sensitive: false,
            output_dir: PathBuf::from("."),
        }
    }
}

impl ExportOptions {
    /// The vendor export command for these options.
    pub fn command(&self) -> &'static str {
        if self.show_sensitive {
            "/export terse show-sensitive"
        } else {
            "/export terse"
        }
    }
}

/// Anything able to save a host's configuration.
pub trait Exporter: Send + Sync {
    /// Export `host` and return the written file.
    fn export(&self, host: &str) -> impl Future<Output = Result<PathBuf>> + Send;
}

/// Exports configuration over a fresh session per host.
pub struct ConfigExporter<F> {
    factory: F,
    options: ExportOptions,
}

impl<F: SessionFactory> ConfigExporter<F> {
    pub fn new(factory: F, options: ExportOptions) -> Self {
        Self { factory, options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Where the export of `host` is written.
    pub fn output_path(&self, host: &str) -> PathBuf {
        let short_name = HostAddress::parse(host).short_name;
        self.options.output_dir.join(format!("{}.rsc", short_name))
    }

    pub async fn export_host(&self, host: &str) -> Result<PathBuf> {
        info!("initializing SSH connection");
        let mut session = self.factory.connect(host).await?;

        let command = self.options.command();
        debug!("SSH cmd is {}", command);
        info!("exporting router configuration");
        let output = session.run(command).await;
        if let Err(e) = session.close().await {
            debug!("ignoring close error for {}: {}", host, e);
        }
        let config = normalize_line_endings(&output?);

        let path = self.output_path(host);
        debug!("writing configuration to {}", path.display());
        tokio::fs::write(&path, config)
            .await
            .map_err(|source| ConfigError::File {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }

    /// Export every host in order, continuing past failures.
    pub async fn export_hosts(&self, hosts: &[String]) -> BatchReport<PathBuf> {
        let mut batch = BatchReport::new();
        for host in hosts {
            let result = self.export_host(host).await;
            batch.record(host, result);
        }
        batch
    }
}

impl<F: SessionFactory> Exporter for ConfigExporter<F> {
    async fn export(&self, host: &str) -> Result<PathBuf> {
        self.export_host(host).await
    }
}
