//! Re-enrollment of devices whose host key legitimately changed.

use log::{debug, error, info};

use super::record::HostKeyRecord;
use super::store::HostKeyStore;
use crate::batch::BatchReport;
use crate::error::Result;
use crate::host::HostAddress;
use crate::transport::{RemoteSession, SessionFactory};

/// Replaces pinned keys by reconnecting in enrollment mode.
///
/// The factory must capture unknown keys into `store`.
pub struct KeyRotation<F> {
    factory: F,
    store: HostKeyStore,
}

impl<F: SessionFactory> KeyRotation<F> {
    pub fn new(factory: F, store: HostKeyStore) -> Self {
        Self { factory, store }
    }

    /// Back up and drop the current key, then pin whatever the device presents.
    ///
    /// If no new key ends up on file the previous one is restored.
    pub async fn rotate_host(&self, host: &str) -> Result<HostKeyRecord> {
        let short_name = HostAddress::parse(host).short_name;

        self.store.backup(&short_name)?;
        self.store.delete(&short_name)?;

        match self.repin(host, &short_name).await {
            Ok(record) => {
                info!("new host key for {}: {}", host, record.fingerprint);
                Ok(record)
            }
            Err(e) => {
                if let Err(restore) = self.store.restore(&short_name) {
                    error!("failed to restore host key backup for {}: {}", host, restore);
                }
                Err(e)
            }
        }
    }

    /// Connect once and load the key the factory pinned.
    async fn repin(&self, host: &str, short_name: &str) -> Result<HostKeyRecord> {
        let mut session = self.factory.connect(host).await?;
        if let Err(e) = session.close().await {
            debug!("ignoring close error for {}: {}", host, e);
        }
        Ok(self.store.load_record(short_name)?)
    }

    /// Rotate each host in order, continuing past failures.
    pub async fn rotate_hosts(&self, hosts: &[String]) -> BatchReport<HostKeyRecord> {
        let mut batch = BatchReport::new();
        for host in hosts {
            let result = self.rotate_host(host).await;
            batch.record(host, result);
        }
        batch
    }
}
