use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use anyhow::Result;
use shared::types::DiscoveryRecord;
use crate::config::DedupKey;

/// Commands sent to the registry task
#[derive(Debug)]
pub enum RegistryCommand {
    InsertIfAbsent(DiscoveryRecord, oneshot::Sender<bool>),
    Snapshot(oneshot::Sender<Vec<DiscoveryRecord>>),
    Len(oneshot::Sender<usize>),
    Shutdown,
}

/// Handle to the discovery registry.
///
/// One task owns the map and applies commands in arrival order, so the
/// check-then-insert in [`RegistryHandle::insert_if_absent`] can never
/// interleave with another writer.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

fn record_key(key: DedupKey, record: &DiscoveryRecord) -> String {
    match key {
        DedupKey::HostPort => record.endpoint(),
        DedupKey::Host => record.address.clone(),
    }
}

impl RegistryHandle {
    /// Spawn the registry task
    pub fn spawn(key: DedupKey) -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(256);

        tokio::spawn(async move {
            let mut records: HashMap<String, DiscoveryRecord> = HashMap::new();

            while let Some(cmd) = rx.recv().await {
                match cmd {
                    RegistryCommand::InsertIfAbsent(record, reply) => {
                        let k = record_key(key, &record);
                        let inserted = if records.contains_key(&k) {
                            false
                        } else {
                            records.insert(k, record);
                            true
                        };
                        let _ = reply.send(inserted);
                    }
                    RegistryCommand::Snapshot(reply) => {
                        let _ = reply.send(records.values().cloned().collect());
                    }
                    RegistryCommand::Len(reply) => {
                        let _ = reply.send(records.len());
                    }
                    RegistryCommand::Shutdown => {
                        tracing::debug!("Registry task shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Store `record` unless its key is already taken. Returns true if stored;
    /// the first writer wins and later records for the same key are dropped.
    pub async fn insert_if_absent(&self, record: DiscoveryRecord) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::InsertIfAbsent(record, reply)).await?;
        Ok(rx.await?)
    }

    /// Copy of every record, in no particular order
    pub async fn snapshot(&self) -> Result<Vec<DiscoveryRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Snapshot(reply)).await?;
        Ok(rx.await?)
    }

    pub async fn len(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Len(reply)).await?;
        Ok(rx.await?)
    }

    /// Stop the registry task
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(RegistryCommand::Shutdown).await?;
        Ok(())
    }
}
