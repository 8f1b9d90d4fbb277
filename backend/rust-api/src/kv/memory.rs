use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AtomicOperation, KvEntry, KvError, KvKey, KvStore, Mutation, ScanSelector, Versionstamp,
};
use crate::metrics::track_kv_operation;

const BACKEND: &str = "memory";

#[derive(Default)]
struct Inner {
    entries: BTreeMap<Vec<u8>, (Vec<u8>, Versionstamp)>,
    last_versionstamp: Versionstamp,
}

/// In-process sorted store. Commits take the write lock for their whole
/// duration, so checks and mutations are applied atomically.
#[derive(Default)]
pub struct MemoryKv {
    inner: RwLock<Inner>,
    closed: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), KvError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::Closed);
        }
        Ok(())
    }
}

fn entry_from(
    raw_key: &[u8],
    value: &[u8],
    versionstamp: Versionstamp,
) -> Result<KvEntry, KvError> {
    Ok(KvEntry {
        key: KvKey::decode(raw_key)?,
        value: value.to_vec(),
        versionstamp,
    })
}

#[async_trait]
impl KvStore for MemoryKv {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &KvKey) -> Result<Option<KvEntry>, KvError> {
        track_kv_operation(BACKEND, "get", async {
            self.ensure_open()?;
            let inner = self.inner.read().await;
            let raw_key = key.encode();
            let entry = inner
                .entries
                .get(&raw_key)
                .map(|(value, stamp)| entry_from(&raw_key, value, *stamp))
                .transpose();
            entry
        })
        .await
    }

    async fn commit(&self, op: AtomicOperation) -> Result<Versionstamp, KvError> {
        track_kv_operation(BACKEND, "commit", async move {
            self.ensure_open()?;
            let mut inner = self.inner.write().await;

            for check in &op.checks {
                let current = inner
                    .entries
                    .get(&check.key.encode())
                    .map(|(_, stamp)| *stamp);
                if current != check.versionstamp {
                    return Err(KvError::Conflict);
                }
            }

            inner.last_versionstamp += 1;
            let stamp = inner.last_versionstamp;

            for mutation in op.mutations {
                match mutation {
                    Mutation::Set { key, value } => {
                        inner.entries.insert(key.encode(), (value, stamp));
                    }
                    Mutation::Delete { key } => {
                        inner.entries.remove(&key.encode());
                    }
                }
            }

            Ok(stamp)
        })
        .await
    }

    async fn scan(&self, selector: &ScanSelector) -> Result<Vec<KvEntry>, KvError> {
        track_kv_operation(BACKEND, "scan", async {
            self.ensure_open()?;
            let (from, to) = selector.byte_range()?;
            let upper = match to {
                Some(end) => Bound::Excluded(end),
                None => Bound::Unbounded,
            };

            let inner = self.inner.read().await;
            let entries = inner
                .entries
                .range((Bound::Included(from), upper))
                .map(|(raw_key, (value, stamp))| entry_from(raw_key, value, *stamp))
                .collect();
            entries
        })
        .await
    }

    async fn close(&self) -> Result<(), KvError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.ensure_open()
    }
}
