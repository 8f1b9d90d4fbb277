//! Sorted key-value substrate.
//!
//! Everything above this module talks to storage through [`KvStore`]: point
//! reads, single writes, all-or-nothing [`AtomicOperation`]s guarded by
//! versionstamp checks, and ordered prefix scans. Two backends ship with the
//! service: [`MemoryKv`] for tests and single-process deployments, and
//! [`RedisKv`] for everything else.

use async_trait::async_trait;
use thiserror::Error;

pub mod key;
pub mod memory;
pub mod redis_store;

pub use key::{prefix_range_end, AttemptKeys, KvKey};
pub use memory::MemoryKv;
pub use redis_store::RedisKv;

/// Monotonically increasing commit id assigned by the backend.
pub type Versionstamp = u64;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("transaction conflict: a check failed, nothing was written")]
    Conflict,

    #[error("key-value store handle is closed")]
    Closed,

    #[error("invalid scan selector: {0}")]
    InvalidSelector(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt entry: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: KvKey,
    pub value: Vec<u8>,
    pub versionstamp: Versionstamp,
}

/// Precondition of an atomic operation. `versionstamp: None` means the key
/// must be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub key: KvKey,
    pub versionstamp: Option<Versionstamp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Set { key: KvKey, value: Vec<u8> },
    Delete { key: KvKey },
}

/// Checks and mutations committed together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicOperation {
    pub checks: Vec<Check>,
    pub mutations: Vec<Mutation>,
}

impl AtomicOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, key: KvKey, versionstamp: Option<Versionstamp>) -> Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    pub fn set(mut self, key: KvKey, value: Vec<u8>) -> Self {
        self.mutations.push(Mutation::Set { key, value });
        self
    }

    pub fn delete(mut self, key: KvKey) -> Self {
        self.mutations.push(Mutation::Delete { key });
        self
    }
}

/// Ordered scan over every key under `prefix`, optionally starting at
/// `start` (inclusive), which must itself lie under `prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSelector {
    pub prefix: KvKey,
    pub start: Option<KvKey>,
}

impl ScanSelector {
    pub fn prefix(prefix: KvKey) -> Self {
        Self {
            prefix,
            start: None,
        }
    }

    pub fn starting_at(prefix: KvKey, start: KvKey) -> Self {
        Self {
            prefix,
            start: Some(start),
        }
    }

    /// Byte range `[from, to)` of the selector. `to` is `None` when the range
    /// is unbounded above.
    pub fn byte_range(&self) -> Result<(Vec<u8>, Option<Vec<u8>>), KvError> {
        let prefix = self.prefix.encode();
        let from = match &self.start {
            Some(start) if !start.starts_with(&self.prefix) => {
                return Err(KvError::InvalidSelector(format!(
                    "start key {} is outside prefix {}",
                    start, self.prefix
                )));
            }
            Some(start) => start.encode(),
            None => prefix.clone(),
        };
        Ok((from, prefix_range_end(&prefix)))
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend name used in metrics and health output.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &KvKey) -> Result<Option<KvEntry>, KvError>;

    async fn set(&self, key: &KvKey, value: Vec<u8>) -> Result<Versionstamp, KvError> {
        self.commit(AtomicOperation::new().set(key.clone(), value))
            .await
    }

    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &KvKey) -> Result<(), KvError> {
        self.commit(AtomicOperation::new().delete(key.clone()))
            .await
            .map(|_| ())
    }

    /// Applies every mutation or none. Fails with [`KvError::Conflict`] when a
    /// check does not hold.
    async fn commit(&self, op: AtomicOperation) -> Result<Versionstamp, KvError>;

    /// Entries in ascending encoded-key order.
    async fn scan(&self, selector: &ScanSelector) -> Result<Vec<KvEntry>, KvError>;

    /// Releases the handle. Every later call fails with [`KvError::Closed`].
    async fn close(&self) -> Result<(), KvError>;

    /// Liveness check for the health endpoint.
    async fn ping(&self) -> Result<(), KvError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_rejects_start_outside_prefix() {
        let selector = ScanSelector::starting_at(
            AttemptKeys::user_prefix("alice"),
            AttemptKeys::by_attempt_id("bob", "2026-01-01T00:00:00.000Z"),
        );
        assert!(matches!(
            selector.byte_range(),
            Err(KvError::InvalidSelector(_))
        ));
    }

    #[test]
    fn selector_range_starts_at_prefix_by_default() {
        let prefix = AttemptKeys::user_prefix("alice");
        let (from, to) = ScanSelector::prefix(prefix.clone()).byte_range().unwrap();
        assert_eq!(from, prefix.encode());
        assert!(to.unwrap() > from);
    }
}
