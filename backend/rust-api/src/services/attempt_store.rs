use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::kv::{AtomicOperation, AttemptKeys, KvEntry, KvError, KvStore, ScanSelector};
use crate::models::Attempt;
use crate::utils::time::{parse_iso_millis, to_iso_millis};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum AttemptStoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("attempt {attempt_id} not found for user {user_id}")]
    NotFound { user_id: String, attempt_id: String },

    #[error("transaction aborted by a conflicting write; retry the operation")]
    TransactionAborted,

    #[error(transparent)]
    Kv(KvError),

    #[error("failed to (de)serialize attempt: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<KvError> for AttemptStoreError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Conflict => AttemptStoreError::TransactionAborted,
            other => AttemptStoreError::Kv(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, AttemptStoreError>;

/// Attempt records indexed twice over a sorted key-value store:
///
/// 1. `(by_attempt_id, user_id, attempt_id)`
/// 2. `(by_question_id, user_id, question_id, attempt_id)`
///
/// Both entries are written and removed in the same atomic commit. Errors are
/// returned to the caller untouched; nothing here logs or retries.
#[derive(Clone)]
pub struct AttemptStore {
    kv: Arc<dyn KvStore>,
}

impl AttemptStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn add_attempt(&self, attempt: &Attempt) -> Result<()> {
        if parse_iso_millis(&attempt.attempt_id).is_none() {
            return Err(AttemptStoreError::Validation(format!(
                "attempt_id {:?} is not a canonical ISO-8601 timestamp",
                attempt.attempt_id
            )));
        }

        let value = serde_json::to_vec(attempt)?;
        let op = AtomicOperation::new()
            .set(
                AttemptKeys::by_attempt_id(&attempt.user_id, &attempt.attempt_id),
                value.clone(),
            )
            .set(
                AttemptKeys::by_question_id(
                    &attempt.user_id,
                    &attempt.question_id,
                    &attempt.attempt_id,
                ),
                value,
            );

        self.kv.commit(op).await?;
        Ok(())
    }

    pub async fn get_attempt(&self, user_id: &str, attempt_id: &str) -> Result<Attempt> {
        let entry = self
            .kv
            .get(&AttemptKeys::by_attempt_id(user_id, attempt_id))
            .await?
            .ok_or_else(|| AttemptStoreError::NotFound {
                user_id: user_id.to_string(),
                attempt_id: attempt_id.to_string(),
            })?;

        Ok(serde_json::from_slice(&entry.value)?)
    }

    /// Every attempt of the user, oldest first.
    pub async fn list_by_user_id(&self, user_id: &str) -> Result<Vec<Attempt>> {
        let entries = self
            .kv
            .scan(&ScanSelector::prefix(AttemptKeys::user_prefix(user_id)))
            .await?;
        decode_all(entries)
    }

    pub async fn list_by_question_id(&self, user_id: &str, question_id: &str) -> Result<Vec<Attempt>> {
        let entries = self
            .kv
            .scan(&ScanSelector::prefix(AttemptKeys::question_prefix(
                user_id,
                question_id,
            )))
            .await?;
        decode_all(entries)
    }

    /// Attempts whose id is at or after `now - window`, with `now` read from
    /// the clock at call time.
    pub async fn list_with_lookback_window(
        &self,
        user_id: &str,
        window: Option<Duration>,
    ) -> Result<Vec<Attempt>> {
        let window = window.unwrap_or_else(|| Duration::days(DEFAULT_LOOKBACK_DAYS));
        let since = Utc::now().checked_sub_signed(window).ok_or_else(|| {
            AttemptStoreError::Validation(format!(
                "lookback window of {} days reaches past the supported date range",
                window.num_days()
            ))
        })?;
        self.list_since(user_id, since).await
    }

    pub async fn list_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<Attempt>> {
        let selector = ScanSelector::starting_at(
            AttemptKeys::user_prefix(user_id),
            AttemptKeys::by_attempt_id(user_id, &to_iso_millis(since)),
        );
        let entries = self.kv.scan(&selector).await?;
        decode_all(entries)
    }

    /// Removes both index entries. Deleting a missing attempt is a no-op.
    pub async fn delete_attempt(
        &self,
        user_id: &str,
        attempt_id: &str,
        question_id: &str,
    ) -> Result<()> {
        let op = AtomicOperation::new()
            .delete(AttemptKeys::by_attempt_id(user_id, attempt_id))
            .delete(AttemptKeys::by_question_id(user_id, question_id, attempt_id));

        self.kv.commit(op).await?;
        Ok(())
    }

    /// Cascade for question removal: deletes every attempt the user has on
    /// `question_id` in one commit. The commit is guarded by the versionstamps
    /// read during the listing, so a concurrent write to any of those entries
    /// aborts the whole cascade.
    pub async fn delete_question_attempts(&self, user_id: &str, question_id: &str) -> Result<usize> {
        let entries = self
            .kv
            .scan(&ScanSelector::prefix(AttemptKeys::question_prefix(
                user_id,
                question_id,
            )))
            .await?;

        if entries.is_empty() {
            return Ok(0);
        }

        let mut op = AtomicOperation::new();
        for entry in &entries {
            let attempt: Attempt = serde_json::from_slice(&entry.value)?;
            let by_attempt = AttemptKeys::by_attempt_id(user_id, &attempt.attempt_id);
            op = op
                .check(entry.key.clone(), Some(entry.versionstamp))
                .delete(entry.key.clone())
                .delete(by_attempt);
        }

        self.kv.commit(op).await?;
        Ok(entries.len())
    }

    /// Releases the underlying key-value handle. Only the owner of a dedicated
    /// handle should call this; clones share the same handle.
    pub async fn close(self) -> Result<()> {
        self.kv.close().await?;
        Ok(())
    }
}

fn decode_all(entries: Vec<KvEntry>) -> Result<Vec<Attempt>> {
    entries
        .iter()
        .map(|entry| serde_json::from_slice(&entry.value).map_err(AttemptStoreError::from))
        .collect()
}
