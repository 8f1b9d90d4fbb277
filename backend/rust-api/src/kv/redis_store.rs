//! Redis backend for [`KvStore`].
//!
//! Layout under a namespace `ns` (braced so every key hashes to one cluster
//! slot):
//!
//! - `{ns}:kv:index` sorted set, all scores 0, members are hex-encoded keys.
//!   Hex is fixed width and order preserving, so `ZRANGEBYLEX` walks keys in
//!   encoded byte order.
//! - `{ns}:kv:data` hash member -> value bytes
//! - `{ns}:kv:versions` hash member -> versionstamp
//! - `{ns}:kv:stamp` commit counter
//!
//! Commits and scans run as Lua scripts so they observe and modify the three
//! structures atomically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{
    AtomicOperation, KvEntry, KvError, KvKey, KvStore, Mutation, ScanSelector, Versionstamp,
};
use crate::metrics::track_kv_operation;

const BACKEND: &str = "redis";

const COMMIT_SCRIPT: &str = r#"
    local index, data, versions, counter = KEYS[1], KEYS[2], KEYS[3], KEYS[4]
    local checks = tonumber(ARGV[1])
    local pos = 2

    for _ = 1, checks do
        local member, expected = ARGV[pos], ARGV[pos + 1]
        local current = redis.call('HGET', versions, member)
        if expected == '' then
            if current then
                return -1
            end
        elseif current ~= expected then
            return -1
        end
        pos = pos + 2
    end

    local stamp = redis.call('INCR', counter)

    while pos <= #ARGV do
        local kind, member = ARGV[pos], ARGV[pos + 1]
        if kind == 's' then
            redis.call('ZADD', index, 0, member)
            redis.call('HSET', data, member, ARGV[pos + 2])
            redis.call('HSET', versions, member, stamp)
        else
            redis.call('ZREM', index, member)
            redis.call('HDEL', data, member)
            redis.call('HDEL', versions, member)
        end
        pos = pos + 3
    end

    return stamp
"#;

const SCAN_SCRIPT: &str = r#"
    local members = redis.call('ZRANGEBYLEX', KEYS[1], ARGV[1], ARGV[2])
    local out = {}
    for _, member in ipairs(members) do
        out[#out + 1] = member
        out[#out + 1] = redis.call('HGET', KEYS[2], member)
        out[#out + 1] = redis.call('HGET', KEYS[3], member)
    end
    return out
"#;

pub struct RedisKv {
    conn: ConnectionManager,
    index_key: String,
    data_key: String,
    versions_key: String,
    stamp_key: String,
    closed: AtomicBool,
}

impl RedisKv {
    pub fn new(conn: ConnectionManager, namespace: &str) -> Self {
        let base = format!("{{{}}}:kv", namespace);
        Self {
            conn,
            index_key: format!("{}:index", base),
            data_key: format!("{}:data", base),
            versions_key: format!("{}:versions", base),
            stamp_key: format!("{}:stamp", base),
            closed: AtomicBool::new(false),
        }
    }

    /// Opens a connection manager for `uri` and verifies it with PING.
    pub async fn connect(uri: &str, namespace: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(uri)?;

        tracing::info!("Connecting key-value store to Redis...");

        let conn = tokio::time::timeout(Duration::from_secs(30), ConnectionManager::new(client))
            .await
            .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let store = Self::new(conn, namespace);
        tokio::time::timeout(Duration::from_secs(5), store.ping())
            .await
            .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!(namespace, "Redis key-value store ready");
        Ok(store)
    }

    fn ensure_open(&self) -> Result<(), KvError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::Closed);
        }
        Ok(())
    }
}

fn member(key: &KvKey) -> String {
    hex::encode(key.encode())
}

fn decode_member(member: &[u8]) -> Result<KvKey, KvError> {
    let raw = hex::decode(member)
        .map_err(|e| KvError::Corrupt(format!("index member is not hex: {}", e)))?;
    KvKey::decode(&raw)
}

fn parse_stamp(raw: &[u8]) -> Result<Versionstamp, KvError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| KvError::Corrupt("versionstamp is not an integer".to_string()))
}

#[async_trait]
impl KvStore for RedisKv {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &KvKey) -> Result<Option<KvEntry>, KvError> {
        track_kv_operation(BACKEND, "get", async {
            self.ensure_open()?;
            let mut conn = self.conn.clone();
            let field = member(key);

            let (value, stamp): (Option<Vec<u8>>, Option<Vec<u8>>) = redis::pipe()
                .atomic()
                .cmd("HGET")
                .arg(&self.data_key)
                .arg(&field)
                .cmd("HGET")
                .arg(&self.versions_key)
                .arg(&field)
                .query_async(&mut conn)
                .await?;

            match (value, stamp) {
                (Some(value), Some(stamp)) => Ok(Some(KvEntry {
                    key: key.clone(),
                    value,
                    versionstamp: parse_stamp(&stamp)?,
                })),
                (None, None) => Ok(None),
                _ => Err(KvError::Corrupt(format!(
                    "value and versionstamp out of sync for {}",
                    key
                ))),
            }
        })
        .await
    }

    async fn commit(&self, op: AtomicOperation) -> Result<Versionstamp, KvError> {
        track_kv_operation(BACKEND, "commit", async move {
            self.ensure_open()?;
            let mut conn = self.conn.clone();

            let script = redis::Script::new(COMMIT_SCRIPT);
            let mut invocation = script.prepare_invoke();
            invocation
                .key(&self.index_key)
                .key(&self.data_key)
                .key(&self.versions_key)
                .key(&self.stamp_key)
                .arg(op.checks.len());

            for check in &op.checks {
                let expected = check
                    .versionstamp
                    .map(|stamp| stamp.to_string())
                    .unwrap_or_default();
                invocation.arg(member(&check.key)).arg(expected);
            }

            for mutation in &op.mutations {
                match mutation {
                    Mutation::Set { key, value } => {
                        invocation.arg("s").arg(member(key)).arg(value.as_slice());
                    }
                    Mutation::Delete { key } => {
                        invocation.arg("d").arg(member(key)).arg("");
                    }
                }
            }

            let stamp: i64 = invocation.invoke_async(&mut conn).await?;
            if stamp < 0 {
                return Err(KvError::Conflict);
            }
            Ok(stamp as Versionstamp)
        })
        .await
    }

    async fn scan(&self, selector: &ScanSelector) -> Result<Vec<KvEntry>, KvError> {
        track_kv_operation(BACKEND, "scan", async {
            self.ensure_open()?;
            let (from, to) = selector.byte_range()?;
            let min = format!("[{}", hex::encode(from));
            let max = match to {
                Some(end) => format!("({}", hex::encode(end)),
                None => "+".to_string(),
            };

            let mut conn = self.conn.clone();
            let flat: Vec<Vec<u8>> = redis::Script::new(SCAN_SCRIPT)
                .key(&self.index_key)
                .key(&self.data_key)
                .key(&self.versions_key)
                .arg(min)
                .arg(max)
                .invoke_async(&mut conn)
                .await?;

            if flat.len() % 3 != 0 {
                return Err(KvError::Corrupt(
                    "scan returned an incomplete entry".to_string(),
                ));
            }

            flat.chunks_exact(3)
                .map(|chunk| {
                    Ok(KvEntry {
                        key: decode_member(&chunk[0])?,
                        value: chunk[1].clone(),
                        versionstamp: parse_stamp(&chunk[2])?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn close(&self) -> Result<(), KvError> {
        // ConnectionManager tears the connection down once the last clone is
        // dropped; the flag stops this handle from issuing further commands.
        self.closed.store(true, Ordering::Release);
        tracing::info!("Redis key-value store closed");
        Ok(())
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
