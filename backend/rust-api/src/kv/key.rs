use std::fmt;

use super::KvError;

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0xFF;

/// Composite key made of string segments.
///
/// Keys are encoded so that byte order of the encodings matches the tuple
/// order of the segments, and the encoding of a key is a byte prefix of the
/// encoding of every key that extends it. Each segment is written with `0x00`
/// escaped as `0x00 0xFF` and closed by a `0x00` terminator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KvKey {
    segments: Vec<String>,
}

impl KvKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns a new key with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn starts_with(&self, prefix: &KvKey) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.segments.iter().map(|s| s.len() + 1).sum());
        for segment in &self.segments {
            for &byte in segment.as_bytes() {
                out.push(byte);
                if byte == TERMINATOR {
                    out.push(ESCAPE);
                }
            }
            out.push(TERMINATOR);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, KvError> {
        let mut segments = Vec::new();
        let mut current = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            let byte = bytes[i];
            if byte == TERMINATOR {
                if bytes.get(i + 1) == Some(&ESCAPE) {
                    current.push(TERMINATOR);
                    i += 2;
                    continue;
                }
                let segment = String::from_utf8(std::mem::take(&mut current))
                    .map_err(|_| KvError::InvalidKey("segment is not valid UTF-8".to_string()))?;
                segments.push(segment);
            } else {
                current.push(byte);
            }
            i += 1;
        }

        if !current.is_empty() {
            return Err(KvError::InvalidKey(
                "trailing segment is missing its terminator".to_string(),
            ));
        }

        Ok(Self { segments })
    }
}

impl fmt::Display for KvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.segments.join(", "))
    }
}

/// Exclusive upper bound of the byte range covered by `prefix`.
///
/// Returns `None` when every key sorts below the bound (empty prefix or a
/// prefix made only of `0xFF` bytes).
pub fn prefix_range_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

const ATTEMPTS: &str = "attempts";
const BY_ATTEMPT_ID: &str = "by_attempt_id";
const BY_QUESTION_ID: &str = "by_question_id";

/// Key builders for the two attempt indexes. Nothing else should assemble
/// attempt keys by hand.
pub struct AttemptKeys;

impl AttemptKeys {
    /// `(by_attempt_id, user_id)` prefix.
    pub fn user_prefix(user_id: &str) -> KvKey {
        KvKey::new([ATTEMPTS, BY_ATTEMPT_ID, user_id])
    }

    /// `(by_attempt_id, user_id, attempt_id)`
    pub fn by_attempt_id(user_id: &str, attempt_id: &str) -> KvKey {
        Self::user_prefix(user_id).child(attempt_id)
    }

    /// `(by_question_id, user_id, question_id)` prefix.
    pub fn question_prefix(user_id: &str, question_id: &str) -> KvKey {
        KvKey::new([ATTEMPTS, BY_QUESTION_ID, user_id, question_id])
    }

    /// `(by_question_id, user_id, question_id, attempt_id)`
    pub fn by_question_id(user_id: &str, question_id: &str, attempt_id: &str) -> KvKey {
        Self::question_prefix(user_id, question_id).child(attempt_id)
    }
}
