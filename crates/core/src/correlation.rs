//! Correlation tokens binding a submission to its eventual output.
//!
//! A token has the shape `{prefix}_{user_id}_{unix_millis}` and is the
//! only thing used to recognise a job's entry in the shared history of
//! the remote service. Tokens must therefore never repeat within the
//! process, even when two users submit in the same millisecond.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::{Timestamp, UserId};

/// Default token prefix, naming the chat surface the request came from.
pub const DEFAULT_TOKEN_PREFIX: &str = "telegram";

/// Opaque per-job correlation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Wrap an already-formatted token string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the uploaded input file that carries this token.
    ///
    /// History lookups match on this exact name, so `telegram_4_17` can
    /// never be confused with `telegram_42_17`.
    pub fn input_filename(&self) -> String {
        format!("input_{}.jpg", self.0)
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues process-unique correlation tokens.
///
/// The timestamp component is the submission time in milliseconds. When
/// two submissions land on the same (or an earlier) millisecond the
/// issuer bumps the value past the last one handed out, so tokens stay
/// strictly increasing across all callers.
#[derive(Debug)]
pub struct TokenIssuer {
    prefix: String,
    last_millis: AtomicI64,
}

impl TokenIssuer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            last_millis: AtomicI64::new(i64::MIN),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Issue a token for `user_id` submitting at `submitted_at`.
    pub fn issue(&self, user_id: UserId, submitted_at: Timestamp) -> CorrelationToken {
        let wanted = submitted_at.timestamp_millis();
        let mut current = self.last_millis.load(Ordering::Relaxed);
        let millis = loop {
            let next = if wanted > current { wanted } else { current + 1 };
            match self.last_millis.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break next,
                Err(actual) => current = actual,
            }
        };
        CorrelationToken(format!("{}_{}_{}", self.prefix, user_id, millis))
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_PREFIX)
    }
}
