//! Conversion between snapshots and the string stored under a persistence key.
//!
//! Format of the stored text:
//! ```text
//! base64( secret ++ base64( utf8( {"data": <state>, "expiry"?: <epoch-millis>} ) ) )
//! ```
//!
//! The secret only deters casual inspection of the backing store. It is
//! **not** a key in any security sense and this is **not** encryption:
//! anyone holding the stored text can recover the state without the secret.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use strata_common::Snapshot;

/// Errors from the obfuscation stages. Never surfaced by [`decode`] or [`encode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The persisted wrapper around a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Snapshot,
    /// Epoch milliseconds after which the envelope is logically absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

impl Envelope {
    /// Wrap a snapshot, stamping `now + ttl` as expiry when a ttl is given.
    pub fn new(data: Snapshot, ttl: Option<Duration>, now_millis: u64) -> Self {
        let expiry = ttl.map(|ttl| {
            let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            now_millis.saturating_add(ttl_millis)
        });
        Self { data, expiry }
    }

    /// Whether the envelope has expired at `now_millis`.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.expiry.is_some_and(|expiry| now_millis > expiry)
    }
}

/// Apply the two-stage reversible text transform.
pub fn obfuscate(plain: &str, secret: &str) -> String {
    let inner = STANDARD.encode(plain.as_bytes());
    STANDARD.encode(format!("{secret}{inner}"))
}

/// Reverse [`obfuscate`]. The secret prefix is stripped only when present.
pub fn deobfuscate(raw: &str, secret: &str) -> Result<String, CodecError> {
    let outer = String::from_utf8(STANDARD.decode(raw.trim())?)?;
    let stripped = outer.strip_prefix(secret).unwrap_or(&outer);
    Ok(String::from_utf8(STANDARD.decode(stripped)?)?)
}

/// Serialize and obfuscate an envelope.
///
/// Returns `None` after logging a warning if serialization fails, so callers
/// can skip the write and keep the last good record.
pub fn encode(envelope: &Envelope, secret: &str) -> Option<String> {
    match serde_json::to_string(envelope) {
        Ok(json) => Some(obfuscate(&json, secret)),
        Err(err) => {
            tracing::warn!(%err, "failed to serialize state envelope");
            None
        }
    }
}

/// Reverse [`encode`].
///
/// Returns `None` for absent, empty, or unparsable input. If the obfuscation
/// cannot be reversed the raw text is tried as plain envelope JSON. Expiry is
/// not checked here.
pub fn decode(raw: Option<&str>, secret: &str) -> Option<Envelope> {
    let raw = raw.filter(|raw| !raw.is_empty())?;
    let text = match deobfuscate(raw, secret) {
        Ok(text) => Cow::Owned(text),
        Err(err) => {
            tracing::debug!(%err, "stored state is not obfuscated, reading as plain text");
            Cow::Borrowed(raw)
        }
    };
    match serde_json::from_str::<Envelope>(&text) {
        Ok(envelope) => Some(envelope),
        Err(err) => {
            tracing::debug!(%err, "stored state is not a valid envelope");
            None
        }
    }
}
