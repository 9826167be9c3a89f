//! Inline result extraction from a Connect submission response.
//!
//! Connect answers a submission with a JSON object whose non-metadata
//! fields hold base64-encoded outputs, keyed by the output annotation in
//! the workflow (usually `output`). Which keys count as metadata is an
//! explicit allow-list, since the response carries no schema.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

/// Keys checked first, in this order, before any other response key.
pub const PRIORITY_KEYS: [&str; 4] = ["output", "result", "video", "image"];

/// Subkeys searched when a candidate value is a nested object.
pub const NESTED_KEYS: [&str; 6] = ["data", "content", "file", "video", "image", "output"];

/// Response keys that never carry a result.
pub const DEFAULT_METADATA_KEYS: [&str; 7] = [
    "status",
    "client_id",
    "prompt_id",
    "number",
    "node_errors",
    "error",
    "message",
];

/// Strings this short are status text, not encoded media.
pub const MIN_ENCODED_LEN: usize = 100;

/// Smallest decoded payload accepted without recognisable magic bytes.
pub const MIN_UNRECOGNIZED_BYTES: usize = 10_000;

/// Where a candidate result lives in the response, plus its encoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadLocator {
    /// Dotted path into the response, e.g. `output`, `videos[0]`, `result.data`.
    pub path: String,
    /// The base64 text found at `path`.
    pub encoded: String,
}

/// Ordered result candidates located in a submission response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePayload {
    pub candidates: Vec<PayloadLocator>,
}

/// Media container recognised from a payload's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Mp4,
    Gif,
    Jpeg,
    Png,
    WebM,
}

/// Why a located candidate could not be used.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("'{path}' is not valid base64: {source}")]
    InvalidBase64 {
        path: String,
        source: base64::DecodeError,
    },

    #[error("'{path}' decoded to {len} bytes of unrecognised data")]
    Unrecognized { path: String, len: usize },
}

/// Finds base64 result candidates in a response, skipping metadata keys.
#[derive(Debug, Clone)]
pub struct InlineExtractor {
    metadata_keys: HashSet<String>,
}

impl InlineExtractor {
    pub fn new<I, S>(metadata_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metadata_keys: metadata_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_metadata(&self, key: &str) -> bool {
        self.metadata_keys.contains(key)
    }

    /// Locate every candidate payload in `response`, priority keys first,
    /// then the remaining non-metadata keys in response order.
    ///
    /// Returns `None` when the response holds nothing that looks like an
    /// encoded payload.
    pub fn locate(&self, response: &Value) -> Option<InlinePayload> {
        let object = response.as_object()?;

        let ordered_keys = PRIORITY_KEYS
            .iter()
            .copied()
            .filter(|key| object.contains_key(*key))
            .chain(
                object
                    .keys()
                    .map(String::as_str)
                    .filter(|key| !PRIORITY_KEYS.contains(key)),
            )
            .filter(|key| !self.is_metadata(key));

        let candidates: Vec<PayloadLocator> = ordered_keys
            .filter_map(|key| locate_in_value(key, &object[key]))
            .collect();

        if candidates.is_empty() {
            None
        } else {
            Some(InlinePayload { candidates })
        }
    }
}

impl Default for InlineExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_KEYS)
    }
}

/// Find an encoded string directly at `value`, in the first item of a
/// list, or one level down under a [`NESTED_KEYS`] subkey.
fn locate_in_value(key: &str, value: &Value) -> Option<PayloadLocator> {
    match value {
        Value::Object(map) => NESTED_KEYS.iter().find_map(|subkey| {
            map.get(*subkey)
                .and_then(|inner| encoded_leaf(&format!("{key}.{subkey}"), inner))
        }),
        other => encoded_leaf(key, other),
    }
}

fn encoded_leaf(path: &str, value: &Value) -> Option<PayloadLocator> {
    match value {
        Value::String(s) if s.len() > MIN_ENCODED_LEN => Some(PayloadLocator {
            path: path.to_string(),
            encoded: s.clone(),
        }),
        Value::Array(items) => match items.first() {
            Some(Value::String(s)) if s.len() > MIN_ENCODED_LEN => Some(PayloadLocator {
                path: format!("{path}[0]"),
                encoded: s.clone(),
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Decode a located candidate and check it looks like media.
///
/// A payload with recognised magic bytes is accepted at any size; an
/// unrecognised one only when it is at least [`MIN_UNRECOGNIZED_BYTES`].
pub fn decode_payload(locator: &PayloadLocator) -> Result<Vec<u8>, PayloadError> {
    let bytes = STANDARD
        .decode(locator.encoded.trim())
        .map_err(|source| PayloadError::InvalidBase64 {
            path: locator.path.clone(),
            source,
        })?;

    match sniff_media(&bytes) {
        Some(kind) => {
            tracing::debug!(path = %locator.path, ?kind, len = bytes.len(), "Decoded inline media");
            Ok(bytes)
        }
        None if bytes.len() >= MIN_UNRECOGNIZED_BYTES => {
            tracing::warn!(
                path = %locator.path,
                len = bytes.len(),
                "Unknown magic bytes in large inline payload, using it anyway",
            );
            Ok(bytes)
        }
        None => Err(PayloadError::Unrecognized {
            path: locator.path.clone(),
            len: bytes.len(),
        }),
    }
}

/// Classify a payload by its leading bytes.
pub fn sniff_media(data: &[u8]) -> Option<MediaKind> {
    if data.len() < 10 {
        return None;
    }
    if &data[4..8] == b"ftyp" || data.starts_with(b"ftyp") {
        return Some(MediaKind::Mp4);
    }
    if data.starts_with(b"GIF") {
        return Some(MediaKind::Gif);
    }
    if data.starts_with(&[0xFF, 0xD8]) {
        return Some(MediaKind::Jpeg);
    }
    if data.starts_with(b"\x89PNG") {
        return Some(MediaKind::Png);
    }
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(MediaKind::WebM);
    }
    None
}
