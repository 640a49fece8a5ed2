//! Content-derived short keys and input URL validation.
//!
//! A short key is the BLAKE3 digest of the original URL, hex-encoded and
//! truncated to [`SHORT_KEY_LEN`] characters. Truncation makes collisions
//! possible in principle; stores detect them as [`Error::Conflict`].

use crate::error::{Error, Result};

/// Length of a short key in hex characters.
pub const SHORT_KEY_LEN: usize = 8;

/// Hash an input string to its short key.
///
/// # Examples
///
/// ```
/// use shortener::hasher::{hash, SHORT_KEY_LEN};
///
/// let key = hash("https://example.com");
/// assert_eq!(key.len(), SHORT_KEY_LEN);
/// assert_eq!(key, hash("https://example.com"));
/// ```
#[must_use]
pub fn hash(input: &str) -> String {
    let digest = blake3::hash(input.as_bytes());
    let mut key = hex::encode(&digest.as_bytes()[..SHORT_KEY_LEN / 2]);
    key.truncate(SHORT_KEY_LEN);
    key
}

/// Check that `input` is an absolute URL with a scheme and host.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] for empty input, relative references and
/// URLs without a host (`mailto:`, `data:` and similar).
pub fn validate_url(input: &str) -> Result<()> {
    if input.trim().is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }

    let parsed = url::Url::parse(input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))?;

    if parsed.cannot_be_a_base() || !parsed.has_host() {
        return Err(Error::InvalidUrl(format!("{input}: missing host")));
    }

    Ok(())
}
