//! Pseudo-version codec.
//!
//! Only the v0 form without a base version is supported:
//! `v0.0.0-YYYYMMDDhhmmss-abcdefabcdef`, where the timestamp is the commit's
//! UTC committer time and the suffix is the first 12 hex digits of its hash.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

const PREFIX: &str = "v0.0.0-";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const TIMESTAMP_LEN: usize = 14;

/// Number of commit hash digits in a pseudo-version.
pub const SHORT_HASH_LEN: usize = 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed pseudo-version {version:?}: {reason}")]
pub struct PseudoVersionError {
    pub version: String,
    pub reason: &'static str,
}

/// Build the pseudo-version for a commit.
pub fn pseudo_version(time: DateTime<Utc>, commit_hex: &str) -> String {
    let short = &commit_hex[..commit_hex.len().min(SHORT_HASH_LEN)];
    format!("{}{}-{}", PREFIX, time.format(TIMESTAMP_FORMAT), short)
}

/// Split a pseudo-version into its timestamp and abbreviated commit hash.
pub fn parse_pseudo_version(version: &str) -> Result<(DateTime<Utc>, String), PseudoVersionError> {
    let malformed = |reason| PseudoVersionError {
        version: version.to_string(),
        reason,
    };

    let rest = version
        .strip_prefix(PREFIX)
        .ok_or_else(|| malformed("not a v0.0.0 pseudo-version"))?;
    let (timestamp, hash) = rest.split_once('-').ok_or_else(|| malformed("missing commit hash"))?;

    if timestamp.len() != TIMESTAMP_LEN || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("timestamp must be 14 digits"));
    }
    if hash.len() != SHORT_HASH_LEN || !hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return Err(malformed("commit hash must be 12 lower-case hex digits"));
    }

    let time = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| malformed("invalid timestamp"))?
        .and_utc();
    Ok((time, hash.to_string()))
}
