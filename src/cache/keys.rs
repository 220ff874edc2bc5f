//! Cache key construction.
//!
//! Keys must match the ones a cache warmer writes, so the format is fixed:
//! `prefix:username`, or `prefix:username:<hash>` where the hash is the first
//! 16 hex characters of the MD5 of an identifier that is unsafe to embed
//! verbatim (course URLs).

use md5::{Digest, Md5};

pub const SCHEDULE_PREFIX: &str = "schedule";
pub const ATTENDANCE_PREFIX: &str = "attendance";
pub const CONTENT_PREFIX: &str = "cms_content";

const HASH_LEN: usize = 16;

/// Build a cache key for `username`, optionally scoped by a hashed identifier.
pub fn cache_key(prefix: &str, username: &str, identifier: Option<&str>) -> String {
    match identifier {
        Some(identifier) => format!("{prefix}:{username}:{}", short_hash(identifier)),
        None => format!("{prefix}:{username}"),
    }
}

fn short_hash(identifier: &str) -> String {
    let digest = Md5::digest(identifier.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}
