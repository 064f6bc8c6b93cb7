//! Opaque license keys.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SEGMENTS: usize = 5;
const SEGMENT_LEN: usize = 8;

/// Length of a generated key including separators.
pub const KEY_LENGTH: usize = SEGMENTS * SEGMENT_LEN + (SEGMENTS - 1);

/// A license key, e.g. `7KQ2M9XA-...`.
///
/// Keys carry no information; they are looked up, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Generates a random key of five dash-separated, eight-character segments.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let mut key = String::with_capacity(KEY_LENGTH);
        for segment in 0..SEGMENTS {
            if segment > 0 {
                key.push('-');
            }
            for _ in 0..SEGMENT_LEN {
                key.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
            }
        }
        Self(key)
    }

    /// Returns true if `s` has the shape of a generated key.
    #[must_use]
    pub fn is_well_formed(s: &str) -> bool {
        let segments: Vec<&str> = s.split('-').collect();
        segments.len() == SEGMENTS
            && segments.iter().all(|seg| {
                seg.len() == SEGMENT_LEN && seg.bytes().all(|b| ALPHABET.contains(&b))
            })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LicenseKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LicenseKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
