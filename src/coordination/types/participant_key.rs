//! Process-lifetime-unique participant keys.
//!
//! A key is the registry's primary key for one running participant. It is
//! regenerated on every start and never coordinated centrally: uniqueness
//! comes from a microsecond timestamp followed by 64 random bits.

use chrono::Utc;
use std::fmt;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque key identifying one participant in the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantKey(String);

impl ParticipantKey {
    /// Generates a fresh key from the current time and a random suffix.
    pub fn generate() -> Self {
        let micros = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        let suffix: u64 = rand::random();
        ParticipantKey(format!("{}{}", to_base36(micros), to_base36(suffix)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ParticipantKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}
