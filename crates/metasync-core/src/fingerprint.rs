//! Stable 64-bit identifiers for generated artifacts.
//!
//! Fields are hashed with FNV-1a in the order they are written, with no
//! separators between them. The value is stable across processes and
//! releases, so it can be persisted by consumers as a task or file id.

use std::fmt::Display;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Incremental FNV-1a 64 hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    state: u64,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        for byte in bytes {
            self.state ^= u64::from(*byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
        self
    }

    pub fn write_str(&mut self, s: &str) -> &mut Self {
        self.write(s.as_bytes())
    }

    /// Write the canonical string form of a value (decimal for integers).
    pub fn write_display(&mut self, value: impl Display) -> &mut Self {
        self.write_str(&value.to_string())
    }

    pub fn finish(&self) -> u64 {
        self.state
    }

    /// One-shot hash of a byte slice.
    pub fn of(bytes: &[u8]) -> u64 {
        Self::new().write(bytes).finish()
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

/// Squash a fingerprint into the positive `i32` range by repeated
/// integer division by 50. Lossy; distinct inputs may collide.
pub fn avoid_overflow(mut value: u64) -> u64 {
    while value > i32::MAX as u64 {
        value /= 50;
    }
    value
}
