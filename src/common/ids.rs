//! Deterministic hash helpers used to checksum persisted snapshots.

/// Small non-cryptographic FNV-1a hash.
#[derive(Copy, Clone, Debug)]
pub struct SimpleHash(u64);

impl SimpleHash {
    /// Create a new hash state with the FNV offset basis.
    pub fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    /// Feed bytes into the hash function.
    pub fn update(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = (self.0 ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3);
        }
    }

    /// Finalise the hash and return a 64-bit value.
    pub fn finish64(&self) -> u64 {
        self.0
    }

    /// Finalise the hash and return a 16-character lowercase hex string.
    pub fn finish_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// One-shot digest of a byte slice.
    pub fn digest_hex(bytes: &[u8]) -> String {
        let mut hasher = Self::new();
        hasher.update(bytes);
        hasher.finish_hex()
    }
}

impl Default for SimpleHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_vectors() {
        assert_eq!(SimpleHash::new().finish64(), 0xcbf2_9ce4_8422_2325);
        assert_eq!(SimpleHash::digest_hex(b"a"), "af63dc4c8601ec8c");
    }

    #[test]
    fn incremental_equals_one_shot() {
        let mut hasher = SimpleHash::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finish_hex(), SimpleHash::digest_hex(b"hello world"));
        assert_ne!(hasher.finish_hex(), SimpleHash::digest_hex(b"hello worle"));
    }
}
