//! Test fixtures.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 of data.
#[allow(dead_code)]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Split data into chunks of `chunk_size` bytes (last chunk may be shorter).
#[allow(dead_code)]
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

/// Generate deterministic pseudo-random bytes from a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    let mut state = seed;
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }
    data
}
