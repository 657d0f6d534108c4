//! Embedding vector encoding and distance.
//!
//! Vectors are persisted as BLOBs of little-endian IEEE-754 `f32` values,
//! concatenated, so a vector of width `d` occupies exactly `d × 4` bytes.

use anyhow::{bail, Result};

/// Bytes per encoded component.
pub const BYTES_PER_COMPONENT: usize = 4;

/// Encode a vector as little-endian `f32` bytes.
///
/// ```rust
/// use mdsearch_core::vector::{decode_vector, encode_vector};
///
/// let blob = encode_vector(&[1.0, -2.5]);
/// assert_eq!(blob, vec![0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x20, 0xc0]);
/// assert_eq!(decode_vector(&blob).unwrap(), vec![1.0, -2.5]);
/// ```
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB produced by [`encode_vector`].
///
/// Fails when the length is not a multiple of four bytes.
pub fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % BYTES_PER_COMPONENT != 0 {
        bail!(
            "embedding blob of {} bytes is not a whole number of f32 values",
            blob.len()
        );
    }
    Ok(blob
        .chunks_exact(BYTES_PER_COMPONENT)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`; lower is closer.
///
/// Zero-length or zero-norm inputs are treated as orthogonal (distance 1).
/// Callers must pass vectors of equal width.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 1.0;
    }
    1.0 - dot / denom
}
