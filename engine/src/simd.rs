//! Lane buffer and batched hashing front-end.
//!
//! The hash kernel is treated as an opaque batched primitive: callers fill
//! a [`SimdHashBuffer`] with up to [`SIMD_LANES`] words and get all digests
//! back from a single [`simd_hash`] call. The current kernel runs the
//! RustCrypto implementations lane by lane.

use rtcrack_commons::HashAlgorithm;

/// Number of lanes processed per batched hash call.
pub const SIMD_LANES: usize = 8;

/// The widest digest produced by a supported algorithm (SHA-256).
pub const MAX_HASH_SIZE: usize = 32;

/// A `width × lanes` byte matrix with per-lane lengths, used both for the
/// words fed to the hash kernel and for their digests.
pub struct SimdHashBuffer {
    width: usize,
    lanes: usize,
    buffer: Vec<u8>,
    lengths: Vec<usize>,
}

impl SimdHashBuffer {
    pub fn new(width: usize, lanes: usize) -> Self {
        Self {
            width,
            lanes,
            buffer: vec![0; width * lanes],
            lengths: vec![0; lanes],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Full-width view of a lane.
    pub fn lane(&self, index: usize) -> &[u8] {
        &self.buffer[index * self.width..(index + 1) * self.width]
    }

    /// Full-width mutable view of a lane.
    pub fn lane_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.buffer[index * self.width..(index + 1) * self.width]
    }

    /// The word currently held by a lane, i.e. its first `length` bytes.
    pub fn word(&self, index: usize) -> &[u8] {
        &self.lane(index)[..self.lengths[index]]
    }

    pub fn set_length(&mut self, index: usize, length: usize) {
        debug_assert!(length <= self.width);
        self.lengths[index] = length;
    }

    pub fn length(&self, index: usize) -> usize {
        self.lengths[index]
    }
}

/// Hashes every lane of `words` with `algorithm`, writing the digest of
/// lane `i` at `hashes[i * digest_size..]`.
pub fn simd_hash(algorithm: HashAlgorithm, words: &SimdHashBuffer, hashes: &mut [u8]) {
    let width = algorithm.digest_size();
    for lane in 0..words.lanes() {
        let digest = algorithm.hash(words.word(lane));
        hashes[lane * width..(lane + 1) * width].copy_from_slice(&digest);
    }
}

#[cfg(test)]
mod tests {
    use super::{simd_hash, SimdHashBuffer, SIMD_LANES};
    use rtcrack_commons::HashAlgorithm;

    #[test]
    fn test_lane_layout() {
        let mut words = SimdHashBuffer::new(4, SIMD_LANES);
        words.lane_mut(3)[..2].copy_from_slice(b"ok");
        words.set_length(3, 2);

        assert_eq!(b"ok", words.word(3));
        assert_eq!(4, words.lane(3).len());
        assert_eq!(0, words.length(0));
    }

    #[test]
    fn test_batched_matches_scalar() {
        let algorithm = HashAlgorithm::Sha256;
        let mut words = SimdHashBuffer::new(8, SIMD_LANES);
        for lane in 0..SIMD_LANES {
            let word = format!("lane{lane}");
            words.lane_mut(lane)[..word.len()].copy_from_slice(word.as_bytes());
            words.set_length(lane, word.len());
        }

        let mut hashes = [0u8; 32 * SIMD_LANES];
        simd_hash(algorithm, &words, &mut hashes);

        for lane in 0..SIMD_LANES {
            let expected = algorithm.hash(format!("lane{lane}").as_bytes());
            assert_eq!(expected.as_slice(), &hashes[lane * 32..(lane + 1) * 32]);
        }
    }
}
