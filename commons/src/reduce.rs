//! Digest-to-word reduction functions.
//!
//! A reducer maps a `(digest, column)` pair back into the password space,
//! uniformly and without modulo bias. Two strategies exist: a fast bytewise
//! one for fixed-length spaces and a windowed one for variable-length
//! spaces. Both fall back on an entropy extension schedule when they run
//! out of digest material before producing a full word.

use crate::{
    generate_word_into, word_length_index, WordIndex, MAX_DIGEST_LENGTH_ALLOWED,
    MAX_PASSWORD_LENGTH_ALLOWED,
};

const WORD_SIZE: usize = core::mem::size_of::<u32>();
const MAX_DIGEST_WORDS: usize = MAX_DIGEST_LENGTH_ALLOWED / WORD_SIZE;

/// Extends the entropy of a word buffer in place, SHA-1 message schedule
/// style: the buffer is replaced by the second half of its own extension.
fn extend_entropy(words: &mut [u32]) {
    let len = words.len();
    let mut temp = [0u32; 2 * MAX_DIGEST_WORDS];

    temp[..len].copy_from_slice(words);
    for i in len..2 * len {
        temp[i] = (temp[i - len] ^ temp[i - 2]).rotate_left(1);
    }
    words.copy_from_slice(&temp[len..2 * len]);
}

/// Byte-buffer front for [`extend_entropy`], viewing the digest as
/// little-endian 32-bit words.
fn extend_entropy_bytes(buffer: &mut [u8]) {
    let len = buffer.len() / WORD_SIZE;
    let mut words = [0u32; MAX_DIGEST_WORDS];

    for (word, chunk) in words.iter_mut().zip(buffer.chunks_exact(WORD_SIZE)) {
        *word = u32::from_le_bytes(chunk.try_into().unwrap());
    }
    extend_entropy(&mut words[..len]);
    for (chunk, word) in buffer.chunks_exact_mut(WORD_SIZE).zip(&words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

/// Reduces a digest and a chain column into a word of the password space.
#[derive(Clone, Debug)]
pub enum Reducer {
    /// Fixed-length reduction by rejection sampling over single digest
    /// bytes. Only valid when the minimum and maximum lengths coincide.
    Bytewise {
        length: usize,
        hash_length: usize,
        /// Largest multiple of the charset length that fits a byte; bytes
        /// at or above it are rejected to keep the sampling unbiased.
        mod_max: u16,
        charset: Vec<u8>,
    },
    /// Variable-length reduction sampling 32-bit windows of the digest
    /// until one falls inside the index range of the keyspace.
    Modulo {
        hash_length: usize,
        min_index: WordIndex,
        index_range: WordIndex,
        /// Number of 32-bit words a sampling window spans.
        words_required: usize,
        /// Mask applied to the most significant word of a window.
        msb_mask: u32,
        charset: Vec<u8>,
    },
}

impl Reducer {
    /// Picks the reduction strategy for a password space: bytewise when the
    /// length is fixed, windowed modulo otherwise.
    pub fn new(min: usize, max: usize, hash_length: usize, charset: &[u8]) -> Self {
        assert!(!charset.is_empty(), "empty charset");
        assert!(min <= max && max <= MAX_PASSWORD_LENGTH_ALLOWED);
        assert!(
            hash_length % WORD_SIZE == 0 && hash_length <= MAX_DIGEST_LENGTH_ALLOWED,
            "unsupported digest width"
        );

        if min == max {
            return Reducer::Bytewise {
                length: max,
                hash_length,
                mod_max: (256 / charset.len() as u16) * charset.len() as u16,
                charset: charset.to_vec(),
            };
        }

        let min_index = word_length_index(min, charset);
        let max_index = word_length_index(max + 1, charset);
        let (min_index, max_index) = min_index
            .zip(max_index)
            .expect("keyspace bounds checked by the table context");
        let index_range = max_index - min_index;

        // smallest number of digest bits whose all-ones value covers the range
        let bits_required = (128 - index_range.leading_zeros()) as usize;
        let words_required = bits_required / 32 + usize::from(bits_required % 32 != 0);
        let msb_mask = match bits_required % 32 {
            0 => u32::MAX,
            partial => u32::MAX >> (32 - partial),
        };
        debug_assert!(words_required * WORD_SIZE <= hash_length);

        Reducer::Modulo {
            hash_length,
            min_index,
            index_range,
            words_required,
            msb_mask,
            charset: charset.to_vec(),
        }
    }

    /// Reduces `hash` at chain column `column` into a word written at the
    /// start of `dest`, returning its length.
    pub fn reduce(&self, dest: &mut [u8], hash: &[u8], column: usize) -> usize {
        match self {
            Reducer::Bytewise {
                length,
                hash_length,
                mod_max,
                charset,
            } => {
                let mut buffer = [0u8; MAX_DIGEST_LENGTH_ALLOWED];
                buffer[..*hash_length].copy_from_slice(&hash[..*hash_length]);

                let mut offset = 0;
                let mut count = 0;
                while count < *length {
                    if offset == *hash_length {
                        extend_entropy_bytes(&mut buffer[..*hash_length]);
                        offset = 0;
                    }
                    let next = buffer[offset];
                    offset += 1;
                    if u16::from(next) < *mod_max {
                        dest[count] = charset[next as usize % charset.len()];
                        count += 1;
                    }
                }
                count
            }

            Reducer::Modulo {
                hash_length,
                min_index,
                index_range,
                words_required,
                msb_mask,
                charset,
            } => {
                let hash_words = hash_length / WORD_SIZE;
                let mut buffer = [0u32; MAX_DIGEST_WORDS];
                for (word, chunk) in buffer
                    .iter_mut()
                    .zip(hash[..*hash_length].chunks_exact(WORD_SIZE))
                {
                    *word = u32::from_le_bytes(chunk.try_into().unwrap());
                }

                // Sample bit windows of the digest until one falls inside the
                // index range; a plain modulo would favour the bottom of the
                // keyspace whenever 2^bits is not a multiple of the range.
                let mut offset = 0;
                let mut value = loop {
                    if offset + words_required > hash_words {
                        extend_entropy(&mut buffer[..hash_words]);
                        offset = 0;
                    }
                    let mut window = WordIndex::from(buffer[offset] & msb_mask);
                    for word in &buffer[offset + 1..offset + words_required] {
                        window = (window << 32) | WordIndex::from(*word);
                    }
                    if window < *index_range {
                        break window;
                    }
                    offset += 1;
                };

                // salt with the column; the pre-XOR value is already in range
                // so the residual bias of the modulo is negligible
                value ^= column as WordIndex;
                if value >= *index_range {
                    value %= *index_range;
                }
                value += *min_index;

                generate_word_into(dest, value, charset)
                    .expect("reduced index within the keyspace")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Reducer;
    use crate::{word_length_index, HashAlgorithm};

    #[test]
    fn test_bytewise_zero_digest() {
        // an all-zero digest accepts every byte and always selects rank 0
        let reducer = Reducer::new(8, 8, 20, b"abcd");
        let mut dest = [0u8; 8];
        let length = reducer.reduce(&mut dest, &[0u8; 20], 0);
        assert_eq!(8, length);
        assert_eq!(b"aaaaaaaa", &dest);
    }

    #[test]
    fn test_bytewise_length_and_alphabet() {
        let charset = b"0123456789";
        let reducer = Reducer::new(6, 6, 16, charset);
        let mut dest = [0u8; 6];

        for i in 0u32..2_000 {
            let digest = HashAlgorithm::Md5.hash(&i.to_le_bytes());
            let length = reducer.reduce(&mut dest, &digest, i as usize);
            assert_eq!(6, length);
            assert!(dest.iter().all(|c| charset.contains(c)));
        }
    }

    #[test]
    fn test_bytewise_deterministic() {
        let reducer = Reducer::new(4, 4, 20, b"ab");
        let digest = HashAlgorithm::Sha1.hash(b"fixture");
        let mut first = [0u8; 4];
        let mut second = [0u8; 4];
        reducer.reduce(&mut first, &digest, 17);
        reducer.reduce(&mut second, &digest, 17);
        assert_eq!(first, second);
    }

    #[test]
    fn test_modulo_bounds() {
        let charset = b"abcd";
        let reducer = Reducer::new(1, 3, 20, charset);
        let mut dest = [0u8; 3];

        for i in 0u32..2_000 {
            let digest = HashAlgorithm::Sha1.hash(&i.to_le_bytes());
            let length = reducer.reduce(&mut dest, &digest, i as usize);
            assert!((1..=3).contains(&length));
            assert!(dest[..length].iter().all(|c| charset.contains(c)));
        }
    }

    #[test]
    fn test_modulo_column_changes_output() {
        let reducer = Reducer::new(2, 5, 20, b"abcdefgh");
        let digest = HashAlgorithm::Sha1.hash(b"salted");
        let mut first = [0u8; 5];
        let mut second = [0u8; 5];
        let first_len = reducer.reduce(&mut first, &digest, 1);
        let second_len = reducer.reduce(&mut second, &digest, 2);
        assert_ne!(first[..first_len], second[..second_len]);
    }

    #[test]
    fn test_modulo_length_distribution() {
        // the share of words of length L must match |C|^L / (S(max+1) - S(min))
        const SAMPLES: usize = 250_000;
        let charset = b"abcd";
        let reducer = Reducer::new(1, 3, 20, charset);
        let space = (word_length_index(4, charset).unwrap()
            - word_length_index(1, charset).unwrap()) as f64;

        let mut dest = [0u8; 3];
        let mut counts = [0usize; 4];
        for i in 0..SAMPLES {
            let digest = HashAlgorithm::Sha1.hash(&(i as u64).to_le_bytes());
            counts[reducer.reduce(&mut dest, &digest, 0)] += 1;
        }

        for length in 1..=3usize {
            let expected = (charset.len() as f64).powi(length as i32) / space * SAMPLES as f64;
            let actual = counts[length] as f64;
            let deviation = (actual - expected).abs() / expected;
            assert!(
                deviation < 0.05,
                "length {length}: expected {expected:.0}, got {actual:.0}"
            );
        }
    }
}
