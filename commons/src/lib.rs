mod reduce;
mod words;

pub use reduce::Reducer;
pub use words::{generate_word, generate_word_into, parse_word, word_length_index};

use core::fmt::{Debug, Display};
use core::ops::{Deref, DerefMut};

use md5::{Digest as _, Md5};
use sha1::Sha1;
use sha2::Sha256;
use tinyvec::ArrayVec;

/// The printable ASCII alphabet, space through tilde. This is the charset
/// used when none is specified.
pub const ASCII: &[u8] =
    b" !\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`\
abcdefghijklmnopqrstuvwxyz{|}~";

/// The maximum password length allowed.
pub const MAX_PASSWORD_LENGTH_ALLOWED: usize = 128;

/// The maximum digest size allowed.
pub const MAX_DIGEST_LENGTH_ALLOWED: usize = 64;

/// The maximum charset length allowed.
pub const MAX_CHARSET_LENGTH_ALLOWED: usize = 128;

/// The position of a word in the bijective enumeration of all words over a
/// charset. 128 bits cover every keyspace the table builder accepts.
pub type WordIndex = u128;

/// An ASCII password stored in a stack-allocated vector.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Password(ArrayVec<[u8; MAX_PASSWORD_LENGTH_ALLOWED]>);

impl Password {
    /// Creates a new password.
    pub fn new(text: &[u8]) -> Self {
        Password(text.try_into().unwrap())
    }
}

impl AsRef<[u8]> for Password {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Password {
    type Target = ArrayVec<[u8; MAX_PASSWORD_LENGTH_ALLOWED]>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Password {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Display for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", core::str::from_utf8(&self.0).unwrap())
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        <Password as Display>::fmt(self, f)
    }
}

/// A digest stored in a stack-allocated vector.
pub type Digest = ArrayVec<[u8; MAX_DIGEST_LENGTH_ALLOWED]>;

/// All the supported hash algorithms.
///
/// The discriminants are the values stored in the algorithm bits of a table
/// header and must never change.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5 = 0,
    Sha1 = 1,
    Sha256 = 2,
}

impl HashAlgorithm {
    /// Hashes a byte slice using the right hash function.
    #[inline]
    pub fn hash(&self, data: &[u8]) -> Digest {
        match self {
            HashAlgorithm::Md5 => Md5::digest(data).as_slice().try_into().unwrap(),
            HashAlgorithm::Sha1 => Sha1::digest(data).as_slice().try_into().unwrap(),
            HashAlgorithm::Sha256 => Sha256::digest(data).as_slice().try_into().unwrap(),
        }
    }

    /// Gets the digest size in bytes.
    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => Md5::output_size(),
            HashAlgorithm::Sha1 => Sha1::output_size(),
            HashAlgorithm::Sha256 => Sha256::output_size(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl TryFrom<u8> for HashAlgorithm {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(HashAlgorithm::Md5),
            1 => Ok(HashAlgorithm::Sha1),
            2 => Ok(HashAlgorithm::Sha256),
            other => Err(other),
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
