//! The [`IntegrityDescriptor`] and the runtime selected [`Hasher`].

use std::{
    fmt::{Display, Formatter},
    io::Write,
    str::FromStr,
};

use base64::{engine::general_purpose::STANDARD, Engine};
use digest::Digest;
use md5::Md5;
use sha2::{Sha256, Sha384, Sha512};

use crate::Blake2b256;

/// A hash algorithm that can be used to describe the content of a file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    /// MD5, only useful to read legacy metadata.
    Md5,
    /// SHA-2 with a 256 bit digest.
    Sha256,
    /// SHA-2 with a 384 bit digest.
    Sha384,
    /// SHA-2 with a 512 bit digest.
    Sha512,
    /// Blake2b with a 256 bit digest.
    Blake2b256,
}

impl Algorithm {
    /// Returns the number of bytes in a digest produced by this algorithm.
    pub const fn digest_len(self) -> usize {
        match self {
            Algorithm::Md5 => 16,
            Algorithm::Sha256 | Algorithm::Blake2b256 => 32,
            Algorithm::Sha384 => 48,
            Algorithm::Sha512 => 64,
        }
    }

    /// Returns the token used for this algorithm in a subresource integrity
    /// string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
            Algorithm::Blake2b256 => "blake2b256",
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ParseIntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "md5" => Ok(Algorithm::Md5),
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            "blake2b256" => Ok(Algorithm::Blake2b256),
            _ => Err(ParseIntegrityError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// An error that can occur when parsing an [`IntegrityDescriptor`] from its
/// subresource integrity representation.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ParseIntegrityError {
    /// The string is empty or does not contain a `-` separator.
    #[error("'{0}' is not a valid integrity string, expected '<algorithm>-<base64 digest>'")]
    InvalidFormat(String),

    /// The algorithm is not supported.
    #[error("unsupported hash algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// The digest is not valid base64.
    #[error("the digest is not valid base64")]
    InvalidBase64(#[from] base64::DecodeError),

    /// The digest does not have the length the algorithm produces.
    #[error("expected a {algorithm} digest of {expected} bytes but got {actual} bytes")]
    InvalidDigestLength {
        /// The algorithm of the descriptor.
        algorithm: Algorithm,
        /// The number of bytes the algorithm produces.
        expected: usize,
        /// The number of bytes that were decoded.
        actual: usize,
    },
}

/// Describes the expected content of a file: which algorithm was used to hash
/// it, the resulting digest and optionally the number of bytes.
///
/// The textual representation is the subresource integrity format
/// `<algorithm>-<base64 digest>`. The size is not part of that representation;
/// use [`IntegrityDescriptor::with_size`] to attach it after parsing.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct IntegrityDescriptor {
    algorithm: Algorithm,
    digest: Vec<u8>,
    size: Option<u64>,
}

impl IntegrityDescriptor {
    /// Constructs a descriptor from a digest that was computed elsewhere.
    pub fn new(
        algorithm: Algorithm,
        digest: impl Into<Vec<u8>>,
    ) -> Result<Self, ParseIntegrityError> {
        let digest = digest.into();
        if digest.len() != algorithm.digest_len() {
            return Err(ParseIntegrityError::InvalidDigestLength {
                algorithm,
                expected: algorithm.digest_len(),
                actual: digest.len(),
            });
        }
        Ok(Self {
            algorithm,
            digest,
            size: None,
        })
    }

    /// Hashes the given bytes and records their length as the expected size.
    pub fn from_bytes(algorithm: Algorithm, bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        let mut hasher = Hasher::new(algorithm);
        hasher.update(bytes);
        Self {
            algorithm,
            digest: hasher.finalize(),
            size: Some(bytes.len() as u64),
        }
    }

    /// Parses a subresource integrity string such as `sha512-<base64>`.
    ///
    /// Only the first whitespace separated entry is considered and any
    /// `?options` suffix is ignored.
    pub fn parse_sri(s: &str) -> Result<Self, ParseIntegrityError> {
        let entry = s
            .split_whitespace()
            .next()
            .ok_or_else(|| ParseIntegrityError::InvalidFormat(s.to_string()))?;
        let entry = entry.split_once('?').map_or(entry, |(entry, _)| entry);
        let (algorithm, digest) = entry
            .split_once('-')
            .ok_or_else(|| ParseIntegrityError::InvalidFormat(s.to_string()))?;
        let algorithm = Algorithm::from_str(algorithm)?;
        let digest = STANDARD.decode(digest)?;
        Self::new(algorithm, digest)
    }

    /// Returns a copy of this descriptor with the expected size set.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// The algorithm used to compute the digest.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The raw digest bytes.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// The expected size of the content in bytes, if known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Returns the digest as a lower case hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }
}

impl Display for IntegrityDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.algorithm, STANDARD.encode(&self.digest))
    }
}

impl FromStr for IntegrityDescriptor {
    type Err = ParseIntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_sri(s)
    }
}

/// A hasher for one of the supported [`Algorithm`]s, selected at runtime.
///
/// Implements [`Write`] so content can be copied into it.
pub struct Hasher(HasherImpl);

enum HasherImpl {
    Md5(Md5),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Blake2b256(Blake2b256),
}

impl Hasher {
    /// Constructs a new empty hasher for the given algorithm.
    pub fn new(algorithm: Algorithm) -> Self {
        Self(match algorithm {
            Algorithm::Md5 => HasherImpl::Md5(Md5::new()),
            Algorithm::Sha256 => HasherImpl::Sha256(Sha256::new()),
            Algorithm::Sha384 => HasherImpl::Sha384(Sha384::new()),
            Algorithm::Sha512 => HasherImpl::Sha512(Sha512::new()),
            Algorithm::Blake2b256 => HasherImpl::Blake2b256(Blake2b256::new()),
        })
    }

    /// Feeds bytes into the hasher.
    pub fn update(&mut self, bytes: &[u8]) {
        match &mut self.0 {
            HasherImpl::Md5(h) => Digest::update(h, bytes),
            HasherImpl::Sha256(h) => Digest::update(h, bytes),
            HasherImpl::Sha384(h) => Digest::update(h, bytes),
            HasherImpl::Sha512(h) => Digest::update(h, bytes),
            HasherImpl::Blake2b256(h) => Digest::update(h, bytes),
        }
    }

    /// Consumes the hasher and returns the digest bytes.
    pub fn finalize(self) -> Vec<u8> {
        match self.0 {
            HasherImpl::Md5(h) => h.finalize().to_vec(),
            HasherImpl::Sha256(h) => h.finalize().to_vec(),
            HasherImpl::Sha384(h) => h.finalize().to_vec(),
            HasherImpl::Sha512(h) => h.finalize().to_vec(),
            HasherImpl::Blake2b256(h) => h.finalize().to_vec(),
        }
    }
}

impl Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case::md5(Algorithm::Md5)]
    #[case::sha256(Algorithm::Sha256)]
    #[case::sha384(Algorithm::Sha384)]
    #[case::sha512(Algorithm::Sha512)]
    #[case::blake2b256(Algorithm::Blake2b256)]
    fn test_digest_len(#[case] algorithm: Algorithm) {
        let descriptor = IntegrityDescriptor::from_bytes(algorithm, b"abc");
        assert_eq!(descriptor.digest().len(), algorithm.digest_len());
        assert_eq!(descriptor.size(), Some(3));
    }

    #[test]
    fn test_parse_known_sri() {
        // `echo -n "Hello, world!" | openssl dgst -sha256 -binary | base64`
        let descriptor =
            IntegrityDescriptor::parse_sri("sha256-MV9b23bQeMQ7isAGTkoBZGErH853yGk0W/yUx1iU7dM=")
                .unwrap();
        assert_eq!(descriptor.algorithm(), Algorithm::Sha256);
        assert_eq!(
            descriptor.to_hex(),
            "315f5bdb76d078c43b8ac0064e4a0164612b1fce77c869345bfc94c75894edd3"
        );
        assert_eq!(descriptor.size(), None);
        assert_eq!(
            descriptor.with_size(13),
            IntegrityDescriptor::from_bytes(Algorithm::Sha256, "Hello, world!")
        );
    }

    #[test]
    fn test_parse_ignores_options_and_extra_entries() {
        let expected = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"content");
        let sri = format!("{expected}?foo=bar sha256-ignored");
        let parsed = IntegrityDescriptor::parse_sri(&sri).unwrap();
        assert_eq!(parsed.digest(), expected.digest());
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(
            IntegrityDescriptor::parse_sri(""),
            Err(ParseIntegrityError::InvalidFormat(_))
        );
        assert_matches!(
            IntegrityDescriptor::parse_sri("sha512"),
            Err(ParseIntegrityError::InvalidFormat(_))
        );
        assert_matches!(
            IntegrityDescriptor::parse_sri("crc32-AAAA"),
            Err(ParseIntegrityError::UnknownAlgorithm(alg)) if alg == "crc32"
        );
        assert_matches!(
            IntegrityDescriptor::parse_sri("sha256-!!!"),
            Err(ParseIntegrityError::InvalidBase64(_))
        );
        assert_matches!(
            IntegrityDescriptor::parse_sri("sha256-AAAA"),
            Err(ParseIntegrityError::InvalidDigestLength {
                expected: 32,
                actual: 3,
                ..
            })
        );
    }

    #[test]
    fn test_equality_is_by_value() {
        let a = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"x");
        let b = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"x");
        let c = IntegrityDescriptor::from_bytes(Algorithm::Sha256, b"x");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
