#![deny(missing_docs)]

//! Integrity descriptors and hashing helpers for the content-addressable file
//! store.
//!
//! Content entering the store is described by an [`IntegrityDescriptor`]: the
//! hash [`Algorithm`] that was used, the raw digest bytes and, optionally, the
//! expected size of the content in bytes. Descriptors are plain values, two
//! descriptors are equal when all their fields are equal.
//!
//! The hashing itself is delegated to the
//! [RustCrypto/hashes](https://github.com/RustCrypto/hashes) crates. The
//! algorithm is selected at runtime through [`Hasher`], which implements
//! [`std::io::Write`] so a file can be streamed into it with
//! [`std::io::copy`].
//!
//! For statically known algorithms there are a few free helpers:
//!
//! - [`compute_bytes_digest`] and [`compute_file_digest`] hash a buffer or a
//!   file on disk.
//! - [`HashingWriter`] wraps a writer and hashes everything that passes
//!   through it.
//!
//! # Examples
//!
//! ```
//! use cafs_digest::{Algorithm, IntegrityDescriptor};
//!
//! let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"Hello, world!");
//! assert_eq!(descriptor.size(), Some(13));
//!
//! // Descriptors round-trip through their subresource integrity form.
//! let parsed: IntegrityDescriptor = descriptor.to_string().parse().unwrap();
//! assert_eq!(parsed.with_size(13), descriptor);
//! ```

mod integrity;

#[cfg(feature = "serde")]
pub mod serde;

pub use digest;

use std::{fs::File, io::Write, path::Path};

use blake2::digest::consts::U32;
use blake2::Blake2b;
use digest::{Digest, Output};

pub use integrity::{Algorithm, Hasher, IntegrityDescriptor, ParseIntegrityError};
pub use md5::Md5;
pub use sha2::{Sha256, Sha384, Sha512};

/// A type alias for the output of a SHA256 hash.
pub type Sha256Hash = sha2::digest::Output<Sha256>;

/// A type alias for the output of a SHA512 hash.
pub type Sha512Hash = sha2::digest::Output<Sha512>;

/// A type for a 32 bit length blake2b digest.
pub type Blake2b256 = Blake2b<U32>;

/// Compute a hash of the file at the specified location.
pub fn compute_file_digest<D: Digest + Default + Write>(
    path: impl AsRef<Path>,
) -> Result<Output<D>, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = D::default();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}

/// Compute a hash of the specified bytes.
pub fn compute_bytes_digest<D: Digest + Default>(bytes: impl AsRef<[u8]>) -> Output<D> {
    let mut hasher = D::default();
    hasher.update(bytes);
    hasher.finalize()
}

/// A simple object that provides a [`Write`] implementation that also
/// immediately hashes the bytes written to it. Call
/// [`HashingWriter::finalize`] to retrieve both the wrapped writer and the
/// hash.
pub struct HashingWriter<W, D: Digest> {
    writer: W,
    hasher: D,
}

impl<W, D: Digest + Default> HashingWriter<W, D> {
    /// Constructs a new instance from a writer and a new (empty) hasher.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            hasher: D::default(),
        }
    }
}

impl<W, D: Digest> HashingWriter<W, D> {
    /// Consumes this instance and returns the wrapped writer and the hash of
    /// all bytes written to this instance.
    pub fn finalize(self) -> (W, Output<D>) {
        (self.writer, self.hasher.finalize())
    }
}

impl<W: Write, D: Digest> Write for HashingWriter<W, D> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let bytes = self.writer.write(buf)?;
        self.hasher.update(&buf[..bytes]);
        Ok(bytes)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
