//! Serialization support for [`IntegrityDescriptor`].
//!
//! A descriptor serializes as its subresource integrity string. The expected
//! size is not part of that string and is therefore lost, store it next to the
//! descriptor if it is needed.
//!
//! # Example:
//!
//! ```
//! use cafs_digest::{Algorithm, IntegrityDescriptor};
//!
//! let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"content");
//! let json = serde_json::to_string(&descriptor).unwrap();
//! let parsed: IntegrityDescriptor = serde_json::from_str(&json).unwrap();
//! assert_eq!(parsed.digest(), descriptor.digest());
//! ```

use std::borrow::Cow;

use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

use crate::IntegrityDescriptor;

impl Serialize for IntegrityDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IntegrityDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let str = Cow::<'de, str>::deserialize(deserializer)?;
        IntegrityDescriptor::parse_sri(str.as_ref()).map_err(D::Error::custom)
    }
}
