#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::new_without_default, clippy::too_many_arguments)]

//! Fingerprints and content digests.
//!
//! A [`Fingerprint`] is a raw SHA-256 hash. A [`Digest`] pairs a fingerprint with the byte
//! length of the data it was computed from, which lets callers distinguish a short read from a
//! genuine hash mismatch without re-hashing.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as Sha256Digest, Sha256};

pub const FINGERPRINT_SIZE: usize = 32;

pub const EMPTY_FINGERPRINT: Fingerprint = Fingerprint([
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
    0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
]);

#[derive(Clone, Copy, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Fingerprint(pub [u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub fn from_bytes_unsafe(bytes: &[u8]) -> Fingerprint {
        assert_eq!(
            bytes.len(),
            FINGERPRINT_SIZE,
            "input was not a fingerprint; had length {}",
            bytes.len()
        );
        let mut fingerprint = [0; FINGERPRINT_SIZE];
        fingerprint.clone_from_slice(bytes);
        Fingerprint(fingerprint)
    }

    pub fn from_hex_string(hex_string: &str) -> Result<Fingerprint, String> {
        let bytes = hex::decode(hex_string).map_err(|e| format!("{e}"))?;
        if bytes.len() != FINGERPRINT_SIZE {
            return Err(format!(
                "hex string decoded to {} bytes, expected {FINGERPRINT_SIZE}",
                bytes.len()
            ));
        }
        Ok(Fingerprint::from_bytes_unsafe(&bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint<{}>", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::from_hex_string(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FingerprintVisitor;

        impl Visitor<'_> for FingerprintVisitor {
            type Value = Fingerprint;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a hex-encoded 32-byte fingerprint")
            }

            fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
                Fingerprint::from_hex_string(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(FingerprintVisitor)
    }
}

/// A fingerprint plus the byte length of the data it was computed from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub hash: Fingerprint,
    pub size_bytes: usize,
}

impl Digest {
    pub fn new(hash: Fingerprint, size_bytes: usize) -> Digest {
        Digest { hash, size_bytes }
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::default();
        hasher.update(bytes);
        Digest::new(Fingerprint(hasher.finalize().into()), bytes.len())
    }

    /// Hashes the full contents of a file. Intended to be run on a blocking-safe thread: this
    /// does unbuffered synchronous I/O.
    pub fn of_file(path: &Path) -> io::Result<Digest> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::default();
        let mut buf = [0u8; 64 * 1024];
        let mut size_bytes = 0usize;
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[0..read]);
            size_bytes += read;
        }
        Ok(Digest::new(Fingerprint(hasher.finalize().into()), size_bytes))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_bytes_matches_known_digest() {
        let digest = Digest::of_bytes(b"");
        assert_eq!(digest.hash, EMPTY_FINGERPRINT);
        assert_eq!(digest.size_bytes, 0);
    }

    #[test]
    fn of_bytes_is_deterministic() {
        assert_eq!(Digest::of_bytes(b"hello"), Digest::of_bytes(b"hello"));
        assert_ne!(Digest::of_bytes(b"hello"), Digest::of_bytes(b"world"));
    }

    #[test]
    fn of_file_matches_of_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"some file contents").unwrap();
        assert_eq!(
            Digest::of_file(&path).unwrap(),
            Digest::of_bytes(b"some file contents")
        );
    }

    #[test]
    fn fingerprint_hex_round_trip() {
        let digest = Digest::of_bytes(b"round trip me");
        let hex = digest.hash.to_hex();
        assert_eq!(Fingerprint::from_hex_string(&hex).unwrap(), digest.hash);
    }

    #[test]
    fn fingerprint_from_hex_string_rejects_bad_length() {
        assert!(Fingerprint::from_hex_string("ab").is_err());
    }

    #[test]
    fn digest_serde_round_trip() {
        let digest = Digest::of_bytes(b"serde me");
        let json = serde_json::to_string(&digest).unwrap();
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(digest, back);
    }
}
