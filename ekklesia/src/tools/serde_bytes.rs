//! Serde helpers for byte-string fields: hex in human-readable formats,
//! raw bytes otherwise.

use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Deserializer, Serializer};

pub(crate) fn serialize<S>(bytes: &(impl AsRef<[u8]> + ?Sized), serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if serializer.is_human_readable() {
        serializer.serialize_str(&hex::encode(bytes.as_ref()))
    } else {
        serializer.serialize_bytes(bytes.as_ref())
    }
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    if deserializer.is_human_readable() {
        let string = String::deserialize(deserializer)?;
        hex::decode(&string).map_err(serde::de::Error::custom)
    } else {
        // `serde_bytes`-style efficiency is not needed here; a plain
        // sequence of bytes round-trips through every self-describing format.
        Vec::<u8>::deserialize(deserializer)
    }
}

/// Adapter for `#[serde(with = ...)]` on `Vec<u8>`/`Box<[u8]>` fields.
pub(crate) mod as_hex {
    use super::*;

    pub(crate) fn serialize<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        super::serialize(bytes, serializer)
    }

    pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: From<Vec<u8>>,
        D: Deserializer<'de>,
    {
        super::deserialize(deserializer).map(T::from)
    }
}
