//! Flash algorithm images are opaque machine code. They travel through the
//! description files as base64 text and are never interpreted.

use base64::{engine::general_purpose as base64_engine, Engine as _};
use serde::{de, Deserializer, Serializer};

pub(crate) fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if serializer.is_human_readable() {
        serializer.serialize_str(&base64_engine::STANDARD.encode(bytes))
    } else {
        serializer.serialize_bytes(bytes)
    }
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ImageVisitor;

    impl<'de> de::Visitor<'de> for ImageVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "base64 ASCII text or a byte buffer")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            // Long images are usually wrapped over several lines.
            let compact: String = v.split_whitespace().collect();
            base64_engine::STANDARD
                .decode(compact)
                .map_err(de::Error::custom)
        }

        fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v)
        }
    }

    if deserializer.is_human_readable() {
        deserializer.deserialize_str(ImageVisitor)
    } else {
        deserializer.deserialize_byte_buf(ImageVisitor)
    }
}
