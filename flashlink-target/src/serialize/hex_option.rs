use super::serialize_u_int::SerializeUnsignedInt;
use serde::{Serialize, Serializer};

pub(crate) fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + std::fmt::LowerHex + SerializeUnsignedInt,
{
    match value {
        Some(value) if serializer.is_human_readable() => {
            serializer.serialize_some(&format!("{value:#x}"))
        }
        Some(value) => serializer.serialize_some(value),
        None => serializer.serialize_none(),
    }
}
