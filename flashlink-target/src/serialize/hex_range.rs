use serde::{ser::SerializeStruct, Serializer};
use std::ops::Range;

pub(crate) fn serialize<S>(range: &Range<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let human_readable = serializer.is_human_readable();
    let mut state = serializer.serialize_struct("Range", 2)?;
    if human_readable {
        state.serialize_field("start", &format!("{:#x}", range.start))?;
        state.serialize_field("end", &format!("{:#x}", range.end))?;
    } else {
        state.serialize_field("start", &range.start)?;
        state.serialize_field("end", &range.end)?;
    }
    state.end()
}
