//! Session metadata keys and the text encoding of user-data entries.
//!
//! Each entry is stored under `user_key_<n>` as `<type>:<id>:<bits>` with all
//! three fields in lowercase hex. Floats store their IEEE bit pattern, so a
//! decoded value is identical to the encoded one.

use tracing::warn;

use super::types::{SessionData, UserDataEntry, UserDataValue};

pub const KEY_SESSION_NAME: &str = "session_name";
pub const KEY_GAME_TYPE: &str = "game_type";
pub const KEY_PUBLIC_SLOTS: &str = "public_slots";
pub const KEY_PRIVATE_SLOTS: &str = "private_slots";

pub fn user_key(index: usize) -> String {
    format!("user_key_{index}")
}

const TAG_INT64: u8 = 0;
const TAG_INT32: u8 = 1;
const TAG_INT16: u8 = 2;
const TAG_INT8: u8 = 3;
const TAG_FLOAT64: u8 = 4;
const TAG_FLOAT32: u8 = 5;

pub fn encode_entry(entry: &UserDataEntry) -> String {
    let (tag, bits) = match entry.value {
        UserDataValue::Int64(v) => (TAG_INT64, v.cast_unsigned()),
        UserDataValue::Int32(v) => (TAG_INT32, u64::from(v.cast_unsigned())),
        UserDataValue::Int16(v) => (TAG_INT16, u64::from(v.cast_unsigned())),
        UserDataValue::Int8(v) => (TAG_INT8, u64::from(v.cast_unsigned())),
        UserDataValue::Float64(v) => (TAG_FLOAT64, v.to_bits()),
        UserDataValue::Float32(v) => (TAG_FLOAT32, u64::from(v.to_bits())),
    };
    format!("{tag:x}:{:x}:{bits:x}", entry.id)
}

pub fn decode_entry(text: &str) -> Option<UserDataEntry> {
    let mut parts = text.splitn(3, ':');
    let tag = u8::from_str_radix(parts.next()?, 16).ok()?;
    let id = u32::from_str_radix(parts.next()?, 16).ok()?;
    let bits = u64::from_str_radix(parts.next()?, 16).ok()?;

    let value = match tag {
        TAG_INT64 => UserDataValue::Int64(bits.cast_signed()),
        TAG_INT32 => UserDataValue::Int32(u32::try_from(bits).ok()?.cast_signed()),
        TAG_INT16 => UserDataValue::Int16(u16::try_from(bits).ok()?.cast_signed()),
        TAG_INT8 => UserDataValue::Int8(u8::try_from(bits).ok()?.cast_signed()),
        TAG_FLOAT64 => UserDataValue::Float64(f64::from_bits(bits)),
        TAG_FLOAT32 => UserDataValue::Float32(f32::from_bits(u32::try_from(bits).ok()?)),
        _ => return None,
    };
    Some(UserDataEntry { id, value })
}

pub fn encode_u32(value: u32) -> String {
    format!("{value:x}")
}

pub fn decode_u32(text: &str) -> Option<u32> {
    u32::from_str_radix(text, 16).ok()
}

/// Every key/value pair that advertises `data`.
pub fn metadata_pairs(data: &SessionData) -> Vec<(String, String)> {
    let mut pairs = vec![
        (KEY_SESSION_NAME.to_string(), data.name.clone()),
        (
            KEY_PUBLIC_SLOTS.to_string(),
            encode_u32(data.num_public_slots),
        ),
        (
            KEY_PRIVATE_SLOTS.to_string(),
            encode_u32(data.num_private_slots),
        ),
        (KEY_GAME_TYPE.to_string(), encode_u32(u32::from(data.ranked))),
    ];
    pairs.extend(user_data_pairs(&data.user_data));
    pairs
}

pub fn user_data_pairs(entries: &[UserDataEntry]) -> Vec<(String, String)> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| (user_key(index), encode_entry(entry)))
        .collect()
}

/// Rebuild session data from metadata lookups.
///
/// User-data keys are read in order until the first missing one; entries
/// that fail to parse are skipped.
pub fn decode_session_data(
    lookup: impl Fn(&str) -> Option<String>,
    max_entries: usize,
) -> SessionData {
    let slots = |key: &str| lookup(key).and_then(|v| decode_u32(&v)).unwrap_or(0);

    let mut user_data = Vec::new();
    for index in 0..max_entries {
        let Some(text) = lookup(&user_key(index)) else {
            break;
        };
        match decode_entry(&text) {
            Some(entry) => user_data.push(entry),
            None => warn!(index, value = %text, "Skipping malformed session user data"),
        }
    }

    SessionData {
        name: lookup(KEY_SESSION_NAME).unwrap_or_default(),
        num_public_slots: slots(KEY_PUBLIC_SLOTS),
        num_private_slots: slots(KEY_PRIVATE_SLOTS),
        ranked: slots(KEY_GAME_TYPE) != 0,
        user_data,
    }
}
