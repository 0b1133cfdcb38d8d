//! Response interpretation for the friend list and stranger-info lookups.

use serde_json::Value;

use crate::identity::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of scanning a `get_friend_list` response for one account.
pub enum FriendLookup {
    Friend,
    NotFriend,
    Malformed,
}

/// Accepts a bare list or an object wrapping the list under `data`.
pub fn friend_entries(response: &Value) -> Option<&[Value]> {
    match response {
        Value::Array(entries) => Some(entries.as_slice()),
        Value::Object(map) => map
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice),
        _ => None,
    }
}

pub fn lookup_friend(response: &Value, user_id: UserId) -> FriendLookup {
    let Some(entries) = friend_entries(response) else {
        return FriendLookup::Malformed;
    };
    let found = entries.iter().any(|entry| {
        entry
            .get("user_id")
            .and_then(UserId::from_value)
            .is_some_and(|candidate| candidate == user_id)
    });
    if found {
        FriendLookup::Friend
    } else {
        FriendLookup::NotFriend
    }
}

/// Reads the VIP flag from a `get_stranger_info` response.
///
/// The flag is read from `data` when that object is present, otherwise from the
/// top level. `vip` and `is_vip` are both recognized; booleans, non-zero numbers
/// and `"true"`/`"1"` strings count as set.
pub fn vip_flag_from_stranger_info(response: &Value) -> bool {
    let body = match response.get("data") {
        Some(data) if data.is_object() => data,
        _ => response,
    };
    ["vip", "is_vip"]
        .iter()
        .filter_map(|field| body.get(*field))
        .any(is_truthy_flag)
}

fn is_truthy_flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
        Value::String(raw) => matches!(raw.trim(), "true" | "1"),
        _ => false,
    }
}
