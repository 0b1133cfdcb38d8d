//! Canonical numeric identities.
//!
//! OneBot payloads carry account and group ids either as JSON numbers or as
//! numeric strings. Everything is normalized here, once, at ingestion so the
//! rest of the pipeline compares plain integers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Parses a JSON number or numeric string into a positive account number.
///
/// Zero, negatives, fractions, booleans and non-numeric strings yield `None`.
pub fn parse_identity_value(value: &Value) -> Option<u64> {
    let parsed = match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && *float > 0.0 && *float < u64::MAX as f64)
                .map(|float| float as u64)
        }),
        Value::String(raw) => raw.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (parsed > 0).then_some(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
/// Account identity of a user or of the bot itself.
pub struct UserId(u64);

impl UserId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        parse_identity_value(value).map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        parse_identity_value(&Value::String(raw.to_string()))
            .map(Self)
            .ok_or_else(|| format!("'{}' is not a valid account id", raw.trim()))
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("expected numeric account id, found {raw}"))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
/// Group (chat room) identity for group-scoped pokes.
pub struct GroupId(u64);

impl GroupId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        parse_identity_value(value).map(Self)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
