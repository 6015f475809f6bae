//! Serde helpers for wall-clock times written as `"HH:MM"` or `"HH:MM:SS"`.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serializer};

/// Parse `"HH:MM"` or `"HH:MM:SS"`.
pub fn parse(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

pub fn serialize<S: Serializer>(t: &NaiveTime, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&t.format("%H:%M:%S").to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(de)?;
    parse(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid time of day '{raw}', expected HH:MM[:SS]"))
    })
}
