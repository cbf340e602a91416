// Serde helpers for the beacon API JSON format.
// Integers travel as decimal strings and payloads are wrapped in {"data": ...}.

use serde::{Deserialize, Serialize};

/// Beacon API response envelope: `{"data": T, ...}`.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// (De)serialize a `u64` as a decimal string, accepting bare numbers on input.
pub mod quoted_u64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum QuotedOrNumber {
        Quoted(String),
        Number(u64),
    }

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match QuotedOrNumber::deserialize(deserializer)? {
            QuotedOrNumber::Quoted(s) => s
                .parse()
                .map_err(|e| D::Error::custom(format!("Invalid quoted integer '{}': {}", s, e))),
            QuotedOrNumber::Number(n) => Ok(n),
        }
    }
}
