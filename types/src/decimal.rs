//! Serde adapter for `u128` chain weights.
//!
//! JSON numbers stop being portable above 2^53, so human-readable formats
//! carry the value as a decimal string. Binary formats keep the raw integer.
//!
//! ```ignore
//! #[serde(with = "strata_types::decimal")]
//! pub cumulative_difficulty: u128,
//! ```

use serde::{de, Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        serializer.collect_str(value)
    } else {
        serializer.serialize_u128(*value)
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
    if deserializer.is_human_readable() {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    } else {
        u128::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Weight(#[serde(with = "super")] u128);

    #[test]
    fn json_carries_a_string() {
        let w = Weight(u128::MAX);
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
        assert_eq!(serde_json::from_str::<Weight>(&json).unwrap(), w);
    }

    #[test]
    fn bincode_carries_sixteen_bytes() {
        let encoded = bincode::serialize(&Weight(7)).unwrap();
        assert_eq!(encoded.len(), 16);
        assert_eq!(bincode::deserialize::<Weight>(&encoded).unwrap(), Weight(7));
    }
}
