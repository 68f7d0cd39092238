//! 32-byte digests for blocks and transactions.
//!
//! The short numeric ids used on the wire are the first eight bytes of these
//! digests, read little-endian.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::ids::{BlockId, TransactionId};

macro_rules! digest_type {
    ($name:ident, $id:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// The short id derived from this digest.
            pub fn id(&self) -> $id {
                let mut head = [0u8; 8];
                head.copy_from_slice(&self.0[..8]);
                $id::new(u64::from_le_bytes(head))
            }

            pub fn from_hex(s: &str) -> Option<Self> {
                let bytes = hex::decode(s).ok()?;
                let arr: [u8; 32] = bytes.try_into().ok()?;
                Some(Self(arr))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&hex::encode(self.0))
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    Self::from_hex(&s)
                        .ok_or_else(|| de::Error::custom(concat!("invalid ", stringify!($name))))
                } else {
                    <[u8; 32]>::deserialize(deserializer).map(Self)
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }
    };
}

digest_type!(BlockHash, BlockId);
digest_type!(TxHash, TransactionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_little_endian_prefix() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[1] = 0x02;
        let hash = BlockHash::new(bytes);
        assert_eq!(hash.id().get(), 0x0201);
    }

    #[test]
    fn hex_round_trip() {
        let hash = TxHash::new([0xab; 32]);
        let parsed = TxHash::from_hex(&hash.to_string()).unwrap();
        assert_eq!(parsed, hash);
        assert!(TxHash::from_hex("abcd").is_none());
    }

    #[test]
    fn json_form_is_hex() {
        let hash = BlockHash::new([0x11; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "11".repeat(32)));
        let back: BlockHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
