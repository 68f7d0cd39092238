//! Network identifier.

use serde::{Deserialize, Serialize};

/// Identifies which Strata network a node follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production network.
    Live,
    /// The public test network.
    Test,
    /// Local development network.
    Dev,
}

impl NetworkId {
    /// Default peer port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Live => 7874,
            Self::Test => 6874,
            Self::Dev => 5874,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Test => "test",
            Self::Dev => "dev",
        }
    }
}

impl std::str::FromStr for NetworkId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "test" => Ok(Self::Test),
            "dev" => Ok(Self::Dev),
            other => Err(format!("unknown network: {other}")),
        }
    }
}
