use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("peer {peer} timed out")]
    Timeout { peer: String },

    #[error("peer {0} is not connected")]
    Disconnected(String),

    #[error("peer {peer} sent a malformed response: {reason}")]
    Malformed { peer: String, reason: String },

    #[error("peer {peer} sent {len} items, limit is {max}")]
    Oversized { peer: String, len: usize, max: usize },

    #[error("peer {peer} sent inconsistent data: {reason}")]
    Inconsistent { peer: String, reason: String },

    #[error("peer {peer} answered with an error: {message}")]
    Remote { peer: String, message: String },

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl NetworkError {
    /// Address of the peer the failure is attributed to, if any.
    pub fn peer(&self) -> Option<&str> {
        match self {
            Self::Timeout { peer }
            | Self::Malformed { peer, .. }
            | Self::Oversized { peer, .. }
            | Self::Inconsistent { peer, .. }
            | Self::Remote { peer, .. } => Some(peer),
            Self::Disconnected(peer) => Some(peer),
            Self::Encoding(_) => None,
        }
    }

    /// Whether the peer misbehaved, as opposed to merely being slow or gone.
    pub fn is_misbehaviour(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. } | Self::Oversized { .. } | Self::Inconsistent { .. }
        )
    }
}
