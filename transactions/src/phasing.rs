use serde::{Deserialize, Serialize};

/// Deferred execution: the transaction's effects wait until `finish_height`,
/// or until `quorum` distinct accounts approve it, whichever comes first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phasing {
    pub finish_height: u32,
    pub quorum: u32,
}

impl Phasing {
    pub(crate) fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.finish_height.to_le_bytes());
        out.extend_from_slice(&self.quorum.to_le_bytes());
    }
}
