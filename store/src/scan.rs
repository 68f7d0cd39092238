use serde::{Deserialize, Serialize};

/// Durable marker of a rescan in progress.
///
/// Written before a rescan replays its first block and cleared once it
/// finishes, so a process that dies mid-rescan resumes it on restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub rescan: bool,
    pub height: u32,
    pub validate: bool,
}

impl ScanRecord {
    pub fn pending(height: u32, validate: bool) -> Self {
        Self {
            rescan: true,
            height,
            validate,
        }
    }
}
