//! [`tracing::Span`] constructors for chain operations, so every code path
//! names and fields them the same way.

use strata_types::BlockId;
use tracing::{info_span, Span};

/// Validation and apply of one block.
pub fn block_push_span(block: BlockId, height: u32) -> Span {
    info_span!("block_push", block = %block, height)
}

pub fn pop_off_span(from_height: u32, to_height: u32) -> Span {
    info_span!("pop_off", from_height, to_height)
}

pub fn rescan_span(from_height: u32, validate: bool) -> Span {
    info_span!("rescan", from_height, validate)
}

/// One iteration of the sync loop against a feeder peer.
pub fn sync_span(peer: &str) -> Span {
    info_span!("sync", peer = %peer)
}

pub fn segment_span(peer: &str, start: BlockId, count: usize) -> Span {
    info_span!("segment", peer = %peer, start = %start, count)
}

pub fn peer_request_span(request: &str) -> Span {
    info_span!("peer_request", request = %request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_can_be_entered_without_a_subscriber() {
        let span = block_push_span(BlockId::new(7), 3);
        let _guard = span.enter();
        let inner = segment_span("10.0.0.1:7874", BlockId::new(8), 36);
        let _inner = inner.enter();
    }
}
