//! Prometheus metrics for the chain service.
//!
//! [`ChainMetrics`] owns a dedicated [`Registry`]. Head movement is counted
//! by an event-bus subscriber; the node's workers record sync outcomes and
//! pool sizes directly.

use std::sync::Arc;

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::events::{ChainEvent, ChainEventKind, EventBus};

pub struct ChainMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub blocks_pushed: IntCounter,
    pub blocks_popped: IntCounter,
    /// Blocks refused from peers or local production.
    pub blocks_rejected: IntCounter,
    pub reorgs: IntCounter,
    pub sync_iterations: IntCounter,
    pub rescans: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub height: IntGauge,
    pub admitted: IntGauge,
    pub waiting: IntGauge,

    /// Wall time of one sync iteration, in milliseconds.
    pub sync_time_ms: Histogram,
}

impl ChainMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let blocks_pushed = register_int_counter_with_registry!(
            Opts::new("strata_blocks_pushed_total", "Blocks appended to the chain"),
            registry
        )?;
        let blocks_popped = register_int_counter_with_registry!(
            Opts::new("strata_blocks_popped_total", "Blocks detached from the chain"),
            registry
        )?;
        let blocks_rejected = register_int_counter_with_registry!(
            Opts::new("strata_blocks_rejected_total", "Blocks refused by validation"),
            registry
        )?;
        let reorgs = register_int_counter_with_registry!(
            Opts::new("strata_reorgs_total", "Forks adopted over the local chain"),
            registry
        )?;
        let sync_iterations = register_int_counter_with_registry!(
            Opts::new("strata_sync_iterations_total", "Sync iterations run"),
            registry
        )?;
        let rescans = register_int_counter_with_registry!(
            Opts::new("strata_rescans_total", "Rescans started"),
            registry
        )?;

        let height = register_int_gauge_with_registry!(
            Opts::new("strata_chain_height", "Height of the chain head"),
            registry
        )?;
        let admitted = register_int_gauge_with_registry!(
            Opts::new("strata_pool_admitted", "Transactions in the admitted table"),
            registry
        )?;
        let waiting = register_int_gauge_with_registry!(
            Opts::new("strata_pool_waiting", "Transactions in the waiting queue"),
            registry
        )?;

        let sync_time_ms = register_histogram_with_registry!(
            HistogramOpts::new("strata_sync_time_ms", "Sync iteration time in milliseconds")
                .buckets(prometheus::exponential_buckets(1.0, 2.0, 16)?),
            registry
        )?;

        Ok(Self {
            registry,
            blocks_pushed,
            blocks_popped,
            blocks_rejected,
            reorgs,
            sync_iterations,
            rescans,
            height,
            admitted,
            waiting,
            sync_time_ms,
        })
    }

    /// Track head movement from chain events.
    pub fn attach(self: &Arc<Self>, events: &EventBus) {
        let metrics = Arc::clone(self);
        events.subscribe_all(
            &[
                ChainEventKind::BlockPushed,
                ChainEventKind::BlockPopped,
                ChainEventKind::BlockScanned,
                ChainEventKind::RescanBegin,
                ChainEventKind::RescanEnd,
            ],
            move |event| metrics.observe(event),
        );
    }

    fn observe(&self, event: &ChainEvent) {
        match event {
            ChainEvent::BlockPushed(block) => {
                self.blocks_pushed.inc();
                self.height.set(i64::from(block.height));
            }
            ChainEvent::BlockPopped(block) => {
                self.blocks_popped.inc();
                self.height.set(i64::from(block.height.saturating_sub(1)));
            }
            ChainEvent::BlockScanned(block) => self.height.set(i64::from(block.height)),
            ChainEvent::RescanBegin { .. } => self.rescans.inc(),
            ChainEvent::RescanEnd { height } => self.height.set(i64::from(*height)),
            _ => {}
        }
    }

    pub fn observe_pool(&self, admitted: usize, waiting: usize) {
        self.admitted.set(i64::try_from(admitted).unwrap_or(i64::MAX));
        self.waiting.set(i64::try_from(waiting).unwrap_or(i64::MAX));
    }

    /// Text exposition of every metric in the registry.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
