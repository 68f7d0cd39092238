//! Strata chain core.
//!
//! [`Chain`] owns the chain head, the derived state and the unconfirmed
//! pool behind one lock, and exposes block acceptance, pop-off, rescan,
//! pool admission and block generation. [`SyncEngine`] keeps it on the
//! heaviest chain known to peers, [`PeerRequestHandler`] serves peers, and
//! [`ChainNode`] runs the periodic workers around them.

mod acceptor;
mod admission;
mod assembly;
pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
mod fork;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod peer_api;
pub mod pool;
mod replay;
pub mod shutdown;
pub mod sync;
pub mod tracing_spans;

pub use admission::PeerTransactionOutcome;
pub use cache::BlockCache;
pub use chain::{Chain, ChainOptions};
pub use config::{NodeConfig, SyncConfig};
pub use error::{BlockRejection, ChainError, NodeError};
pub use events::{ChainEvent, ChainEventKind, EventBus};
pub use fork::ForkOutcome;
pub use logging::{init_logging, LogFormat};
pub use metrics::ChainMetrics;
pub use node::ChainNode;
pub use peer_api::PeerRequestHandler;
pub use pool::{Priority, UnconfirmedPool, UnconfirmedTransaction};
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use sync::{SyncEngine, SyncOutcome};
