use thiserror::Error;

/// Rolling back below the trimmed height is impossible: the history needed
/// to reconstruct that state is gone.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{table}: cannot roll back to height {requested}, history trimmed at {trimmed}")]
pub struct RollbackError {
    pub table: &'static str,
    pub requested: u32,
    pub trimmed: u32,
}

/// A materialized view that tracks chain height.
///
/// The chain service calls these in lock-step with head movement: `rollback`
/// on pop-off and failed block apply, `trim` from the trim worker, and
/// `truncate` before a rescan from genesis.
pub trait DerivedState: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drop history that is no longer needed to roll back to `height`.
    fn trim(&mut self, height: u32);

    /// Discard every change made above `height`.
    fn rollback(&mut self, height: u32) -> Result<(), RollbackError>;

    /// Forget everything.
    fn truncate(&mut self);
}
