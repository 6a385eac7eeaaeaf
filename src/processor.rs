//! The reconciliation loop: work sources, fetcher rotation, pacing, the
//! decision engine, and the loop controller tying them together.

pub mod engine;
pub mod pacing;
pub mod reconciler;
pub mod rotation;
pub mod source;

#[cfg(test)]
pub(crate) mod fake;
