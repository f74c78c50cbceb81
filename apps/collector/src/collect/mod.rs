// Collection pipeline: org listing → topic filter → per-repository fetch/store → fork walk.
// All GitHub calls go through crate::github; all writes go through crate::store::RecordStore.

pub mod orchestrator;
pub mod persist;
pub mod processor;
