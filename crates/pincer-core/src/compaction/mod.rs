//! Background history compaction.
//!
//! - `CompactionLeases`: per-key single-flight leases
//! - `Compactor`: summarizes old turns and truncates history

pub mod compactor;
pub mod lease;
