//! Session storage: an in-memory store of conversation sessions backed by a
//! pluggable persistence port.

pub mod box_persistence;
pub mod persistence;
pub mod store;
