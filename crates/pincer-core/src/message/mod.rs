//! Inbound/outbound message bus between chat channels and the agent loop.

pub mod bus;
