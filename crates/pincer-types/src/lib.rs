//! Shared domain types for Pincer.
//!
//! This crate contains the types passed between the agent engine and its
//! adapters: conversation messages, tool calls, backend responses and their
//! error classification, sessions, bus envelopes and configuration.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod bus;
pub mod config;
pub mod error;
pub mod llm;
pub mod session;
pub mod tool;
