//! Agent orchestration engine for Pincer.
//!
//! This crate holds the engine and the "ports" its adapters implement:
//! - `llm`: provider traits, chat backend trait and the retrying, failing-over
//!   `Transport`
//! - `session`: in-memory session store over a pluggable persistence trait
//! - `compaction`: single-flight background history summarization
//! - `agent`: context building, tool registry, the tool-calling loop and
//!   background subagents
//! - `message`: the inbound/outbound message bus
//!
//! It depends only on `pincer-types` -- never on `pincer-infra` or any
//! HTTP/filesystem crate.

pub mod agent;
pub mod compaction;
pub mod llm;
pub mod message;
pub mod session;
