//! LLM backend abstractions for Pincer.
//!
//! - `LlmProvider`: RPITIT trait the engine calls for completions
//! - `BoxLlmProvider`: object-safe wrapper for dynamic dispatch
//! - `ChatBackend`: a single HTTP attempt against one endpoint
//! - `Transport`: orphan filtering, retry with backoff and failover on top of
//!   `ChatBackend`s

pub mod backend;
pub mod box_provider;
pub mod provider;
pub mod retry;
pub mod sanitize;
pub mod transport;
pub mod wire;
