//! LLM backend implementations.
//!
//! [`ReqwestBackend`](reqwest_backend::ReqwestBackend) speaks the
//! OpenAI-compatible chat-completions protocol; [`factory`] picks the
//! endpoint and key for a model name and assembles the resilient transport.

pub mod factory;
pub mod reqwest_backend;
