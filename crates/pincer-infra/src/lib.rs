//! Infrastructure layer for Pincer.
//!
//! Contains implementations of the traits defined in `pincer-core`: the
//! reqwest chat backend and provider resolution, JSON-file session
//! persistence, and the `config.toml` loader.

pub mod config;
pub mod llm;
pub mod session;
