//! Agent orchestration: context building, tools, the tool-calling loop and
//! background subagents.

pub mod agent_loop;
pub mod context;
pub mod subagent;
pub mod tools;
