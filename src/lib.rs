//! Taskmind - conversational action pipeline for tasks and calendar events

pub mod assistant;
pub mod command;
pub mod core;
pub mod llm;
pub mod store;

pub use assistant::{Assistant, Conversation};
