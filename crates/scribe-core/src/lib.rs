//! Core types and error definitions for the Scribe workspace.
//!
//! This crate provides the foundational types shared across all Scribe crates,
//! including error handling, chat message representations, and tool call
//! abstractions.
//!
//! # Main types
//!
//! - [`ScribeError`]: Unified error enum for all Scribe subsystems.
//! - [`ScribeResult`]: Convenience alias for `Result<T, ScribeError>`.
//! - [`Role`]: Message role (user, assistant, system, tool).
//! - [`Message`]: A single message sent to a chat model.
//! - [`ToolCall`]: Represents an LLM-initiated tool invocation request.
//! - [`ToolResult`]: The result returned after executing a tool call.

/// Error types.
pub mod error;
/// Chat message types.
pub mod message;
/// Tool call and tool result types.
pub mod tool;

pub use error::{ScribeError, ScribeResult};
pub use message::{Message, Role};
pub use tool::{ToolCall, ToolResult};
