//! Chat model providers.
//!
//! Every supported provider speaks the OpenAI chat-completions protocol, so
//! one backend covers them all; [`crate::config::LlmProvider`] only changes
//! the base URL and headers.

/// The chat-completions client and its SSE decoder.
pub mod openai;
