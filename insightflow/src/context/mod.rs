//! Conversation state shared across agent calls.

mod conversation;

pub use conversation::{ConversationContext, Message, SessionMode, Turn};
