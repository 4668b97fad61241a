//! Chat sessions for feedloom.
//!
//! A [`ChatSession`] holds a model, a system prompt and the conversation
//! history. [`ToolCallingChatSession`] wraps it and executes ```` ```mcp ````
//! tool-call directives found in model replies, either once per directive
//! (`send`) or with bounded, model-corrected retries while streaming
//! (`stream`). [`ChatService`] owns the live sessions and the delivery
//! channels opened by streaming clients.

pub mod digest;
pub mod directive;
pub mod error;
pub mod event;
pub mod prompt;
pub mod registry;
pub mod service;
pub mod session;
pub mod tool_chat;

pub use digest::{Digest, FeedDigester};
pub use directive::{ParseError, ToolCallDirective};
pub use error::{ChatError, Result};
pub use event::{EventSender, StreamEvent, drain_into};
pub use registry::{ActiveStreams, InMemorySessionStore, SessionStore, SharedSession};
pub use service::{ChatReply, ChatRequest, ChatService};
pub use session::{ChatSession, strip_reasoning};
pub use tool_chat::{DEFAULT_MAX_ATTEMPTS, ToolCallingChatSession, TurnReply, TurnState};
