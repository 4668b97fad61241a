//! Streaming turn events.
//!
//! Every streaming turn delivers an ordered sequence of `StreamEvent`s and
//! always ends with exactly one event where `is_final` is set and `chunk` is
//! empty, including when the turn fails.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub chunk: String,
    pub is_final: bool,
    /// Whether the turn contained at least one well-formed tool call.
    /// Only meaningful once directives have been detected.
    pub has_tool_call: bool,
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>, has_tool_call: bool) -> Self {
        Self {
            chunk: text.into(),
            is_final: false,
            has_tool_call,
        }
    }

    pub fn finished(has_tool_call: bool) -> Self {
        Self {
            chunk: String::new(),
            is_final: true,
            has_tool_call,
        }
    }
}

pub type EventSender = mpsc::Sender<StreamEvent>;

/// Sends turn events, carrying the turn's tool-call flag.
///
/// A closed receiver is not an error: the turn still runs to completion so
/// history stays consistent.
pub(crate) struct Emitter<'a> {
    tx: &'a EventSender,
    has_tool_call: bool,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(tx: &'a EventSender) -> Self {
        Self {
            tx,
            has_tool_call: false,
        }
    }

    pub(crate) fn mark_tool_call(&mut self, detected: bool) {
        self.has_tool_call = detected;
    }

    pub(crate) fn has_tool_call(&self) -> bool {
        self.has_tool_call
    }

    pub(crate) async fn send(&self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        let _ = self.tx.send(StreamEvent::chunk(text, self.has_tool_call)).await;
    }

    pub(crate) async fn finish(self) {
        let _ = self.tx.send(StreamEvent::finished(self.has_tool_call)).await;
    }
}

/// Drain `rx` into a `(chunk, is_final, has_tool_call)` callback.
pub async fn drain_into<F>(mut rx: mpsc::Receiver<StreamEvent>, mut callback: F)
where
    F: FnMut(&str, bool, bool),
{
    while let Some(event) = rx.recv().await {
        callback(&event.chunk, event.is_final, event.has_tool_call);
        if event.is_final {
            break;
        }
    }
}
