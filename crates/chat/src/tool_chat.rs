//! Chat session that executes tool-call directives found in model output.
//!
//! A turn moves through `TurnState`:
//! `Idle -> AwaitingModel -> DetectingToolCalls | Emitting ->
//! [ExecutingTool -> AwaitingModel]* -> Complete -> Idle`.
//!
//! Non-streaming turns call each tool once. Streaming turns forward model
//! fragments as they arrive, then run each directive through a bounded
//! retry loop in which the model is asked to correct failed parameters.

use std::ops::Range;
use std::sync::Arc;

use feedloom_core::message::{Message, SessionId};
use feedloom_core::provider::ProviderRequest;
use feedloom_core::tool::ToolBackend;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::directive::{self, DirectiveMatch, ToolCallDirective};
use crate::error::Result;
use crate::event::{Emitter, EventSender, StreamEvent, drain_into};
use crate::prompt;
use crate::session::{ChatSession, strip_reasoning};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingModel,
    DetectingToolCalls,
    Emitting,
    ExecutingTool { tool: String, attempt: u32 },
    Complete,
}

/// Result of a non-streaming turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub response: String,
    pub has_tool_call: bool,
}

pub struct ToolCallingChatSession {
    base: ChatSession,
    tools: Arc<dyn ToolBackend>,
    available_tools: Vec<String>,
    max_attempts: u32,
    state: TurnState,
}

impl ToolCallingChatSession {
    /// Wrap `base`, fetching the tool list once. An unreachable tool
    /// backend leaves the session without tools rather than failing.
    pub async fn create(mut base: ChatSession, tools: Arc<dyn ToolBackend>) -> Self {
        let available_tools = match tools.list_tools().await {
            Ok(names) => names,
            Err(e) => {
                warn!(session_id = %base.id(), backend = tools.name(), error = %e, "Could not list tools");
                Vec::new()
            }
        };
        let augmented = prompt::with_tools(base.system_prompt(), &available_tools);
        base.set_system_prompt(augmented);
        info!(session_id = %base.id(), tools = available_tools.len(), "Tool chat session created");

        Self {
            base,
            tools,
            available_tools,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            state: TurnState::Idle,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn id(&self) -> &SessionId {
        self.base.id()
    }

    pub fn base(&self) -> &ChatSession {
        &self.base
    }

    pub fn history(&self) -> &[Message] {
        self.base.history()
    }

    pub fn available_tools(&self) -> &[String] {
        &self.available_tools
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    fn transition(&mut self, next: TurnState) {
        debug!(session_id = %self.base.id(), from = ?self.state, to = ?next, "Turn state");
        self.state = next;
    }

    fn is_available(&self, tool: &str) -> bool {
        self.available_tools.iter().any(|t| t == tool)
    }

    /// One non-streaming turn.
    pub async fn send(&mut self, user_input: &str) -> Result<TurnReply> {
        info!(session_id = %self.base.id(), "Tool chat turn");
        self.transition(TurnState::AwaitingModel);

        let request = self.base.request(vec![Message::user(user_input)]);
        let response = match self.base.model().provider.complete(request).await {
            Ok(r) => r,
            Err(e) => {
                self.transition(TurnState::Idle);
                return Err(e.into());
            }
        };
        let text = strip_reasoning(&response.message.content);

        self.transition(TurnState::DetectingToolCalls);
        let matches = directive::scan(&text);
        let has_tool_call = log_and_count(&matches) > 0;

        let mut replacements: Vec<(Range<usize>, String)> = Vec::new();
        for (span, call) in well_formed(matches) {
            let replacement = if !self.is_available(&call.tool) {
                prompt::unknown_tool(&call.tool, &self.available_tools)
            } else {
                self.transition(TurnState::ExecutingTool {
                    tool: call.tool.clone(),
                    attempt: 1,
                });
                match self.tools.call(&call.tool, call.params.clone()).await {
                    Ok(output) => prompt::tool_result(&call.tool, &output),
                    Err(e) => {
                        warn!(tool = %call.tool, error = %e, "Tool call failed");
                        prompt::tool_failed(&call.tool, &e.to_string())
                    }
                }
            };
            replacements.push((span, replacement));
        }

        if !has_tool_call {
            self.transition(TurnState::Emitting);
        }
        let response = directive::substitute(&text, &replacements);
        self.base.commit(user_input, response.clone());
        self.transition(TurnState::Complete);
        self.transition(TurnState::Idle);

        Ok(TurnReply {
            response,
            has_tool_call,
        })
    }

    /// One streaming turn delivered on `tx`. Always ends with a final event.
    ///
    /// Returns whether a well-formed tool call was detected.
    pub async fn stream(&mut self, user_input: &str, tx: &EventSender) -> bool {
        info!(session_id = %self.base.id(), "Streaming tool chat turn");
        let mut emitter = Emitter::new(tx);

        let committed = self.stream_turn(user_input, &mut emitter).await;
        if !committed {
            self.transition(TurnState::Idle);
        }

        let has_tool_call = emitter.has_tool_call();
        emitter.finish().await;
        has_tool_call
    }

    /// Streaming turn with a `(chunk, is_final, has_tool_call)` callback.
    pub async fn stream_with_callback<F>(&mut self, user_input: &str, callback: F) -> bool
    where
        F: FnMut(&str, bool, bool),
    {
        let (tx, rx) = mpsc::channel::<StreamEvent>(64);
        let (has_tool_call, ()) = tokio::join!(
            async {
                let has = self.stream(user_input, &tx).await;
                drop(tx);
                has
            },
            drain_into(rx, callback)
        );
        has_tool_call
    }

    /// Returns false when the model failed and nothing was committed.
    async fn stream_turn(&mut self, user_input: &str, emitter: &mut Emitter<'_>) -> bool {
        self.transition(TurnState::AwaitingModel);
        let request = self.base.request(vec![Message::user(user_input)]);
        let complete = match self.forward_model_stream(request, emitter).await {
            Ok(text) => text,
            Err(message) => {
                emitter.send(message).await;
                return false;
            }
        };

        // Directives drafted inside reasoning blocks are not calls.
        let text = strip_reasoning(&complete);
        self.transition(TurnState::DetectingToolCalls);
        let matches = directive::scan(&text);
        emitter.mark_tool_call(log_and_count(&matches) > 0);
        if !emitter.has_tool_call() {
            self.transition(TurnState::Emitting);
        }

        let mut replacements: Vec<(Range<usize>, String)> = Vec::new();
        for (span, call) in well_formed(matches) {
            let replacement = if self.is_available(&call.tool) {
                self.execute_with_retry(call, user_input, &text, emitter).await
            } else {
                let warning = prompt::unknown_tool(&call.tool, &self.available_tools);
                emitter.send(warning.clone()).await;
                warning
            };
            replacements.push((span, replacement));
        }

        let response = directive::substitute(&text, &replacements);
        self.base.commit(user_input, response);
        self.transition(TurnState::Complete);
        self.transition(TurnState::Idle);
        true
    }

    /// Stream a model reply to the caller and return the accumulated text,
    /// or the error chunk to send.
    async fn forward_model_stream(
        &self,
        request: ProviderRequest,
        emitter: &Emitter<'_>,
    ) -> std::result::Result<String, String> {
        let mut rx = self.base.model().provider.stream(request).await.map_err(|e| {
            warn!(session_id = %self.base.id(), error = %e, "Model stream failed to start");
            prompt::error_chunk(&e)
        })?;

        let mut complete = String::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(chunk) => {
                    if let Some(content) = chunk.content {
                        complete.push_str(&content);
                        emitter.send(content).await;
                    }
                    if chunk.done {
                        break;
                    }
                }
                Err(e) => {
                    warn!(session_id = %self.base.id(), error = %e, "Model stream interrupted");
                    return Err(prompt::error_chunk(&e));
                }
            }
        }
        Ok(complete)
    }

    /// Run one directive with bounded retries. Returns the text that
    /// replaces the directive in history.
    async fn execute_with_retry(
        &mut self,
        call: ToolCallDirective,
        user_input: &str,
        original_response: &str,
        emitter: &Emitter<'_>,
    ) -> String {
        let tool = call.tool;
        let mut params = call.params;
        let mut tried: Vec<String> = Vec::new();
        let mut last_reason = String::new();

        for attempt in 1..=self.max_attempts {
            self.transition(TurnState::ExecutingTool {
                tool: tool.clone(),
                attempt,
            });
            tried.push(params.to_string());

            emitter.send(prompt::tool_calling(&tool)).await;
            let outcome = self.attempt(&tool, &params, emitter).await;
            emitter.send(prompt::OUTPUT_END).await;

            match outcome {
                Ok(output) => {
                    info!(tool = %tool, attempt, "Tool call succeeded");
                    return prompt::tool_result(&tool, &output);
                }
                Err(reason) => {
                    warn!(tool = %tool, attempt, reason = %reason, "Tool attempt failed");
                    last_reason = reason;
                }
            }

            if attempt == self.max_attempts {
                break;
            }

            emitter
                .send(prompt::retry_notice(&tool, &last_reason, attempt + 1, self.max_attempts))
                .await;
            self.transition(TurnState::AwaitingModel);
            if let Some(corrected) = self
                .request_correction(&tool, &params, &last_reason, user_input, original_response, emitter)
                .await
            {
                params = corrected;
            }
            if tried.contains(&params.to_string()) {
                debug!(tool = %tool, "Corrected parameters repeat an earlier attempt");
                emitter.send(prompt::non_convergent(&tool)).await;
            }
        }

        let notice = prompt::exhausted(&tool, self.max_attempts, &last_reason);
        emitter.send(notice.clone()).await;
        notice
    }

    /// One streamed tool invocation. Fragments are forwarded as they arrive.
    async fn attempt(&self, tool: &str, params: &Value, emitter: &Emitter<'_>) -> std::result::Result<String, String> {
        let mut rx = self
            .tools
            .call_streaming(tool, params.clone())
            .await
            .map_err(|e| e.to_string())?;

        let mut output = String::new();
        let mut fragments = 0usize;
        while let Some(item) = rx.recv().await {
            let fragment = item.map_err(|e| e.to_string())?;
            fragments += 1;
            emitter.send(fragment.clone()).await;
            if is_error_fragment(&fragment) {
                return Err(fragment.trim().to_string());
            }
            output.push_str(&fragment);
        }

        if fragments == 0 {
            return Err("tool returned no output".into());
        }
        Ok(output)
    }

    /// Ask the model for corrected parameters, streaming its reply.
    async fn request_correction(
        &self,
        tool: &str,
        params: &Value,
        reason: &str,
        user_input: &str,
        original_response: &str,
        emitter: &Emitter<'_>,
    ) -> Option<Value> {
        let request = self.base.request(vec![
            Message::user(user_input),
            Message::assistant(original_response),
            Message::user(prompt::correction_request(tool, params, reason)),
        ]);
        match self.forward_model_stream(request, emitter).await {
            Ok(reply) => directive::corrected_params(&strip_reasoning(&reply)),
            Err(message) => {
                emitter.send(message).await;
                None
            }
        }
    }
}

fn is_error_fragment(fragment: &str) -> bool {
    fragment
        .trim_start()
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("error"))
}

fn log_and_count(matches: &[DirectiveMatch]) -> usize {
    for m in matches {
        if let Err(e) = &m.parsed {
            debug!(error = %e, "Skipping malformed tool directive");
        }
    }
    matches.iter().filter(|m| m.parsed.is_ok()).count()
}

fn well_formed(matches: Vec<DirectiveMatch>) -> impl Iterator<Item = (Range<usize>, ToolCallDirective)> {
    matches
        .into_iter()
        .filter_map(|m| m.parsed.ok().map(|call| (m.span, call)))
}
