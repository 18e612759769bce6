//! The bounded reasoning loop.
//!
//! Drives one user turn: assemble context, call the model, dispatch any tool
//! calls it requests, loop until a terminal message, then persist. Four
//! bounds are enforced regardless of what the model asks for: steps, tool
//! calls, wall time, and cost. Transient provider errors retry with
//! exponential backoff; everything else ends the turn with an error-tagged
//! assistant message so the client always receives a well-formed response.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mnemon_core::error::{Error, ErrorKind, ProviderError};
use mnemon_core::event::{DomainEvent, EventBus};
use mnemon_core::message::{Message, MessageToolCall, SessionId};
use mnemon_core::provider::{Provider, ProviderRequest, Usage};
use mnemon_core::tool::{ToolCall, ToolRegistry};
use mnemon_memory::hierarchy::{ConsolidationReport, HierarchicalMemory};
use mnemon_store::{ConversationStore, VersionStore};
use mnemon_telemetry::{CostTracker, UsageRecord};

use crate::assembler::{AssembledContext, AssemblyInput, ContextAssembler, ContextUsage};
use crate::stream_event::AgentStreamEvent;
use crate::summarizer::Summarizer;

/// Loop bounds, each configurable. The tightest budget wins.
#[derive(Debug, Clone)]
pub struct TurnBounds {
    /// Maximum LLM calls per turn.
    pub max_steps: u32,
    /// Maximum tool dispatches per turn.
    pub max_tool_calls: u32,
    /// Wall-time budget for the whole turn.
    pub max_turn_duration: Duration,
    /// Cost budget for the whole turn, in USD.
    pub max_turn_cost: f64,
    /// Per-LLM-call timeout.
    pub llm_timeout: Duration,
    /// Retries for transient provider errors.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
}

impl Default for TurnBounds {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_tool_calls: 30,
            max_turn_duration: Duration::from_secs(120),
            max_turn_cost: 1.0,
            llm_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

/// The result of one completed turn. A failed turn still completes — its
/// `message` carries the error kind.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The final persisted assistant message.
    pub message: Message,
    /// Usage breakdown from the last context assembly.
    pub context_usage: ContextUsage,
    /// Summed provider usage across all model calls this turn.
    pub model_usage: Usage,
    pub steps: u32,
    pub tool_calls_made: u32,
    pub cost_usd: f64,
    pub reasoning_time_ms: u64,
    pub consolidation: Option<ConsolidationReport>,
}

/// The reasoning loop runner. One per agent; turns on the same session are
/// serialized by the caller.
pub struct TurnRunner {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    memory: Arc<HierarchicalMemory>,
    conversations: Arc<ConversationStore>,
    versions: Arc<VersionStore>,
    tracker: Arc<CostTracker>,
    event_bus: Arc<EventBus>,
    assembler: ContextAssembler,
    bounds: TurnBounds,
    summarizer: Option<Arc<Summarizer>>,
    auto_summarize: bool,
    /// Messages kept out of the summarized prefix.
    keep_recent_on_summarize: usize,
}

impl TurnRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        memory: Arc<HierarchicalMemory>,
        conversations: Arc<ConversationStore>,
        versions: Arc<VersionStore>,
        tracker: Arc<CostTracker>,
        event_bus: Arc<EventBus>,
        assembler: ContextAssembler,
        bounds: TurnBounds,
    ) -> Self {
        Self {
            provider,
            tools,
            memory,
            conversations,
            versions,
            tracker,
            event_bus,
            assembler,
            bounds,
            summarizer: None,
            auto_summarize: false,
            keep_recent_on_summarize: 10,
        }
    }

    /// Enable automatic summarization when the assembler asks for it.
    pub fn with_summarizer(mut self, summarizer: Arc<Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self.auto_summarize = true;
        self
    }

    async fn emit(events: &Option<mpsc::Sender<AgentStreamEvent>>, event: AgentStreamEvent) {
        if let Some(tx) = events {
            let _ = tx.send(event).await;
        }
    }

    /// Persist an error-tagged assistant message ending the turn.
    async fn persist_error(
        &self,
        session: &SessionId,
        kind: ErrorKind,
        text: String,
        events: &Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<Message, Error> {
        warn!(session = %session, kind = %kind, "Turn failed: {text}");
        Self::emit(events, AgentStreamEvent::Error { kind, message: text.clone() }).await;
        let msg = Message::assistant_error(session, kind, text);
        Ok(self.conversations.append(msg).await?)
    }

    /// One model call with exponential backoff on transient errors. The
    /// per-call timeout is clamped to the remaining turn budget.
    async fn call_model(
        &self,
        request: &ProviderRequest,
        deadline: Instant,
    ) -> Result<mnemon_core::provider::ProviderResponse, ProviderError> {
        let mut attempt: u32 = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProviderError::Timeout("turn budget exhausted".into()));
            }
            let call_timeout = remaining.min(self.bounds.llm_timeout);

            let result =
                tokio::time::timeout(call_timeout, self.provider.complete(request.clone())).await;

            let err = match result {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "no response within {}s",
                    call_timeout.as_secs()
                )),
            };

            if err.is_transient() && attempt < self.bounds.max_retries {
                let delay = self.bounds.retry_base_delay * 2u32.saturating_pow(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying transient provider error: {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            return Err(err);
        }
    }

    /// Process one user message through to a terminal assistant message.
    ///
    /// `events` receives stream frames when the caller is streaming; pass
    /// `None` for the non-streaming path.
    pub async fn run_turn(
        &self,
        agent_id: &str,
        session: &SessionId,
        user_text: &str,
        events: Option<mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<TurnOutcome, Error> {
        // Validation before any model call fails the request outright.
        let agent = self
            .versions
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| Error::InvalidRequest { message: format!("unknown agent {agent_id}") })?;
        if !agent.active {
            return Err(Error::InvalidRequest { message: format!("agent {agent_id} is inactive") });
        }

        let started = Instant::now();
        let deadline = started + self.bounds.max_turn_duration;
        let config = self.versions.get_current(agent_id).await?;
        let blocks = self.versions.list_blocks(agent_id).await?;
        let tool_definitions = self.tools.definitions();

        info!(agent = %agent_id, session = %session, model = %config.model, "Turn started");

        self.conversations.append(Message::user(session, user_text)).await?;

        let recalled = self
            .memory
            .search(&session.0, user_text, self.assembler.config().recall_k, None, None)
            .await?;

        let mut steps: u32 = 0;
        let mut tool_calls_made: u32 = 0;
        let mut total_usage = Usage::default();
        let mut total_cost = 0.0f64;
        let mut summarized = false;
        let mut context_usage: Option<ContextUsage> = None;

        let final_message: Message = loop {
            // ── ASSEMBLE ──────────────────────────────────────────────
            let history = self.conversations.list_all(session).await?;
            let assembled: AssembledContext = match self.assembler.assemble(&AssemblyInput {
                config: &config,
                blocks: &blocks,
                tool_definitions: &tool_definitions,
                recalled: &recalled,
                history: &history,
            }) {
                Ok(a) => a,
                Err(e @ Error::ContextOverflowFixed { .. }) => {
                    break self
                        .persist_error(session, e.kind(), e.to_string(), &events)
                        .await?;
                }
                Err(e) => return Err(e),
            };

            if assembled.usage.needs_summarization && self.auto_summarize && !summarized {
                summarized = true;
                if let Some(summarizer) = &self.summarizer {
                    if let Some(up_to_seq) =
                        Summarizer::prefix_cutoff(&history, self.keep_recent_on_summarize)
                    {
                        // A failed summarization leaves the log unchanged;
                        // the turn proceeds with the unsummarized context.
                        if let Err(e) = summarizer
                            .summarize(&self.conversations, session, up_to_seq, &config)
                            .await
                        {
                            warn!(session = %session, "Auto-summarization failed: {e}");
                        }
                        continue; // re-assemble once
                    }
                }
            }
            context_usage = Some(assembled.usage.clone());

            // ── Bounds ────────────────────────────────────────────────
            if steps >= self.bounds.max_steps {
                break self
                    .persist_error(
                        session,
                        ErrorKind::StepLimit,
                        format!("step limit reached after {steps} model calls"),
                        &events,
                    )
                    .await?;
            }
            if Instant::now() >= deadline {
                break self
                    .persist_error(
                        session,
                        ErrorKind::TurnTimeout,
                        format!("turn exceeded {}s", self.bounds.max_turn_duration.as_secs()),
                        &events,
                    )
                    .await?;
            }
            steps += 1;

            // ── CALL_LLM ──────────────────────────────────────────────
            let request = ProviderRequest {
                model: config.model.clone(),
                messages: assembled.messages.clone(),
                temperature: config.temperature,
                top_p: config.top_p,
                max_tokens: config.max_tokens,
                tools: assembled.tool_definitions.clone(),
                reasoning_enabled: config.reasoning_enabled,
                max_reasoning_tokens: config.max_reasoning_tokens,
                stream: false,
            };

            let response = match self.call_model(&request, deadline).await {
                Ok(r) => r,
                Err(e) => {
                    let kind = if Instant::now() >= deadline {
                        ErrorKind::TurnTimeout
                    } else {
                        e.kind()
                    };
                    break self.persist_error(session, kind, e.to_string(), &events).await?;
                }
            };

            // ── Account usage and cost ────────────────────────────────
            if let Some(usage) = &response.usage {
                total_usage.prompt_tokens += usage.prompt_tokens;
                total_usage.completion_tokens += usage.completion_tokens;
                if let Some(r) = usage.reasoning_tokens {
                    total_usage.reasoning_tokens =
                        Some(total_usage.reasoning_tokens.unwrap_or(0) + r);
                }

                let call_cost = self.tracker.compute_cost(
                    &response.model,
                    usage.prompt_tokens,
                    usage.completion_tokens,
                    usage.reasoning_tokens,
                );
                total_cost += call_cost;

                self.tracker.record(UsageRecord {
                    timestamp: Utc::now(),
                    session_id: session.0.clone(),
                    model: response.model.clone(),
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    reasoning_tokens: usage.reasoning_tokens,
                    cost: call_cost,
                    tool_calls_made: response.message.tool_calls.len() as u32,
                });
                self.event_bus.publish(DomainEvent::UsageRecorded {
                    session_id: session.0.clone(),
                    model: response.model.clone(),
                    total_tokens: usage.total_tokens(),
                    cost_usd: call_cost,
                    timestamp: Utc::now(),
                });
            }

            if total_cost > self.bounds.max_turn_cost {
                break self
                    .persist_error(
                        session,
                        ErrorKind::BudgetExceeded,
                        format!(
                            "turn cost ${total_cost:.4} exceeds ${:.2}",
                            self.bounds.max_turn_cost
                        ),
                        &events,
                    )
                    .await?;
            }

            // ── INSPECT ───────────────────────────────────────────────
            let calls = response.message.tool_calls.clone();
            if calls.is_empty() {
                if let Some(thinking) = &response.message.thinking {
                    Self::emit(&events, AgentStreamEvent::ThinkingDelta {
                        content: thinking.clone(),
                    })
                    .await;
                }
                Self::emit(&events, AgentStreamEvent::ContentDelta {
                    content: response.message.content.clone(),
                })
                .await;

                let mut msg = Message::assistant(session, response.message.content.clone());
                msg.thinking = response.message.thinking.clone();
                msg.reasoning_time_ms = Some(started.elapsed().as_millis() as u64);
                break self.conversations.append(msg).await?;
            }

            if tool_calls_made + calls.len() as u32 > self.bounds.max_tool_calls {
                break self
                    .persist_error(
                        session,
                        ErrorKind::ToolLimit,
                        format!(
                            "tool call limit of {} exceeded",
                            self.bounds.max_tool_calls
                        ),
                        &events,
                    )
                    .await?;
            }

            // ── TOOL_DISPATCH ─────────────────────────────────────────
            let mut terminal_content: Option<String> = None;
            let mut executed: Vec<MessageToolCall> = Vec::new();
            let mut results: Vec<(String, String)> = Vec::new();

            for call in calls {
                Self::emit(&events, AgentStreamEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                })
                .await;

                let tool_call = ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                };

                if self.tools.is_terminal(&call.name) {
                    match self.tools.validate(&tool_call) {
                        Ok(()) => {
                            let content = call.arguments["message"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string();
                            terminal_content = Some(content);
                            // Calls after a terminal one are not dispatched.
                            break;
                        }
                        Err(e) => {
                            executed.push(call.clone());
                            results.push((
                                call.id.clone(),
                                serde_json::json!({
                                    "error": { "kind": e.kind(), "message": e.to_string() }
                                })
                                .to_string(),
                            ));
                            continue;
                        }
                    }
                }

                tool_calls_made += 1;
                let dispatch_started = Instant::now();
                match self.tools.dispatch(&tool_call).await {
                    Ok(result) => {
                        self.event_bus.publish(DomainEvent::ToolExecuted {
                            tool_name: call.name.clone(),
                            success: result.success,
                            duration_ms: result.duration_ms,
                            timestamp: Utc::now(),
                        });
                        Self::emit(&events, AgentStreamEvent::ToolResult {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            output: result.output.clone(),
                            success: result.success,
                        })
                        .await;
                        executed.push(call.clone());
                        results.push((call.id.clone(), result.output));
                    }
                    Err(e) => {
                        // Fed back to the model so it can recover.
                        self.event_bus.publish(DomainEvent::ToolExecuted {
                            tool_name: call.name.clone(),
                            success: false,
                            duration_ms: dispatch_started.elapsed().as_millis() as u64,
                            timestamp: Utc::now(),
                        });
                        let payload = serde_json::json!({
                            "error": { "kind": e.kind(), "message": e.to_string() }
                        })
                        .to_string();
                        Self::emit(&events, AgentStreamEvent::ToolResult {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            output: payload.clone(),
                            success: false,
                        })
                        .await;
                        executed.push(call.clone());
                        results.push((call.id.clone(), payload));
                    }
                }
            }

            // ── APPEND_TOOL_RESULTS ───────────────────────────────────
            if !executed.is_empty() {
                let mut assistant = Message::assistant(session, response.message.content.clone())
                    .with_tool_calls(executed);
                assistant.thinking = response.message.thinking.clone();
                self.conversations.append(assistant).await?;
                for (call_id, output) in results {
                    self.conversations
                        .append(Message::tool_result(session, call_id, output))
                        .await?;
                }
            }

            if let Some(content) = terminal_content {
                Self::emit(&events, AgentStreamEvent::ContentDelta { content: content.clone() })
                    .await;
                let mut msg = Message::assistant(session, content);
                msg.thinking = response.message.thinking.clone();
                msg.reasoning_time_ms = Some(started.elapsed().as_millis() as u64);
                break self.conversations.append(msg).await?;
            }

            // Loop back — the model sees the tool results and continues.
        };

        // ── PERSIST / DONE ────────────────────────────────────────────
        let reasoning_time_ms = started.elapsed().as_millis() as u64;
        self.event_bus.publish(DomainEvent::TurnCompleted {
            session_id: session.0.clone(),
            model: config.model.clone(),
            steps,
            tool_calls: tool_calls_made,
            tokens_used: total_usage.total_tokens(),
            cost_usd: total_cost,
            timestamp: Utc::now(),
        });

        let consolidation = match self.memory.note_turn().await {
            Ok(report) => {
                if let Some(r) = &report {
                    self.event_bus.publish(DomainEvent::MemoryConsolidated {
                        agent_id: agent_id.to_string(),
                        archived: r.archived,
                        promoted: r.promoted_to_semantic + r.promoted_from_working,
                        merged: r.merged,
                        timestamp: Utc::now(),
                    });
                }
                report
            }
            Err(e) => {
                warn!(agent = %agent_id, "Consolidation failed: {e}");
                None
            }
        };

        let context_usage = context_usage.unwrap_or(ContextUsage {
            system: 0,
            memory_blocks: 0,
            tool_schemas: 0,
            conversation: 0,
            total: 0,
            max: config.context_window,
            percent_used: 0.0,
            needs_summarization: false,
            remaining: config.context_window,
        });

        Self::emit(&events, AgentStreamEvent::Done {
            usage: Some(total_usage.clone()),
            cost_usd: total_cost,
            steps,
            tool_calls_made,
        })
        .await;

        info!(
            agent = %agent_id,
            session = %session,
            steps,
            tool_calls = tool_calls_made,
            cost = total_cost,
            elapsed_ms = reasoning_time_ms,
            "Turn complete"
        );

        Ok(TurnOutcome {
            message: final_message,
            context_usage,
            model_usage: total_usage,
            steps,
            tool_calls_made,
            cost_usd: total_cost,
            reasoning_time_ms,
            consolidation,
        })
    }
}
