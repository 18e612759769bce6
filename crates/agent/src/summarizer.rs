//! History summarization — compresses a message prefix into one
//! system-tagged summary message.
//!
//! On failure the log is left untouched and the error surfaces; messages are
//! never silently dropped.

use std::sync::Arc;
use tracing::info;

use mnemon_core::agent::AgentConfig;
use mnemon_core::error::Error;
use mnemon_core::message::{Message, Role, SessionId};
use mnemon_core::provider::{Provider, ProviderRequest};
use mnemon_store::ConversationStore;

const SUMMARY_INSTRUCTIONS: &str = "Condense the conversation below into a compact summary. \
Preserve: facts learned about the user, decisions made, open tasks, and emotional context. \
Write in third person. Do not invent details.";

/// Provider-backed conversation summarizer.
pub struct Summarizer {
    provider: Arc<dyn Provider>,
    /// Token budget for the produced summary.
    max_summary_tokens: u32,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider, max_summary_tokens: 1_500 }
    }

    pub fn with_max_summary_tokens(mut self, max: u32) -> Self {
        self.max_summary_tokens = max;
        self
    }

    /// Summarize all messages with `seq ≤ up_to_seq` and replace them in the
    /// log with a single system message. Returns the summary text.
    pub async fn summarize(
        &self,
        store: &ConversationStore,
        session: &SessionId,
        up_to_seq: i64,
        config: &AgentConfig,
    ) -> Result<String, Error> {
        let all = store.list_all(session).await?;
        let prefix: Vec<&Message> = all.iter().filter(|m| m.seq <= up_to_seq).collect();
        if prefix.is_empty() {
            return Err(Error::SummarizationFailed(format!(
                "no messages at or before seq {up_to_seq}"
            )));
        }

        let mut transcript = String::new();
        for msg in &prefix {
            transcript.push_str(&format!("{}: {}\n", msg.role.as_str(), msg.content));
        }

        let request = ProviderRequest {
            model: config.model.clone(),
            messages: vec![
                Message::system(session, SUMMARY_INSTRUCTIONS),
                Message::user(session, transcript),
            ],
            temperature: 0.3,
            top_p: 1.0,
            max_tokens: Some(self.max_summary_tokens),
            tools: vec![],
            reasoning_enabled: false,
            max_reasoning_tokens: None,
            stream: false,
        };

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| Error::SummarizationFailed(e.to_string()))?;

        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(Error::SummarizationFailed("model returned an empty summary".into()));
        }

        store.replace_prefix_with_summary(session, up_to_seq, &summary).await?;
        info!(session = %session, up_to_seq, "Summarized conversation prefix");
        Ok(summary)
    }

    /// Seq of the newest message that would be summarized when keeping the
    /// most recent `keep_recent` messages, if there is anything to compact.
    pub fn prefix_cutoff(messages: &[Message], keep_recent: usize) -> Option<i64> {
        if messages.len() <= keep_recent {
            return None;
        }
        messages
            .get(messages.len() - keep_recent - 1)
            .filter(|m| m.role != Role::System)
            .map(|m| m.seq)
    }
}
