use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use super::chat_stream::{ChatModel, SamplingParams};
use crate::error::PipelineError;
use crate::models::{Section, SectionResult};

pub const SYSTEM_PROMPT: &str = "You are an expert technical writer. Your task is to generate a \
specific section of a GitHub README.md file based on the provided context. Be concise, \
professional, and use standard markdown formatting. Only output the markdown for the requested \
section, without any introductory text or conversational filler.";

pub const SAMPLING: SamplingParams = SamplingParams {
    max_tokens: 1024,
    temperature: 0.7,
};

/// Chat-template control tokens that must never reach the model from repository text.
const CONTROL_TOKENS: [&str; 6] = [
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<|begin_of_text|>",
    "<|start_header_id|>",
    "<|end_header_id|>",
];

/// Remove chat-template control tokens from untrusted text.
pub fn sanitize_for_prompt(text: &str) -> String {
    CONTROL_TOKENS
        .iter()
        .fold(text.to_string(), |acc, token| acc.replace(token, ""))
}

pub fn build_user_prompt(section_name: &str, context: &str) -> String {
    format!(
        "Context from the repository:\n{}\n\nBased on this context, please write the \"{}\" section of the README.",
        sanitize_for_prompt(context),
        section_name
    )
}

/// Streams one README section out of a chat model.
#[derive(Clone)]
pub struct SectionComposer {
    model: Arc<dyn ChatModel>,
    /// Longest gap tolerated between deltas; `None` waits forever
    idle_timeout: Option<Duration>,
}

impl SectionComposer {
    pub fn new(model: Arc<dyn ChatModel>, idle_timeout: Option<Duration>) -> Self {
        Self {
            model,
            idle_timeout,
        }
    }

    /// Compose `section` from `context`, concatenating deltas in arrival order.
    ///
    /// A stream that breaks after producing text returns what arrived with
    /// `truncated` set. A stream that breaks before any text is an error.
    pub async fn compose(
        &self,
        section: Section,
        context: &str,
    ) -> Result<SectionResult, PipelineError> {
        let name = section.name();
        let composition_err = |source: anyhow::Error| PipelineError::Composition {
            section: name.to_string(),
            source,
        };

        let user_prompt = build_user_prompt(name, context);
        let mut stream = self
            .model
            .stream_chat(SYSTEM_PROMPT, &user_prompt, SAMPLING)
            .await
            .map_err(composition_err)?;

        let mut markdown = String::new();
        let interruption = loop {
            let next = match self.idle_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, stream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        break Some(anyhow::anyhow!(
                            "No output from the model for {}s",
                            timeout.as_secs()
                        ))
                    }
                },
                None => stream.next().await,
            };

            match next {
                Some(Ok(delta)) => markdown.push_str(&delta),
                Some(Err(e)) => break Some(e),
                None => break None,
            }
        };

        let truncated = match interruption {
            None => false,
            Some(e) if markdown.is_empty() => return Err(composition_err(e)),
            Some(e) => {
                tracing::warn!(
                    "Stream for section '{name}' ended early after {} chars: {e:#}",
                    markdown.len()
                );
                true
            }
        };

        tracing::info!("Finished generating section: '{name}'");
        Ok(SectionResult {
            section,
            markdown,
            truncated,
        })
    }
}
