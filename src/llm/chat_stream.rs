use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::pin::Pin;
use std::time::Duration;

use crate::config::LlmConfig;

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A chat model that answers with a stream of text deltas.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: SamplingParams,
    ) -> Result<ChatStream>;
}

/// Streams chat completions from Ollama or any OpenAI-compatible endpoint.
pub struct HttpChatModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpChatModel {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn stream_chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: SamplingParams,
    ) -> Result<ChatStream> {
        let wire = Wire::for_provider(&self.config.provider)?;
        let messages = [
            Message {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            },
            Message {
                role: "user".to_string(),
                content: user_prompt.to_string(),
            },
        ];

        let mut request = self
            .client
            .post(wire.endpoint(&self.config.base_url))
            .timeout(Duration::from_secs(300))
            .json(&wire.body(&self.config.chat_model, &messages, params));
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to connect to {} for chat streaming", wire.label()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} chat API returned {status}: {body}", wire.label());
        }

        Ok(Box::pin(deltas_until_end(wire, stream_lines(resp.bytes_stream()))))
    }
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

/// Ollama frame: one JSON object per line.
#[derive(Deserialize)]
struct NdjsonFrame {
    message: Message,
    done: bool,
}

/// OpenAI frame: a `data: {json}` server-sent event.
#[derive(Deserialize)]
struct SseFrame {
    choices: Vec<SseChoice>,
}

#[derive(Deserialize)]
struct SseChoice {
    delta: SseDelta,
}

#[derive(Deserialize)]
struct SseDelta {
    content: Option<String>,
}

/// Request shape and response framing per provider.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Wire {
    Ollama,
    OpenAi,
}

impl Wire {
    fn for_provider(provider: &str) -> Result<Self> {
        match provider {
            "ollama" => Ok(Wire::Ollama),
            "openai" => Ok(Wire::OpenAi),
            other => anyhow::bail!("Unsupported LLM provider for chat: {other}"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Wire::Ollama => "Ollama",
            Wire::OpenAi => "OpenAI-compatible endpoint",
        }
    }

    fn endpoint(self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Wire::Ollama => format!("{base}/api/chat"),
            Wire::OpenAi => format!("{base}/v1/chat/completions"),
        }
    }

    fn body(self, model: &str, messages: &[Message], params: SamplingParams) -> serde_json::Value {
        match self {
            Wire::Ollama => json!({
                "model": model,
                "messages": messages,
                "stream": true,
                "options": {
                    "num_predict": params.max_tokens,
                    "temperature": params.temperature,
                },
            }),
            Wire::OpenAi => json!({
                "model": model,
                "messages": messages,
                "stream": true,
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
            }),
        }
    }

    /// Classify one line of the response body.
    ///
    /// Blank lines, keep-alives and role-only frames are [`Frame::Skip`].
    fn parse_line(self, line: &str) -> Result<Frame> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Frame::Skip);
        }

        let delta = match self {
            Wire::Ollama => {
                let frame: NdjsonFrame = serde_json::from_str(line)
                    .map_err(|e| anyhow::anyhow!("Failed to parse Ollama frame: {e}"))?;
                if frame.done {
                    return Ok(Frame::End);
                }
                Some(frame.message.content)
            }
            Wire::OpenAi => {
                let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
                    return Ok(Frame::Skip);
                };
                if payload == "[DONE]" {
                    return Ok(Frame::End);
                }
                let frame: SseFrame = serde_json::from_str(payload)
                    .map_err(|e| anyhow::anyhow!("Failed to parse SSE frame: {e}"))?;
                frame.choices.into_iter().next().and_then(|c| c.delta.content)
            }
        };

        Ok(match delta {
            Some(text) if !text.is_empty() => Frame::Text(text),
            _ => Frame::Skip,
        })
    }
}

#[derive(Debug, PartialEq)]
enum Frame {
    Text(String),
    /// `done: true` or `data: [DONE]`
    End,
    Skip,
}

/// Text deltas up to the provider's end marker.
///
/// A body that closes before the marker yields a final error, so the
/// reply is treated as cut off rather than complete.
fn deltas_until_end(
    wire: Wire,
    lines: impl Stream<Item = Result<String>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(lines), false),
        move |(mut lines, closed)| async move {
            if closed {
                return None;
            }
            loop {
                match lines.next().await {
                    Some(Ok(line)) => match wire.parse_line(&line) {
                        Ok(Frame::Text(text)) => return Some((Ok(text), (lines, false))),
                        Ok(Frame::Skip) => continue,
                        Ok(Frame::End) => return None,
                        Err(e) => return Some((Err(e), (lines, false))),
                    },
                    Some(Err(e)) => return Some((Err(e), (lines, false))),
                    None => {
                        let err = anyhow::anyhow!(
                            "{} stream closed before its end marker",
                            wire.label()
                        );
                        return Some((Err(err), (lines, true)));
                    }
                }
            }
        },
    )
}

/// Re-split a byte stream into non-blank lines.
///
/// Bytes are buffered until a newline arrives, so a UTF-8 sequence split
/// across two reads is decoded whole.
fn stream_lines(
    bytes: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(bytes), Vec::<u8>::new(), false),
        |(mut source, mut pending, finished)| async move {
            loop {
                if let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = pending.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some((Ok(line), (source, pending, finished)));
                }
                if finished {
                    return None;
                }

                match source.next().await {
                    Some(Ok(chunk)) => pending.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow::anyhow!("Stream read error: {e}")),
                            (source, pending, finished),
                        ))
                    }
                    None => {
                        // Flush an unterminated last line
                        if pending.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let rest = std::mem::take(&mut pending);
                        let line = String::from_utf8_lossy(&rest).trim_end().to_string();
                        return Some((Ok(line), (source, pending, true)));
                    }
                }
            }
        },
    )
}
