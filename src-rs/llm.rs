use crate::config::AiConfig;
use crate::history::ChatMessage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const SYSTEM_PROMPT: &str =
    "You are a careful assistant that writes natural, concise WeChat messages following the user's style.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat completion request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("chat completion response had no choices")]
    NoChoices,

    #[error("model returned an empty reply")]
    EmptyReply,
}

/// Produces the text to send back in a conversation.
pub trait ReplyGenerator {
    fn generate(&self, contact: &str, history: &[ChatMessage], instructions: Option<&str>)
        -> Result<String>;
}

impl<G: ReplyGenerator + ?Sized> ReplyGenerator for &G {
    fn generate(
        &self,
        contact: &str,
        history: &[ChatMessage],
        instructions: Option<&str>,
    ) -> Result<String> {
        (**self).generate(contact, history, instructions)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<PromptMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct PromptMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionClient {
    http: reqwest::blocking::Client,
    config: AiConfig,
}

impl ChatCompletionClient {
    pub fn new(config: AiConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages: vec![
                PromptMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                PromptMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let endpoint = self.endpoint();
        debug!(%endpoint, model = %self.config.model, "requesting chat completion");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .with_context(|| format!("failed to reach {endpoint}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let payload: CompletionResponse = response
            .json()
            .context("invalid chat completion response body")?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::NoChoices)?
            .message
            .content
            .unwrap_or_default();
        Ok(content)
    }
}

impl ReplyGenerator for ChatCompletionClient {
    fn generate(
        &self,
        contact: &str,
        history: &[ChatMessage],
        instructions: Option<&str>,
    ) -> Result<String> {
        let prompt = build_conversation_prompt(contact, history, instructions);
        let raw = self.complete(&prompt)?;
        let reply = clean_reply(&raw).ok_or(LlmError::EmptyReply)?;
        info!(
            contact,
            provider = %self.config.provider,
            chars = reply.chars().count(),
            "generated reply"
        );
        Ok(reply)
    }
}

pub fn build_conversation_prompt(
    contact: &str,
    history: &[ChatMessage],
    instructions: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are helping compose a reply in an instant messaging app conversation.\n\
         The contact's display name is: {contact:?}.\n\
         Conversation history (from oldest to newest) is below.\n\
         Each line starts with 'ME', 'OTHER', or 'UNKNOWN'.\n\
         Reply as ME to the most recent message from OTHER.\n\
         Return only the message content to send, without quotes or prefixes."
    );

    if let Some(extra) = instructions.map(str::trim).filter(|v| !v.is_empty()) {
        prompt.push_str("\n\nAdditional instructions:\n");
        prompt.push_str(extra);
    }

    prompt.push_str("\n\nConversation:\n");
    let transcript: Vec<String> = history
        .iter()
        .map(|message| format!("{}: {}", message.sender, message.text))
        .collect();
    prompt.push_str(&transcript.join("\n"));
    prompt
}

/// Strips what models tend to wrap a reply in. `None` when nothing is left.
pub fn clean_reply(raw: &str) -> Option<String> {
    let mut reply = raw.trim();
    for prefix in ["ME:", "Me:", "me:"] {
        if let Some(rest) = reply.strip_prefix(prefix) {
            reply = rest.trim_start();
            break;
        }
    }
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”'), ('「', '」')] {
        if reply.chars().count() >= 2 && reply.starts_with(open) && reply.ends_with(close) {
            reply = reply[open.len_utf8()..reply.len() - close.len_utf8()].trim();
            break;
        }
    }
    (!reply.is_empty()).then(|| reply.to_string())
}
