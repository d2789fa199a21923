//! Tool entry points. Each one opens the requested chat first and reports
//! failure as a structured object instead of an error.

use crate::desktop::Desktop;
use crate::dispatch::{send_message, SendOptions, WriteStrategy};
use crate::error::AutomationError;
use crate::history::{fetch_recent_messages, ChatMessage, FetchOptions};
use crate::llm::ReplyGenerator;
use crate::opener::{open_conversation, OpenOptions, OpenPath};
use anyhow::Result;
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    pub open: OpenOptions,
    pub fetch: FetchOptions,
    pub send: SendOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolError {
    pub error: String,
    pub contact_name: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ToolResponse<T> {
    Success(T),
    Failure(ToolError),
}

impl<T> ToolResponse<T> {
    fn from_result(tool: &str, contact: &str, result: Result<T>) -> Self {
        match result {
            Ok(value) => ToolResponse::Success(value),
            Err(err) => Self::failed(tool, contact, err),
        }
    }

    pub fn failed(tool: &str, contact: &str, err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        error!(tool, contact, error = %message, "tool call failed");
        ToolResponse::Failure(ToolError {
            error: message,
            contact_name: contact.to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResponse::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenedChat {
    pub contact_name: String,
    pub opened_via: OpenPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub contact_name: String,
    pub strategy: WriteStrategy,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyOutcome {
    pub contact_name: String,
    pub generated_reply: String,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplyRequest {
    pub instructions: Option<String>,
    /// Draft the reply without typing it into the chat.
    pub dry_run: bool,
}

pub fn open_chat<D>(desktop: &D, contact: &str, options: &ToolOptions) -> ToolResponse<OpenedChat>
where
    D: Desktop + ?Sized,
{
    let result = open_conversation(desktop, contact, &options.open)
        .map(|opened_via| OpenedChat {
            contact_name: contact.to_string(),
            opened_via,
        })
        .map_err(Into::into);
    ToolResponse::from_result("open_chat", contact, result)
}

/// Opens the chat with `contact` and returns its newest messages, oldest first.
pub fn fetch_messages<D>(
    desktop: &D,
    contact: &str,
    options: &ToolOptions,
) -> ToolResponse<Vec<ChatMessage>>
where
    D: Desktop + ?Sized,
{
    let result = (|| -> Result<Vec<ChatMessage>> {
        open_conversation(desktop, contact, &options.open)?;
        let messages = fetch_recent_messages(desktop, &options.fetch)?;
        info!(contact, count = messages.len(), "fetched messages");
        Ok(messages)
    })();
    ToolResponse::from_result("fetch_messages", contact, result)
}

pub fn send_to_contact<D>(
    desktop: &D,
    contact: &str,
    text: &str,
    options: &ToolOptions,
) -> ToolResponse<SentMessage>
where
    D: Desktop + ?Sized,
{
    let result = (|| -> Result<SentMessage> {
        if text.trim().is_empty() {
            return Err(AutomationError::InvalidArgument("message text is empty".to_string()).into());
        }
        open_conversation(desktop, contact, &options.open)?;
        let report = send_message(desktop, text, &options.send)?;
        Ok(SentMessage {
            contact_name: contact.to_string(),
            strategy: report.strategy,
            attempts: report.attempts,
        })
    })();
    ToolResponse::from_result("send_message", contact, result)
}

/// Reads the chat, asks the model for a reply and sends it.
///
/// `make_generator` runs only once there is history to reply to, so a missing
/// model configuration does not block reading the chat.
pub fn reply_to_contact<D, G, F>(
    desktop: &D,
    contact: &str,
    request: &ReplyRequest,
    options: &ToolOptions,
    make_generator: F,
) -> ToolResponse<ReplyOutcome>
where
    D: Desktop + ?Sized,
    G: ReplyGenerator,
    F: FnOnce() -> Result<G>,
{
    let result = (|| -> Result<ReplyOutcome> {
        open_conversation(desktop, contact, &options.open)?;
        let history = fetch_recent_messages(desktop, &options.fetch)?;
        if history.is_empty() {
            return Err(AutomationError::EmptyHistory {
                contact: contact.to_string(),
            }
            .into());
        }

        let generator = make_generator()?;
        let reply = generator.generate(contact, &history, request.instructions.as_deref())?;

        let sent = if request.dry_run {
            info!(contact, "dry run, reply not sent");
            Some(false)
        } else {
            send_message(desktop, &reply, &options.send)?;
            None
        };
        Ok(ReplyOutcome {
            contact_name: contact.to_string(),
            generated_reply: reply,
            message_count: history.len(),
            sent,
        })
    })();
    ToolResponse::from_result("reply_to_contact", contact, result)
}
