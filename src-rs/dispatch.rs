use crate::ax::{AttrKey, UiAction, UiTree};
use crate::desktop::{ClipboardGuard, Desktop, KeyStroke, PollPolicy};
use crate::error::{AutomationError, AutomationResult};
use crate::locate::find_input_field;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    Direct,
    Paste,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub strategy: WriteStrategy,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct SendOptions {
    pub focus_settle: Duration,
    pub verify_settle: Duration,
    pub paste_settle: Duration,
    pub submit: PollPolicy,
    pub refocus_settle: Duration,
    pub retry_backoff: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            focus_settle: Duration::from_millis(100),
            verify_settle: Duration::from_millis(50),
            paste_settle: Duration::from_millis(100),
            submit: PollPolicy {
                max_attempts: 5,
                poll_interval: Duration::from_millis(100),
                attempt_timeout: Duration::from_secs(1),
            },
            refocus_settle: Duration::from_millis(150),
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Types `text` into the open chat's input and presses Return until the
/// field clears.
pub fn send_message<D>(desktop: &D, text: &str, options: &SendOptions) -> AutomationResult<SendReport>
where
    D: Desktop + ?Sized,
{
    info!(chars = text.chars().count(), "sending message");
    let root = desktop.app_root()?;
    let input = find_input_field(desktop, &root)?;

    desktop.perform(&input, UiAction::Raise)?;
    desktop.sleep(options.focus_settle);

    let strategy = write_input(desktop, &input, text, options)?;
    let attempts = submit(desktop, &input, options)?;
    info!(?strategy, attempts, "message sent");
    Ok(SendReport { strategy, attempts })
}

fn write_input<D: Desktop + ?Sized>(
    desktop: &D,
    input: &D::Node,
    text: &str,
    options: &SendOptions,
) -> AutomationResult<WriteStrategy> {
    let direct = desktop.set_value(input, text);
    desktop.sleep(options.verify_settle);
    let actual = desktop.text(input, AttrKey::Value)?;

    if direct.is_ok() && actual.as_deref() == Some(text) {
        debug!("set message text via Accessibility API");
        return Ok(WriteStrategy::Direct);
    }
    warn!(
        write_error = ?direct.err(),
        actual = ?actual,
        "Accessibility API did not take the text, falling back to clipboard paste"
    );

    desktop.key(KeyStroke::SELECT_ALL)?;
    desktop.sleep(options.verify_settle);

    let _restore = ClipboardGuard::stash(desktop)?;
    desktop.write_text(text)?;
    desktop.sleep(options.verify_settle);
    desktop.key(KeyStroke::PASTE)?;
    desktop.sleep(options.paste_settle);

    let actual = desktop.text(input, AttrKey::Value)?;
    if actual.as_deref() != Some(text) {
        error!(actual = ?actual, "clipboard paste did not set the message text either");
        return Err(AutomationError::InputWriteFailure {
            expected: text.to_string(),
            actual,
        });
    }
    info!("set message text via clipboard paste");
    Ok(WriteStrategy::Paste)
}

// Return is sometimes swallowed while the user is interacting with the app,
// so the press is repeated until the input clears.
fn submit<D: Desktop + ?Sized>(desktop: &D, input: &D::Node, options: &SendOptions) -> AutomationResult<u32> {
    let policy = options.submit;
    let mut last_value: Option<String> = None;

    for attempt in 1..=policy.max_attempts {
        desktop.perform(input, UiAction::Raise)?;
        desktop.sleep(options.refocus_settle);
        desktop.key(KeyStroke::RETURN)?;

        let cleared = policy.wait_until(desktop, || {
            let value = desktop.text(input, AttrKey::Value)?;
            let empty = value.as_deref().map_or(true, |v| v.trim().is_empty());
            last_value = value;
            Ok(empty)
        })?;
        if cleared {
            return Ok(attempt);
        }

        warn!(
            attempt,
            max_attempts = policy.max_attempts,
            remaining = ?last_value,
            "input still holds text after Return, retrying"
        );
        if attempt < policy.max_attempts {
            desktop.sleep(options.retry_backoff);
        }
    }

    error!(attempts = policy.max_attempts, remaining = ?last_value, "message send unconfirmed");
    Err(AutomationError::SendUnconfirmed {
        attempts: policy.max_attempts,
        last_value,
    })
}
