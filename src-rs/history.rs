use crate::ax::{Point, ScreenRegion, UiTree};
use crate::desktop::Desktop;
use crate::error::{AutomationError, AutomationResult};
use crate::locate::find_message_list;
use crate::sender::{classify_sender, SenderLabel};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: SenderLabel,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// How many of the newest messages to return.
    pub last_n: usize,
    /// Upper bound on reveal-loop iterations.
    pub max_scrolls: u32,
    /// Consecutive captures without older content before giving up.
    pub stall_limit: u32,
    pub bottom_attempts: u32,
    pub bottom_stable_samples: u32,
    pub bottom_scroll_lines: i32,
    pub bottom_poll: Duration,
    pub bottom_settle: Duration,
    /// Lines scrolled towards older content between captures.
    pub step_lines: i32,
    pub step_settle: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            last_n: 100,
            max_scrolls: 80,
            stall_limit: 5,
            bottom_attempts: 40,
            bottom_stable_samples: 3,
            bottom_scroll_lines: 1000,
            bottom_poll: Duration::from_millis(50),
            bottom_settle: Duration::from_millis(200),
            step_lines: 50,
            step_settle: Duration::from_millis(100),
        }
    }
}

impl FetchOptions {
    pub fn with_last_n(last_n: usize) -> Self {
        Self {
            last_n,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Seeded(usize),
    Prepended(usize),
    Stalled(u32),
}

/// Oldest-first messages gathered across captures, joined on message text.
#[derive(Debug, Default)]
pub struct HistoryAccumulator {
    messages: Vec<ChatMessage>,
    stalls: u32,
}

impl HistoryAccumulator {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Merges one on-screen batch (top to bottom). Everything above the first
    /// row whose text equals the oldest known message is new, older content;
    /// a batch without that row is taken whole.
    pub fn absorb(&mut self, visible: Vec<ChatMessage>) -> MergeOutcome {
        if self.messages.is_empty() {
            let count = visible.len();
            self.messages = visible;
            self.stalls = 0;
            return MergeOutcome::Seeded(count);
        }

        let anchor = &self.messages[0].text;
        let split = visible
            .iter()
            .position(|message| &message.text == anchor)
            .unwrap_or(visible.len());
        if split == 0 {
            self.stalls += 1;
            return MergeOutcome::Stalled(self.stalls);
        }

        let mut merged = visible;
        merged.truncate(split);
        merged.append(&mut self.messages);
        self.messages = merged;
        self.stalls = 0;
        MergeOutcome::Prepended(split)
    }

    /// The newest `last_n` messages, oldest first.
    pub fn into_recent(mut self, last_n: usize) -> Vec<ChatMessage> {
        let excess = self.messages.len().saturating_sub(last_n);
        self.messages.drain(..excess);
        self.messages
    }
}

/// Returns the newest `options.last_n` messages of the open chat, scrolling
/// upwards through history as far as needed.
pub fn fetch_recent_messages<D>(desktop: &D, options: &FetchOptions) -> AutomationResult<Vec<ChatMessage>>
where
    D: Desktop + ?Sized,
{
    if options.last_n == 0 {
        return Err(AutomationError::InvalidArgument(
            "last_n must be at least 1".to_string(),
        ));
    }

    let root = desktop.app_root()?;
    let list = find_message_list(desktop, &root)?;
    let center = list_region(desktop, &list)?.center();
    scroll_to_bottom(desktop, &list, center, options)?;

    let mut history = HistoryAccumulator::default();
    for step in 0..options.max_scrolls {
        let region = list_region(desktop, &list)?;
        let image = desktop.capture(region)?;
        let visible = read_visible_messages(desktop, &list, region, &image)?;
        if visible.is_empty() {
            warn!(step, "message list exposed no readable rows, stopping");
            break;
        }

        match history.absorb(visible) {
            MergeOutcome::Seeded(count) => debug!(step, count, "seeded history from bottom"),
            MergeOutcome::Prepended(count) => {
                debug!(step, count, total = history.len(), "revealed older messages")
            }
            MergeOutcome::Stalled(stalls) => {
                debug!(step, stalls, "no older messages revealed");
                if stalls >= options.stall_limit {
                    info!(stalls, total = history.len(), "history exhausted or unreadable");
                    break;
                }
            }
        }

        if history.len() >= options.last_n {
            break;
        }

        desktop.scroll(center, -options.step_lines)?;
        desktop.sleep(options.step_settle);
    }

    let messages = history.into_recent(options.last_n);
    info!(
        count = messages.len(),
        last_n = options.last_n,
        "fetched messages from current chat"
    );
    Ok(messages)
}

fn list_region<D: Desktop + ?Sized>(desktop: &D, list: &D::Node) -> AutomationResult<ScreenRegion> {
    desktop
        .bounds(list)?
        .filter(|region| !region.is_empty())
        .ok_or(AutomationError::MissingBounds {
            element: "message list",
        })
}

// Large downward scrolls until the last visible text stops changing.
fn scroll_to_bottom<D: Desktop + ?Sized>(
    desktop: &D,
    list: &D::Node,
    center: Point,
    options: &FetchOptions,
) -> AutomationResult<()> {
    let mut last_text: Option<String> = None;
    let mut stable = 0u32;
    let mut settled = false;

    for attempt in 1..=options.bottom_attempts {
        desktop.scroll(center, options.bottom_scroll_lines)?;
        desktop.sleep(options.bottom_poll);

        let Some(trailing) = trailing_text(desktop, list)? else {
            continue;
        };
        if last_text.as_deref() == Some(trailing.as_str()) {
            stable += 1;
            if stable >= options.bottom_stable_samples {
                debug!(attempt, "message list settled at the bottom");
                settled = true;
                break;
            }
        } else {
            last_text = Some(trailing);
            stable = 0;
        }
    }

    if !settled {
        warn!(
            attempts = options.bottom_attempts,
            "message list did not settle at the bottom, continuing from current position"
        );
    }
    desktop.sleep(options.bottom_settle);
    Ok(())
}

fn trailing_text<D: Desktop + ?Sized>(desktop: &D, list: &D::Node) -> AutomationResult<Option<String>> {
    let mut last = None;
    for row in desktop.children(list)? {
        match desktop.label(&row) {
            Ok(Some(text)) => last = Some(text),
            Ok(None) => {}
            Err(AutomationError::InvalidElement) => {
                debug!("row recycled while sampling trailing text");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(last)
}

fn read_visible_messages<D: Desktop + ?Sized>(
    desktop: &D,
    list: &D::Node,
    region: ScreenRegion,
    image: &RgbImage,
) -> AutomationResult<Vec<ChatMessage>> {
    let mut visible = Vec::new();
    for row in desktop.children(list)? {
        let text = match desktop.label(&row) {
            Ok(Some(text)) => text,
            Ok(None) => continue,
            Err(AutomationError::InvalidElement) => {
                warn!("row recycled while reading visible messages, skipping it");
                continue;
            }
            Err(err) => return Err(err),
        };
        let sender = match desktop.bounds(&row) {
            Ok(Some(bounds)) => classify_sender(image, region, bounds),
            Ok(None) | Err(AutomationError::InvalidElement) => SenderLabel::Unknown,
            Err(err) => return Err(err),
        };
        visible.push(ChatMessage { sender, text });
    }
    Ok(visible)
}
