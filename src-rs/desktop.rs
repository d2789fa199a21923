use crate::ax::{Point, ScreenRegion, UiTree};
use crate::error::AutomationResult;
use image::RgbImage;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Return,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub key: Key,
    pub command: bool,
}

impl KeyStroke {
    pub const RETURN: KeyStroke = KeyStroke {
        key: Key::Return,
        command: false,
    };
    pub const SELECT_ALL: KeyStroke = KeyStroke {
        key: Key::Char('a'),
        command: true,
    };
    pub const PASTE: KeyStroke = KeyStroke {
        key: Key::Char('v'),
        command: true,
    };
}

pub trait InputDevice {
    fn key(&self, stroke: KeyStroke) -> AutomationResult<()>;

    /// Posts a scroll-wheel event at `at`. Positive `lines` move towards the
    /// newest content (bottom of a chat), negative towards older content. The
    /// macOS backend posts `lines` as the raw line delta, sign unchanged.
    fn scroll(&self, at: Point, lines: i32) -> AutomationResult<()>;
}

pub trait ScreenCapture {
    fn capture(&self, region: ScreenRegion) -> AutomationResult<RgbImage>;
}

/// A clipboard payload that can be read and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardContents {
    Empty,
    Text(String),
    /// RGBA8 pixels, row-major.
    Image {
        width: usize,
        height: usize,
        rgba: Vec<u8>,
    },
}

impl ClipboardContents {
    fn kind(&self) -> &'static str {
        match self {
            ClipboardContents::Empty => "empty",
            ClipboardContents::Text(_) => "text",
            ClipboardContents::Image { .. } => "image",
        }
    }
}

pub trait Clipboard {
    fn read(&self) -> AutomationResult<ClipboardContents>;

    /// `ClipboardContents::Empty` clears the clipboard.
    fn write(&self, contents: &ClipboardContents) -> AutomationResult<()>;

    fn write_text(&self, text: &str) -> AutomationResult<()> {
        self.write(&ClipboardContents::Text(text.to_string()))
    }
}

pub trait Clock {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

/// Everything the chat automation needs from the host.
pub trait Desktop: UiTree + InputDevice + ScreenCapture + Clipboard + Clock {
    fn bundle_id(&self) -> &str;

    /// Brings the target application to the foreground and returns a fresh
    /// root node. Called at the start of every public operation.
    fn app_root(&self) -> AutomationResult<Self::Node>;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Bounded wait-for-condition loop: `max_attempts` outer tries, each polling
/// every `poll_interval` for at most `attempt_timeout`.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub attempt_timeout: Duration,
}

impl PollPolicy {
    /// Runs one attempt: calls `done` until it returns true or the attempt
    /// times out. Always probes at least once.
    pub fn wait_until<C, F>(&self, clock: &C, mut done: F) -> AutomationResult<bool>
    where
        C: Clock + ?Sized,
        F: FnMut() -> AutomationResult<bool>,
    {
        let deadline = clock.now() + self.attempt_timeout;
        loop {
            if done()? {
                return Ok(true);
            }
            if clock.now() >= deadline {
                return Ok(false);
            }
            clock.sleep(self.poll_interval);
        }
    }
}

/// Saves the clipboard on creation and writes it back when dropped,
/// whichever way the enclosing scope exits.
pub struct ClipboardGuard<'a, C: Clipboard + ?Sized> {
    clipboard: &'a C,
    saved: ClipboardContents,
}

impl<'a, C: Clipboard + ?Sized> ClipboardGuard<'a, C> {
    pub fn stash(clipboard: &'a C) -> AutomationResult<Self> {
        let saved = clipboard.read()?;
        debug!(kind = saved.kind(), "saved clipboard contents");
        Ok(Self { clipboard, saved })
    }
}

impl<C: Clipboard + ?Sized> Drop for ClipboardGuard<'_, C> {
    fn drop(&mut self) {
        match self.clipboard.write(&self.saved) {
            Ok(()) => debug!("restored clipboard contents"),
            Err(err) => warn!(error = %err, "failed to restore clipboard contents"),
        }
    }
}
