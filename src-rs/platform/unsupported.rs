use crate::ax::{AttrKey, AttrValue, Point, ScreenRegion, UiAction, UiTree};
use crate::desktop::{
    Clipboard, ClipboardContents, Clock, Desktop, InputDevice, KeyStroke, ScreenCapture, SystemClock,
};
use crate::error::{AutomationError, AutomationResult};
use image::RgbImage;
use std::env;
use std::time::Duration;

/// Stand-in for hosts without an accessibility backend. Every desktop call
/// fails with `Unsupported`, so tools still answer with a structured error.
pub struct UnsupportedDesktop {
    bundle_id: String,
    clock: SystemClock,
}

impl UnsupportedDesktop {
    pub fn connect(bundle_id: &str) -> AutomationResult<Self> {
        Ok(Self {
            bundle_id: bundle_id.to_string(),
            clock: SystemClock::new(),
        })
    }
}

fn unsupported<T>() -> AutomationResult<T> {
    Err(AutomationError::Unsupported(format!(
        "WeChat automation needs the macOS accessibility API (this host is {})",
        env::consts::OS
    )))
}

impl UiTree for UnsupportedDesktop {
    type Node = ();

    fn attribute(&self, _node: &(), _key: AttrKey) -> AutomationResult<AttrValue<()>> {
        unsupported()
    }

    fn perform(&self, _node: &(), _action: UiAction) -> AutomationResult<()> {
        unsupported()
    }

    fn set_value(&self, _node: &(), _text: &str) -> AutomationResult<()> {
        unsupported()
    }
}

impl InputDevice for UnsupportedDesktop {
    fn key(&self, _stroke: KeyStroke) -> AutomationResult<()> {
        unsupported()
    }

    fn scroll(&self, _at: Point, _lines: i32) -> AutomationResult<()> {
        unsupported()
    }
}

impl ScreenCapture for UnsupportedDesktop {
    fn capture(&self, _region: ScreenRegion) -> AutomationResult<RgbImage> {
        unsupported()
    }
}

impl Clipboard for UnsupportedDesktop {
    fn read(&self) -> AutomationResult<ClipboardContents> {
        unsupported()
    }

    fn write(&self, _contents: &ClipboardContents) -> AutomationResult<()> {
        unsupported()
    }
}

impl Clock for UnsupportedDesktop {
    fn now(&self) -> Duration {
        self.clock.now()
    }

    fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration);
    }
}

impl Desktop for UnsupportedDesktop {
    fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    fn app_root(&self) -> AutomationResult<()> {
        unsupported()
    }
}
