use super::process::{capture_path, command_exists, parse_pid, run_osascript, take_capture};
use crate::ax::{AttrKey, AttrValue, Point, ScreenRegion, Size, UiAction, UiTree};
use crate::desktop::{
    Clipboard, ClipboardContents, Clock, Desktop, InputDevice, Key, KeyStroke, ScreenCapture, SystemClock,
};
use crate::error::{AutomationError, AutomationResult};
use accessibility::AXUIElement;
use accessibility_sys::{
    kAXErrorAttributeUnsupported, kAXErrorInvalidUIElement, kAXErrorNoValue, kAXErrorSuccess,
    kAXValueTypeCGPoint, kAXValueTypeCGSize, AXIsProcessTrusted, AXUIElementCopyAttributeValue,
    AXUIElementPerformAction, AXUIElementRef, AXUIElementSetAttributeValue, AXValueGetTypeID,
    AXValueGetValue, AXValueRef,
};
use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFType, CFTypeRef, TCFType};
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::event::{CGEvent, CGEventTapLocation, ScrollEventUnit};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;
use enigo::{Direction, Enigo, Keyboard, Settings};
use image::RgbImage;
use std::borrow::Cow;
use std::cell::RefCell;
use std::env;
use std::ffi::c_void;
use std::process::Command;
use std::ptr;
use std::time::Duration;
use tracing::{debug, info};

const ACTIVATE_SETTLE: Duration = Duration::from_millis(200);

const PID_SCRIPT: &str = r#"
on run argv
  set bundleId to item 1 of argv
  tell application "System Events"
    set pids to unix id of every process whose bundle identifier is bundleId
  end tell
  if (count of pids) is 0 then
    return "none"
  end if
  return (item 1 of pids) as text
end run
"#;

const ACTIVATE_SCRIPT: &str = r#"
on run argv
  tell application id (item 1 of argv) to activate
  return "ok"
end run
"#;

#[repr(C)]
#[derive(Default)]
struct RawPoint {
    x: f64,
    y: f64,
}

#[repr(C)]
#[derive(Default)]
struct RawSize {
    width: f64,
    height: f64,
}

/// Live desktop: AX tree of the target app, synthetic input, system clipboard
/// and `screencapture`.
pub struct MacDesktop {
    bundle_id: String,
    clock: SystemClock,
    input: RefCell<Enigo>,
}

impl MacDesktop {
    pub fn connect(bundle_id: &str) -> AutomationResult<Self> {
        if !unsafe { AXIsProcessTrusted() } {
            return Err(AutomationError::Platform(
                "accessibility access is not granted to this process (System Settings > Privacy & Security > Accessibility)"
                    .to_string(),
            ));
        }
        if !command_exists("screencapture") {
            return Err(AutomationError::Platform("screencapture is not available".to_string()));
        }
        let input = Enigo::new(&Settings::default()).map_err(|err| {
            AutomationError::Platform(format!("failed to initialize input backend: {err}"))
        })?;
        Ok(Self {
            bundle_id: bundle_id.to_string(),
            clock: SystemClock::new(),
            input: RefCell::new(input),
        })
    }

    fn pid(&self) -> AutomationResult<Option<i32>> {
        parse_pid(&run_osascript(PID_SCRIPT, &[self.bundle_id.as_str()])?)
    }
}

fn ax_error(code: i32, doing: &str) -> AutomationError {
    if code == kAXErrorInvalidUIElement {
        return AutomationError::InvalidElement;
    }
    AutomationError::Platform(format!("{doing} failed with AXError {code}"))
}

fn copy_attribute(element: &AXUIElement, name: &str) -> AutomationResult<Option<CFType>> {
    let attribute = CFString::new(name);
    let mut value: CFTypeRef = ptr::null();
    let code = unsafe {
        AXUIElementCopyAttributeValue(
            element.as_concrete_TypeRef(),
            attribute.as_concrete_TypeRef(),
            &mut value,
        )
    };
    match code {
        kAXErrorSuccess if !value.is_null() => Ok(Some(unsafe { CFType::wrap_under_create_rule(value) })),
        kAXErrorSuccess | kAXErrorNoValue | kAXErrorAttributeUnsupported => Ok(None),
        other => Err(ax_error(other, &format!("reading {name}"))),
    }
}

fn convert(value: CFType) -> AttrValue<AXUIElement> {
    let type_id = value.type_of();
    if type_id == CFString::type_id() {
        let text = unsafe { CFString::wrap_under_get_rule(value.as_CFTypeRef() as CFStringRef) };
        return AttrValue::Text(text.to_string());
    }
    if type_id == CFArray::<CFType>::type_id() {
        let items = unsafe { CFArray::<CFType>::wrap_under_get_rule(value.as_CFTypeRef() as CFArrayRef) };
        let children = items
            .iter()
            .filter(|item| item.type_of() == AXUIElement::type_id())
            .map(|item| unsafe { AXUIElement::wrap_under_get_rule(item.as_CFTypeRef() as AXUIElementRef) })
            .collect();
        return AttrValue::Children(children);
    }
    if type_id == unsafe { AXValueGetTypeID() } {
        let raw = value.as_CFTypeRef() as AXValueRef;
        let mut point = RawPoint::default();
        if unsafe { AXValueGetValue(raw, kAXValueTypeCGPoint, &mut point as *mut RawPoint as *mut c_void) } {
            return AttrValue::Point(Point {
                x: point.x,
                y: point.y,
            });
        }
        let mut size = RawSize::default();
        if unsafe { AXValueGetValue(raw, kAXValueTypeCGSize, &mut size as *mut RawSize as *mut c_void) } {
            return AttrValue::Size(Size {
                width: size.width,
                height: size.height,
            });
        }
    }
    AttrValue::Absent
}

impl UiTree for MacDesktop {
    type Node = AXUIElement;

    fn attribute(&self, node: &AXUIElement, key: AttrKey) -> AutomationResult<AttrValue<AXUIElement>> {
        Ok(copy_attribute(node, key.ax_name())?.map_or(AttrValue::Absent, convert))
    }

    fn perform(&self, node: &AXUIElement, action: UiAction) -> AutomationResult<()> {
        let name = CFString::new(action.ax_name());
        let code = unsafe { AXUIElementPerformAction(node.as_concrete_TypeRef(), name.as_concrete_TypeRef()) };
        if code != kAXErrorSuccess {
            return Err(ax_error(code, action.ax_name()));
        }
        Ok(())
    }

    fn set_value(&self, node: &AXUIElement, text: &str) -> AutomationResult<()> {
        let attribute = CFString::new(AttrKey::Value.ax_name());
        let value = CFString::new(text);
        let code = unsafe {
            AXUIElementSetAttributeValue(
                node.as_concrete_TypeRef(),
                attribute.as_concrete_TypeRef(),
                value.as_CFTypeRef(),
            )
        };
        if code != kAXErrorSuccess {
            return Err(ax_error(code, "writing AXValue"));
        }
        Ok(())
    }
}

/// CoreGraphics line delta for a scroll of `lines`. WeChat's message list
/// moves towards newer messages on a positive delta, so the sign is kept.
fn wheel_delta(lines: i32) -> i32 {
    lines
}

impl InputDevice for MacDesktop {
    fn key(&self, stroke: KeyStroke) -> AutomationResult<()> {
        let mut input = self.input.borrow_mut();
        let key = match stroke.key {
            Key::Return => enigo::Key::Return,
            Key::Char(c) => enigo::Key::Unicode(c),
        };
        let failed = |err: enigo::InputError| AutomationError::Platform(format!("key event failed: {err}"));

        if stroke.command {
            input.key(enigo::Key::Meta, Direction::Press).map_err(failed)?;
        }
        let pressed = input.key(key, Direction::Click).map_err(failed);
        if stroke.command {
            input.key(enigo::Key::Meta, Direction::Release).map_err(failed)?;
        }
        pressed
    }

    // Posted at `at` without moving the pointer.
    fn scroll(&self, at: Point, lines: i32) -> AutomationResult<()> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|()| AutomationError::Platform("failed to create event source".to_string()))?;
        let event = CGEvent::new_scroll_event(source, ScrollEventUnit::LINE, 1, wheel_delta(lines), 0, 0)
            .map_err(|()| AutomationError::Platform("failed to create scroll event".to_string()))?;
        event.set_location(CGPoint::new(at.x, at.y));
        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

impl ScreenCapture for MacDesktop {
    fn capture(&self, region: ScreenRegion) -> AutomationResult<RgbImage> {
        let path = capture_path(&env::temp_dir());
        let rect = format!(
            "{},{},{},{}",
            region.x.round(),
            region.y.round(),
            region.width.round(),
            region.height.round()
        );
        let status = Command::new("screencapture")
            .arg("-x")
            .arg("-R")
            .arg(&rect)
            .arg(&path)
            .status()
            .map_err(|err| AutomationError::Platform(format!("failed to run screencapture: {err}")))?;
        if !status.success() {
            return Err(AutomationError::Platform(format!(
                "screencapture -R {rect} exited with {status}"
            )));
        }
        let image = take_capture(&path)?;
        debug!(rect = %rect, width = image.width(), height = image.height(), "captured region");
        Ok(image)
    }
}

impl Clipboard for MacDesktop {
    fn read(&self) -> AutomationResult<ClipboardContents> {
        let mut clipboard = system_clipboard()?;
        match clipboard.get_text() {
            Ok(text) => return Ok(ClipboardContents::Text(text)),
            Err(arboard::Error::ContentNotAvailable) => {}
            Err(err) => return Err(AutomationError::Platform(format!("clipboard read failed: {err}"))),
        }
        match clipboard.get_image() {
            Ok(image) => Ok(ClipboardContents::Image {
                width: image.width,
                height: image.height,
                rgba: image.bytes.into_owned(),
            }),
            Err(arboard::Error::ContentNotAvailable) => Ok(ClipboardContents::Empty),
            Err(err) => Err(AutomationError::Platform(format!("clipboard image read failed: {err}"))),
        }
    }

    fn write(&self, contents: &ClipboardContents) -> AutomationResult<()> {
        let mut clipboard = system_clipboard()?;
        let written = match contents {
            ClipboardContents::Empty => clipboard.clear(),
            ClipboardContents::Text(text) => clipboard.set_text(text.as_str()),
            ClipboardContents::Image { width, height, rgba } => clipboard.set_image(arboard::ImageData {
                width: *width,
                height: *height,
                bytes: Cow::Borrowed(rgba.as_slice()),
            }),
        };
        written.map_err(|err| AutomationError::Platform(format!("clipboard write failed: {err}")))
    }
}

fn system_clipboard() -> AutomationResult<arboard::Clipboard> {
    arboard::Clipboard::new()
        .map_err(|err| AutomationError::Platform(format!("clipboard unavailable: {err}")))
}

impl Clock for MacDesktop {
    fn now(&self) -> Duration {
        self.clock.now()
    }

    fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration);
    }
}

impl Desktop for MacDesktop {
    fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    fn app_root(&self) -> AutomationResult<AXUIElement> {
        let Some(pid) = self.pid()? else {
            return Err(AutomationError::NotRunning {
                bundle_id: self.bundle_id.clone(),
            });
        };
        run_osascript(ACTIVATE_SCRIPT, &[self.bundle_id.as_str()])?;
        self.clock.sleep(ACTIVATE_SETTLE);
        info!(bundle_id = %self.bundle_id, pid, "activated target app");
        Ok(AXUIElement::application(pid))
    }
}
