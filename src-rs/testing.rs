//! In-memory stand-in for the WeChat window and the host desktop.

use crate::ax::{AttrKey, AttrValue, Point, ScreenRegion, Size, UiAction, UiTree};
use crate::desktop::{Clipboard, ClipboardContents, Clock, Desktop, InputDevice, KeyStroke, ScreenCapture};
use crate::error::{AutomationError, AutomationResult};
use crate::locate::SESSION_ITEM_PREFIX;
use crate::sender::SenderLabel;
use image::{Rgb, RgbImage};
use std::cell::{Cell, RefCell};
use std::time::Duration;

pub const BUNDLE_ID: &str = "com.tencent.xinWeChat";

const LIST_ORIGIN: Point = Point { x: 300.0, y: 100.0 };
const LIST_SIZE: Size = Size {
    width: 600.0,
    height: 400.0,
};
const ROW_HEIGHT: f64 = 40.0;

const BACKGROUND: Rgb<u8> = Rgb([25, 25, 25]);
const MY_BUBBLE: Rgb<u8> = Rgb([149, 236, 105]);
const THEIR_BUBBLE: Rgb<u8> = Rgb([44, 44, 44]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeNode {
    Element(usize),
    /// Row `n` of whatever the message list shows at read time.
    Row(usize),
}

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    role: String,
    title: Option<String>,
    identifier: Option<String>,
    value: Option<String>,
    position: Option<Point>,
    size: Option<Size>,
    children: Vec<usize>,
}

impl FakeElement {
    pub fn new(role: &str) -> Self {
        Self {
            role: role.to_string(),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn identifier(mut self, identifier: &str) -> Self {
        self.identifier = Some(identifier.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn bounds(mut self, origin: Point, size: Size) -> Self {
        self.position = Some(origin);
        self.size = Some(size);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FakeEvent {
    Key(KeyStroke),
    Scroll { at: Point, lines: i32 },
    Action { node: FakeNode, action: UiAction },
    SetValue(String),
    Capture(ScreenRegion),
}

#[derive(Debug, Clone, Copy)]
pub struct InputBehavior {
    pub accepts_direct_write: bool,
    pub accepts_paste: bool,
    pub clears_on_return: bool,
    /// Return presses swallowed before one is honoured.
    pub ignored_returns: u32,
}

impl Default for InputBehavior {
    fn default() -> Self {
        Self {
            accepts_direct_write: true,
            accepts_paste: true,
            clears_on_return: true,
            ignored_returns: 0,
        }
    }
}

type FeedRow = (String, SenderLabel);

#[derive(Debug, Clone)]
enum FeedKind {
    /// Each scroll event advances to the next view; the last one sticks.
    Scripted { views: Vec<Vec<FeedRow>>, index: usize },
    /// A window of `rows` over `history`, `offset` rows above the bottom.
    Viewport {
        history: Vec<FeedRow>,
        rows: usize,
        shift: usize,
        offset: usize,
    },
}

#[derive(Debug, Clone)]
pub struct MessageFeed {
    kind: FeedKind,
}

impl MessageFeed {
    pub fn scripted(views: Vec<Vec<&str>>) -> Self {
        Self::scripted_with_senders(
            views
                .into_iter()
                .map(|view| view.into_iter().map(|text| (text, SenderLabel::Unknown)).collect())
                .collect(),
        )
    }

    pub fn scripted_with_senders(views: Vec<Vec<(&str, SenderLabel)>>) -> Self {
        let views = views
            .into_iter()
            .map(|view| {
                view.into_iter()
                    .map(|(text, sender)| (text.to_string(), sender))
                    .collect()
            })
            .collect();
        Self {
            kind: FeedKind::Scripted { views, index: 0 },
        }
    }

    pub fn viewport(history: Vec<String>, rows: usize, shift: usize) -> Self {
        let history = history
            .into_iter()
            .map(|text| (text, SenderLabel::Unknown))
            .collect();
        Self {
            kind: FeedKind::Viewport {
                history,
                rows,
                shift,
                offset: 0,
            },
        }
    }

    pub fn scrolled_up(mut self, by: usize) -> Self {
        if let FeedKind::Viewport {
            history,
            rows,
            offset,
            ..
        } = &mut self.kind
        {
            *offset = by.min(history.len().saturating_sub(*rows));
        }
        self
    }

    fn visible(&self) -> Vec<FeedRow> {
        match &self.kind {
            FeedKind::Scripted { views, index } => views.get(*index).cloned().unwrap_or_default(),
            FeedKind::Viewport {
                history,
                rows,
                offset,
                ..
            } => {
                let end = history.len() - *offset;
                let start = end.saturating_sub(*rows);
                history[start..end].to_vec()
            }
        }
    }

    fn on_scroll(&mut self, lines: i32) {
        match &mut self.kind {
            FeedKind::Scripted { views, index } => {
                *index = (*index + 1).min(views.len().saturating_sub(1));
            }
            FeedKind::Viewport {
                history,
                rows,
                shift,
                offset,
            } => {
                if lines > 0 {
                    *offset = 0;
                } else if lines < 0 {
                    *offset = (*offset + *shift).min(history.len().saturating_sub(*rows));
                }
            }
        }
    }
}

pub struct FakeDesktop {
    elements: RefCell<Vec<FakeElement>>,
    running: Cell<bool>,
    clock: Cell<Duration>,
    clipboard: RefCell<ClipboardContents>,
    events: RefCell<Vec<FakeEvent>>,
    feed: RefCell<Option<MessageFeed>>,
    sessions: Cell<Option<usize>>,
    list: Cell<Option<usize>>,
    search: Cell<Option<usize>>,
    input: Cell<Option<usize>>,
    focused: Cell<Option<usize>>,
    selected_all: Cell<bool>,
    behavior: Cell<InputBehavior>,
    swallowed_returns: Cell<u32>,
    opened: RefCell<Vec<String>>,
    searched: RefCell<Vec<String>>,
    sent: RefCell<Vec<String>>,
}

impl FakeDesktop {
    /// A running app whose tree is just the application node.
    pub fn new() -> Self {
        Self {
            elements: RefCell::new(vec![FakeElement::new("AXApplication").title("WeChat")]),
            running: Cell::new(true),
            clock: Cell::new(Duration::ZERO),
            clipboard: RefCell::new(ClipboardContents::Empty),
            events: RefCell::new(Vec::new()),
            feed: RefCell::new(None),
            sessions: Cell::new(None),
            list: Cell::new(None),
            search: Cell::new(None),
            input: Cell::new(None),
            focused: Cell::new(None),
            selected_all: Cell::new(false),
            behavior: Cell::new(InputBehavior::default()),
            swallowed_returns: Cell::new(0),
            opened: RefCell::new(Vec::new()),
            searched: RefCell::new(Vec::new()),
            sent: RefCell::new(Vec::new()),
        }
    }

    /// Main window with sidebar search, session list, message list and input.
    pub fn wechat_window() -> Self {
        let desktop = Self::new();
        let window = desktop.add(0, FakeElement::new("AXWindow").title("WeChat"));
        let sidebar = desktop.add(window, FakeElement::new("AXGroup"));
        let search = desktop.add(sidebar, FakeElement::new("AXTextArea").title("Search").value(""));
        let sessions = desktop.add(sidebar, FakeElement::new("AXGroup"));
        let chat = desktop.add(window, FakeElement::new("AXGroup"));
        let list = desktop.add(
            chat,
            FakeElement::new("AXList")
                .title("Messages")
                .bounds(LIST_ORIGIN, LIST_SIZE),
        );
        let input = desktop.add(
            chat,
            FakeElement::new("AXTextArea")
                .identifier("chat_input_field")
                .value(""),
        );
        desktop.search.set(Some(search));
        desktop.sessions.set(Some(sessions));
        desktop.list.set(Some(list));
        desktop.input.set(Some(input));
        desktop
    }

    pub fn root_id(&self) -> usize {
        0
    }

    pub fn root(&self) -> FakeNode {
        FakeNode::Element(0)
    }

    pub fn add(&self, parent: usize, element: FakeElement) -> usize {
        let mut elements = self.elements.borrow_mut();
        elements.push(element);
        let id = elements.len() - 1;
        elements[parent].children.push(id);
        id
    }

    pub fn add_sessions(&self, names: &[&str]) {
        let parent = self.sessions.get().unwrap_or(0);
        for name in names {
            let row = self.add(parent, FakeElement::new("AXRow"));
            self.add(
                row,
                FakeElement::new("AXStaticText")
                    .identifier(&format!("{SESSION_ITEM_PREFIX}{name}"))
                    .title(name),
            );
        }
    }

    pub fn set_feed(&self, feed: MessageFeed) {
        *self.feed.borrow_mut() = Some(feed);
    }

    pub fn set_running(&self, running: bool) {
        self.running.set(running);
    }

    pub fn set_input_behavior(&self, behavior: InputBehavior) {
        self.behavior.set(behavior);
    }

    pub fn set_clipboard(&self, text: Option<&str>) {
        self.set_clipboard_contents(match text {
            Some(text) => ClipboardContents::Text(text.to_string()),
            None => ClipboardContents::Empty,
        });
    }

    pub fn set_clipboard_contents(&self, contents: ClipboardContents) {
        *self.clipboard.borrow_mut() = contents;
    }

    /// Clipboard text, `None` for anything else.
    pub fn clipboard(&self) -> Option<String> {
        match &*self.clipboard.borrow() {
            ClipboardContents::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn clipboard_contents(&self) -> ClipboardContents {
        self.clipboard.borrow().clone()
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.events.borrow().clone()
    }

    pub fn capture_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, FakeEvent::Capture(_)))
            .count()
    }

    pub fn scrolls(&self) -> Vec<i32> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                FakeEvent::Scroll { lines, .. } => Some(*lines),
                _ => None,
            })
            .collect()
    }

    pub fn key_count(&self, stroke: KeyStroke) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| **event == FakeEvent::Key(stroke))
            .count()
    }

    pub fn opened_chats(&self) -> Vec<String> {
        self.opened.borrow().clone()
    }

    pub fn searched_for(&self) -> Vec<String> {
        self.searched.borrow().clone()
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }

    fn record(&self, event: FakeEvent) {
        self.events.borrow_mut().push(event);
    }

    fn visible_rows(&self) -> Vec<FeedRow> {
        self.feed
            .borrow()
            .as_ref()
            .map(MessageFeed::visible)
            .unwrap_or_default()
    }

    fn element(&self, id: usize) -> AutomationResult<FakeElement> {
        self.elements
            .borrow()
            .get(id)
            .cloned()
            .ok_or(AutomationError::InvalidElement)
    }

    fn element_value(&self, id: usize) -> String {
        self.elements.borrow()[id].value.clone().unwrap_or_default()
    }

    fn set_element_value(&self, id: usize, value: &str) {
        self.elements.borrow_mut()[id].value = Some(value.to_string());
    }

    fn row_attribute(&self, index: usize, key: AttrKey) -> AutomationResult<AttrValue<FakeNode>> {
        let rows = self.visible_rows();
        let (text, _) = rows.get(index).ok_or(AutomationError::InvalidElement)?;
        Ok(match key {
            AttrKey::Role => AttrValue::Text("AXStaticText".to_string()),
            AttrKey::Value => AttrValue::Text(text.clone()),
            AttrKey::Position => AttrValue::Point(Point {
                x: LIST_ORIGIN.x,
                y: LIST_ORIGIN.y + index as f64 * ROW_HEIGHT,
            }),
            AttrKey::Size => AttrValue::Size(Size {
                width: LIST_SIZE.width,
                height: ROW_HEIGHT,
            }),
            AttrKey::Title | AttrKey::Identifier | AttrKey::Children => AttrValue::Absent,
        })
    }

    fn paste_into(&self, id: usize) {
        let pasted = self.clipboard().unwrap_or_default();
        let value = if self.selected_all.get() {
            pasted
        } else {
            self.element_value(id) + &pasted
        };
        self.set_element_value(id, &value);
    }

    fn press_return(&self) {
        let Some(focused) = self.focused.get() else {
            return;
        };
        if Some(focused) == self.search.get() {
            self.searched.borrow_mut().push(self.element_value(focused));
            return;
        }
        if Some(focused) != self.input.get() {
            return;
        }
        let behavior = self.behavior.get();
        if self.swallowed_returns.get() < behavior.ignored_returns {
            self.swallowed_returns.set(self.swallowed_returns.get() + 1);
            return;
        }
        let value = self.element_value(focused);
        if behavior.clears_on_return && !value.is_empty() {
            self.sent.borrow_mut().push(value);
            self.set_element_value(focused, "");
        }
    }
}

impl Default for FakeDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl UiTree for FakeDesktop {
    type Node = FakeNode;

    fn attribute(&self, node: &FakeNode, key: AttrKey) -> AutomationResult<AttrValue<FakeNode>> {
        let id = match *node {
            FakeNode::Row(index) => return self.row_attribute(index, key),
            FakeNode::Element(id) => id,
        };
        let element = self.element(id)?;
        let text = |value: Option<String>| value.map_or(AttrValue::Absent, AttrValue::Text);
        Ok(match key {
            AttrKey::Role => AttrValue::Text(element.role),
            AttrKey::Title => text(element.title),
            AttrKey::Identifier => text(element.identifier),
            AttrKey::Value => text(element.value),
            AttrKey::Position => element.position.map_or(AttrValue::Absent, AttrValue::Point),
            AttrKey::Size => element.size.map_or(AttrValue::Absent, AttrValue::Size),
            AttrKey::Children => {
                let children: Vec<FakeNode> = if Some(id) == self.list.get() {
                    (0..self.visible_rows().len()).map(FakeNode::Row).collect()
                } else {
                    element.children.into_iter().map(FakeNode::Element).collect()
                };
                if children.is_empty() {
                    AttrValue::Absent
                } else {
                    AttrValue::Children(children)
                }
            }
        })
    }

    fn perform(&self, node: &FakeNode, action: UiAction) -> AutomationResult<()> {
        self.attribute(node, AttrKey::Role)?;
        self.record(FakeEvent::Action {
            node: *node,
            action,
        });
        let FakeNode::Element(id) = *node else {
            return Ok(());
        };
        self.focused.set(Some(id));
        self.selected_all.set(false);
        if action == UiAction::Press {
            let element = self.element(id)?;
            if let Some(name) = element
                .identifier
                .as_deref()
                .and_then(|identifier| identifier.strip_prefix(SESSION_ITEM_PREFIX))
            {
                self.opened.borrow_mut().push(name.to_string());
            }
        }
        Ok(())
    }

    fn set_value(&self, node: &FakeNode, text: &str) -> AutomationResult<()> {
        self.attribute(node, AttrKey::Role)?;
        self.record(FakeEvent::SetValue(text.to_string()));
        let FakeNode::Element(id) = *node else {
            return Ok(());
        };
        if Some(id) == self.input.get() && !self.behavior.get().accepts_direct_write {
            return Ok(());
        }
        self.set_element_value(id, text);
        Ok(())
    }
}

impl InputDevice for FakeDesktop {
    fn key(&self, stroke: KeyStroke) -> AutomationResult<()> {
        self.record(FakeEvent::Key(stroke));
        if stroke == KeyStroke::SELECT_ALL {
            self.selected_all.set(true);
        } else if stroke == KeyStroke::PASTE {
            if let Some(focused) = self.focused.get() {
                let is_input = Some(focused) == self.input.get();
                if !is_input || self.behavior.get().accepts_paste {
                    self.paste_into(focused);
                }
            }
            self.selected_all.set(false);
        } else if stroke == KeyStroke::RETURN {
            self.press_return();
        }
        Ok(())
    }

    fn scroll(&self, at: Point, lines: i32) -> AutomationResult<()> {
        self.record(FakeEvent::Scroll { at, lines });
        if let Some(feed) = self.feed.borrow_mut().as_mut() {
            feed.on_scroll(lines);
        }
        Ok(())
    }
}

impl ScreenCapture for FakeDesktop {
    fn capture(&self, region: ScreenRegion) -> AutomationResult<RgbImage> {
        self.record(FakeEvent::Capture(region));
        let width = region.width.round().max(1.0) as u32;
        let height = region.height.round().max(1.0) as u32;
        let mut image = RgbImage::from_pixel(width, height, BACKGROUND);

        let row_height = ROW_HEIGHT as u32;
        for (index, (_, sender)) in self.visible_rows().iter().enumerate() {
            let (xs, color) = match sender {
                SenderLabel::Me => (width.saturating_sub(200)..width.saturating_sub(10), MY_BUBBLE),
                SenderLabel::Other => (10..200.min(width), THEIR_BUBBLE),
                SenderLabel::Unknown => continue,
            };
            let top = index as u32 * row_height + 4;
            let bottom = ((index as u32 + 1) * row_height - 4).min(height);
            for y in top..bottom {
                for x in xs.clone() {
                    image.put_pixel(x, y, color);
                }
            }
        }
        Ok(image)
    }
}

impl Clipboard for FakeDesktop {
    fn read(&self) -> AutomationResult<ClipboardContents> {
        Ok(self.clipboard_contents())
    }

    fn write(&self, contents: &ClipboardContents) -> AutomationResult<()> {
        self.set_clipboard_contents(contents.clone());
        Ok(())
    }
}

impl Clock for FakeDesktop {
    fn now(&self) -> Duration {
        self.clock.get()
    }

    fn sleep(&self, duration: Duration) {
        self.clock.set(self.clock.get() + duration);
    }
}

impl Desktop for FakeDesktop {
    fn bundle_id(&self) -> &str {
        BUNDLE_ID
    }

    fn app_root(&self) -> AutomationResult<FakeNode> {
        if !self.running.get() {
            return Err(AutomationError::NotRunning {
                bundle_id: BUNDLE_ID.to_string(),
            });
        }
        Ok(self.root())
    }
}
