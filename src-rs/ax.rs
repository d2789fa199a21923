use crate::error::AutomationResult;
use serde::Serialize;
use tracing::debug;

/// Subtrees below this depth are not visited by `depth_first_search`.
pub const MAX_SEARCH_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKey {
    Role,
    Title,
    Identifier,
    Position,
    Size,
    Value,
    Children,
}

impl AttrKey {
    pub fn ax_name(self) -> &'static str {
        match self {
            AttrKey::Role => "AXRole",
            AttrKey::Title => "AXTitle",
            AttrKey::Identifier => "AXIdentifier",
            AttrKey::Position => "AXPosition",
            AttrKey::Size => "AXSize",
            AttrKey::Value => "AXValue",
            AttrKey::Children => "AXChildren",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Rectangle in screen points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScreenRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRegion {
    pub fn new(origin: Point, size: Size) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            width: size.width,
            height: size.height,
        }
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Result of reading one attribute. `Absent` means the element does not
/// expose the attribute (or has no value), which is not the same as `Text("")`.
#[derive(Debug, Clone)]
pub enum AttrValue<N> {
    Text(String),
    Point(Point),
    Size(Size),
    Children(Vec<N>),
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Press,
    Raise,
}

impl UiAction {
    pub fn ax_name(self) -> &'static str {
        match self {
            UiAction::Press => "AXPress",
            UiAction::Raise => "AXRaise",
        }
    }
}

/// Read/act capability over an externally owned accessibility tree.
///
/// Nodes are non-owning handles that stay valid for one operation at most;
/// implementations report a dead handle as `AutomationError::InvalidElement`
/// and everything else that is merely missing as `AttrValue::Absent`.
pub trait UiTree {
    type Node: Clone;

    fn attribute(&self, node: &Self::Node, key: AttrKey)
        -> AutomationResult<AttrValue<Self::Node>>;

    fn perform(&self, node: &Self::Node, action: UiAction) -> AutomationResult<()>;

    fn set_value(&self, node: &Self::Node, text: &str) -> AutomationResult<()>;

    fn text(&self, node: &Self::Node, key: AttrKey) -> AutomationResult<Option<String>> {
        Ok(match self.attribute(node, key)? {
            AttrValue::Text(text) => Some(text),
            _ => None,
        })
    }

    fn children(&self, node: &Self::Node) -> AutomationResult<Vec<Self::Node>> {
        Ok(match self.attribute(node, AttrKey::Children)? {
            AttrValue::Children(children) => children,
            _ => Vec::new(),
        })
    }

    fn bounds(&self, node: &Self::Node) -> AutomationResult<Option<ScreenRegion>> {
        let origin = match self.attribute(node, AttrKey::Position)? {
            AttrValue::Point(point) => point,
            _ => return Ok(None),
        };
        let size = match self.attribute(node, AttrKey::Size)? {
            AttrValue::Size(size) => size,
            _ => return Ok(None),
        };
        Ok(Some(ScreenRegion::new(origin, size)))
    }

    /// Display text of a row: its value, falling back to its title.
    fn label(&self, node: &Self::Node) -> AutomationResult<Option<String>> {
        if let Some(value) = self.text(node, AttrKey::Value)? {
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }
        Ok(self
            .text(node, AttrKey::Title)?
            .filter(|title| !title.is_empty()))
    }
}

/// Preorder search. The predicate sees `(node, role, title, identifier)` and
/// the first match wins.
pub fn depth_first_search<T, F>(
    tree: &T,
    root: &T::Node,
    mut predicate: F,
) -> AutomationResult<Option<T::Node>>
where
    T: UiTree + ?Sized,
    F: FnMut(&T::Node, Option<&str>, Option<&str>, Option<&str>) -> bool,
{
    let mut stack = vec![(root.clone(), 0usize)];
    while let Some((node, depth)) = stack.pop() {
        let role = tree.text(&node, AttrKey::Role)?;
        let title = tree.text(&node, AttrKey::Title)?;
        let identifier = tree.text(&node, AttrKey::Identifier)?;
        if predicate(
            &node,
            role.as_deref(),
            title.as_deref(),
            identifier.as_deref(),
        ) {
            return Ok(Some(node));
        }

        if depth >= MAX_SEARCH_DEPTH {
            debug!(depth, role = ?role, "search depth bound reached, skipping subtree");
            continue;
        }
        let children = tree.children(&node)?;
        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
    }
    Ok(None)
}

/// Visits every node within the depth bound, in the same order as
/// `depth_first_search`.
pub fn walk<T, F>(tree: &T, root: &T::Node, mut visit: F) -> AutomationResult<()>
where
    T: UiTree + ?Sized,
    F: FnMut(&T::Node, Option<&str>, Option<&str>, Option<&str>),
{
    depth_first_search(tree, root, |node, role, title, identifier| {
        visit(node, role, title, identifier);
        false
    })?;
    Ok(())
}
