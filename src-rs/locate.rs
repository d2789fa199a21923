use crate::ax::{depth_first_search, walk, UiTree};
use crate::error::{AutomationError, AutomationResult};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const ROLE_STATIC_TEXT: &str = "AXStaticText";
pub const ROLE_TEXT_AREA: &str = "AXTextArea";
pub const ROLE_LIST: &str = "AXList";

pub const SESSION_ITEM_PREFIX: &str = "session_item_";
pub const SEARCH_FIELD_TITLE: &str = "Search";
pub const MESSAGE_LIST_TITLE: &str = "Messages";
pub const INPUT_FIELD_IDENTIFIER: &str = "chat_input_field";

/// Session-list entries keyed by display name. Later duplicates win.
pub fn collect_conversations<T: UiTree + ?Sized>(
    tree: &T,
    root: &T::Node,
) -> AutomationResult<BTreeMap<String, T::Node>> {
    let mut found = BTreeMap::new();
    walk(tree, root, |node, role, _, identifier| {
        if role != Some(ROLE_STATIC_TEXT) {
            return;
        }
        if let Some(name) = identifier.and_then(|id| id.strip_prefix(SESSION_ITEM_PREFIX)) {
            if !name.is_empty() {
                found.insert(name.to_string(), node.clone());
            }
        }
    })?;
    info!(count = found.len(), "collected chat elements from session list");
    Ok(found)
}

/// Exact display-name match first, then a case-insensitive one.
pub fn find_conversation<T: UiTree + ?Sized>(
    tree: &T,
    root: &T::Node,
    name: &str,
) -> AutomationResult<Option<T::Node>> {
    let mut conversations = collect_conversations(tree, root)?;
    if let Some(node) = conversations.remove(name) {
        return Ok(Some(node));
    }

    let wanted = name.to_lowercase();
    let matched = conversations
        .into_iter()
        .find(|(candidate, _)| candidate.to_lowercase() == wanted);
    if let Some((candidate, _)) = &matched {
        debug!(requested = name, matched = %candidate, "case-insensitive session match");
    }
    Ok(matched.map(|(_, node)| node))
}

pub fn find_search_field<T: UiTree + ?Sized>(tree: &T, root: &T::Node) -> AutomationResult<T::Node> {
    depth_first_search(tree, root, |_, role, title, _| {
        role == Some(ROLE_TEXT_AREA) && title == Some(SEARCH_FIELD_TITLE)
    })?
    .ok_or_else(|| AutomationError::ElementNotFound {
        element: "search field",
        role: ROLE_TEXT_AREA,
        key: format!("title={SEARCH_FIELD_TITLE}"),
    })
}

pub fn find_message_list<T: UiTree + ?Sized>(tree: &T, root: &T::Node) -> AutomationResult<T::Node> {
    depth_first_search(tree, root, |_, role, title, _| {
        role == Some(ROLE_LIST) && title.unwrap_or_default() == MESSAGE_LIST_TITLE
    })?
    .ok_or_else(|| AutomationError::ElementNotFound {
        element: "message list",
        role: ROLE_LIST,
        key: format!("title={MESSAGE_LIST_TITLE}"),
    })
}

pub fn find_input_field<T: UiTree + ?Sized>(tree: &T, root: &T::Node) -> AutomationResult<T::Node> {
    depth_first_search(tree, root, |_, role, _, identifier| {
        role == Some(ROLE_TEXT_AREA) && identifier == Some(INPUT_FIELD_IDENTIFIER)
    })?
    .ok_or_else(|| AutomationError::ElementNotFound {
        element: "chat input field",
        role: ROLE_TEXT_AREA,
        key: format!("identifier={INPUT_FIELD_IDENTIFIER}"),
    })
}
