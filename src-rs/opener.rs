use crate::ax::{UiAction, UiTree};
use crate::desktop::{ClipboardGuard, Desktop, KeyStroke};
use crate::error::AutomationResult;
use crate::locate::{find_conversation, find_search_field};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenPath {
    SessionList,
    Search,
}

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub click_settle: Duration,
    pub clipboard_settle: Duration,
    pub select_settle: Duration,
    pub search_settle: Duration,
    pub confirm_settle: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            click_settle: Duration::from_millis(300),
            clipboard_settle: Duration::from_millis(100),
            select_settle: Duration::from_millis(50),
            search_settle: Duration::from_millis(400),
            confirm_settle: Duration::from_millis(400),
        }
    }
}

/// Opens the chat with `contact`: clicks it in the session list when listed,
/// otherwise searches for it and confirms the top result.
pub fn open_conversation<D>(desktop: &D, contact: &str, options: &OpenOptions) -> AutomationResult<OpenPath>
where
    D: Desktop + ?Sized,
{
    info!(contact, "opening chat");
    let root = desktop.app_root()?;

    if let Some(entry) = find_conversation(desktop, &root, contact)? {
        info!(contact, "found chat in session list, pressing it");
        desktop.perform(&entry, UiAction::Press)?;
        desktop.sleep(options.click_settle);
        return Ok(OpenPath::SessionList);
    }

    warn!(contact, "chat not in session list, falling back to global search");
    let search = find_search_field(desktop, &root)?;
    desktop.perform(&search, UiAction::Raise)?;

    {
        let _restore = ClipboardGuard::stash(desktop)?;
        desktop.write_text(contact)?;
        desktop.sleep(options.clipboard_settle);
        desktop.key(KeyStroke::SELECT_ALL)?;
        desktop.sleep(options.select_settle);
        desktop.key(KeyStroke::PASTE)?;
        desktop.sleep(options.search_settle);
    }

    desktop.key(KeyStroke::RETURN)?;
    desktop.sleep(options.confirm_settle);
    info!(contact, "confirmed top search result (not verified)");
    Ok(OpenPath::Search)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutomationError;
    use crate::testing::{FakeDesktop, FakeEvent};

    #[test]
    fn listed_chat_is_opened_by_click() {
        let desktop = FakeDesktop::wechat_window();
        desktop.add_sessions(&["Alice", "Bob"]);
        let path = open_conversation(&desktop, "alice", &OpenOptions::default()).unwrap();
        assert_eq!(path, OpenPath::SessionList);
        assert_eq!(desktop.opened_chats(), vec!["Alice".to_string()]);
        assert!(!desktop
            .events()
            .iter()
            .any(|event| matches!(event, FakeEvent::Key(_))));
    }

    #[test]
    fn unlisted_chat_goes_through_search() {
        let desktop = FakeDesktop::wechat_window();
        desktop.add_sessions(&["Bob"]);
        desktop.set_clipboard(Some("previous-clip"));
        let path = open_conversation(&desktop, "Carol", &OpenOptions::default()).unwrap();
        assert_eq!(path, OpenPath::Search);
        assert_eq!(desktop.searched_for(), vec!["Carol".to_string()]);
        assert_eq!(desktop.clipboard().as_deref(), Some("previous-clip"));
        assert_eq!(desktop.key_count(KeyStroke::RETURN), 1);
    }

    #[test]
    fn app_must_be_running() {
        let desktop = FakeDesktop::wechat_window();
        desktop.set_running(false);
        let err = open_conversation(&desktop, "Alice", &OpenOptions::default()).unwrap_err();
        assert!(matches!(err, AutomationError::NotRunning { .. }));
    }
}
