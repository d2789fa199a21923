use thiserror::Error;

/// Failures raised while driving the target application.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("{bundle_id} is not running")]
    NotRunning { bundle_id: String },

    #[error("could not find {element} (role={role}, {key}) via Accessibility API")]
    ElementNotFound {
        element: &'static str,
        role: &'static str,
        key: String,
    },

    #[error("accessibility element is no longer valid")]
    InvalidElement,

    #[error("failed to read on-screen bounds for {element}")]
    MissingBounds { element: &'static str },

    #[error("failed to set input text: expected {expected:?}, got {actual:?}")]
    InputWriteFailure {
        expected: String,
        actual: Option<String>,
    },

    #[error(
        "message may not have been sent after {attempts} attempts; input field still contains {last_value:?}"
    )]
    SendUnconfirmed {
        attempts: u32,
        last_value: Option<String>,
    },

    #[error("no messages available to generate a reply for {contact}")]
    EmptyHistory { contact: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("unsupported platform: {0}")]
    Unsupported(String),
}

pub type AutomationResult<T> = std::result::Result<T, AutomationError>;
