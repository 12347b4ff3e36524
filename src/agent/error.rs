use std::fmt;

#[derive(Debug)]
pub enum AgentError {
    /// The browser sidecar process never came up
    SidecarLaunch { script: String, source: std::io::Error },

    /// I/O with the browser sidecar failed (broken pipe, dead process)
    SessionIO(String),

    /// The sidecar answered a command with an error envelope
    SessionProtocol { command: String, error: String },

    /// JSON crossed a boundary in the wrong shape (sidecar wire,
    /// extraction payload)
    Json { context: String, source: serde_json::Error },

    /// Invalid agent configuration (missing credentials, bad options)
    Config(String),

    /// Model call failed after the backend's own retries
    Model(String),

    /// Model output violates the structured-output contract
    Schema(String),

    /// The model named a tool that is not registered
    UnknownTool(String),

    /// The model addressed an index absent from the current snapshot
    UnknownIndex(u32),

    /// A page interaction failed (timeout, detached node, disabled control)
    Action { action: String, message: String },

    /// DOM extraction returned an unexpected structure
    Extraction(String),

    /// The task was aborted at a cooperative point
    Aborted(String),

    /// A poll deadline expired
    Timeout { what: String, waited_ms: u64 },

    /// The agent was disposed and cannot run tasks
    Disposed,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::SidecarLaunch { script, source } => {
                write!(f, "Browser sidecar '{}' failed to start (is node on PATH?): {}", script, source)
            }
            AgentError::SessionIO(msg) => write!(f, "Browser session I/O error: {}", msg),
            AgentError::SessionProtocol { command, error } => {
                write!(f, "Browser command '{}' failed: {}", command, error)
            }
            AgentError::Json { context, source } => {
                write!(f, "Bad JSON while {}: {}", context, source)
            }
            AgentError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AgentError::Model(msg) => write!(f, "Model error: {}", msg),
            AgentError::Schema(msg) => write!(f, "Structured output violation: {}", msg),
            AgentError::UnknownTool(name) => write!(f, "Unknown tool: '{}'", name),
            AgentError::UnknownIndex(index) => {
                write!(f, "No element with index {} in the current snapshot", index)
            }
            AgentError::Action { action, message } => {
                write!(f, "Action '{}' failed: {}", action, message)
            }
            AgentError::Extraction(msg) => write!(f, "Unexpected extraction payload: {}", msg),
            AgentError::Aborted(reason) => write!(f, "Aborted: {}", reason),
            AgentError::Timeout { what, waited_ms } => {
                write!(f, "Timed out after {}ms waiting for {}", waited_ms, what)
            }
            AgentError::Disposed => write!(f, "Agent has been disposed"),
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        // Only two variants wrap a lower-level error that adds anything
        // beyond their own message: the spawn failure (io::Error kind
        // matters to callers) and malformed JSON (position and column
        // live in the serde error). The rest are already complete.
        match self {
            AgentError::SidecarLaunch { source, .. } => Some(source),
            AgentError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}
