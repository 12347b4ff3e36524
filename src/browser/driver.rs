use serde_json::Value;

use crate::agent::error::AgentError;

/// The narrow interface to the browser-automation library.
///
/// All element addressing is by CSS selector; the controller only ever
/// sends marker-attribute selectors it stamped during extraction.
/// Implementations apply a short per-action timeout (~5s) and are
/// expected to scroll nothing implicitly: scrolling, page metrics and
/// script execution all go through `eval`.
pub trait PageDriver {
    fn navigate(&mut self, url: &str) -> Result<(), AgentError>;

    /// Evaluate a JS expression in the page and return its value.
    /// Promises are awaited before serialization.
    fn eval(&mut self, script: &str) -> Result<Value, AgentError>;

    fn click(&mut self, selector: &str) -> Result<(), AgentError>;

    /// Clears the field, then types `text`.
    fn fill(&mut self, selector: &str, text: &str) -> Result<(), AgentError>;

    /// Select an option by its visible label. Returns false when no
    /// option with that label exists.
    fn select_option(&mut self, selector: &str, label: &str) -> Result<bool, AgentError>;

    fn url(&mut self) -> Result<String, AgentError>;

    fn title(&mut self) -> Result<String, AgentError>;

    /// Release the underlying page. Idempotent, best-effort.
    fn close(&mut self) -> Result<(), AgentError>;
}
