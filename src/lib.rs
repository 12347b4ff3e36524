pub mod agent;
pub mod browser;
pub mod cli;
pub mod dom;
pub mod page;
pub mod trace;
pub mod util;

pub use agent::agent::{Agent, AgentConfig, AgentHandle, ToolOverride};
pub use agent::error::AgentError;
pub use agent::history::{HistoryEntry, TaskResult};
pub use agent::model::{MockBackend, ModelBackend, ModelOptions, OpenAiBackend};
pub use agent::tools::{Tool, ToolCtx, ToolOutcome, ToolRegistry};
pub use browser::driver::PageDriver;
pub use browser::session::BrowserSession;
pub use page::controller::{ActionResult, PageController, UpdateEvent};
