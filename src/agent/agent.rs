use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::agent::error::AgentError;
use crate::agent::history::{
    ActionRecord, Brain, HistoryEntry, TaskResult, MAX_STEPS, VIEWPORT_EXPANSION,
    WAIT_WARNING_THRESHOLD,
};
use crate::agent::model::{decode_step, response_schema, ModelBackend, ModelOptions, OpenAiBackend};
use crate::agent::prompt::PromptAssembler;
use crate::agent::tools::{Tool, ToolCtx, ToolOutcome, ToolRegistry};
use crate::browser::driver::PageDriver;
use crate::page::controller::PageController;
use crate::trace::StepTrace;
use crate::util;

/// Shared abort signal, observed at the loop's cooperative points and
/// passed into the model backend. The first reason wins; `abort` is
/// idempotent.
#[derive(Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

#[derive(Default)]
struct AbortInner {
    aborted: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self, reason: impl Into<String>) {
        let mut guard = match self.inner.reason.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_none() {
            *guard = Some(reason.into());
        }
        self.inner.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> String {
        let guard = match self.inner.reason.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone().unwrap_or_else(|| "aborted".to_string())
    }

    pub fn check(&self) -> Result<(), AgentError> {
        if self.is_aborted() {
            Err(AgentError::Aborted(self.reason()))
        } else {
            Ok(())
        }
    }

    fn reset(&self) {
        self.inner.aborted.store(false, Ordering::SeqCst);
        let mut guard = match self.inner.reason.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }
}

/// Cloneable control surface for pausing or aborting a running task
/// from outside the loop (e.g. another thread).
#[derive(Clone)]
pub struct AgentHandle {
    paused: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl AgentHandle {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn abort(&self, reason: impl Into<String>) {
        self.abort.abort(reason);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// Mutation applied to the default tool set at construction.
pub enum ToolOverride {
    Add(Box<dyn Tool>),
    Remove(String),
}

/// Agent configuration. Lifecycle hooks receive lightweight payloads;
/// they observe the loop, they do not steer it.
pub struct AgentConfig {
    pub viewport_expansion: i64,
    pub include_attributes: Vec<String>,
    pub max_steps: usize,
    pub working_language: String,
    pub enable_script_tool: bool,
    pub custom_tools: Vec<ToolOverride>,
    pub trace_path: Option<String>,
    pub on_before_task: Option<Box<dyn FnMut(&str)>>,
    pub on_after_task: Option<Box<dyn FnMut(&TaskResult)>>,
    pub on_before_step: Option<Box<dyn FnMut(usize)>>,
    pub on_after_step: Option<Box<dyn FnMut(&HistoryEntry)>>,
    pub on_dispose: Option<Box<dyn FnMut()>>,
    pub on_ask_user: Option<Box<dyn FnMut(&str) -> Option<String>>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            viewport_expansion: VIEWPORT_EXPANSION,
            include_attributes: Vec::new(),
            max_steps: MAX_STEPS,
            working_language: "English".to_string(),
            enable_script_tool: false,
            custom_tools: Vec::new(),
            trace_path: None,
            on_before_task: None,
            on_after_task: None,
            on_before_step: None,
            on_after_step: None,
            on_dispose: None,
            on_ask_user: None,
        }
    }
}

/// The reason-act loop: one call to `execute` runs one task to
/// completion, step budget, abort or unrecoverable failure.
pub struct Agent {
    controller: PageController,
    backend: Box<dyn ModelBackend>,
    registry: ToolRegistry,
    prompts: PromptAssembler,
    trace: Option<StepTrace>,
    max_steps: usize,
    history: Vec<HistoryEntry>,
    task_id: String,
    paused: Arc<AtomicBool>,
    abort: AbortHandle,
    total_wait: Duration,
    disposed: bool,
    on_before_task: Option<Box<dyn FnMut(&str)>>,
    on_after_task: Option<Box<dyn FnMut(&TaskResult)>>,
    on_before_step: Option<Box<dyn FnMut(usize)>>,
    on_after_step: Option<Box<dyn FnMut(&HistoryEntry)>>,
    on_dispose: Option<Box<dyn FnMut()>>,
    on_ask_user: Option<Box<dyn FnMut(&str) -> Option<String>>>,
}

impl Agent {
    /// Agent over the OpenAI-compatible backend. Fails fast on missing
    /// credentials, before any task starts.
    pub fn new(
        driver: Box<dyn PageDriver>,
        model: ModelOptions,
        config: AgentConfig,
    ) -> Result<Self, AgentError> {
        let backend = Box::new(OpenAiBackend::new(model)?);
        Ok(Self::with_backend(driver, backend, config))
    }

    /// Agent over a caller-supplied backend (mock, alternative client).
    pub fn with_backend(
        driver: Box<dyn PageDriver>,
        backend: Box<dyn ModelBackend>,
        mut config: AgentConfig,
    ) -> Self {
        let mut registry = ToolRegistry::defaults(config.enable_script_tool);
        for tool_override in config.custom_tools.drain(..) {
            match tool_override {
                ToolOverride::Add(tool) => registry.register(tool),
                ToolOverride::Remove(name) => {
                    registry.remove(&name);
                }
            }
        }

        let controller = PageController::new(
            driver,
            config.viewport_expansion,
            &config.include_attributes,
            config.enable_script_tool,
        );

        Self {
            controller,
            backend,
            registry,
            prompts: PromptAssembler::new(&config.working_language),
            trace: config.trace_path.as_deref().map(StepTrace::open),
            max_steps: config.max_steps,
            history: Vec::new(),
            task_id: String::new(),
            paused: Arc::new(AtomicBool::new(false)),
            abort: AbortHandle::new(),
            total_wait: Duration::ZERO,
            disposed: false,
            on_before_task: config.on_before_task,
            on_after_task: config.on_after_task,
            on_before_step: config.on_before_step,
            on_after_step: config.on_after_step,
            on_dispose: config.on_dispose,
            on_ask_user: config.on_ask_user,
        }
    }

    /// Control surface usable from other threads while a task runs.
    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            paused: Arc::clone(&self.paused),
            abort: self.abort.clone(),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// The tool set used for the next task. A different set changes the
    /// structured-output schema on the very next step.
    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn controller(&self) -> &PageController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PageController {
        &mut self.controller
    }

    /// Abort the current task and release the page. Idempotent.
    pub fn dispose(&mut self, reason: Option<&str>) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.abort
            .abort(reason.unwrap_or("agent disposed").to_string());
        self.controller.dispose();
        if let Some(hook) = &mut self.on_dispose {
            hook();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Run one task. History is cleared at task start and returned in
    /// full with the outcome.
    pub fn execute(&mut self, task: &str) -> TaskResult {
        if self.disposed {
            return TaskResult {
                success: false,
                data: AgentError::Disposed.to_string(),
                history: Vec::new(),
            };
        }

        self.task_id = util::short_id();
        self.history.clear();
        self.total_wait = Duration::ZERO;
        self.abort.reset();

        if let Some(hook) = &mut self.on_before_task {
            hook(task);
        }
        if let Some(trace) = &mut self.trace {
            trace.task_started(&self.task_id, task);
        }

        let (success, data) = self.run_loop(task);
        if let Some(trace) = &mut self.trace {
            trace.task_finished(&self.task_id, success, &data);
        }
        let result = TaskResult {
            success,
            data,
            history: std::mem::take(&mut self.history),
        };

        if let Some(hook) = &mut self.on_after_task {
            hook(&result);
        }
        result
    }

    fn run_loop(&mut self, task: &str) -> (bool, String) {
        loop {
            let step = self.history.len() + 1;
            if let Some(hook) = &mut self.on_before_step {
                hook(step);
            }

            if let Err(AgentError::Aborted(reason)) = self.cooperative_checkpoint() {
                return (false, reason);
            }

            // Perceive: the snapshot must be fresh before any prompt is
            // assembled from it.
            if let Err(e) = self.controller.refresh() {
                return (false, format!("Snapshot refresh failed: {}", e));
            }
            let url = self
                .controller
                .url()
                .unwrap_or_else(|_| "about:blank".to_string());
            let title = self.controller.title().unwrap_or_default();

            let schema = response_schema(&self.registry);
            let system = self.prompts.system_prompt(&self.registry);
            let user = self.prompts.user_prompt(
                task,
                &self.history,
                step,
                self.max_steps,
                &url,
                &title,
                self.controller.page_info(),
                self.controller.serialized_html(),
            );

            let reply = match self.backend.complete(&system, &user, &schema, &self.abort) {
                Ok(reply) => reply,
                Err(AgentError::Aborted(reason)) => return (false, reason),
                Err(e) => return (false, e.to_string()),
            };

            // Decide and act: exactly one tool per step. A contract
            // violation fails the step, not the task.
            let (brain, name, input, outcome) = match decode_step(&reply.content) {
                Ok(decoded) => {
                    let outcome = self.dispatch(&decoded.tool_name, decoded.tool_input.clone());
                    (decoded.brain, decoded.tool_name, decoded.tool_input, outcome)
                }
                Err(e) => (Brain::default(), "invalid".to_string(), Value::Null, Err(e)),
            };

            let (mut output, done) = match outcome {
                Ok(ToolOutcome::Message(message)) => (message, None),
                Ok(ToolOutcome::Done { success, text }) => {
                    (format!("Task finished: {}", text), Some((success, text)))
                }
                Err(AgentError::Aborted(reason)) => return (false, reason),
                Err(e) => (format!("Step failed: {}", e), None),
            };

            if name == "wait" {
                if self.total_wait >= WAIT_WARNING_THRESHOLD {
                    output.push_str(
                        " Note: more than 3 seconds spent waiting in total; stop waiting and act on the current state.",
                    );
                }
            } else {
                self.total_wait = Duration::ZERO;
            }

            let entry = HistoryEntry {
                brain,
                action: ActionRecord {
                    name,
                    input,
                    output,
                },
                usage: reply.usage,
            };
            self.trace_step(step, &entry);
            self.history.push(entry);
            if let (Some(hook), Some(entry)) = (&mut self.on_after_step, self.history.last()) {
                hook(entry);
            }

            if let Some((success, text)) = done {
                return (success, text);
            }
            if self.history.len() > self.max_steps {
                return (false, "Step count exceeded maximum limit".to_string());
            }
        }
    }

    fn dispatch(&mut self, name: &str, input: Value) -> Result<ToolOutcome, AgentError> {
        self.cooperative_checkpoint()?;
        let Some(tool) = self.registry.get(name) else {
            return Err(AgentError::UnknownTool(name.to_string()));
        };
        let ask_user = reborrow_ask_user(&mut self.on_ask_user);
        let mut ctx = ToolCtx {
            controller: &mut self.controller,
            abort: &self.abort,
            total_wait: &mut self.total_wait,
            ask_user,
        };
        tool.execute(&mut ctx, input)
    }

    /// Block while paused; observe the abort signal either way.
    fn cooperative_checkpoint(&self) -> Result<(), AgentError> {
        loop {
            self.abort.check()?;
            if !self.paused.load(Ordering::SeqCst) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    fn trace_step(&mut self, step: usize, entry: &HistoryEntry) {
        if let Some(trace) = &mut self.trace {
            trace.step(
                &self.task_id,
                step as u64,
                entry.brain.next_goal.as_deref(),
                &entry.action.name,
                &entry.action.output,
            );
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.dispose(Some("agent dropped"));
    }
}

/// Standalone so its explicit lifetime guides inference past the boxed
/// `FnMut` trait object, which `Option::as_deref_mut` otherwise forces
/// to `'static` in this position.
fn reborrow_ask_user<'a>(
    opt: &'a mut Option<Box<dyn FnMut(&str) -> Option<String>>>,
) -> Option<&'a mut dyn FnMut(&str) -> Option<String>> {
    match opt {
        Some(cb) => Some(&mut **cb),
        None => None,
    }
}
