use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::agent::AbortHandle;
use crate::agent::error::AgentError;
use crate::page::controller::{HorizontalScroll, PageController, VerticalScroll};

/// What a tool hands back to the loop: a history message, or task
/// termination.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Message(String),
    Done { success: bool, text: String },
}

/// Everything a tool may touch while it runs, bound to the agent for
/// the duration of one dispatch.
pub struct ToolCtx<'a> {
    pub controller: &'a mut PageController,
    pub abort: &'a AbortHandle,
    pub total_wait: &'a mut Duration,
    pub ask_user: Option<&'a mut dyn FnMut(&str) -> Option<String>>,
}

/// A named, schema-described action the model may choose on a step.
/// Input validation happens inside `execute` by deserializing into the
/// tool's typed input; a validation failure is a failed step, not a
/// failed task.
pub trait Tool {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError>;
}

fn parse_input<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T, AgentError> {
    serde_json::from_value(input)
        .map_err(|e| AgentError::Schema(format!("invalid input for tool '{}': {}", tool, e)))
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// done
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DoneInput {
    text: String,
    #[serde(default = "default_true")]
    success: bool,
}

pub struct DoneTool;

impl Tool for DoneTool {
    fn name(&self) -> &str {
        "done"
    }

    fn description(&self) -> &str {
        "Finish the task. Use when the user request is fully satisfied (success=true) \
         or cannot be completed (success=false). `text` is the final answer for the user."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"},
                "success": {"type": "boolean", "default": true}
            },
            "required": ["text"],
            "additionalProperties": false
        })
    }

    fn execute(&self, _ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: DoneInput = parse_input(self.name(), input)?;
        Ok(ToolOutcome::Done {
            success: input.success,
            text: input.text,
        })
    }
}

// ---------------------------------------------------------------------------
// wait
// ---------------------------------------------------------------------------

fn default_wait_seconds() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WaitInput {
    #[serde(default = "default_wait_seconds")]
    seconds: u64,
}

pub struct WaitTool;

impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Wait for the page to settle, e.g. after a submit that triggers loading. \
         Time already spent since the last page snapshot is subtracted."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": {"type": "integer", "minimum": 1, "maximum": 10, "default": 1}
            },
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: WaitInput = parse_input(self.name(), input)?;
        if !(1..=10).contains(&input.seconds) {
            return Err(AgentError::Schema(format!(
                "wait seconds must be between 1 and 10, got {}",
                input.seconds
            )));
        }

        let already_elapsed = ctx
            .controller
            .last_refresh_elapsed()
            .unwrap_or(Duration::ZERO);
        let remaining = Duration::from_secs(input.seconds).saturating_sub(already_elapsed);

        let mut slept = Duration::ZERO;
        while slept < remaining {
            ctx.abort.check()?;
            let slice = Duration::from_millis(100).min(remaining - slept);
            thread::sleep(slice);
            slept += slice;
        }
        *ctx.total_wait += slept;

        Ok(ToolOutcome::Message(format!(
            "Waited {:.1}s (requested {}s, {:.1}s had already passed since the last snapshot)",
            slept.as_secs_f32(),
            input.seconds,
            already_elapsed.as_secs_f32()
        )))
    }
}

// ---------------------------------------------------------------------------
// ask_user
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AskUserInput {
    question: String,
}

pub struct AskUserTool;

impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question when the task is ambiguous or needs \
         credentials. In non-interactive runs the question is recorded and the task continues."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"question": {"type": "string"}},
            "required": ["question"],
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: AskUserInput = parse_input(self.name(), input)?;
        if let Some(ask) = ctx.ask_user.as_mut() {
            if let Some(answer) = ask(&input.question) {
                return Ok(ToolOutcome::Message(format!("User replied: {}", answer)));
            }
        }
        Ok(ToolOutcome::Message(format!(
            "Question recorded for the user (non-interactive run, continuing): {}",
            input.question
        )))
    }
}

// ---------------------------------------------------------------------------
// navigate / go_back
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NavigateInput {
    url: String,
}

pub struct NavigateTool;

impl Tool for NavigateTool {
    fn name(&self) -> &str {
        "navigate"
    }

    fn description(&self) -> &str {
        "Navigate the current tab to a URL."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"url": {"type": "string"}},
            "required": ["url"],
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: NavigateInput = parse_input(self.name(), input)?;
        let result = ctx.controller.navigate(&input.url)?;
        Ok(ToolOutcome::Message(result.message))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GoBackInput {}

pub struct GoBackTool;

impl Tool for GoBackTool {
    fn name(&self) -> &str {
        "go_back"
    }

    fn description(&self) -> &str {
        "Go back one entry in the tab's history."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let _input: GoBackInput = parse_input(self.name(), input)?;
        let result = ctx.controller.go_back()?;
        Ok(ToolOutcome::Message(result.message))
    }
}

// ---------------------------------------------------------------------------
// click_element_by_index
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClickInput {
    index: u32,
}

pub struct ClickTool;

impl Tool for ClickTool {
    fn name(&self) -> &str {
        "click_element_by_index"
    }

    fn description(&self) -> &str {
        "Click the interactive element with the given index from the browser state."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"index": {"type": "integer", "minimum": 0}},
            "required": ["index"],
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: ClickInput = parse_input(self.name(), input)?;
        let result = ctx.controller.click(input.index)?;
        Ok(ToolOutcome::Message(result.message))
    }
}

// ---------------------------------------------------------------------------
// input_text
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InputTextInput {
    index: u32,
    text: String,
}

pub struct InputTextTool;

impl Tool for InputTextTool {
    fn name(&self) -> &str {
        "input_text"
    }

    fn description(&self) -> &str {
        "Clear the input element with the given index and type text into it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "index": {"type": "integer", "minimum": 0},
                "text": {"type": "string"}
            },
            "required": ["index", "text"],
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: InputTextInput = parse_input(self.name(), input)?;
        let result = ctx.controller.type_text(input.index, &input.text)?;
        Ok(ToolOutcome::Message(result.message))
    }
}

// ---------------------------------------------------------------------------
// select_dropdown_option
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectInput {
    index: u32,
    text: String,
}

pub struct SelectTool;

impl Tool for SelectTool {
    fn name(&self) -> &str {
        "select_dropdown_option"
    }

    fn description(&self) -> &str {
        "Select the option with the given visible label in the dropdown element \
         with the given index."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "index": {"type": "integer", "minimum": 0},
                "text": {"type": "string"}
            },
            "required": ["index", "text"],
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: SelectInput = parse_input(self.name(), input)?;
        let result = ctx.controller.select_option(input.index, &input.text)?;
        Ok(ToolOutcome::Message(result.message))
    }
}

// ---------------------------------------------------------------------------
// scroll / scroll_horizontally
// ---------------------------------------------------------------------------

fn default_num_pages() -> f64 {
    0.1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScrollInput {
    #[serde(default = "default_true")]
    down: bool,
    #[serde(default = "default_num_pages")]
    num_pages: f64,
    #[serde(default)]
    pixels: Option<u64>,
    #[serde(default)]
    index: Option<u32>,
}

pub struct ScrollTool;

impl Tool for ScrollTool {
    fn name(&self) -> &str {
        "scroll"
    }

    fn description(&self) -> &str {
        "Scroll the page (or, with `index`, a scrollable container) vertically. \
         `num_pages` is in viewport heights; `pixels` overrides it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "down": {"type": "boolean", "default": true},
                "num_pages": {"type": "number", "minimum": 0, "maximum": 10, "default": 0.1},
                "pixels": {"type": "integer", "minimum": 0},
                "index": {"type": "integer", "minimum": 0}
            },
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: ScrollInput = parse_input(self.name(), input)?;
        if !(0.0..=10.0).contains(&input.num_pages) {
            return Err(AgentError::Schema(format!(
                "num_pages must be between 0 and 10, got {}",
                input.num_pages
            )));
        }
        let result = ctx.controller.scroll_vertical(&VerticalScroll {
            down: input.down,
            num_pages: input.num_pages,
            pixels: input.pixels,
            index: input.index,
        })?;
        Ok(ToolOutcome::Message(result.message))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScrollHorizontalInput {
    #[serde(default = "default_true")]
    right: bool,
    pixels: u64,
    #[serde(default)]
    index: Option<u32>,
}

pub struct ScrollHorizontalTool;

impl Tool for ScrollHorizontalTool {
    fn name(&self) -> &str {
        "scroll_horizontally"
    }

    fn description(&self) -> &str {
        "Scroll the page (or, with `index`, a scrollable container) horizontally \
         by a number of pixels."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "right": {"type": "boolean", "default": true},
                "pixels": {"type": "integer", "minimum": 0},
                "index": {"type": "integer", "minimum": 0}
            },
            "required": ["pixels"],
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: ScrollHorizontalInput = parse_input(self.name(), input)?;
        let result = ctx.controller.scroll_horizontal(&HorizontalScroll {
            right: input.right,
            pixels: input.pixels,
            index: input.index,
        })?;
        Ok(ToolOutcome::Message(result.message))
    }
}

// ---------------------------------------------------------------------------
// execute_javascript (gated)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteJavascriptInput {
    script: String,
}

pub struct ExecuteJavascriptTool;

impl Tool for ExecuteJavascriptTool {
    fn name(&self) -> &str {
        "execute_javascript"
    }

    fn description(&self) -> &str {
        "Run JavaScript on the page and return its stringified result. \
         Last resort when no indexed element can express the interaction."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"script": {"type": "string"}},
            "required": ["script"],
            "additionalProperties": false
        })
    }

    fn execute(&self, ctx: &mut ToolCtx<'_>, input: Value) -> Result<ToolOutcome, AgentError> {
        let input: ExecuteJavascriptInput = parse_input(self.name(), input)?;
        let result = ctx.controller.exec_script(&input.script)?;
        Ok(ToolOutcome::Message(result.message))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered, mutable collection of the tools the model may call.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// The default vocabulary. The script-execution tool is registered
    /// only on explicit opt-in.
    pub fn defaults(enable_script_tool: bool) -> Self {
        let mut tools: Vec<Box<dyn Tool>> = vec![
            Box::new(DoneTool),
            Box::new(WaitTool),
            Box::new(AskUserTool),
            Box::new(NavigateTool),
            Box::new(GoBackTool),
            Box::new(ClickTool),
            Box::new(InputTextTool),
            Box::new(SelectTool),
            Box::new(ScrollTool),
            Box::new(ScrollHorizontalTool),
        ];
        if enable_script_tool {
            tools.push(Box::new(ExecuteJavascriptTool));
        }
        Self { tools }
    }

    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    /// Add a tool, replacing any existing tool of the same name in place.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if let Some(slot) = self
            .tools
            .iter_mut()
            .find(|existing| existing.name() == tool.name())
        {
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Remove a tool by name. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.tools.len();
        self.tools.retain(|tool| tool.name() != name);
        self.tools.len() != before
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(|boxed| boxed.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Discriminated union over the current tool set: each variant is a
    /// single-key object `{<name>: <input schema>}`. Rebuilt at step
    /// time so runtime registration and removal are honored.
    pub fn action_schema(&self) -> Value {
        let variants: Vec<Value> = self
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "object",
                    "properties": {tool.name(): tool.parameters_schema()},
                    "required": [tool.name()],
                    "additionalProperties": false
                })
            })
            .collect();
        json!({"anyOf": variants})
    }

    /// Tool documentation block for the system prompt.
    pub fn describe_for_prompt(&self) -> String {
        self.tools
            .iter()
            .map(|tool| {
                format!(
                    "- {}: {}\n  input schema: {}",
                    tool.name(),
                    tool.description(),
                    tool.parameters_schema()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
