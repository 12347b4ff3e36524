use chrono::{SecondsFormat, Utc};

use crate::agent::history::HistoryEntry;
use crate::agent::tools::ToolRegistry;
use crate::dom::model::PageInfo;

/// Fixed system prompt. `{language}` is substituted from the agent
/// config, `{tools}` from the registry at step time.
const SYSTEM_PROMPT: &str = r#"You are an AI agent that completes tasks in a web browser on behalf of a user.

<input>
At every step you receive:
1. <agent_history>: your previous steps with their evaluations, memory notes, goals and action results.
2. <agent_state>: the immutable <user_request> and a <step_info> block with the current step number and timestamp.
3. <browser_state>: the current URL and title, a one-line page geometry summary, and the visible page content.

Page content is rendered as indented pseudo-HTML. Interactive elements look like:
	[12]<button type=submit>Sign in />
The number in square brackets is the element's index. Indices are the ONLY way to address elements; they are reassigned on every step, so never reuse an index from an earlier step. A line starting with * marks an element that is new since the previous step. Lines without an index are plain page text and cannot be interacted with. An element annotated with data-scrollable has its own scroll container.
</input>

<browser_rules>
- Interact only with elements that have an index in the CURRENT browser state.
- One action per step. After every action the page may change and you will see a fresh state.
- If the content you need is not visible, scroll or use the element's scroll container before assuming it does not exist.
- Typing into a field replaces its current content.
- Links that open a new tab take their content out of your sight; prefer same-tab navigation when possible.
- If an action fails, read the result message, re-examine the new state and try a different approach instead of repeating the same action.
- Do not wait repeatedly: pages settle quickly, and waiting burns steps.
</browser_rules>

<reasoning_rules>
- In evaluation_previous_goal, judge honestly whether your last action achieved its goal, using the action result and the new browser state as evidence.
- In memory, keep short notes of progress and facts you must not forget (values seen, pages visited, remaining sub-tasks).
- In next_goal, state the single concrete thing the next action should achieve.
- Call done as soon as the user request is satisfied, with the answer in text. If the task proves impossible, call done with success=false and explain why.
</reasoning_rules>

<available_tools>
{tools}
</available_tools>

<output>
Respond with a single JSON object, no prose around it:
{
  "evaluation_previous_goal": "...",
  "memory": "...",
  "next_goal": "...",
  "action": {"<tool_name>": { ...tool input... }}
}
The action object must contain exactly one tool. Write all free text in {language}.
</output>"#;

/// Composes the system prompt and the per-step user prompt from the
/// task, the history and the freshly refreshed browser state.
pub struct PromptAssembler {
    working_language: String,
}

impl PromptAssembler {
    pub fn new(working_language: &str) -> Self {
        Self {
            working_language: working_language.to_string(),
        }
    }

    pub fn system_prompt(&self, registry: &ToolRegistry) -> String {
        SYSTEM_PROMPT
            .replace("{tools}", &registry.describe_for_prompt())
            .replace("{language}", &self.working_language)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn user_prompt(
        &self,
        task: &str,
        history: &[HistoryEntry],
        step: usize,
        max_steps: usize,
        url: &str,
        title: &str,
        page_info: Option<PageInfo>,
        dom_html: &str,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str("<agent_history>\n");
        if history.is_empty() {
            prompt.push_str("(no steps taken yet)\n");
        }
        for (i, entry) in history.iter().enumerate() {
            let n = i + 1;
            prompt.push_str(&format!("<step_{}>\n", n));
            prompt.push_str(&format!(
                "Evaluation of Previous Step: {}\n",
                entry.brain.evaluation_previous_goal.as_deref().unwrap_or("-")
            ));
            prompt.push_str(&format!(
                "Memory: {}\n",
                entry.brain.memory.as_deref().unwrap_or("-")
            ));
            prompt.push_str(&format!(
                "Next Goal: {}\n",
                entry.brain.next_goal.as_deref().unwrap_or("-")
            ));
            prompt.push_str(&format!(
                "Action Result: [{}] {}\n",
                entry.action.name, entry.action.output
            ));
            prompt.push_str(&format!("</step_{}>\n", n));
        }
        prompt.push_str("</agent_history>\n");

        prompt.push_str("<agent_state>\n<user_request>\n");
        prompt.push_str(task);
        prompt.push_str("\n</user_request>\n<step_info>\n");
        prompt.push_str(&format!("Step {} of {} max possible steps\n", step, max_steps));
        prompt.push_str(&format!(
            "Current date and time: {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        prompt.push_str("</step_info>\n</agent_state>\n");

        prompt.push_str("<browser_state>\n");
        prompt.push_str(&format!("Current URL: {}\nCurrent Title: {}\n", url, title));
        if let Some(info) = page_info {
            prompt.push_str(&format!("{}\n", format_page_summary(&info)));
            prompt.push_str(&format!("{}\n", format_page_header(&info)));
        }
        if dom_html.is_empty() {
            prompt.push_str("(the page has no visible content)\n");
        } else {
            prompt.push_str(dom_html);
            prompt.push('\n');
        }
        if let Some(info) = page_info {
            prompt.push_str(&format!("{}\n", format_page_footer(&info)));
        }
        prompt.push_str("</browser_state>");

        prompt
    }
}

pub fn format_page_summary(info: &PageInfo) -> String {
    format!(
        "Page info: {}x{}px viewport, {}x{}px total page size, {:.1} pages above, {:.1} pages below, {:.1} total pages, at {:.0}% of page",
        info.viewport_width,
        info.viewport_height,
        info.page_width,
        info.page_height,
        info.pages_above,
        info.pages_below,
        info.total_pages,
        info.current_page_position * 100.0
    )
}

pub fn format_page_header(info: &PageInfo) -> String {
    if info.pixels_above > 0 {
        format!(
            "... {} pixels above ({:.1} pages) - scroll to see more ...",
            info.pixels_above, info.pages_above
        )
    } else {
        "[Start of page]".to_string()
    }
}

pub fn format_page_footer(info: &PageInfo) -> String {
    if info.pixels_below > 0 {
        format!(
            "... {} pixels below ({:.1} pages) - scroll to see more ...",
            info.pixels_below, info.pages_below
        )
    } else {
        "[End of page]".to_string()
    }
}
