use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::agent::error::AgentError;
use crate::browser::driver::PageDriver;
use crate::dom::extractor::DomExtractor;
use crate::dom::model::{DomNode, FlatSnapshot, NodeId, PageInfo};
use crate::dom::serializer::{SerializedDom, TreeSerializer};
use crate::util;

/// Outcome of one page action. `message` is what the model reads next
/// turn, so it names the element and says what happened.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Snapshot refresh notifications. Observers only; the snapshot is not
/// theirs to mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    BeforeUpdate,
    AfterUpdate { element_count: usize },
}

#[derive(Debug, Clone)]
pub struct VerticalScroll {
    pub down: bool,
    pub num_pages: f64,
    pub pixels: Option<u64>,
    pub index: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct HorizontalScroll {
    pub right: bool,
    pub pixels: u64,
    pub index: Option<u32>,
}

/// A drivable element of the current snapshot: the snapshot node plus
/// the marker-attribute selector that recovers its live handle.
#[derive(Debug, Clone)]
pub struct IndexedElement {
    pub node_id: NodeId,
    pub selector: String,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
}

/// Owns the latest snapshot of the page and dispatches indexed actions
/// against it. Handles die with the snapshot: every action resolves
/// its index against the maps built by the most recent `refresh`.
pub struct PageController {
    driver: Box<dyn PageDriver>,
    extractor: DomExtractor,
    serializer: TreeSerializer,
    snapshot: FlatSnapshot,
    page_info: Option<PageInfo>,
    selector_map: BTreeMap<u32, IndexedElement>,
    serialized: SerializedDom,
    previous_hashes: Option<HashSet<u64>>,
    last_refresh: Option<Instant>,
    script_execution_enabled: bool,
    observers: Vec<Box<dyn FnMut(&UpdateEvent)>>,
    disposed: bool,
}

impl PageController {
    pub fn new(
        driver: Box<dyn PageDriver>,
        viewport_expansion: i64,
        include_attributes: &[String],
        script_execution_enabled: bool,
    ) -> Self {
        Self {
            driver,
            extractor: DomExtractor::new(&util::short_id(), viewport_expansion),
            serializer: TreeSerializer::new(include_attributes),
            snapshot: FlatSnapshot::default(),
            page_info: None,
            selector_map: BTreeMap::new(),
            serialized: SerializedDom::default(),
            previous_hashes: None,
            last_refresh: None,
            script_execution_enabled,
            observers: Vec::new(),
            disposed: false,
        }
    }

    /// Register an observer for refresh events.
    pub fn on_update(&mut self, observer: Box<dyn FnMut(&UpdateEvent)>) {
        self.observers.push(observer);
    }

    fn notify(&mut self, event: UpdateEvent) {
        for observer in &mut self.observers {
            observer(&event);
        }
    }

    fn ensure_live(&self) -> Result<(), AgentError> {
        if self.disposed {
            Err(AgentError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Run the extractor, rebuild the serialization and the index maps,
    /// and replace the previous snapshot wholesale.
    pub fn refresh(&mut self) -> Result<(), AgentError> {
        self.ensure_live()?;
        self.notify(UpdateEvent::BeforeUpdate);

        let extraction = self.extractor.extract(self.driver.as_mut())?;
        let serialized = self
            .serializer
            .serialize(&extraction.snapshot, self.previous_hashes.as_ref());

        let mut selector_map = BTreeMap::new();
        for (index, element) in extraction.snapshot.interactive_nodes() {
            let node_id = extraction
                .snapshot
                .nodes
                .iter()
                .find_map(|(id, node)| match node {
                    DomNode::Element(el) if el.index == Some(index) => Some(id.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            selector_map.insert(
                index,
                IndexedElement {
                    node_id,
                    selector: self.extractor.handle_selector(index),
                    tag: element.tag.clone(),
                    attributes: element.attributes.clone(),
                },
            );
        }

        self.previous_hashes = Some(serialized.hashes.clone());
        self.snapshot = extraction.snapshot;
        self.page_info = Some(extraction.page_info);
        self.selector_map = selector_map;
        self.serialized = serialized;
        self.last_refresh = Some(Instant::now());

        self.notify(UpdateEvent::AfterUpdate {
            element_count: self.selector_map.len(),
        });
        Ok(())
    }

    fn resolve(&self, index: u32) -> Result<IndexedElement, AgentError> {
        self.selector_map
            .get(&index)
            .cloned()
            .ok_or(AgentError::UnknownIndex(index))
    }

    /// Friendly name for an element, from its rendered pseudo-HTML line.
    pub fn describe(&self, index: u32) -> String {
        self.serialized
            .line_for(index)
            .map(str::to_string)
            .unwrap_or_else(|| format!("with index {}", index))
    }

    fn scroll_into_view(&mut self, selector: &str) {
        let sel = serde_json::json!(selector);
        // Best-effort; a failed pre-scroll must not fail the action.
        let _ = self.driver.eval(&format!(
            "(() => {{ const el = document.querySelector({}); if (el) el.scrollIntoView({{block: \"center\"}}); }})()",
            sel
        ));
    }

    pub fn click(&mut self, index: u32) -> Result<ActionResult, AgentError> {
        self.ensure_live()?;
        let element = self.resolve(index)?;
        let opens_new_tab = element.tag == "a"
            && element.attributes.get("target").map(String::as_str) == Some("_blank");
        let description = self.describe(index);
        self.scroll_into_view(&element.selector);
        match self.driver.click(&element.selector) {
            Ok(()) => {
                let mut message = format!("Clicked element {}", description);
                if opens_new_tab {
                    message.push_str(
                        ". Warning: this link opens in a new tab, whose content is not visible to the agent; keep working in the current tab",
                    );
                }
                Ok(ActionResult::ok(message))
            }
            Err(e) => Ok(ActionResult::failed(format!(
                "Failed to click element {}: {}",
                description, e
            ))),
        }
    }

    pub fn type_text(&mut self, index: u32, text: &str) -> Result<ActionResult, AgentError> {
        self.ensure_live()?;
        let element = self.resolve(index)?;
        let description = self.describe(index);
        self.scroll_into_view(&element.selector);
        match self.driver.fill(&element.selector, text) {
            Ok(()) => Ok(ActionResult::ok(format!(
                "Typed \"{}\" into element {}",
                util::truncate_chars(text, 50),
                description
            ))),
            Err(e) => Ok(ActionResult::failed(format!(
                "Failed to type into element {}: {}",
                description, e
            ))),
        }
    }

    pub fn select_option(&mut self, index: u32, label: &str) -> Result<ActionResult, AgentError> {
        self.ensure_live()?;
        let element = self.resolve(index)?;
        let description = self.describe(index);
        if self.option_count(&element.node_id) == 0 {
            return Ok(ActionResult::ok(format!(
                "Selection skipped: element {} has no options",
                description
            )));
        }
        self.scroll_into_view(&element.selector);
        match self.driver.select_option(&element.selector, label) {
            Ok(true) => Ok(ActionResult::ok(format!(
                "Selected option \"{}\" in element {}",
                label, description
            ))),
            Ok(false) => Ok(ActionResult::failed(format!(
                "No option labelled \"{}\" in element {}",
                label, description
            ))),
            Err(e) => Ok(ActionResult::failed(format!(
                "Failed to select option in element {}: {}",
                description, e
            ))),
        }
    }

    fn option_count(&self, node_id: &str) -> usize {
        let Some(element) = self.snapshot.element(node_id) else {
            return 0;
        };
        let mut count = 0;
        let mut pending: Vec<&NodeId> = element.child_ids.iter().collect();
        while let Some(id) = pending.pop() {
            if let Some(child) = self.snapshot.element(id) {
                if child.tag == "option" {
                    count += 1;
                }
                pending.extend(child.child_ids.iter());
            }
        }
        count
    }

    pub fn scroll_vertical(&mut self, params: &VerticalScroll) -> Result<ActionResult, AgentError> {
        self.ensure_live()?;
        let viewport = self
            .page_info
            .map(|p| p.viewport_height)
            .unwrap_or(720) as f64;
        let magnitude = params
            .pixels
            .map(|p| p as f64)
            .unwrap_or(params.num_pages * viewport);
        let amount = if params.down { magnitude } else { -magnitude };

        if let Some(index) = params.index {
            let element = self.resolve(index)?;
            let description = self.describe(index);
            let delta = self.scroll_element(&element.selector, "scrollTop", amount)?;
            if delta.abs() > 0.5 {
                return Ok(ActionResult::ok(format!(
                    "Scrolled element {} vertically by {:.0} pixels",
                    description, delta
                )));
            }
            // The container did not move; scroll the window instead.
        }

        self.driver
            .eval(&format!("window.scrollBy(0, {})", amount))?;
        Ok(ActionResult::ok(format!(
            "Scrolled the page {} by {:.0} pixels",
            if params.down { "down" } else { "up" },
            magnitude
        )))
    }

    pub fn scroll_horizontal(
        &mut self,
        params: &HorizontalScroll,
    ) -> Result<ActionResult, AgentError> {
        self.ensure_live()?;
        let magnitude = params.pixels as f64;
        let amount = if params.right { magnitude } else { -magnitude };

        if let Some(index) = params.index {
            let element = self.resolve(index)?;
            let description = self.describe(index);
            let delta = self.scroll_element(&element.selector, "scrollLeft", amount)?;
            if delta.abs() > 0.5 {
                return Ok(ActionResult::ok(format!(
                    "Scrolled element {} horizontally by {:.0} pixels",
                    description, delta
                )));
            }
        }

        self.driver
            .eval(&format!("window.scrollBy({}, 0)", amount))?;
        Ok(ActionResult::ok(format!(
            "Scrolled the page {} by {:.0} pixels",
            if params.right { "right" } else { "left" },
            magnitude
        )))
    }

    fn scroll_element(
        &mut self,
        selector: &str,
        property: &str,
        amount: f64,
    ) -> Result<f64, AgentError> {
        let sel = serde_json::json!(selector);
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return null; \
             const before = el.{prop}; el.{prop} = before + ({amount}); return el.{prop} - before; }})()",
            sel = sel,
            prop = property,
            amount = amount
        );
        let value = self.driver.eval(&script)?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    /// Evaluate caller-supplied script on the page. Disabled unless the
    /// agent was configured with the script-execution tool.
    pub fn exec_script(&mut self, source: &str) -> Result<ActionResult, AgentError> {
        self.ensure_live()?;
        if !self.script_execution_enabled {
            return Err(AgentError::Config(
                "script execution is disabled; enable it explicitly in the agent config".into(),
            ));
        }
        let script = format!("(async () => {{ {} }})()", source);
        match self.driver.eval(&script) {
            Ok(Value::String(s)) => Ok(ActionResult::ok(format!("Script returned: {}", s))),
            Ok(Value::Null) => Ok(ActionResult::ok("Script ran and returned nothing")),
            Ok(value) => Ok(ActionResult::ok(format!("Script returned: {}", value))),
            Err(e) => Ok(ActionResult::failed(format!("Script failed: {}", e))),
        }
    }

    pub fn navigate(&mut self, url: &str) -> Result<ActionResult, AgentError> {
        self.ensure_live()?;
        match self.driver.navigate(url) {
            Ok(()) => Ok(ActionResult::ok(format!("Navigated to {}", url))),
            Err(e) => Ok(ActionResult::failed(format!(
                "Failed to navigate to {}: {}",
                url, e
            ))),
        }
    }

    pub fn go_back(&mut self) -> Result<ActionResult, AgentError> {
        self.ensure_live()?;
        match self.driver.eval("history.back()") {
            Ok(_) => Ok(ActionResult::ok("Navigated back in history")),
            Err(e) => Ok(ActionResult::failed(format!("Failed to go back: {}", e))),
        }
    }

    pub fn url(&mut self) -> Result<String, AgentError> {
        self.ensure_live()?;
        self.driver.url()
    }

    pub fn title(&mut self) -> Result<String, AgentError> {
        self.ensure_live()?;
        self.driver.title()
    }

    pub fn page_info(&self) -> Option<PageInfo> {
        self.page_info
    }

    pub fn serialized_html(&self) -> &str {
        &self.serialized.html
    }

    pub fn element_count(&self) -> usize {
        self.selector_map.len()
    }

    pub fn element_text(&self, index: u32) -> Option<&str> {
        self.serialized.line_for(index)
    }

    pub fn selector_map(&self) -> &BTreeMap<u32, IndexedElement> {
        &self.selector_map
    }

    pub fn last_refresh_elapsed(&self) -> Option<Duration> {
        self.last_refresh.map(|at| at.elapsed())
    }

    /// Drop the snapshot and release the page. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.snapshot = FlatSnapshot::default();
        self.page_info = None;
        self.selector_map.clear();
        self.serialized = SerializedDom::default();
        self.previous_hashes = None;
        let _ = self.driver.close();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
