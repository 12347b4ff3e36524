use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::{json, Value};

use page_pilot::agent::error::AgentError;
use page_pilot::browser::driver::PageDriver;

use crate::common::snapshots::empty_page;

/// Shareable action log so tests keep visibility after the driver is
/// moved into the controller.
#[derive(Clone, Default)]
pub struct DriverLog(Rc<RefCell<Vec<String>>>);

impl DriverLog {
    pub fn push(&self, entry: String) {
        self.0.borrow_mut().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.borrow().iter().any(|e| e.contains(needle))
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.0.borrow().iter().filter(|e| e.contains(needle)).count()
    }
}

/// Scripted `PageDriver`: serves canned extraction payloads (the last
/// one repeats, like a static page) and records every action. No
/// browser, no sidecar.
pub struct FakeDriver {
    payloads: VecDeque<Value>,
    current: Option<Value>,
    url: Rc<RefCell<String>>,
    title: String,
    log: DriverLog,
    pub element_scroll_delta: f64,
    pub select_result: bool,
    pub fail_clicks: bool,
}

impl FakeDriver {
    pub fn new(payloads: Vec<Value>) -> Self {
        Self {
            payloads: payloads.into_iter().collect(),
            current: None,
            url: Rc::new(RefCell::new("https://example.com/".to_string())),
            title: "Example".to_string(),
            log: DriverLog::default(),
            element_scroll_delta: 100.0,
            select_result: true,
            fail_clicks: false,
        }
    }

    pub fn log_handle(&self) -> DriverLog {
        self.log.clone()
    }

    pub fn url_handle(&self) -> Rc<RefCell<String>> {
        Rc::clone(&self.url)
    }

    fn next_payload(&mut self) -> Value {
        if let Some(next) = self.payloads.pop_front() {
            self.current = Some(next);
        }
        self.current.clone().unwrap_or_else(empty_page)
    }
}

impl PageDriver for FakeDriver {
    fn navigate(&mut self, url: &str) -> Result<(), AgentError> {
        self.log.push(format!("navigate {}", url));
        *self.url.borrow_mut() = url.to_string();
        Ok(())
    }

    fn eval(&mut self, script: &str) -> Result<Value, AgentError> {
        if script.starts_with("(function") {
            self.log.push("extract".to_string());
            return Ok(self.next_payload());
        }
        if script.contains("scrollIntoView") {
            self.log.push("scroll_into_view".to_string());
            return Ok(Value::Null);
        }
        if script.contains("window.scrollBy") {
            self.log.push(format!("eval {}", script));
            return Ok(Value::Null);
        }
        if script.contains("scrollTop") || script.contains("scrollLeft") {
            self.log.push(format!("element_scroll {}", script));
            return Ok(json!(self.element_scroll_delta));
        }
        if script.contains("history.back") {
            self.log.push("go_back".to_string());
            return Ok(Value::Null);
        }
        if script.starts_with("(async") {
            self.log.push(format!("exec_script {}", script));
            return Ok(json!("script-result"));
        }
        self.log.push(format!("eval {}", script));
        Ok(Value::Null)
    }

    fn click(&mut self, selector: &str) -> Result<(), AgentError> {
        if self.fail_clicks {
            return Err(AgentError::Action {
                action: "click".to_string(),
                message: "element detached".to_string(),
            });
        }
        self.log.push(format!("click {}", selector));
        Ok(())
    }

    fn fill(&mut self, selector: &str, text: &str) -> Result<(), AgentError> {
        self.log.push(format!("fill {} {}", selector, text));
        Ok(())
    }

    fn select_option(&mut self, selector: &str, label: &str) -> Result<bool, AgentError> {
        self.log.push(format!("select {} {}", selector, label));
        Ok(self.select_result)
    }

    fn url(&mut self) -> Result<String, AgentError> {
        Ok(self.url.borrow().clone())
    }

    fn title(&mut self) -> Result<String, AgentError> {
        Ok(self.title.clone())
    }

    fn close(&mut self) -> Result<(), AgentError> {
        self.log.push("close".to_string());
        Ok(())
    }
}
