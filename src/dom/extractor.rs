use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::agent::error::AgentError;
use crate::browser::driver::PageDriver;
use crate::dom::model::{DomNode, FlatSnapshot, NodeId, PageInfo, PageMetrics};

/// In-page extraction script, embedded at compile time so the walk and
/// its classification rules live in one reviewable file.
const EXTRACT_SCRIPT: &str = include_str!("extract.js");

/// Wire shape returned by the extraction script.
#[derive(Debug, Deserialize)]
struct ExtractPayload {
    root_id: Option<NodeId>,
    nodes: HashMap<NodeId, DomNode>,
    page_info: PageMetrics,
}

/// One extraction pass: the flattened snapshot plus page geometry.
#[derive(Debug)]
pub struct Extraction {
    pub snapshot: FlatSnapshot,
    pub page_info: PageInfo,
}

/// Runs the extraction script in the page's own scripting context and
/// decodes the flat node map it returns. Elements that qualify for an
/// index are stamped with a marker attribute on the live DOM so the
/// controller can recover handles for them afterwards.
pub struct DomExtractor {
    marker_attr: String,
    viewport_expansion: i64,
}

impl DomExtractor {
    /// `namespace` keeps this agent's markers distinct from any other
    /// agent driving the same page. `viewport_expansion`: -1 = whole
    /// page, 0 = viewport only, positive = viewport padded by N px.
    pub fn new(namespace: &str, viewport_expansion: i64) -> Self {
        Self {
            marker_attr: format!("data-pilot-{}-index", namespace),
            viewport_expansion,
        }
    }

    pub fn marker_attr(&self) -> &str {
        &self.marker_attr
    }

    pub fn viewport_expansion(&self) -> i64 {
        self.viewport_expansion
    }

    /// CSS selector recovering the live element behind `index`.
    pub fn handle_selector(&self, index: u32) -> String {
        format!("[{}=\"{}\"]", self.marker_attr, index)
    }

    /// The parameterized script, ready for one `eval` round-trip.
    pub fn script(&self) -> String {
        format!(
            "{}({}, {})",
            EXTRACT_SCRIPT.trim_end(),
            serde_json::json!(self.marker_attr),
            self.viewport_expansion
        )
    }

    pub fn extract(&self, driver: &mut dyn PageDriver) -> Result<Extraction, AgentError> {
        let raw: Value = driver.eval(&self.script())?;
        let payload: ExtractPayload =
            serde_json::from_value(raw).map_err(|e| AgentError::Json {
                context: "decoding the extraction payload".into(),
                source: e,
            })?;
        if let Some(root) = &payload.root_id {
            crate::util::ensure(
                payload.nodes.contains_key(root),
                "root node missing from node map",
            )?;
        }
        Ok(Extraction {
            snapshot: FlatSnapshot {
                root_id: payload.root_id,
                nodes: payload.nodes,
            },
            page_info: PageInfo::from_metrics(payload.page_info),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_embeds_parameters() {
        let extractor = DomExtractor::new("ab12cd", -1);
        let script = extractor.script();
        assert!(script.starts_with("(function"));
        assert!(script.ends_with("(\"data-pilot-ab12cd-index\", -1)"));
    }

    #[test]
    fn handle_selector_shape() {
        let extractor = DomExtractor::new("ab12cd", 0);
        assert_eq!(
            extractor.handle_selector(7),
            "[data-pilot-ab12cd-index=\"7\"]"
        );
    }

    #[test]
    fn script_covers_classification_rules() {
        // The embedded walk must carry the full interactivity surface.
        for needle in [
            "contenteditable",
            "elementFromPoint",
            "scrollHeight",
            "removeAttribute",
            "checkbox",
        ] {
            assert!(EXTRACT_SCRIPT.contains(needle), "missing {}", needle);
        }
    }
}
