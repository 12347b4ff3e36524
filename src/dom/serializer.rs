use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

use crate::dom::model::{DomNode, ElementNode, FlatSnapshot, ScrollInfo};
use crate::util::truncate_chars;

/// Attribute allow-list, in emission (and dedup-priority) order.
pub const DEFAULT_ATTRIBUTES: &[&str] = &[
    "title",
    "type",
    "checked",
    "name",
    "role",
    "value",
    "placeholder",
    "data-date-format",
    "alt",
    "aria-label",
    "aria-expanded",
    "data-state",
    "aria-checked",
    "id",
    "for",
    "target",
    "aria-haspopup",
    "aria-controls",
    "aria-owns",
];

const MAX_ATTR_CHARS: usize = 20;
const MAX_TEXT_CHARS: usize = 100;

/// Rendered snapshot: the indented pseudo-HTML, the index → line map
/// used for friendly action messages, and the per-element identity
/// hashes used to mark new elements on the next pass.
#[derive(Debug, Default)]
pub struct SerializedDom {
    pub html: String,
    pub element_text: BTreeMap<u32, String>,
    pub hashes: HashSet<u64>,
}

impl SerializedDom {
    pub fn line_for(&self, index: u32) -> Option<&str> {
        self.element_text.get(&index).map(String::as_str)
    }
}

/// Renders a `FlatSnapshot` as indented pseudo-HTML for the model.
/// One line per indexed element; bare text lines only outside indexed
/// subtrees; descendant text folded into the nearest indexed ancestor.
pub struct TreeSerializer {
    attribute_order: Vec<String>,
}

impl TreeSerializer {
    /// `extra_attributes` extends the default allow-list; duplicates
    /// are ignored, order of extras follows the caller.
    pub fn new(extra_attributes: &[String]) -> Self {
        let mut attribute_order: Vec<String> =
            DEFAULT_ATTRIBUTES.iter().map(|s| s.to_string()).collect();
        for extra in extra_attributes {
            if !attribute_order.iter().any(|a| a == extra) {
                attribute_order.push(extra.clone());
            }
        }
        Self { attribute_order }
    }

    /// `previous_hashes`, when given, marks elements absent from the
    /// prior snapshot with a `*` prefix.
    pub fn serialize(
        &self,
        snapshot: &FlatSnapshot,
        previous_hashes: Option<&HashSet<u64>>,
    ) -> SerializedDom {
        let mut out = SerializedDom::default();
        let mut lines: Vec<String> = Vec::new();
        if let Some(root) = &snapshot.root_id {
            self.walk(snapshot, root, 0, false, previous_hashes, &mut lines, &mut out);
        }
        out.html = lines.join("\n");
        out
    }

    fn walk(
        &self,
        snapshot: &FlatSnapshot,
        id: &str,
        depth: usize,
        under_indexed: bool,
        previous: Option<&HashSet<u64>>,
        lines: &mut Vec<String>,
        out: &mut SerializedDom,
    ) {
        let Some(element) = snapshot.element(id) else {
            return;
        };

        if element.interactive {
            if let Some(index) = element.index {
                let text = self.folded_text(snapshot, element);
                let line = self.render_line(index, element, &text);
                let hash = element_identity(element, &text);
                let is_new = previous.is_some_and(|prev| !prev.contains(&hash));
                out.hashes.insert(hash);
                let marker = if is_new { "*" } else { "" };
                lines.push(format!("{}{}{}", "\t".repeat(depth), marker, line));
                out.element_text.insert(index, line);

                // Text children are already folded into this line; only
                // element children continue the walk, one level deeper.
                for child in &element.child_ids {
                    self.walk(snapshot, child, depth + 1, true, previous, lines, out);
                }
                return;
            }
        }

        for child in &element.child_ids {
            match snapshot.nodes.get(child) {
                Some(DomNode::Text(text_node)) => {
                    if !under_indexed && element.visible && element.topmost {
                        lines.push(format!(
                            "{}{}",
                            "\t".repeat(depth),
                            truncate_chars(&text_node.text, MAX_TEXT_CHARS)
                        ));
                    }
                }
                Some(DomNode::Element(_)) => {
                    self.walk(snapshot, child, depth, under_indexed, previous, lines, out);
                }
                None => {}
            }
        }
    }

    /// Descendant text of an indexed element, collected until another
    /// indexed element is reached (that subtree is skipped).
    fn folded_text(&self, snapshot: &FlatSnapshot, element: &ElementNode) -> String {
        let mut parts: Vec<String> = Vec::new();
        self.collect_text(snapshot, element, &mut parts);
        truncate_chars(parts.join(" ").trim(), MAX_TEXT_CHARS)
    }

    fn collect_text(&self, snapshot: &FlatSnapshot, element: &ElementNode, parts: &mut Vec<String>) {
        for child in &element.child_ids {
            match snapshot.nodes.get(child) {
                Some(DomNode::Text(text_node)) => {
                    if text_node.visible {
                        parts.push(text_node.text.clone());
                    }
                }
                Some(DomNode::Element(child_el)) => {
                    if !(child_el.interactive && child_el.index.is_some()) {
                        self.collect_text(snapshot, child_el, parts);
                    }
                }
                None => {}
            }
        }
    }

    fn render_line(&self, index: u32, element: &ElementNode, text: &str) -> String {
        let mut attrs = String::new();
        for (name, value) in self.filter_attributes(element, text) {
            attrs.push(' ');
            attrs.push_str(&name);
            attrs.push('=');
            attrs.push_str(&value);
        }
        if let Some(annotation) = scrollable_annotation(element.scroll_info.as_ref()) {
            attrs.push(' ');
            attrs.push_str(&annotation);
        }
        format!("[{}]<{}{}>{} />", index, element.tag, attrs, text)
    }

    fn filter_attributes(&self, element: &ElementNode, text: &str) -> Vec<(String, String)> {
        let mut kept: Vec<(String, String)> = Vec::new();
        let mut seen_values: HashSet<String> = HashSet::new();
        let trimmed_text = text.trim();

        for name in &self.attribute_order {
            let Some(value) = element.attributes.get(name) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            if value.chars().count() > 5 && !seen_values.insert(value.clone()) {
                continue;
            }
            if name == "role" && value == &element.tag {
                continue;
            }
            if matches!(name.as_str(), "aria-label" | "placeholder" | "title")
                && value.trim().eq_ignore_ascii_case(trimmed_text)
            {
                continue;
            }
            kept.push((name.clone(), truncate_chars(value, MAX_ATTR_CHARS)));
        }
        kept
    }
}

/// Identity hash for cross-snapshot "new element" detection: the tag,
/// the raw attribute snapshot, and the folded text.
fn element_identity(element: &ElementNode, text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    element.tag.hash(&mut hasher);
    for (name, value) in &element.attributes {
        name.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    text.hash(&mut hasher);
    hasher.finish()
}

fn scrollable_annotation(scroll_info: Option<&ScrollInfo>) -> Option<String> {
    let info = scroll_info?;
    if !info.is_scrollable() {
        return None;
    }
    let mut sides: Vec<String> = Vec::new();
    for (label, amount) in [
        ("left", info.left),
        ("top", info.top),
        ("right", info.right),
        ("bottom", info.bottom),
    ] {
        if amount != 0 {
            sides.push(format!("{}={}", label, amount));
        }
    }
    Some(format!("data-scrollable=\"{}\"", sides.join(", ")))
}
