use serde_json::json;

use page_pilot::dom::serializer::{TreeSerializer, DEFAULT_ATTRIBUTES};

use crate::common::snapshots::{
    el, interactive, payload, simple_page, snapshot_from, text,
};

mod common;

fn serialize(payload: &serde_json::Value) -> page_pilot::dom::serializer::SerializedDom {
    TreeSerializer::new(&[]).serialize(&snapshot_from(payload), None)
}

// =========================================================================
// Line emission
// =========================================================================

#[test]
fn one_line_per_indexed_element() {
    let rendered = serialize(&simple_page());
    let indexed: Vec<&str> = rendered
        .html
        .lines()
        .filter(|l| l.trim_start().starts_with('['))
        .collect();
    assert_eq!(indexed.len(), 1);
    assert!(indexed[0].contains("[0]<a"));
    assert_eq!(rendered.element_text.len(), 1);
    assert_eq!(rendered.line_for(0), Some("[0]<a>more />"));
}

#[test]
fn bare_text_emitted_outside_indexed_subtrees() {
    let rendered = serialize(&simple_page());
    let lines: Vec<&str> = rendered.html.lines().collect();
    // "Example" lives under a plain h1, so it is a bare line;
    // "more" is folded into the link and must not appear on its own.
    assert!(lines.contains(&"Example"));
    assert!(!lines.contains(&"more"));
    assert!(rendered.html.contains("[0]<a>more />"));
}

#[test]
fn text_under_invisible_parent_is_not_emitted() {
    let page = payload(
        "n2",
        json!({
            "n0": text("secret"),
            "n1": {"kind": "element", "tag": "div", "child_ids": ["n0"],
                   "visible": false, "topmost": false, "in_viewport": false},
            "n2": el("body", &["n1"])
        }),
    );
    let rendered = serialize(&page);
    assert!(!rendered.html.contains("secret"));
}

#[test]
fn text_under_non_topmost_parent_is_not_emitted() {
    let page = payload(
        "n2",
        json!({
            "n0": text("covered"),
            "n1": {"kind": "element", "tag": "div", "child_ids": ["n0"],
                   "visible": true, "topmost": false, "in_viewport": true},
            "n2": el("body", &["n1"])
        }),
    );
    let rendered = serialize(&page);
    assert!(!rendered.html.contains("covered"));
}

#[test]
fn depth_increments_only_inside_indexed_ancestors() {
    // body > form(0) > div > button(1): button renders one tab deep.
    let page = payload(
        "n4",
        json!({
            "n0": text("Send"),
            "n1": interactive("button", 1, json!({"type": "submit"}), &["n0"]),
            "n2": el("div", &["n1"]),
            "n3": interactive("form", 0, json!({}), &["n2"]),
            "n4": el("body", &["n3"])
        }),
    );
    let rendered = serialize(&page);
    let lines: Vec<&str> = rendered.html.lines().collect();
    // The button's text belongs to the button, not the form.
    assert_eq!(lines[0], "[0]<form> />");
    assert_eq!(lines[1], "\t[1]<button type=submit>Send />");
}

// =========================================================================
// Text folding
// =========================================================================

#[test]
fn folding_stops_at_nested_indexed_elements() {
    // <div[0]>intro <a[1]>inner</a> outro</div>
    let page = payload(
        "n5",
        json!({
            "n0": text("intro"),
            "n1": text("inner"),
            "n2": interactive("a", 1, json!({"href": "/i"}), &["n1"]),
            "n3": text("outro"),
            "n4": interactive("div", 0, json!({"role": "button"}), &["n0", "n2", "n3"]),
            "n5": el("body", &["n4"])
        }),
    );
    let rendered = serialize(&page);
    let outer = rendered.line_for(0).unwrap();
    assert!(outer.contains("intro outro"));
    assert!(!outer.contains("inner"));
    let nested = rendered.line_for(1).unwrap();
    assert!(nested.contains("inner"));
}

#[test]
fn folding_descends_through_plain_children() {
    // Text inside a span inside the indexed link still lands on the line.
    let page = payload(
        "n3",
        json!({
            "n0": text("deep label"),
            "n1": el("span", &["n0"]),
            "n2": interactive("a", 0, json!({"href": "/d"}), &["n1"]),
            "n3": el("body", &["n2"])
        }),
    );
    let rendered = serialize(&page);
    assert_eq!(rendered.line_for(0), Some("[0]<a>deep label />"));
}

#[test]
fn invisible_text_is_not_folded() {
    let page = payload(
        "n2",
        json!({
            "n0": {"kind": "text", "text": "ghost", "visible": false},
            "n1": interactive("button", 0, json!({}), &["n0"]),
            "n2": el("body", &["n1"])
        }),
    );
    let rendered = serialize(&page);
    assert_eq!(rendered.line_for(0), Some("[0]<button> />"));
}

// =========================================================================
// Attribute filtering
// =========================================================================

#[test]
fn non_allowlisted_attributes_are_dropped() {
    let rendered = serialize(&simple_page());
    assert!(!rendered.html.contains("href"));
}

#[test]
fn caller_supplied_attributes_extend_the_allowlist() {
    let serializer = TreeSerializer::new(&["href".to_string()]);
    let rendered = serializer.serialize(&snapshot_from(&simple_page()), None);
    assert!(rendered.html.contains("href=/x"));
}

#[test]
fn empty_values_are_dropped() {
    let page = payload(
        "n1",
        json!({
            "n0": interactive("input", 0, json!({"type": "text", "placeholder": "   "}), &[]),
            "n1": el("body", &["n0"])
        }),
    );
    let rendered = serialize(&page);
    assert_eq!(rendered.line_for(0), Some("[0]<input type=text> />"));
}

#[test]
fn long_values_are_deduplicated_in_allowlist_order() {
    // title comes before aria-label in the allow-list, so it wins.
    let page = payload(
        "n1",
        json!({
            "n0": interactive("button", 0,
                json!({"title": "Save document", "aria-label": "Save document"}), &[]),
            "n1": el("body", &["n0"])
        }),
    );
    let rendered = serialize(&page);
    let line = rendered.line_for(0).unwrap();
    assert!(line.contains("title=Save document"));
    assert!(!line.contains("aria-label"));
}

#[test]
fn short_duplicate_values_are_kept() {
    let page = payload(
        "n1",
        json!({
            "n0": interactive("input", 0, json!({"type": "text", "value": "text"}), &[]),
            "n1": el("body", &["n0"])
        }),
    );
    let rendered = serialize(&page);
    let line = rendered.line_for(0).unwrap();
    assert!(line.contains("type=text"));
    assert!(line.contains("value=text"));
}

#[test]
fn role_equal_to_tag_is_dropped() {
    let page = payload(
        "n1",
        json!({
            "n0": interactive("button", 0, json!({"role": "button", "name": "save"}), &[]),
            "n1": el("body", &["n0"])
        }),
    );
    let rendered = serialize(&page);
    let line = rendered.line_for(0).unwrap();
    assert!(!line.contains("role="));
    assert!(line.contains("name=save"));
}

#[test]
fn label_attributes_equal_to_text_are_dropped() {
    let page = payload(
        "n2",
        json!({
            "n0": text("Submit"),
            "n1": interactive("button", 0, json!({"aria-label": "submit"}), &["n0"]),
            "n2": el("body", &["n1"])
        }),
    );
    let rendered = serialize(&page);
    assert_eq!(rendered.line_for(0), Some("[0]<button>Submit />"));
}

#[test]
fn retained_values_are_truncated_to_twenty_chars() {
    let page = payload(
        "n1",
        json!({
            "n0": interactive("input", 0,
                json!({"placeholder": "Search for anything you can imagine"}), &[]),
            "n1": el("body", &["n0"])
        }),
    );
    let rendered = serialize(&page);
    let line = rendered.line_for(0).unwrap();
    assert!(line.contains("placeholder=Search for anything …"));
}

#[test]
fn default_allowlist_order_is_stable() {
    assert_eq!(DEFAULT_ATTRIBUTES[0], "title");
    assert!(DEFAULT_ATTRIBUTES.contains(&"aria-label"));
    assert!(DEFAULT_ATTRIBUTES.contains(&"target"));
}

// =========================================================================
// Scrollable annotation
// =========================================================================

#[test]
fn scrollable_annotation_lists_only_nonzero_sides() {
    let page = payload(
        "n1",
        json!({
            "n0": {"kind": "element", "tag": "div", "attributes": {"role": "listbox"},
                   "child_ids": [], "visible": true, "topmost": true, "in_viewport": true,
                   "interactive": true, "index": 0,
                   "scroll_info": {"top": 120, "bottom": 480}},
            "n1": el("body", &["n0"])
        }),
    );
    let rendered = serialize(&page);
    let line = rendered.line_for(0).unwrap();
    assert!(line.contains("data-scrollable=\"top=120, bottom=480\""));
    assert!(!line.contains("left="));
}

// =========================================================================
// New-element marker and idempotence
// =========================================================================

#[test]
fn new_elements_are_starred_on_the_next_snapshot() {
    let serializer = TreeSerializer::new(&[]);
    let first = serializer.serialize(&snapshot_from(&simple_page()), None);
    assert!(!first.html.contains('*'));

    // Same page plus a freshly appeared button.
    let second_page = payload(
        "n6",
        json!({
            "n0": text("Example"),
            "n1": el("h1", &["n0"]),
            "n2": text("more"),
            "n3": interactive("a", 0, json!({"href": "/x"}), &["n2"]),
            "n4": text("Accept"),
            "n5": interactive("button", 1, json!({"type": "button"}), &["n4"]),
            "n6": el("body", &["n1", "n3", "n5"])
        }),
    );
    let second = serializer.serialize(&snapshot_from(&second_page), Some(&first.hashes));
    let lines: Vec<&str> = second.html.lines().collect();
    assert!(lines.iter().any(|l| l.starts_with("*[1]<button")));
    assert!(lines.iter().any(|l| l.starts_with("[0]<a")));
}

#[test]
fn serialization_is_idempotent_on_a_static_page() {
    let serializer = TreeSerializer::new(&[]);
    let snapshot = snapshot_from(&simple_page());
    let first = serializer.serialize(&snapshot, None);
    let second = serializer.serialize(&snapshot, Some(&first.hashes));
    assert_eq!(first.html, second.html);
    assert_eq!(first.element_text, second.element_text);
    assert_eq!(first.hashes, second.hashes);
}
