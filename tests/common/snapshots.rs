use std::collections::HashMap;

use serde_json::{json, Value};

use page_pilot::dom::model::{DomNode, FlatSnapshot};

pub fn metrics() -> Value {
    json!({
        "viewport_width": 1280,
        "viewport_height": 720,
        "page_width": 1280,
        "page_height": 720,
        "scroll_x": 0,
        "scroll_y": 0
    })
}

pub fn payload(root: &str, nodes: Value) -> Value {
    json!({"root_id": root, "nodes": nodes, "page_info": metrics()})
}

pub fn empty_page() -> Value {
    payload(
        "n0",
        json!({
            "n0": {"kind": "element", "tag": "body", "child_ids": [],
                   "visible": true, "topmost": true, "in_viewport": true}
        }),
    )
}

pub fn text(content: &str) -> Value {
    json!({"kind": "text", "text": content, "visible": true})
}

pub fn hidden_text(content: &str) -> Value {
    json!({"kind": "text", "text": content, "visible": false})
}

pub fn el(tag: &str, children: &[&str]) -> Value {
    json!({
        "kind": "element", "tag": tag, "child_ids": children,
        "visible": true, "topmost": true, "in_viewport": true
    })
}

pub fn interactive(tag: &str, index: u32, attributes: Value, children: &[&str]) -> Value {
    json!({
        "kind": "element", "tag": tag, "attributes": attributes, "child_ids": children,
        "visible": true, "topmost": true, "in_viewport": true,
        "interactive": true, "index": index
    })
}

/// Decode a payload the way the extractor does, for serializer tests
/// that bypass the driver.
pub fn snapshot_from(payload: &Value) -> FlatSnapshot {
    let nodes: HashMap<String, DomNode> =
        serde_json::from_value(payload["nodes"].clone()).expect("valid node map");
    FlatSnapshot {
        root_id: payload["root_id"].as_str().map(String::from),
        nodes,
    }
}

/// `<body><h1>Example</h1><a href="/x">more</a></body>`
pub fn simple_page() -> Value {
    payload(
        "n4",
        json!({
            "n0": text("Example"),
            "n1": el("h1", &["n0"]),
            "n2": text("more"),
            "n3": interactive("a", 0, json!({"href": "/x"}), &["n2"]),
            "n4": el("body", &["n1", "n3"])
        }),
    )
}

/// `<body><input id="q" placeholder="Search"><button>Go</button></body>`
pub fn form_page() -> Value {
    payload(
        "n3",
        json!({
            "n0": interactive("input", 0, json!({"id": "q", "type": "text", "placeholder": "Search"}), &[]),
            "n1": text("Go"),
            "n2": interactive("button", 1, json!({"type": "submit"}), &["n1"]),
            "n3": el("body", &["n0", "n2"])
        }),
    )
}

/// `<body><a target="_blank" href="https://x.example">docs</a></body>`
pub fn blank_link_page() -> Value {
    payload(
        "n2",
        json!({
            "n0": text("docs"),
            "n1": interactive("a", 0, json!({"href": "https://x.example", "target": "_blank"}), &["n0"]),
            "n2": el("body", &["n1"])
        }),
    )
}

/// A select with two options, and one with none.
pub fn select_page(with_options: bool) -> Value {
    if with_options {
        payload(
            "n5",
            json!({
                "n0": text("Red"),
                "n1": el("option", &["n0"]),
                "n2": text("Blue"),
                "n3": el("option", &["n2"]),
                "n4": interactive("select", 0, json!({"name": "color"}), &["n1", "n3"]),
                "n5": el("body", &["n4"])
            }),
        )
    } else {
        payload(
            "n1",
            json!({
                "n0": interactive("select", 0, json!({"name": "color"}), &[]),
                "n1": el("body", &["n0"])
            }),
        )
    }
}

/// A scrollable container that is itself interactive (index 0).
pub fn scrollable_page() -> Value {
    payload(
        "n2",
        json!({
            "n0": text("Chat log"),
            "n1": {
                "kind": "element", "tag": "div",
                "attributes": {"role": "textbox", "id": "log"},
                "child_ids": ["n0"],
                "visible": true, "topmost": true, "in_viewport": true,
                "interactive": true, "index": 0,
                "scroll_info": {"top": 0, "bottom": 600}
            },
            "n2": el("body", &["n1"])
        }),
    )
}
