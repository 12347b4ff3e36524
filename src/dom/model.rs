use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Opaque node identifier, unique within one snapshot.
pub type NodeId = String;

/// One node of a flattened DOM snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomNode {
    Text(TextNode),
    Element(ElementNode),
}

/// Trimmed, non-empty text content. `visible` is inherited from the
/// parent element at extraction time.
#[derive(Debug, Clone, Deserialize)]
pub struct TextNode {
    pub text: String,
    pub visible: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementNode {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub child_ids: Vec<NodeId>,
    pub visible: bool,
    #[serde(default)]
    pub topmost: bool,
    #[serde(default)]
    pub in_viewport: bool,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub scroll_info: Option<ScrollInfo>,
}

/// Scrollable overflow in pixels on each side of a scroll container.
/// Present only when the element actually overflows (≥4px on an axis
/// with overflow auto/scroll).
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
pub struct ScrollInfo {
    #[serde(default)]
    pub left: i64,
    #[serde(default)]
    pub top: i64,
    #[serde(default)]
    pub right: i64,
    #[serde(default)]
    pub bottom: i64,
}

impl ScrollInfo {
    pub fn is_scrollable(&self) -> bool {
        self.left != 0 || self.top != 0 || self.right != 0 || self.bottom != 0
    }
}

/// Immutable description of the page produced by one extraction pass.
/// `root_id` is absent on pages without a body (e.g. mid-navigation).
#[derive(Debug, Clone, Default)]
pub struct FlatSnapshot {
    pub root_id: Option<NodeId>,
    pub nodes: HashMap<NodeId, DomNode>,
}

impl FlatSnapshot {
    pub fn element(&self, id: &str) -> Option<&ElementNode> {
        match self.nodes.get(id) {
            Some(DomNode::Element(el)) => Some(el),
            _ => None,
        }
    }

    /// Indexed interactive nodes, ordered by index.
    pub fn interactive_nodes(&self) -> BTreeMap<u32, &ElementNode> {
        self.nodes
            .values()
            .filter_map(|node| match node {
                DomNode::Element(el) if el.interactive => el.index.map(|i| (i, el)),
                _ => None,
            })
            .collect()
    }
}

/// Raw page metrics reported by the in-page extraction script.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageMetrics {
    pub viewport_width: i64,
    pub viewport_height: i64,
    pub page_width: i64,
    pub page_height: i64,
    pub scroll_x: i64,
    pub scroll_y: i64,
}

/// Derived page geometry, shown to the model and returned from the API.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PageInfo {
    pub viewport_width: i64,
    pub viewport_height: i64,
    pub page_width: i64,
    pub page_height: i64,
    pub scroll_x: i64,
    pub scroll_y: i64,
    pub pixels_above: i64,
    pub pixels_below: i64,
    pub pages_above: f64,
    pub pages_below: f64,
    pub total_pages: f64,
    pub current_page_position: f64,
    pub pixels_left: i64,
    pub pixels_right: i64,
}

impl PageInfo {
    pub fn from_metrics(m: PageMetrics) -> Self {
        let vh = m.viewport_height.max(1) as f64;
        let pixels_above = m.scroll_y.max(0);
        let pixels_below = (m.page_height - m.viewport_height - m.scroll_y).max(0);
        let scroll_range = (m.page_height - m.viewport_height).max(1) as f64;
        Self {
            viewport_width: m.viewport_width,
            viewport_height: m.viewport_height,
            page_width: m.page_width,
            page_height: m.page_height,
            scroll_x: m.scroll_x,
            scroll_y: m.scroll_y,
            pixels_above,
            pixels_below,
            pages_above: pixels_above as f64 / vh,
            pages_below: pixels_below as f64 / vh,
            total_pages: m.page_height as f64 / vh,
            current_page_position: (m.scroll_y.max(0) as f64 / scroll_range).min(1.0),
            pixels_left: m.scroll_x.max(0),
            pixels_right: (m.page_width - m.viewport_width - m.scroll_x).max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(page_height: i64, scroll_y: i64) -> PageMetrics {
        PageMetrics {
            viewport_width: 1280,
            viewport_height: 720,
            page_width: 1280,
            page_height,
            scroll_x: 0,
            scroll_y,
        }
    }

    #[test]
    fn page_info_at_top() {
        let info = PageInfo::from_metrics(metrics(2160, 0));
        assert_eq!(info.pixels_above, 0);
        assert_eq!(info.pixels_below, 1440);
        assert!((info.total_pages - 3.0).abs() < 1e-9);
        assert_eq!(info.current_page_position, 0.0);
    }

    #[test]
    fn page_info_at_bottom() {
        let info = PageInfo::from_metrics(metrics(2160, 1440));
        assert_eq!(info.pixels_above, 1440);
        assert_eq!(info.pixels_below, 0);
        assert!((info.current_page_position - 1.0).abs() < 1e-9);
    }

    #[test]
    fn page_shorter_than_viewport() {
        let info = PageInfo::from_metrics(metrics(400, 0));
        assert_eq!(info.pixels_below, 0);
        assert_eq!(info.pixels_above, 0);
    }

    #[test]
    fn scroll_info_scrollable() {
        assert!(!ScrollInfo::default().is_scrollable());
        assert!(ScrollInfo { bottom: 12, ..Default::default() }.is_scrollable());
    }
}
