use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identity of a live element, stamped into the page as `data-harvest-id`.
///
/// The stamp survives re-snapshots, so the same handle names the same element
/// across expansion passes and menu polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHandle(pub u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Represents a DOM element node as produced by the snapshot script
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementNode {
    /// HTML tag name, lower-cased (e.g., "div", "button", "a")
    pub tag_name: String,

    /// Element attributes. For anchors `href` holds the resolved address.
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Text of the element's own text nodes (descendant text lives on the descendants)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,

    /// Child elements. Same-origin iframe bodies appear as the iframe's only child.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementNode>,

    /// Stable handle assigned by the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<NodeHandle>,

    /// Computed style leaves the element shown (not `visibility:hidden`, not `display:none`)
    #[serde(default)]
    pub is_visible: bool,

    /// Bounding client rect in viewport coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// Bounding box coordinates for an element
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementNode {
    /// Create a new ElementNode
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes: HashMap::new(),
            text_content: None,
            children: Vec::new(),
            handle: None,
            is_visible: false,
            bounding_box: None,
        }
    }

    /// Builder method: add a single attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_attribute(key, value);
        self
    }

    /// Builder method: set text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    /// Builder method: set children
    pub fn with_children(mut self, children: Vec<ElementNode>) -> Self {
        self.children = children;
        self
    }

    /// Builder method: add a child
    pub fn with_child(mut self, child: ElementNode) -> Self {
        self.children.push(child);
        self
    }

    /// Builder method: set handle
    pub fn with_handle(mut self, handle: u64) -> Self {
        self.handle = Some(NodeHandle(handle));
        self
    }

    /// Builder method: set visibility
    pub fn with_visibility(mut self, visible: bool) -> Self {
        self.is_visible = visible;
        self
    }

    /// Builder method: set bounding box
    pub fn with_bounding_box(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bounding_box = Some(BoundingBox { x, y, width, height });
        self
    }

    /// Add a single attribute
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Add a child element
    pub fn add_child(&mut self, child: ElementNode) {
        self.children.push(child);
    }

    /// Get attribute value as `&str`
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Attribute equals `value` exactly
    pub fn attr_is(&self, key: &str, value: &str) -> bool {
        self.attr(key) == Some(value)
    }

    /// Attribute contains `needle`, ignoring ASCII case (CSS `[attr*=needle i]`)
    pub fn attr_contains_ci(&self, key: &str, needle: &str) -> bool {
        self.attr(key)
            .is_some_and(|v| v.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()))
    }

    /// ARIA role, if declared
    pub fn role(&self) -> Option<&str> {
        self.attr("role")
    }

    /// Check if element has a specific class
    pub fn has_class(&self, class_name: &str) -> bool {
        if let Some(classes) = self.attributes.get("class") {
            classes.split_whitespace().any(|c| c == class_name)
        } else {
            false
        }
    }

    /// Get element ID
    pub fn id(&self) -> Option<&String> {
        self.attributes.get("id")
    }

    /// Check if element is a specific tag
    pub fn is_tag(&self, tag: &str) -> bool {
        self.tag_name.eq_ignore_ascii_case(tag)
    }

    /// Anchor with a usable address (`a[href]`, ignoring empty and `javascript:` links)
    pub fn link_href(&self) -> Option<&str> {
        if !self.is_tag("a") {
            return None;
        }
        let href = self.attr("href")?.trim();
        if href.is_empty() || href.to_ascii_lowercase().starts_with("javascript:") {
            return None;
        }
        Some(href)
    }

    /// Rendered as per the page: shown by style and occupying a non-empty box
    pub fn is_rendered(&self) -> bool {
        self.is_visible && self.bounding_box.is_some_and(|b| b.is_visible())
    }

    /// Matches `summary, button, [role="button"], [aria-expanded]`
    pub fn is_activator(&self) -> bool {
        self.is_tag("summary")
            || self.is_tag("button")
            || self.role() == Some("button")
            || self.has_attribute("aria-expanded")
    }

    /// Exposes a popup menu (`aria-haspopup` other than "false")
    pub fn has_popup(&self) -> bool {
        self.attr("aria-haspopup").is_some_and(|v| !v.eq_ignore_ascii_case("false"))
    }

    /// Simplify element by removing unnecessary children (like scripts, styles)
    pub fn simplify(&mut self) {
        self.children
            .retain(|child| !matches!(child.tag_name.as_str(), "script" | "style" | "noscript" | "template"));

        for child in &mut self.children {
            child.simplify();
        }
    }

    /// Short opening-tag rendering for log lines
    pub fn to_simple_string(&self) -> String {
        let mut parts = vec![format!("<{}", self.tag_name)];

        if let Some(id) = self.id() {
            parts.push(format!(" id=\"{}\"", id));
        }

        if let Some(class) = self.attributes.get("class") {
            parts.push(format!(" class=\"{}\"", class));
        }

        if let Some(label) = self.attributes.get("aria-label") {
            parts.push(format!(" aria-label=\"{}\"", label));
        }

        if let Some(handle) = self.handle {
            parts.push(format!(" data-harvest-id=\"{}\"", handle.0));
        }

        parts.push(">".to_string());

        if let Some(text) = &self.text_content {
            let text = text.trim();
            if !text.is_empty() {
                parts.push(text.chars().take(60).collect());
            }
        }

        parts.join("")
    }
}

impl BoundingBox {
    /// Create a new BoundingBox
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Check if the bounding box is visible (has non-zero dimensions)
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Centre point in viewport coordinates
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Squared Euclidean distance between the two centres
    pub fn center_distance_sq(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        (ax - bx).powi(2) + (ay - by).powi(2)
    }
}
