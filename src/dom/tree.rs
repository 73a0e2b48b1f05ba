use crate::classify::normalize_url;
use crate::dom::element::{ElementNode, NodeHandle};
use crate::error::{HarvestError, Result};
use headless_chrome::Tab;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use url::Url;

/// One element of a [`DomTree`], with its children moved into the arena
#[derive(Debug, Clone)]
pub struct DomNode {
    /// The element itself; `children` is always empty here
    pub element: ElementNode,

    /// Arena index of the parent element
    pub parent: Option<usize>,

    /// Exclusive end of this node's subtree in the arena
    end: usize,
}

/// Snapshot of a page's element tree, stored in document order.
///
/// Nodes live in a pre-order arena, so every subtree occupies a contiguous
/// index range and arena order is document order.
#[derive(Debug, Clone)]
pub struct DomTree {
    /// Address of the document the snapshot was taken from
    url: Option<Url>,

    nodes: Vec<DomNode>,

    /// Handle to arena index, in document order
    handles: IndexMap<NodeHandle, usize>,

    /// First element carrying each `id`
    ids: HashMap<String, usize>,
}

/// Wire shape returned by `snapshot.js`
#[derive(Debug, Deserialize)]
struct SnapshotPayload {
    #[serde(default)]
    url: Option<String>,
    root: ElementNode,
}

impl DomTree {
    /// Build a tree from a root element. Elements without a handle get their arena position.
    pub fn new(root: ElementNode) -> Self {
        let mut nodes = Vec::new();
        Self::push(&mut nodes, root, None);

        let mut handles = IndexMap::with_capacity(nodes.len());
        let mut ids = HashMap::new();
        for (ix, node) in nodes.iter_mut().enumerate() {
            let handle = *node.element.handle.get_or_insert(NodeHandle(ix as u64));
            handles.entry(handle).or_insert(ix);
            if let Some(id) = node.element.id() {
                ids.entry(id.clone()).or_insert(ix);
            }
        }

        Self { url: None, nodes, handles, ids }
    }

    /// Builder method: set the document address used to resolve relative links
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Url::parse(url).ok();
        self
    }

    /// Snapshot the live DOM of a browser tab
    pub fn from_tab(tab: &Arc<Tab>) -> Result<Self> {
        // The script stamps handles and returns a JSON string
        let js_code = include_str!("snapshot.js");

        let result = tab
            .evaluate(js_code, false)
            .map_err(|e| HarvestError::SnapshotFailed(format!("Failed to execute snapshot script: {}", e)))?;

        let json_value = result
            .value
            .ok_or_else(|| HarvestError::SnapshotFailed("No value returned from snapshot script".to_string()))?;

        let json_str: String = serde_json::from_value(json_value)
            .map_err(|e| HarvestError::SnapshotFailed(format!("Failed to get JSON string: {}", e)))?;

        Self::from_json(&json_str)
    }

    /// Parse the snapshot script's JSON payload
    pub fn from_json(json: &str) -> Result<Self> {
        let mut payload: SnapshotPayload = serde_json::from_str(json)
            .map_err(|e| HarvestError::SnapshotFailed(format!("Failed to parse snapshot JSON: {}", e)))?;

        payload.root.simplify();
        let tree = Self::new(payload.root);
        Ok(match payload.url {
            Some(url) => tree.with_url(&url),
            None => tree,
        })
    }

    fn push(nodes: &mut Vec<DomNode>, mut element: ElementNode, parent: Option<usize>) {
        let ix = nodes.len();
        let children = std::mem::take(&mut element.children);
        nodes.push(DomNode { element, parent, end: ix + 1 });
        for child in children {
            Self::push(nodes, child, Some(ix));
        }
        nodes[ix].end = nodes.len();
    }

    /// Document address, when known
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Arena index of the root element
    pub fn root(&self) -> usize {
        0
    }

    /// Count total elements in the tree
    pub fn count_elements(&self) -> usize {
        self.nodes.len()
    }

    pub fn element(&self, ix: usize) -> &ElementNode {
        &self.nodes[ix].element
    }

    /// Handle of the element at `ix`
    pub fn handle(&self, ix: usize) -> NodeHandle {
        // Every node receives a handle in `new`
        self.nodes[ix].element.handle.unwrap_or(NodeHandle(ix as u64))
    }

    pub fn parent(&self, ix: usize) -> Option<usize> {
        self.nodes[ix].parent
    }

    /// Proper ancestors, nearest first
    pub fn ancestors(&self, ix: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.parent(ix), move |&p| self.parent(p))
    }

    /// The node and all of its descendants, in document order
    pub fn subtree(&self, ix: usize) -> Range<usize> {
        ix..self.nodes[ix].end
    }

    /// Proper descendants, in document order
    pub fn descendants(&self, ix: usize) -> Range<usize> {
        ix + 1..self.nodes[ix].end
    }

    /// Direct children, in document order
    pub fn children(&self, ix: usize) -> impl Iterator<Item = usize> + '_ {
        let end = self.nodes[ix].end;
        // Bounds are checked before indexing: a trailing subtree ends at `nodes.len()`
        std::iter::successors(Some(ix + 1).filter(|&c| c < end), move |&c| {
            Some(self.nodes[c].end).filter(|&next| next < end)
        })
    }

    /// `ix` lies inside the subtree rooted at `ancestor` (inclusive)
    pub fn contains(&self, ancestor: usize, ix: usize) -> bool {
        self.subtree(ancestor).contains(&ix)
    }

    /// Arena index of the element with this handle
    pub fn find(&self, handle: NodeHandle) -> Option<usize> {
        self.handles.get(&handle).copied()
    }

    /// Like `document.getElementById`
    pub fn element_by_id(&self, id: &str) -> Option<usize> {
        self.ids.get(id).copied()
    }

    /// Descendants of `scope` matching `pred`, in document order
    pub fn select(&self, scope: usize, pred: impl Fn(&ElementNode) -> bool) -> Vec<usize> {
        self.descendants(scope).filter(|&ix| pred(self.element(ix))).collect()
    }

    /// All elements matching `pred`, root included, in document order
    pub fn select_all(&self, pred: impl Fn(&ElementNode) -> bool) -> Vec<usize> {
        (0..self.nodes.len()).filter(|&ix| pred(self.element(ix))).collect()
    }

    /// Whitespace-collapsed text of the whole subtree (like `textContent`)
    pub fn text(&self, ix: usize) -> String {
        self.subtree(ix)
            .filter_map(|i| self.element(i).text_content.as_deref())
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Rendered check for the element at `ix`
    pub fn is_rendered(&self, ix: usize) -> bool {
        self.element(ix).is_rendered()
    }

    /// The element that holds the page's main content: `main`, `[role=main]`, `#content`, else the root
    pub fn main_container(&self) -> usize {
        let all = 0..self.nodes.len();
        all.clone()
            .find(|&ix| self.element(ix).is_tag("main"))
            .or_else(|| all.clone().find(|&ix| self.element(ix).role() == Some("main")))
            .or_else(|| self.element_by_id("content"))
            .unwrap_or_else(|| self.root())
    }

    /// Absolute, normalized address of an anchor
    pub fn link_url(&self, ix: usize) -> Option<String> {
        let href = self.element(ix).link_href()?;
        normalize_url(href, self.url())
    }

    /// Handles in document order
    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.handles.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tree() -> ElementNode {
        ElementNode::new("body")
            .with_child(
                ElementNode::new("header").with_child(
                    ElementNode::new("button").with_attribute("id", "nav-btn").with_text("Menu"),
                ),
            )
            .with_child(
                ElementNode::new("main")
                    .with_child(ElementNode::new("a").with_attribute("href", "/page.pdf").with_text("Click here"))
                    .with_child(
                        ElementNode::new("div")
                            .with_attribute("class", "content")
                            .with_text("Some")
                            .with_child(ElementNode::new("span").with_text("  text \n")),
                    ),
            )
    }

    #[test]
    fn test_dom_tree_creation() {
        let tree = DomTree::new(create_test_tree());

        assert_eq!(tree.element(tree.root()).tag_name, "body");
        assert_eq!(tree.children(tree.root()).count(), 2);
        assert_eq!(tree.count_elements(), 7);
    }

    #[test]
    fn test_document_order() {
        let tree = DomTree::new(create_test_tree());
        let tags: Vec<&str> = (0..tree.count_elements()).map(|ix| tree.element(ix).tag_name.as_str()).collect();
        assert_eq!(tags, ["body", "header", "button", "main", "a", "div", "span"]);
    }

    #[test]
    fn test_ancestors_and_contains() {
        let tree = DomTree::new(create_test_tree());
        let span = 6;

        let ancestors: Vec<usize> = tree.ancestors(span).collect();
        assert_eq!(ancestors, vec![5, 3, 0]);
        assert!(tree.contains(3, span));
        assert!(!tree.contains(1, span));
        assert_eq!(tree.descendants(3), 4..7);
    }

    #[test]
    fn test_children_skip_grandchildren() {
        let tree = DomTree::new(create_test_tree());
        let main = 3;
        assert_eq!(tree.children(main).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(tree.children(6).count(), 0);
    }

    #[test]
    fn test_children_of_trailing_subtree() {
        let tree = DomTree::new(ElementNode::new("body").with_child(ElementNode::new("span")));
        assert_eq!(tree.children(0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(tree.children(1).count(), 0);

        let last = tree.count_elements() - 1;
        assert_eq!(tree.children(last).count(), 0);
    }

    #[test]
    fn test_default_handles_and_ids() {
        let tree = DomTree::new(create_test_tree());
        assert_eq!(tree.handle(4), NodeHandle(4));
        assert_eq!(tree.find(NodeHandle(4)), Some(4));
        assert_eq!(tree.element_by_id("nav-btn"), Some(2));
        assert_eq!(tree.handles().count(), 7);
    }

    #[test]
    fn test_explicit_handles_survive() {
        let root = ElementNode::new("body").with_handle(100).with_child(ElementNode::new("p").with_handle(250));
        let tree = DomTree::new(root);
        assert_eq!(tree.find(NodeHandle(250)), Some(1));
        assert_eq!(tree.find(NodeHandle(1)), None);
    }

    #[test]
    fn test_text_collapses_whitespace() {
        let tree = DomTree::new(create_test_tree());
        assert_eq!(tree.text(5), "Some text");
        assert_eq!(tree.text(3), "Click here Some text");
    }

    #[test]
    fn test_main_container() {
        let tree = DomTree::new(create_test_tree());
        assert_eq!(tree.main_container(), 3);

        let by_role = DomTree::new(
            ElementNode::new("body").with_child(ElementNode::new("div").with_attribute("role", "main")),
        );
        assert_eq!(by_role.main_container(), 1);

        let fallback = DomTree::new(ElementNode::new("body").with_child(ElementNode::new("div")));
        assert_eq!(fallback.main_container(), 0);
    }

    #[test]
    fn test_link_url_resolves_against_document() {
        let tree = DomTree::new(create_test_tree()).with_url("https://LMS.example.edu/ultra/course/1/");
        assert_eq!(tree.link_url(4).as_deref(), Some("https://lms.example.edu/page.pdf"));
        assert_eq!(tree.link_url(5), None);
    }

    #[test]
    fn test_select() {
        let tree = DomTree::new(create_test_tree());
        assert_eq!(tree.select(3, |e| e.is_tag("a")), vec![4]);
        assert_eq!(tree.select(1, |e| e.is_tag("a")), Vec::<usize>::new());
        assert_eq!(tree.select_all(|e| e.is_tag("body")), vec![0]);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "url": "https://lms.example.edu/ultra/course/1/cl/outline",
            "root": {
                "tag_name": "body",
                "handle": 1,
                "children": [
                    {"tag_name": "script", "handle": 2, "text_content": "var x;"},
                    {"tag_name": "a", "handle": 3, "attributes": {"href": "files/notes.docx"}}
                ]
            }
        }"#;
        let tree = DomTree::from_json(json).unwrap();

        assert_eq!(tree.count_elements(), 2);
        let a = tree.find(NodeHandle(3)).unwrap();
        assert_eq!(
            tree.link_url(a).as_deref(),
            Some("https://lms.example.edu/ultra/course/1/cl/files/notes.docx")
        );
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(DomTree::from_json("{not json"), Err(HarvestError::SnapshotFailed(_))));
    }
}
