//! Scripted in-memory page for unit tests.

use crate::dom::{DomTree, ElementNode, NodeHandle};
use crate::error::{HarvestError, Result};
use crate::page::Page;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

type Reaction = Box<dyn Fn(&mut ElementNode)>;

/// Visible element with a distinct 200x24 box stacked by handle
pub(crate) fn node(tag: &str, handle: u64) -> ElementNode {
    ElementNode::new(tag)
        .with_handle(handle)
        .with_visibility(true)
        .with_bounding_box(0.0, handle as f64 * 30.0, 200.0, 24.0)
}

/// Anchor with an address
pub(crate) fn link(handle: u64, href: &str, text: &str) -> ElementNode {
    node("a", handle).with_attribute("href", href).with_text(text)
}

/// Mark a whole subtree shown or hidden
pub(crate) fn set_visible(node: &mut ElementNode, visible: bool) {
    node.is_visible = visible;
    for child in &mut node.children {
        set_visible(child, visible);
    }
}

/// Show an element the way a browser would: a closed `<details>` only renders its summary
pub(crate) fn show(node: &mut ElementNode) {
    node.is_visible = true;
    let closed = node.is_tag("details") && !node.has_attribute("open");
    for child in &mut node.children {
        if !closed || child.is_tag("summary") {
            show(child);
        }
    }
}

pub(crate) fn hidden(mut node: ElementNode) -> ElementNode {
    set_visible(&mut node, false);
    node
}

pub(crate) fn find_mut(node: &mut ElementNode, handle: u64) -> Option<&mut ElementNode> {
    if node.handle == Some(NodeHandle(handle)) {
        return Some(node);
    }
    node.children.iter_mut().find_map(|c| find_mut(c, handle))
}

/// Reaction: open a `<details>` and show its content
pub(crate) fn open_details(details: u64) -> impl Fn(&mut ElementNode) + 'static {
    move |root| {
        if let Some(d) = find_mut(root, details) {
            d.add_attribute("open", "");
            show(d);
        }
    }
}

/// Reaction: show a subtree
pub(crate) fn reveal(handle: u64) -> impl Fn(&mut ElementNode) + 'static {
    move |root| {
        if let Some(n) = find_mut(root, handle) {
            show(n);
        }
    }
}

/// Reaction: render `child` as the last child of `parent`
pub(crate) fn append(parent: u64, child: ElementNode) -> impl Fn(&mut ElementNode) + 'static {
    move |root| {
        if let Some(p) = find_mut(root, parent) {
            p.add_child(child.clone());
        }
    }
}

pub(crate) struct ScriptedPage {
    root: RefCell<ElementNode>,
    url: Option<String>,
    on_activate: RefCell<HashMap<NodeHandle, Vec<Reaction>>>,
    on_poll: RefCell<Vec<(u32, Reaction)>>,
    failing: RefCell<HashSet<NodeHandle>>,
    activations: RefCell<Vec<NodeHandle>>,
    escapes: Cell<usize>,
    mutations: Cell<u64>,
    churning: Cell<bool>,
}

impl ScriptedPage {
    pub(crate) fn new(root: ElementNode) -> Self {
        Self {
            root: RefCell::new(root),
            url: None,
            on_activate: RefCell::new(HashMap::new()),
            on_poll: RefCell::new(Vec::new()),
            failing: RefCell::new(HashSet::new()),
            activations: RefCell::new(Vec::new()),
            escapes: Cell::new(0),
            mutations: Cell::new(0),
            churning: Cell::new(false),
        }
    }

    pub(crate) fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Run `reaction` on the tree whenever `handle` is activated
    pub(crate) fn on_activate(&self, handle: u64, reaction: impl Fn(&mut ElementNode) + 'static) {
        self.on_activate.borrow_mut().entry(NodeHandle(handle)).or_default().push(Box::new(reaction));
    }

    /// Run `reaction` on the `polls`-th mutation counter read from now
    pub(crate) fn after_polls(&self, polls: u32, reaction: impl Fn(&mut ElementNode) + 'static) {
        self.on_poll.borrow_mut().push((polls, Box::new(reaction)));
    }

    /// Make activating `handle` fail
    pub(crate) fn fail_activation(&self, handle: u64) {
        self.failing.borrow_mut().insert(NodeHandle(handle));
    }

    pub(crate) fn activations(&self) -> Vec<NodeHandle> {
        self.activations.borrow().clone()
    }

    pub(crate) fn activation_count(&self, handle: u64) -> usize {
        self.activations.borrow().iter().filter(|h| **h == NodeHandle(handle)).count()
    }

    /// Make the page mutate between every two counter reads, forever
    pub(crate) fn churn(&self) {
        self.churning.set(true);
    }

    pub(crate) fn escapes(&self) -> usize {
        self.escapes.get()
    }

    fn mutate(&self, reaction: &Reaction) {
        reaction(&mut self.root.borrow_mut());
        self.mutations.set(self.mutations.get() + 1);
    }
}

/// Closing a menu unmounts it, as menu layers do
fn remove_menus(node: &mut ElementNode) -> bool {
    let before = node.children.len();
    node.children.retain(|c| !(c.role() == Some("menu") && c.is_visible));
    let mut any = node.children.len() != before;
    for child in &mut node.children {
        any |= remove_menus(child);
    }
    any
}

impl Page for ScriptedPage {
    fn snapshot(&self) -> Result<DomTree> {
        let tree = DomTree::new(self.root.borrow().clone());
        Ok(match &self.url {
            Some(url) => tree.with_url(url),
            None => tree,
        })
    }

    fn activate(&self, handle: NodeHandle) -> Result<()> {
        if self.failing.borrow().contains(&handle) {
            return Err(HarvestError::interaction(format!("activate {}", handle), "element is detached"));
        }
        if find_mut(&mut self.root.borrow_mut(), handle.0).is_none() {
            return Err(HarvestError::ElementNotFound(handle.to_string()));
        }
        self.activations.borrow_mut().push(handle);
        if let Some(reactions) = self.on_activate.borrow().get(&handle) {
            for reaction in reactions {
                self.mutate(reaction);
            }
        }
        Ok(())
    }

    fn scroll_into_view(&self, _handle: NodeHandle) -> Result<()> {
        Ok(())
    }

    fn dismiss_menus(&self) -> Result<()> {
        self.escapes.set(self.escapes.get() + 1);
        if remove_menus(&mut self.root.borrow_mut()) {
            self.mutations.set(self.mutations.get() + 1);
        }
        Ok(())
    }

    fn mutation_count(&self) -> Result<u64> {
        let due: Vec<Reaction> = {
            let mut pending = self.on_poll.borrow_mut();
            let mut due = Vec::new();
            let mut keep = Vec::new();
            for (polls, reaction) in pending.drain(..) {
                if polls <= 1 {
                    due.push(reaction);
                } else {
                    keep.push((polls - 1, reaction));
                }
            }
            *pending = keep;
            due
        };
        for reaction in &due {
            self.mutate(reaction);
        }
        if self.churning.get() {
            self.mutations.set(self.mutations.get() + 1);
        }
        Ok(self.mutations.get())
    }
}
