//! Tracks which list items already had their overflow menu opened in a run.

use crate::dom::{DomTree, ElementNode, NodeHandle};
use std::collections::HashSet;

/// Semantic wrapper of a content item:
/// `article, li, [role=article], [role=listitem], .content, .item, .course-item, [data-test*=item i]`
fn is_item_wrapper(el: &ElementNode) -> bool {
    el.is_tag("article")
        || el.is_tag("li")
        || matches!(el.role(), Some("article" | "listitem"))
        || el.has_class("content")
        || el.has_class("item")
        || el.has_class("course-item")
        || el.attr_contains_ci("data-test", "item")
}

/// Item container of a trigger, keyed by node identity
#[derive(Debug, Clone)]
pub struct ContainerDeduper {
    depth: usize,
    seen: HashSet<NodeHandle>,
}

impl ContainerDeduper {
    pub fn new(depth: usize) -> Self {
        Self { depth, seen: HashSet::new() }
    }

    /// The item wrapping the trigger at `trigger_ix`.
    ///
    /// Looks at most `depth` ancestors up for a semantic wrapper, then, with the
    /// same bound, for the nearest ancestor holding an `a[href]`. `None` means
    /// the trigger stands alone and is never deduplicated.
    pub fn container_for(&self, tree: &DomTree, trigger_ix: usize) -> Option<NodeHandle> {
        let ancestors = || tree.ancestors(trigger_ix).take(self.depth);

        ancestors()
            .find(|&ix| is_item_wrapper(tree.element(ix)))
            .or_else(|| {
                ancestors().find(|&ix| {
                    tree.descendants(ix)
                        .any(|d| tree.element(d).is_tag("a") && tree.element(d).has_attribute("href"))
                })
            })
            .map(|ix| tree.handle(ix))
    }

    pub fn seen(&self, container: NodeHandle) -> bool {
        self.seen.contains(&container)
    }

    /// Returns `false` when the container was already marked
    pub fn mark_seen(&mut self, container: NodeHandle) -> bool {
        self.seen.insert(container)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
