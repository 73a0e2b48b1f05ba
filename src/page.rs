//! The view of a live page that the harvesting engine works against.
//!
//! Production code drives Chrome through [`crate::browser::CdpPage`]; tests
//! drive scripted in-memory pages. Everything the engine needs is a fresh
//! snapshot plus a handful of interactions addressed by [`NodeHandle`].

use crate::dom::{DomTree, NodeHandle};
use crate::error::Result;

pub trait Page {
    /// Capture the current element tree
    fn snapshot(&self) -> Result<DomTree>;

    /// Activate (click) an element. Implementations fall back to synthetic
    /// pointer and keyboard activation when a plain click is refused.
    fn activate(&self, handle: NodeHandle) -> Result<()>;

    /// Scroll the element to the middle of the viewport
    fn scroll_into_view(&self, handle: NodeHandle) -> Result<()>;

    /// Send an Escape keypress to close whatever menu is open
    fn dismiss_menus(&self) -> Result<()>;

    /// Monotonic count of DOM mutations under the main content container
    fn mutation_count(&self) -> Result<u64>;
}
