//! Page snapshots
//!
//! A snapshot is taken by running `snapshot.js` in the page. It stamps every
//! element with a stable `data-harvest-id` and returns the body as a JSON
//! tree, which is flattened into a [`DomTree`] arena.
//! - ElementNode: one element as the script reported it
//! - NodeHandle: the stamped id, valid across snapshots of the same document
//! - DomTree: the arena, in document order, with navigation helpers

pub mod element;
pub mod tree;

pub use element::{BoundingBox, ElementNode, NodeHandle};
pub use tree::{DomNode, DomTree};
