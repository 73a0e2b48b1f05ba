//! Overflow-menu resolution: which menu a trigger opened, and its "download" action.
//!
//! Association is attempted through ARIA first (`aria-controls` / `aria-owns`).
//! Pages that render menus into a detached layer give no such link, so the
//! fallback picks the visible menu whose centre lies nearest to the trigger.

use crate::browser::HarvestConfig;
use crate::dom::{BoundingBox, DomTree, ElementNode, NodeHandle};
use crate::error::Result;
use crate::page::Page;
use std::time::Instant;

/// Element that can be a menu entry: `[role=menuitem], li, button, a`
fn is_menu_entry(el: &ElementNode) -> bool {
    el.role() == Some("menuitem") || el.is_tag("li") || el.is_tag("button") || el.is_tag("a")
}

/// The "download" action found inside a menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    /// The matching menu entry
    pub element: NodeHandle,

    /// Address of the entry itself when it is a link, else of its first descendant link
    pub href: Option<String>,
}

/// A visible entry of an open menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub handle: NodeHandle,
    pub text: String,
    pub href: Option<String>,
}

/// An open menu and what it offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMenu {
    pub menu: NodeHandle,

    /// Visible entries in document order
    pub items: Vec<MenuItem>,

    /// Addresses of every link inside the menu, in document order
    pub links: Vec<String>,

    pub download: Option<DownloadItem>,
}

/// Rendered `[role=menu]` containers in document order
pub fn visible_menus(tree: &DomTree) -> Vec<usize> {
    tree.select_all(|el| el.role() == Some("menu") && el.is_rendered())
}

/// Menu opened by the trigger at `trigger_ix`, if any is visible
pub fn find_menu_for_trigger(tree: &DomTree, trigger_ix: usize) -> Option<usize> {
    let trigger = tree.element(trigger_ix);

    let named = ["aria-controls", "aria-owns"]
        .iter()
        .filter_map(|attr| trigger.attr(attr))
        .find_map(|value| value.split_whitespace().next());
    if let Some(id) = named {
        if let Some(ix) = tree.element_by_id(id).filter(|&ix| tree.is_rendered(ix)) {
            return Some(ix);
        }
    }

    let origin = trigger.bounding_box.unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0));
    visible_menus(tree).into_iter().min_by(|&a, &b| {
        let da = distance_to(tree, a, &origin);
        let db = distance_to(tree, b, &origin);
        da.total_cmp(&db)
    })
}

fn distance_to(tree: &DomTree, ix: usize, origin: &BoundingBox) -> f64 {
    tree.element(ix).bounding_box.map_or(f64::INFINITY, |b| b.center_distance_sq(origin))
}

fn mentions_download(tree: &DomTree, ix: usize) -> bool {
    tree.text(ix).to_lowercase().contains("download")
        || tree.element(ix).attr_contains_ci("data-analytics-id", "download")
}

/// First visible entry of the menu that reads as a download action
pub fn find_download_item(tree: &DomTree, menu_ix: usize) -> Option<DownloadItem> {
    let ix = tree
        .descendants(menu_ix)
        .filter(|&ix| is_menu_entry(tree.element(ix)) && tree.is_rendered(ix))
        .find(|&ix| mentions_download(tree, ix))?;

    let href = tree
        .link_url(ix)
        .or_else(|| tree.descendants(ix).find_map(|d| tree.link_url(d)));

    Some(DownloadItem { element: tree.handle(ix), href })
}

/// Everything a harvest needs from the menu at `menu_ix`
pub fn resolve_menu(tree: &DomTree, menu_ix: usize) -> ResolvedMenu {
    let items = tree
        .descendants(menu_ix)
        .filter(|&ix| is_menu_entry(tree.element(ix)) && tree.is_rendered(ix))
        .map(|ix| MenuItem { handle: tree.handle(ix), text: tree.text(ix), href: tree.link_url(ix) })
        .collect();

    let links = tree.descendants(menu_ix).filter_map(|ix| tree.link_url(ix)).collect();

    ResolvedMenu { menu: tree.handle(menu_ix), items, links, download: find_download_item(tree, menu_ix) }
}

/// Opens and closes menus on a live page, one at a time
pub struct MenuResolver<'a, P: Page + ?Sized> {
    page: &'a P,
    config: &'a HarvestConfig,
}

impl<'a, P: Page + ?Sized> MenuResolver<'a, P> {
    pub fn new(page: &'a P, config: &'a HarvestConfig) -> Self {
        Self { page, config }
    }

    /// Press Escape when a menu is showing. Returns whether one was.
    pub fn close_open_menus(&self) -> Result<bool> {
        if visible_menus(&self.page.snapshot()?).is_empty() {
            return Ok(false);
        }
        self.page.dismiss_menus()?;
        Ok(true)
    }

    /// Activate `trigger` and wait for the menu it opens.
    ///
    /// Returns `None` when no menu shows up within the menu timeout or the
    /// trigger leaves the page.
    pub fn open_and_resolve(&self, trigger: NodeHandle) -> Result<Option<ResolvedMenu>> {
        self.close_open_menus()?;

        if let Err(e) = self.page.scroll_into_view(trigger) {
            log::debug!("Could not scroll {} into view: {}", trigger, e);
        }
        self.page.activate(trigger)?;

        let deadline = Instant::now() + self.config.menu_timeout;
        loop {
            let tree = self.page.snapshot()?;
            let Some(trigger_ix) = tree.find(trigger) else {
                log::debug!("Trigger {} disappeared before its menu opened", trigger);
                return Ok(None);
            };

            if let Some(menu_ix) = find_menu_for_trigger(&tree, trigger_ix) {
                log::debug!("Menu {} opened by {}", tree.element(menu_ix).to_simple_string(), trigger);
                return Ok(Some(resolve_menu(&tree, menu_ix)));
            }

            if Instant::now() >= deadline {
                log::debug!("No menu appeared after activating {}", trigger);
                return Ok(None);
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Dismiss open menus and wait for them to go. Returns `false` on timeout.
    pub fn close_and_wait(&self) -> Result<bool> {
        if !self.close_open_menus()? {
            return Ok(true);
        }

        let deadline = Instant::now() + self.config.menu_close_timeout;
        loop {
            if visible_menus(&self.page.snapshot()?).is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}
