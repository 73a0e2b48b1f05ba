//! Forces collapsed sections open until the page stops revealing new ones.
//!
//! Expansion runs in two phases. A bounded number of click passes opens
//! everything collapsed that is visible right now. An observation phase then
//! watches the mutation counter for content rendered lazily in response, and
//! ends once a debounced re-scan finds nothing new or the hard ceiling expires.

use crate::browser::HarvestConfig;
use crate::dom::{DomTree, ElementNode, NodeHandle};
use crate::error::Result;
use crate::page::Page;
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// A collapsed container paired with the element that toggles it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expandable {
    pub container: NodeHandle,
    pub activator: NodeHandle,
}

/// What an expansion run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpansionReport {
    /// Click passes that found something to open
    pub passes: usize,
    /// Successful activations across both phases
    pub activations: usize,
    /// Mutation bursts handled during observation
    pub observed_bursts: usize,
    /// Observation ended at the hard ceiling instead of converging
    pub timed_out: bool,
}

/// Element exposes a collapsed state we know how to open
fn exposes_collapsed_state(el: &ElementNode) -> bool {
    if !el.attr_is("aria-expanded", "false") || el.has_popup() {
        return false;
    }
    el.role() == Some("button")
        || el.has_attribute("aria-controls")
        || el.attr_contains_ci("data-test", "expand")
        || el.attr_contains_ci("aria-label", "expand")
}

/// Itself when clickable, else its first clickable descendant, else itself
pub fn activator_for(tree: &DomTree, ix: usize) -> usize {
    if tree.element(ix).is_activator() {
        return ix;
    }
    tree.descendants(ix).find(|&d| tree.element(d).is_activator()).unwrap_or(ix)
}

/// Visible collapsed elements under the main content container, one per activator
pub fn find_expandables(tree: &DomTree) -> Vec<Expandable> {
    let scope = tree.main_container();
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for ix in tree.descendants(scope) {
        let el = tree.element(ix);
        let container = if el.is_tag("details") && !el.has_attribute("open") {
            match tree.children(ix).find(|&c| tree.element(c).is_tag("summary")) {
                Some(_) => ix,
                None => continue,
            }
        } else if exposes_collapsed_state(el) {
            ix
        } else {
            continue;
        };

        let activator = activator_for(tree, container);
        if !tree.is_rendered(activator) {
            continue;
        }
        let handle = tree.handle(activator);
        if seen.insert(handle) {
            found.push(Expandable { container: tree.handle(container), activator: handle });
        }
    }

    found
}

pub struct DomExpander<'a, P: Page + ?Sized> {
    page: &'a P,
    config: &'a HarvestConfig,
}

impl<'a, P: Page + ?Sized> DomExpander<'a, P> {
    pub fn new(page: &'a P, config: &'a HarvestConfig) -> Self {
        Self { page, config }
    }

    /// Expand with the configured pass budget
    pub fn expand_all(&self) -> Result<ExpansionReport> {
        self.expand_with_passes(self.config.max_passes)
    }

    pub fn expand_with_passes(&self, max_passes: usize) -> Result<ExpansionReport> {
        let mut report = ExpansionReport::default();

        for pass in 0..max_passes {
            let found = find_expandables(&self.page.snapshot()?);
            if found.is_empty() {
                log::debug!("Expansion pass {} found nothing collapsed", pass + 1);
                break;
            }
            log::debug!("Expansion pass {}: {} collapsed elements", pass + 1, found.len());
            report.passes += 1;
            report.activations += self.activate_all(&found);
            std::thread::sleep(self.config.settle_delay);
        }

        match self.observe(&mut report) {
            Ok(converged) => report.timed_out = !converged,
            Err(e) => {
                log::warn!("Stopped observing mutations: {}", e);
                report.timed_out = true;
            }
        }

        log::info!(
            "Expansion finished: {} activations over {} passes and {} observed bursts{}",
            report.activations,
            report.passes,
            report.observed_bursts,
            if report.timed_out { " (ceiling reached)" } else { "" }
        );
        Ok(report)
    }

    fn activate_all(&self, found: &[Expandable]) -> usize {
        let mut activated = 0;
        for item in found {
            match self.page.activate(item.activator) {
                Ok(()) => activated += 1,
                Err(e) => log::debug!("Skipping expander {}: {}", item.activator, e),
            }
        }
        activated
    }

    /// Returns `true` when the page converged, `false` when the ceiling cut it short
    fn observe(&self, report: &mut ExpansionReport) -> Result<bool> {
        let deadline = Instant::now() + self.config.observe_timeout;
        let mut seen = self.page.mutation_count()?;
        let mut activated_at: Option<Instant> = None;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            if activated_at.is_some_and(|t| now.duration_since(t) >= self.config.debounce) {
                return Ok(true);
            }

            std::thread::sleep(self.config.poll_interval.min(deadline - now));
            let count = self.page.mutation_count()?;
            if count == seen {
                continue;
            }

            let settled = self.settle_burst(count, deadline)?;
            report.observed_bursts += 1;

            let found = find_expandables(&self.page.snapshot()?);
            if found.is_empty() {
                return Ok(settled);
            }
            log::debug!("{} collapsed elements appeared after mutations", found.len());
            report.activations += self.activate_all(&found);
            seen = self.page.mutation_count()?;
            activated_at = Some(Instant::now());
        }
    }

    /// Wait until the counter stops moving for one debounce window.
    /// Returns `false` when the deadline arrives first.
    fn settle_burst(&self, mut count: u64, deadline: Instant) -> Result<bool> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO {
                return Ok(false);
            }
            std::thread::sleep(self.config.debounce.min(remaining));
            let next = self.page.mutation_count()?;
            if next == count {
                return Ok(true);
            }
            count = next;
        }
    }
}
