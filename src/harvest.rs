//! The harvest run: collect, expand, collect again, then mine overflow menus.
//!
//! A run moves through fixed phases:
//!
//! ```text
//! SeedCollect -> Expand -> ReCollect -> EnumerateTriggers -> ForEachTrigger -> Aggregate -> Done
//! ```
//!
//! Triggers are handled strictly one at a time in document order, so at most
//! one menu is open at any moment. A failure while handling one trigger is
//! logged and the run moves on to the next.

use crate::browser::{HarvestConfig, RelevancePolicy};
use crate::classify::{classify, has_document_extension};
use crate::dedup::ContainerDeduper;
use crate::dom::{DomTree, ElementNode, NodeHandle};
use crate::download::{DownloadSink, HeadFetcher, download_file};
use crate::error::Result;
use crate::expand::{DomExpander, ExpansionReport};
use crate::menu::MenuResolver;
use crate::page::Page;
use crate::protocol::{ClickDownloadsResponse, GetFilesResponse, MenuDownloadSummary};
use indexmap::IndexSet;
use std::fmt;

/// Markers recorded alongside URLs and stripped before reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// The page shows a control whose text mentions "download"
    PageDownloadButton,
    /// A menu download action without an address was activated
    MenuDownloadClicked,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Candidate {
    Url(String),
    Sentinel(Sentinel),
}

/// Insertion-ordered set of candidates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    items: IndexSet<Candidate>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the URL was already present
    pub fn insert_url(&mut self, url: impl Into<String>) -> bool {
        self.items.insert(Candidate::Url(url.into()))
    }

    pub fn insert_sentinel(&mut self, sentinel: Sentinel) -> bool {
        self.items.insert(Candidate::Sentinel(sentinel))
    }

    pub fn extend(&mut self, other: &ResultSet) {
        self.items.extend(other.items.iter().cloned());
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.items.contains(&Candidate::Url(url.to_string()))
    }

    pub fn has_sentinel(&self, sentinel: Sentinel) -> bool {
        self.items.contains(&Candidate::Sentinel(sentinel))
    }

    /// URLs in insertion order, sentinels removed
    pub fn urls(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|c| match c {
                Candidate::Url(url) => Some(url.clone()),
                Candidate::Sentinel(_) => None,
            })
            .collect()
    }

    /// Number of URLs
    pub fn len(&self) -> usize {
        self.items.iter().filter(|c| matches!(c, Candidate::Url(_))).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn inside_frame(tree: &DomTree, ix: usize) -> bool {
    tree.ancestors(ix).any(|a| tree.element(a).is_tag("iframe"))
}

fn is_button_like(el: &ElementNode) -> bool {
    el.is_tag("button") || el.role() == Some("button") || el.is_tag("span")
}

/// One collect pass over a snapshot.
///
/// Takes anchors whose address classifies as a file, anchors carrying a
/// `download` attribute, and file anchors inside same-origin frames. Notes a
/// sentinel when any button-like element's text mentions "download".
pub fn collect_files(tree: &DomTree) -> ResultSet {
    let mut files = ResultSet::new();
    let mut anchors = 0;
    let mut rejected = Vec::new();

    for ix in 0..tree.count_elements() {
        let el = tree.element(ix);

        if let Some(url) = tree.link_url(ix) {
            anchors += 1;
            if classify(&url).is_file() {
                log::debug!("Found file URL: {}", url);
                files.insert_url(url);
            } else if el.has_attribute("download") && !inside_frame(tree, ix) {
                log::debug!("Found download attribute URL: {}", url);
                files.insert_url(url);
            } else {
                rejected.push(url);
            }
        }

        if is_button_like(el) && tree.text(ix).to_lowercase().contains("download") {
            files.insert_sentinel(Sentinel::PageDownloadButton);
        }
    }

    log::debug!("Collection summary: {} file URLs found out of {} anchors", files.len(), anchors);
    if files.is_empty() && !rejected.is_empty() {
        log::debug!("No files found. First rejected URLs: {:?}", &rejected[..rejected.len().min(20)]);
    }
    files
}

/// Menu trigger selectors. `include_collapsed` adds `[aria-expanded=false][aria-haspopup=true]`.
fn is_menu_trigger(el: &ElementNode, include_collapsed: bool) -> bool {
    let menu_popup = el.attr_is("aria-haspopup", "menu");
    (menu_popup && (el.is_tag("button") || el.role() == Some("button")))
        || (include_collapsed && el.attr_is("aria-expanded", "false") && el.attr_is("aria-haspopup", "true"))
}

/// Rendered menu triggers in document order
pub fn enumerate_triggers(tree: &DomTree, include_collapsed: bool) -> Vec<usize> {
    tree.select_all(|el| el.is_rendered() && is_menu_trigger(el, include_collapsed))
}

/// Whether the trigger's item looks like it holds a file.
///
/// The item is the trigger's container, or the trigger itself when it has
/// none. It qualifies through a link that classifies as a file or ends in a
/// document extension, or through text naming one of the policy keywords.
pub fn is_likely_file_item(
    tree: &DomTree,
    trigger_ix: usize,
    deduper: &ContainerDeduper,
    policy: &RelevancePolicy,
) -> bool {
    let scope = deduper.container_for(tree, trigger_ix).and_then(|h| tree.find(h)).unwrap_or(trigger_ix);

    let has_file_link = tree
        .subtree(scope)
        .filter_map(|ix| tree.link_url(ix))
        .any(|url| classify(&url).is_file() || has_document_extension(&url));
    if has_file_link {
        return true;
    }

    let text = tree.text(scope).to_lowercase();
    policy.keywords.iter().any(|k| text.contains(&k.to_lowercase()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SeedCollect,
    Expand,
    ReCollect,
    EnumerateTriggers,
    ForEachTrigger,
    Aggregate,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::SeedCollect => "seed collect",
            Phase::Expand => "expand",
            Phase::ReCollect => "re-collect",
            Phase::EnumerateTriggers => "enumerate triggers",
            Phase::ForEachTrigger => "process triggers",
            Phase::Aggregate => "aggregate",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Per-run trigger counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerStats {
    /// Visible triggers on the page
    pub found: usize,
    /// Triggers that passed the relevance policy
    pub relevant: usize,
    /// Triggers whose menu was opened
    pub opened: usize,
    /// Triggers skipped because their container was already handled
    pub duplicates: usize,
    /// Triggers that failed and were skipped
    pub failed: usize,
}

/// State of one harvest run
#[derive(Debug, Clone)]
pub struct HarvestRun {
    phase: Phase,
    pub seeds: ResultSet,
    pub post_expand: ResultSet,
    pub menu: ResultSet,
    pub deduper: ContainerDeduper,
    pub expansion: Option<ExpansionReport>,
    pub triggers: TriggerStats,
}

impl HarvestRun {
    pub fn new(container_depth: usize) -> Self {
        Self {
            phase: Phase::SeedCollect,
            seeds: ResultSet::new(),
            post_expand: ResultSet::new(),
            menu: ResultSet::new(),
            deduper: ContainerDeduper::new(container_depth),
            expansion: None,
            triggers: TriggerStats::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        log::debug!("Harvest phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Union of every source, sentinels included
    pub fn aggregate(&self) -> ResultSet {
        let mut all = self.seeds.clone();
        all.extend(&self.post_expand);
        all.extend(&self.menu);
        all
    }

    /// Unique file URLs
    pub fn files(&self) -> Vec<String> {
        self.aggregate().urls()
    }
}

/// Runs harvests against one page
pub struct Harvester<'a, P: Page + ?Sized> {
    page: &'a P,
    config: &'a HarvestConfig,
}

impl<'a, P: Page + ?Sized> Harvester<'a, P> {
    pub fn new(page: &'a P, config: &'a HarvestConfig) -> Self {
        Self { page, config }
    }

    /// A single collect pass over the current page
    pub fn collect(&self) -> Result<ResultSet> {
        Ok(collect_files(&self.page.snapshot()?))
    }

    pub fn get_files(&self) -> Result<GetFilesResponse> {
        Ok(GetFilesResponse { files: self.run()?.files() })
    }

    /// Full harvest
    pub fn run(&self) -> Result<HarvestRun> {
        let mut run = HarvestRun::new(self.config.container_depth);

        run.seeds = self.collect()?;
        log::info!("Initial files found before expanding: {}", run.seeds.len());

        run.enter(Phase::Expand);
        match DomExpander::new(self.page, self.config).expand_all() {
            Ok(report) => run.expansion = Some(report),
            Err(e) => log::warn!("Expansion failed, continuing with what is rendered: {}", e),
        }

        run.enter(Phase::ReCollect);
        run.post_expand = self.collect()?;
        log::info!("Files found after expansion: {}", run.post_expand.len());

        run.enter(Phase::EnumerateTriggers);
        let tree = self.page.snapshot()?;
        let all = enumerate_triggers(&tree, true);
        let relevant: Vec<NodeHandle> = all
            .iter()
            .copied()
            .filter(|&ix| is_likely_file_item(&tree, ix, &run.deduper, &self.config.relevance))
            .map(|ix| tree.handle(ix))
            .collect();
        run.triggers.found = all.len();
        run.triggers.relevant = relevant.len();
        log::info!("Found {} menu triggers, {} likely file-related", all.len(), relevant.len());

        run.enter(Phase::ForEachTrigger);
        for trigger in relevant {
            if let Err(e) = self.process_trigger(&mut run, trigger) {
                log::warn!("Skipping menu trigger {}: {}", trigger, e);
                run.triggers.failed += 1;
            }
            std::thread::sleep(self.config.trigger_gap);
        }

        run.enter(Phase::Aggregate);
        let files = run.files();
        log::info!("Combined unique files found: {}", files.len());

        run.enter(Phase::Done);
        Ok(run)
    }

    fn process_trigger(&self, run: &mut HarvestRun, trigger: NodeHandle) -> Result<()> {
        let tree = self.page.snapshot()?;
        let Some(trigger_ix) = tree.find(trigger) else {
            log::debug!("Trigger {} is gone", trigger);
            return Ok(());
        };

        let container = run.deduper.container_for(&tree, trigger_ix);
        if container.is_some_and(|c| run.deduper.seen(c)) {
            log::debug!("Skipping already processed container for {}", trigger);
            run.triggers.duplicates += 1;
            return Ok(());
        }
        log::debug!("Processing menu trigger {}", tree.element(trigger_ix).to_simple_string());

        let resolver = MenuResolver::new(self.page, self.config);
        let extracted = self.extract_from_menu(&resolver, run, trigger);

        if let Some(container) = container {
            run.deduper.mark_seen(container);
        }
        match resolver.close_and_wait() {
            Ok(true) => {}
            Ok(false) => log::debug!("Menu for {} still open after the close wait", trigger),
            Err(e) => log::debug!("Could not close menu for {}: {}", trigger, e),
        }

        extracted
    }

    fn extract_from_menu(
        &self,
        resolver: &MenuResolver<'_, P>,
        run: &mut HarvestRun,
        trigger: NodeHandle,
    ) -> Result<()> {
        let Some(menu) = resolver.open_and_resolve(trigger)? else {
            log::debug!("No menu appeared after activating {}", trigger);
            return Ok(());
        };
        run.triggers.opened += 1;

        for link in menu.links.iter().filter(|l| classify(l).is_file()) {
            log::debug!("Found direct file link in menu: {}", link);
            run.menu.insert_url(link.as_str());
        }

        let Some(item) = menu.download else {
            return Ok(());
        };
        match item.href.filter(|href| classify(href).is_file()) {
            Some(href) => {
                log::debug!("Found download item with address in menu: {}", href);
                run.menu.insert_url(href);
            }
            None => {
                log::debug!("Activating download item {} without a file address", item.element);
                self.page.activate(item.element)?;
                run.menu.insert_sentinel(Sentinel::MenuDownloadClicked);
            }
        }
        Ok(())
    }

    /// Open up to `limit` menu triggers and activate each one's download action.
    ///
    /// No relevance filter applies. `total` counts every visible trigger,
    /// including those beyond the limit.
    pub fn start_overflow_downloads(&self, limit: usize) -> Result<MenuDownloadSummary> {
        let tree = self.page.snapshot()?;
        let triggers: Vec<NodeHandle> =
            enumerate_triggers(&tree, false).into_iter().map(|ix| tree.handle(ix)).collect();
        let resolver = MenuResolver::new(self.page, self.config);

        let mut started = 0;
        for &trigger in triggers.iter().take(limit) {
            match self.activate_menu_download(&resolver, trigger) {
                Ok(true) => started += 1,
                Ok(false) => log::debug!("No download action behind {}", trigger),
                Err(e) => log::warn!("Skipping menu trigger {}: {}", trigger, e),
            }
            std::thread::sleep(self.config.trigger_gap);
        }

        if let Err(e) = resolver.close_open_menus() {
            log::debug!("Could not close the last menu: {}", e);
        }

        log::info!("Menu downloads started: {} of {} triggers", started, triggers.len());
        Ok(MenuDownloadSummary { total: triggers.len(), started })
    }

    fn activate_menu_download(&self, resolver: &MenuResolver<'_, P>, trigger: NodeHandle) -> Result<bool> {
        let Some(item) = resolver.open_and_resolve(trigger)?.and_then(|m| m.download) else {
            return Ok(false);
        };
        self.page.activate(item.element)?;
        Ok(true)
    }

    /// Menu download actions first, then every file anchor still on the page
    pub fn click_downloads<H, D>(&self, fetcher: &H, sink: &D) -> Result<ClickDownloadsResponse>
    where
        H: HeadFetcher + ?Sized,
        D: DownloadSink + ?Sized,
    {
        let menu = self.start_overflow_downloads(self.config.overflow_limit)?;

        let mut anchor_started = 0;
        for url in self.collect()?.urls() {
            match download_file(fetcher, sink, &url) {
                Ok(_) => anchor_started += 1,
                Err(e) => log::warn!("Download failed for {}: {}", url, e),
            }
        }

        Ok(ClickDownloadsResponse { clicked: true, menu, anchor_started })
    }
}
