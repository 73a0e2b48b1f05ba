//! Follows the browser's download manager through `Browser.downloadWillBegin`
//! and `Browser.downloadProgress` events, so callers can wait for started
//! downloads to land before the browser goes away.

use headless_chrome::protocol::cdp::types::Event;
use serde::Serialize;
use std::{collections::HashMap,
          sync::{Arc, Mutex, MutexGuard, PoisonError},
          thread,
          time::{Duration, Instant}};

/// Where one download stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    InProgress,
    Completed,
    Canceled,
}

impl DownloadState {
    /// Parse the protocol's `state` string
    pub fn from_protocol(state: &str) -> Option<Self> {
        match state {
            "inProgress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// Downloads seen so far, by outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadTally {
    pub completed: usize,
    pub canceled: usize,
    pub pending: usize,
}

impl DownloadTally {
    pub fn seen(&self) -> usize {
        self.completed + self.canceled + self.pending
    }
}

#[derive(Debug)]
struct Ledger {
    states: HashMap<String, DownloadState>,
    last_event: Instant,
}

/// Shared record of every download the browser reported
#[derive(Debug, Clone)]
pub struct DownloadTracker {
    ledger: Arc<Mutex<Ledger>>,
}

impl Default for DownloadTracker {
    fn default() -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger { states: HashMap::new(), last_event: Instant::now() })),
        }
    }
}

impl DownloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // The ledger is plain data; a panicking listener cannot leave it half-written
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A download was announced
    pub fn begun(&self, guid: &str) {
        let mut ledger = self.ledger();
        ledger.states.entry(guid.to_string()).or_insert(DownloadState::InProgress);
        ledger.last_event = Instant::now();
    }

    /// A download reported progress. Finished downloads stay finished.
    pub fn progressed(&self, guid: &str, state: DownloadState) {
        let mut ledger = self.ledger();
        let entry = ledger.states.entry(guid.to_string()).or_insert(state);
        if *entry == DownloadState::InProgress {
            *entry = state;
        }
        ledger.last_event = Instant::now();
    }

    /// Feed one CDP event; anything but download events is ignored
    pub fn record(&self, event: &Event) {
        match event {
            Event::BrowserDownloadWillBegin(ev) => {
                log::debug!("Download {} began: {}", ev.params.guid, ev.params.url);
                self.begun(&ev.params.guid);
            }
            Event::BrowserDownloadProgress(ev) => {
                let state = serde_json::to_value(&ev.params.state)
                    .ok()
                    .and_then(|v| v.as_str().and_then(DownloadState::from_protocol));
                match state {
                    Some(state) => {
                        if state != DownloadState::InProgress {
                            log::debug!("Download {} finished: {:?}", ev.params.guid, state);
                        }
                        self.progressed(&ev.params.guid, state);
                    }
                    None => log::debug!("Unrecognised download state for {}", ev.params.guid),
                }
            }
            _ => {}
        }
    }

    pub fn tally(&self) -> DownloadTally {
        let ledger = self.ledger();
        ledger.states.values().fold(DownloadTally::default(), |mut tally, state| {
            match state {
                DownloadState::InProgress => tally.pending += 1,
                DownloadState::Completed => tally.completed += 1,
                DownloadState::Canceled => tally.canceled += 1,
            }
            tally
        })
    }

    fn quiet_for(&self) -> Duration {
        self.ledger().last_event.elapsed()
    }

    /// Block until nothing is pending and either `expected` downloads were seen
    /// or the browser has been silent for `quiet`. Never waits past `timeout`.
    pub fn wait_idle(&self, expected: usize, quiet: Duration, timeout: Duration) -> DownloadTally {
        let deadline = Instant::now() + timeout;
        let poll = quiet.min(Duration::from_millis(250)).max(Duration::from_millis(1));

        loop {
            let tally = self.tally();
            if tally.pending == 0 && (tally.seen() >= expected || self.quiet_for() >= quiet) {
                return tally;
            }
            if Instant::now() >= deadline {
                log::warn!("Gave up waiting on {} unfinished download(s)", tally.pending);
                return tally;
            }
            thread::sleep(poll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_states() {
        assert_eq!(DownloadState::from_protocol("inProgress"), Some(DownloadState::InProgress));
        assert_eq!(DownloadState::from_protocol("completed"), Some(DownloadState::Completed));
        assert_eq!(DownloadState::from_protocol("canceled"), Some(DownloadState::Canceled));
        assert_eq!(DownloadState::from_protocol("paused"), None);
    }

    #[test]
    fn test_tally_counts_outcomes() {
        let tracker = DownloadTracker::new();
        tracker.begun("a");
        tracker.begun("b");
        tracker.begun("c");
        tracker.progressed("a", DownloadState::Completed);
        tracker.progressed("b", DownloadState::Canceled);
        tracker.progressed("c", DownloadState::InProgress);

        assert_eq!(tracker.tally(), DownloadTally { completed: 1, canceled: 1, pending: 1 });
    }

    #[test]
    fn test_finished_download_stays_finished() {
        let tracker = DownloadTracker::new();
        tracker.begun("a");
        tracker.progressed("a", DownloadState::Completed);
        tracker.progressed("a", DownloadState::InProgress);
        tracker.begun("a");

        assert_eq!(tracker.tally(), DownloadTally { completed: 1, canceled: 0, pending: 0 });
    }

    #[test]
    fn test_wait_returns_once_expected_downloads_finish() {
        let tracker = DownloadTracker::new();
        tracker.begun("a");

        let worker = tracker.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            worker.progressed("a", DownloadState::Completed);
        });

        let start = Instant::now();
        let tally = tracker.wait_idle(1, Duration::from_secs(5), Duration::from_secs(5));
        handle.join().unwrap();

        assert_eq!(tally.completed, 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_wait_gives_up_on_stalled_download() {
        let tracker = DownloadTracker::new();
        tracker.begun("stalled");

        let start = Instant::now();
        let tally = tracker.wait_idle(1, Duration::from_millis(10), Duration::from_millis(60));

        assert_eq!(tally.pending, 1);
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_stops_when_fewer_downloads_arrive_than_clicked() {
        let tracker = DownloadTracker::new();
        tracker.begun("a");
        tracker.progressed("a", DownloadState::Completed);

        // Three clicks, one download: silence ends the wait before the timeout
        let start = Instant::now();
        let tally = tracker.wait_idle(3, Duration::from_millis(40), Duration::from_secs(5));

        assert_eq!(tally.seen(), 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
