//! Progress tracking for action history sync.
//!
//! One `SyncProgressTracker` lives for one `ActionSyncManager::sync` pass. It records every page
//! the chain returned, counts the new actions, and decides when the pass has to stop: either the
//! chain has nothing more, or the per-sync page limit was hit and the rest is left for the next
//! pass.

use tracing::info;

#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// Cursor the pass started from
    start_cursor: u64,
    /// Cursor for the next page request
    cursor: u64,
    pages_fetched: u32,
    max_pages: u32,
    actions_synced: usize,
    highest_sequence: Option<u64>,
    last_irreversible_block: Option<u64>,
    exhausted: bool,
}

impl SyncProgressTracker {
    /// Create a tracker resuming after `last_sequence`, the highest persisted sequence number.
    pub fn new(last_sequence: Option<u64>, max_pages: u32) -> Self {
        let start_cursor = last_sequence.map_or(0, |s| s + 1);
        Self {
            start_cursor,
            cursor: start_cursor,
            pages_fetched: 0,
            max_pages: max_pages.max(1),
            actions_synced: 0,
            highest_sequence: last_sequence,
            last_irreversible_block: None,
            exhausted: false,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Record one fetched page.
    ///
    /// `new_sequences` are the sequence numbers of the actions that were new to this pass, in
    /// ascending order. `next_cursor` is the chain's cursor for the following page.
    pub fn record_page(
        &mut self,
        new_sequences: &[u64],
        next_cursor: Option<u64>,
        last_irreversible_block: u64,
    ) {
        self.pages_fetched += 1;
        self.actions_synced += new_sequences.len();
        self.last_irreversible_block = Some(last_irreversible_block);

        if let Some(&last) = new_sequences.last() {
            self.highest_sequence = Some(self.highest_sequence.map_or(last, |h| h.max(last)));
            self.cursor = self.cursor.max(last + 1);
        }

        match next_cursor {
            // A page without new actions cannot move the cursor, stop rather than spin.
            Some(next) if !new_sequences.is_empty() => self.cursor = self.cursor.max(next),
            _ => self.exhausted = true,
        }
    }

    /// Whether another page should be requested.
    pub fn should_continue(&self) -> bool {
        !self.exhausted && self.pages_fetched < self.max_pages
    }

    /// True when the pass ended because of the page limit while the chain still had more.
    pub fn hit_page_limit(&self) -> bool {
        !self.exhausted && self.pages_fetched >= self.max_pages
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            start_cursor: self.start_cursor,
            pages_fetched: self.pages_fetched,
            actions_synced: self.actions_synced,
            highest_sequence: self.highest_sequence,
            last_irreversible_block: self.last_irreversible_block,
        }
    }

    pub fn log_progress(&self, account: &str) {
        info!("Action sync for {}: {}", account, self.get_stats().summary());
        if self.hit_page_limit() {
            info!(
                "Action sync for {} stopped after {} pages, remaining history continues on the next sync",
                account, self.pages_fetched
            );
        }
    }
}

/// Statistics about one action sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub start_cursor: u64,
    pub pages_fetched: u32,
    pub actions_synced: usize,
    pub highest_sequence: Option<u64>,
    pub last_irreversible_block: Option<u64>,
}

impl SyncStats {
    pub fn summary(&self) -> String {
        format!(
            "{} new actions in {} pages from cursor {}{}",
            self.actions_synced,
            self.pages_fetched,
            self.start_cursor,
            match self.highest_sequence {
                Some(seq) => format!(", highest sequence {}", seq),
                None => String::new(),
            }
        )
    }
}
