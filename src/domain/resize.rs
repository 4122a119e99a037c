use crate::domain::minutes::{snap_to_quarter_hour, MINUTES_IN_DAY, MIN_BLOCK_DURATION_MINUTES};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeEdge {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteRange {
    pub start: i64,
    pub end: i64,
}

impl MinuteRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResizeState {
    Idle,
    Resizing {
        block_id: String,
        edge: ResizeEdge,
        original: MinuteRange,
        preview: MinuteRange,
    },
}

/// Why a resize could not begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeBlocked {
    /// Another resize is already active in this session.
    SessionBusy,
    /// A commit for this block is still in flight.
    CommitPending,
}

/// The single update produced by releasing a changed preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeCommit {
    pub block_id: String,
    pub range: MinuteRange,
}

/// Interactive boundary-edit state machine. Pointer movement mutates only the
/// transient preview; the persisted block is touched exactly once, by the
/// commit returned from `release`, and never after `cancel`.
#[derive(Debug)]
pub struct ResizeSession {
    state: ResizeState,
    pending_commits: HashSet<String>,
}

impl Default for ResizeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ResizeSession {
    pub fn new() -> Self {
        Self {
            state: ResizeState::Idle,
            pending_commits: HashSet::new(),
        }
    }

    pub fn state(&self) -> &ResizeState {
        &self.state
    }

    pub fn is_commit_pending(&self, block_id: &str) -> bool {
        self.pending_commits.contains(block_id)
    }

    /// Captures the original range and enters `Resizing`.
    pub fn begin(
        &mut self,
        block_id: &str,
        edge: ResizeEdge,
        original: MinuteRange,
    ) -> Result<(), ResizeBlocked> {
        if !matches!(self.state, ResizeState::Idle) {
            return Err(ResizeBlocked::SessionBusy);
        }
        if self.pending_commits.contains(block_id) {
            return Err(ResizeBlocked::CommitPending);
        }
        self.state = ResizeState::Resizing {
            block_id: block_id.to_string(),
            edge,
            original,
            preview: original,
        };
        Ok(())
    }

    /// Recomputes the preview from a pointer minute: snap to the quarter
    /// hour, then clamp against the fixed opposite edge. Pointer events
    /// outside an active resize are ignored.
    pub fn preview(&mut self, pointer_minute: i64) -> Option<MinuteRange> {
        let ResizeState::Resizing { edge, preview, .. } = &mut self.state else {
            return None;
        };
        let snapped = snap_to_quarter_hour(pointer_minute);
        match edge {
            ResizeEdge::Start => {
                let max_start = preview.end - MIN_BLOCK_DURATION_MINUTES;
                preview.start = snapped.max(0).min(max_start);
            }
            ResizeEdge::End => {
                let min_end = preview.start + MIN_BLOCK_DURATION_MINUTES;
                preview.end = snapped.min(MINUTES_IN_DAY).max(min_end);
            }
        }
        Some(*preview)
    }

    /// Ends the interaction. Returns a commit only when the preview moved;
    /// the block is then marked in flight until `finish_commit`.
    pub fn release(&mut self) -> Option<ResizeCommit> {
        let state = std::mem::replace(&mut self.state, ResizeState::Idle);
        let ResizeState::Resizing {
            block_id,
            original,
            preview,
            ..
        } = state
        else {
            return None;
        };
        if preview == original {
            return None;
        }
        self.pending_commits.insert(block_id.clone());
        Some(ResizeCommit {
            block_id,
            range: preview,
        })
    }

    /// Discards the preview without producing a commit. Used on pointer
    /// capture loss and on teardown of the owning view.
    pub fn cancel(&mut self) {
        self.state = ResizeState::Idle;
    }

    /// Marks the in-flight commit for `block_id` as settled, whether it
    /// succeeded or failed.
    pub fn finish_commit(&mut self, block_id: &str) {
        self.pending_commits.remove(block_id);
    }
}
