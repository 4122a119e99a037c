use crate::domain::models::{BlockInstance, ScheduleBlock};
use crate::domain::recurrence::apply_minute_range;
use crate::domain::resize::{
    MinuteRange, ResizeBlocked, ResizeEdge, ResizeSession, ResizeState,
};
use crate::infrastructure::block_repository::BlockRepository;
use crate::infrastructure::error::ScheduleError;
use chrono_tz::Tz;
use std::sync::Arc;

/// Drives a `ResizeSession` against the block store. Pointer movement only
/// updates the transient preview; pointer-up issues at most one store update
/// per interaction, and a cancelled interaction issues none.
pub struct ResizeController {
    session: ResizeSession,
    blocks: Arc<dyn BlockRepository>,
    tz: Tz,
}

impl ResizeController {
    pub fn new(blocks: Arc<dyn BlockRepository>, tz: Tz) -> Self {
        Self {
            session: ResizeSession::new(),
            blocks,
            tz,
        }
    }

    pub fn state(&self) -> &ResizeState {
        self.session.state()
    }

    /// Pointer-down on a block handle. The instance carries the resolved
    /// minute range that becomes the revert point.
    pub fn pointer_down(
        &mut self,
        instance: &BlockInstance,
        edge: ResizeEdge,
    ) -> Result<(), ScheduleError> {
        self.session
            .begin(
                &instance.block_id,
                edge,
                MinuteRange::new(instance.start_minute_of_day, instance.end_minute_of_day),
            )
            .map_err(|blocked| match blocked {
                ResizeBlocked::SessionBusy => {
                    ScheduleError::Validation("a resize is already in progress".to_string())
                }
                ResizeBlocked::CommitPending => ScheduleError::Conflict(
                    "an update for this block is still in flight".to_string(),
                ),
            })
    }

    /// Pointer movement; returns the preview range for rendering.
    pub fn pointer_move(&mut self, pointer_minute: i64) -> Option<MinuteRange> {
        self.session.preview(pointer_minute)
    }

    /// Pointer-up. Returns the updated block when a changed preview was
    /// committed, `None` when nothing moved. On a store failure the preview
    /// is already discarded, so the caller reverts to the original range and
    /// surfaces the error kind.
    pub fn pointer_up(&mut self) -> Result<Option<ScheduleBlock>, ScheduleError> {
        let Some(commit) = self.session.release() else {
            return Ok(None);
        };
        let result = self.persist(&commit.block_id, commit.range);
        self.session.finish_commit(&commit.block_id);
        result.map(Some)
    }

    /// Pointer capture lost or the owning view tore down.
    pub fn cancel(&mut self) {
        self.session.cancel();
    }

    fn persist(&self, block_id: &str, range: MinuteRange) -> Result<ScheduleBlock, ScheduleError> {
        let mut block = self
            .blocks
            .get(block_id)?
            .ok_or_else(|| ScheduleError::NotFound(format!("block not found: {block_id}")))?;
        apply_minute_range(&mut block, range.start, range.end, self.tz);
        block
            .validate()
            .map_err(ScheduleError::Validation)?;
        self.blocks.update(&block)?;
        Ok(block)
    }
}
