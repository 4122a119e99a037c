//! Scheduling core of the HomeBlocks household planner: resolves recurring
//! and one-off time blocks into per-day instances, assigns tasks to those
//! instances, and drives cancel-safe interactive resizing of block
//! boundaries. Task lifecycle, profiles, and rewards live with the caller.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::assignment::{AssignmentCoordinator, AssignmentRequest};
pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::commands::{
    assign_task_impl, create_block_impl, day_view_impl, delete_block_impl, list_blocks_impl,
    unassign_task_impl, update_block_impl, AppState, CreateBlockRequest, UpdateBlockRequest,
};
pub use application::conflict::ConflictGuard;
pub use application::day_view::ScheduleAggregator;
pub use application::resize::ResizeController;
pub use domain::minutes::{clamp_range, snap_to_quarter_hour};
pub use domain::models::{
    BlockInstance, BlockType, DayView, Recurrence, ScheduleBlock, Task, TaskQueue, TaskStatus,
};
pub use domain::recurrence::{applies, day_bounds, day_start, resolve_instance};
pub use domain::resize::{
    MinuteRange, ResizeBlocked, ResizeCommit, ResizeEdge, ResizeSession, ResizeState,
};
pub use infrastructure::block_repository::{
    BlockRepository, InMemoryBlockRepository, SqliteBlockRepository,
};
pub use infrastructure::error::ScheduleError;
pub use infrastructure::task_repository::{
    assignment_matches_day, InMemoryTaskRepository, SqliteTaskRepository, TaskAssignment,
    TaskRepository,
};
