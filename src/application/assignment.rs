use crate::application::conflict::ConflictGuard;
use crate::domain::models::{format_date_key, parse_date_key, BlockType, Task};
use crate::domain::recurrence::resolve_instance;
use crate::infrastructure::block_repository::BlockRepository;
use crate::infrastructure::error::ScheduleError;
use crate::infrastructure::task_repository::{TaskAssignment, TaskRepository};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct AssignmentRequest {
    pub block_id: String,
    pub task_id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub date_key: Option<String>,
}

/// Orchestrates putting a task into a block instance and taking it back out.
/// Reads run first; the only mutation is the final single-task write.
pub struct AssignmentCoordinator {
    blocks: Arc<dyn BlockRepository>,
    tasks: Arc<dyn TaskRepository>,
    guard: ConflictGuard,
}

impl AssignmentCoordinator {
    pub fn new(blocks: Arc<dyn BlockRepository>, tasks: Arc<dyn TaskRepository>) -> Self {
        let guard = ConflictGuard::new(Arc::clone(&tasks));
        Self {
            blocks,
            tasks,
            guard,
        }
    }

    pub fn assign(
        &self,
        request: &AssignmentRequest,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Task, ScheduleError> {
        let block = self
            .blocks
            .get(&request.block_id)?
            .ok_or_else(|| {
                ScheduleError::NotFound(format!("block not found: {}", request.block_id))
            })?;
        let task = self
            .tasks
            .get(&request.task_id)?
            .ok_or_else(|| ScheduleError::NotFound(format!("task not found: {}", request.task_id)))?;

        if task.assigned_profile_id != block.profile_id {
            return Err(ScheduleError::Forbidden(
                "task belongs to a different profile".to_string(),
            ));
        }

        let (start, end) = match (request.start, request.end) {
            (Some(start), Some(end)) if end > start => (start, end),
            _ => {
                let reference = task
                    .scheduled_start
                    .or(request.start)
                    .unwrap_or(now);
                let reference_date = reference.with_timezone(&tz).date_naive();
                let instance = resolve_instance(&block, reference_date, tz);
                (instance.start, instance.end)
            }
        };

        let date_key = request
            .date_key
            .as_deref()
            .and_then(parse_date_key)
            .map(format_date_key)
            .unwrap_or_else(|| format_date_key(start.with_timezone(&tz).date_naive()));

        if block.block_type == BlockType::Deep {
            let occupied = self.guard.deep_occupancy(
                &block.profile_id,
                &block.id,
                &date_key,
                &task.id,
                tz,
            )?;
            if occupied {
                return Err(ScheduleError::Conflict(
                    "deep block already has a task for this date".to_string(),
                ));
            }
        }

        self.tasks.update_assignment(
            &task.id,
            &TaskAssignment {
                block_id: block.id.clone(),
                start,
                end,
                date_key,
            },
        )
    }

    /// Clears the assignment fields. A task that is not assigned clears to
    /// the same state, so repeating the call is a no-op success.
    pub fn unassign(&self, task_id: &str) -> Result<Task, ScheduleError> {
        self.tasks
            .get(task_id)?
            .ok_or_else(|| ScheduleError::NotFound(format!("task not found: {task_id}")))?;
        self.tasks.clear_assignment(task_id)
    }
}
