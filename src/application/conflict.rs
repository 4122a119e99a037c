use crate::domain::models::{parse_date_key, TaskStatus};
use crate::domain::recurrence::day_bounds;
use crate::infrastructure::error::ScheduleError;
use crate::infrastructure::task_repository::TaskRepository;
use chrono_tz::Tz;
use std::sync::Arc;

/// Enforces the one-pending-task rule on deep block instances. Admin blocks
/// have no occupancy limit, so callers only consult the guard for deep
/// blocks, and only at assignment time.
pub struct ConflictGuard {
    tasks: Arc<dyn TaskRepository>,
}

impl ConflictGuard {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }

    /// Whether another pending task already occupies `block_id` on the day
    /// named by `date_key`, ignoring `excluding_task_id` so a re-assignment
    /// of the same task never conflicts with itself.
    pub fn deep_occupancy(
        &self,
        profile_id: &str,
        block_id: &str,
        date_key: &str,
        excluding_task_id: &str,
        tz: Tz,
    ) -> Result<bool, ScheduleError> {
        let date = parse_date_key(date_key).ok_or_else(|| {
            ScheduleError::Validation(format!("date_key must be YYYY-MM-DD: {date_key}"))
        })?;
        let (day_start, day_end) = day_bounds(date, tz);
        let assigned = self
            .tasks
            .list_assigned_for_date(profile_id, date_key, day_start, day_end)?;
        Ok(assigned.iter().any(|task| {
            task.id != excluding_task_id
                && task.status == TaskStatus::Pending
                && task.scheduled_block_id.as_deref() == Some(block_id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Task, TaskQueue};
    use crate::infrastructure::task_repository::InMemoryTaskRepository;
    use chrono::{DateTime, Utc};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn occupant(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            title: "Occupy".to_string(),
            description: None,
            queue: TaskQueue::Deep,
            status,
            assigned_profile_id: "prof-1".to_string(),
            scheduled_block_id: Some("blk-1".to_string()),
            scheduled_start: Some(fixed_time("2026-03-02T09:00:00Z")),
            scheduled_end: Some(fixed_time("2026-03-02T10:00:00Z")),
            scheduled_date_key: Some("2026-03-02".to_string()),
            created_at: fixed_time("2026-03-01T07:00:00Z"),
        }
    }

    #[test]
    fn occupied_by_other_pending_task() {
        let tasks = Arc::new(InMemoryTaskRepository::default());
        tasks
            .create(&occupant("tsk-1", TaskStatus::Pending))
            .expect("create");
        let guard = ConflictGuard::new(tasks);

        assert!(guard
            .deep_occupancy("prof-1", "blk-1", "2026-03-02", "tsk-2", Tz::UTC)
            .expect("occupancy check"));
        // The occupant itself may be re-assigned.
        assert!(!guard
            .deep_occupancy("prof-1", "blk-1", "2026-03-02", "tsk-1", Tz::UTC)
            .expect("occupancy check"));
        // Other days and other blocks stay free.
        assert!(!guard
            .deep_occupancy("prof-1", "blk-1", "2026-03-03", "tsk-2", Tz::UTC)
            .expect("occupancy check"));
        assert!(!guard
            .deep_occupancy("prof-1", "blk-2", "2026-03-02", "tsk-2", Tz::UTC)
            .expect("occupancy check"));
    }

    #[test]
    fn completed_occupant_does_not_block() {
        let tasks = Arc::new(InMemoryTaskRepository::default());
        tasks
            .create(&occupant("tsk-1", TaskStatus::Completed))
            .expect("create");
        let guard = ConflictGuard::new(tasks);
        assert!(!guard
            .deep_occupancy("prof-1", "blk-1", "2026-03-02", "tsk-2", Tz::UTC)
            .expect("occupancy check"));
    }

    #[test]
    fn legacy_occupant_without_date_key_still_counts() {
        let tasks = Arc::new(InMemoryTaskRepository::default());
        let mut legacy = occupant("tsk-1", TaskStatus::Pending);
        legacy.scheduled_date_key = None;
        tasks.create(&legacy).expect("create");
        let guard = ConflictGuard::new(tasks);
        assert!(guard
            .deep_occupancy("prof-1", "blk-1", "2026-03-02", "tsk-2", Tz::UTC)
            .expect("occupancy check"));
    }

    #[test]
    fn malformed_date_key_is_rejected() {
        let guard = ConflictGuard::new(Arc::new(InMemoryTaskRepository::default()));
        assert!(matches!(
            guard.deep_occupancy("prof-1", "blk-1", "not-a-date", "tsk-1", Tz::UTC),
            Err(ScheduleError::Validation(_))
        ));
    }
}
