use crate::domain::models::{format_date_key, DayView, TaskQueue};
use crate::domain::recurrence::{applies, day_bounds, resolve_instance};
use crate::infrastructure::block_repository::BlockRepository;
use crate::infrastructure::error::ScheduleError;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::sync::Arc;

/// Assembles the full day view: block instances with their assigned tasks,
/// plus the unscheduled candidates for the sidebar.
pub struct ScheduleAggregator {
    blocks: Arc<dyn BlockRepository>,
    tasks: Arc<dyn TaskRepository>,
}

impl ScheduleAggregator {
    pub fn new(blocks: Arc<dyn BlockRepository>, tasks: Arc<dyn TaskRepository>) -> Self {
        Self { blocks, tasks }
    }

    pub fn build_day_view(
        &self,
        profile_id: &str,
        date: NaiveDate,
        tz: Tz,
    ) -> Result<DayView, ScheduleError> {
        let date_key = format_date_key(date);
        let (day_start, day_end) = day_bounds(date, tz);

        let blocks = self.blocks.list_by_profile(profile_id)?;
        let mut instances = blocks
            .iter()
            .filter(|block| applies(block, date, tz))
            .map(|block| resolve_instance(block, date, tz))
            .collect::<Vec<_>>();

        let assigned = self
            .tasks
            .list_assigned_for_date(profile_id, &date_key, day_start, day_end)?;
        for instance in &mut instances {
            instance.tasks = assigned
                .iter()
                .filter(|task| {
                    task.scheduled_block_id.as_deref() == Some(instance.block_id.as_str())
                })
                .cloned()
                .collect();
            instance
                .tasks
                .sort_by(|left, right| left.scheduled_start.cmp(&right.scheduled_start));
        }
        instances.sort_by(|left, right| {
            left.start_minute_of_day
                .cmp(&right.start_minute_of_day)
                .then_with(|| left.block_id.cmp(&right.block_id))
        });

        // Pending deep tasks stay in the unscheduled list even when assigned,
        // so they can be re-placed freely; admin tasks drop out once placed.
        let unscheduled = self
            .tasks
            .list_pending_by_profile(profile_id)?
            .into_iter()
            .filter(|task| match task.queue {
                TaskQueue::Deep => true,
                TaskQueue::Admin => task.scheduled_block_id.is_none(),
            })
            .collect();

        Ok(DayView {
            date_key,
            instances,
            unscheduled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BlockType, Recurrence, ScheduleBlock, Task, TaskStatus};
    use chrono::{DateTime, Utc};
    use crate::infrastructure::block_repository::InMemoryBlockRepository;
    use crate::infrastructure::task_repository::InMemoryTaskRepository;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn block(id: &str, block_type: BlockType, start_minute: i64, end_minute: i64) -> ScheduleBlock {
        ScheduleBlock {
            id: id.to_string(),
            profile_id: "prof-1".to_string(),
            block_type,
            title: None,
            notes: None,
            start_minute_of_day: Some(start_minute),
            end_minute_of_day: Some(end_minute),
            recurrence: Recurrence::Weekly {
                days_of_week: Vec::new(),
            },
            created_at: fixed_time("2026-01-05T00:00:00Z"),
        }
    }

    fn task(id: &str, queue: TaskQueue) -> Task {
        Task {
            id: id.to_string(),
            title: "Chore".to_string(),
            description: None,
            queue,
            status: TaskStatus::Pending,
            assigned_profile_id: "prof-1".to_string(),
            scheduled_block_id: None,
            scheduled_start: None,
            scheduled_end: None,
            scheduled_date_key: None,
            created_at: fixed_time("2026-03-01T07:00:00Z"),
        }
    }

    struct Fixture {
        blocks: Arc<InMemoryBlockRepository>,
        tasks: Arc<InMemoryTaskRepository>,
        aggregator: ScheduleAggregator,
    }

    fn fixture() -> Fixture {
        let blocks = Arc::new(InMemoryBlockRepository::default());
        let tasks = Arc::new(InMemoryTaskRepository::default());
        let aggregator = ScheduleAggregator::new(
            Arc::clone(&blocks) as Arc<dyn BlockRepository>,
            Arc::clone(&tasks) as Arc<dyn TaskRepository>,
        );
        Fixture {
            blocks,
            tasks,
            aggregator,
        }
    }

    #[test]
    fn instances_are_sorted_and_filtered_by_recurrence() {
        let fixture = fixture();
        let mut monday_only = block("blk-monday", BlockType::Deep, 540, 600);
        monday_only.recurrence = Recurrence::Weekly {
            days_of_week: vec![1],
        };
        let mut early = block("blk-early", BlockType::Admin, 300, 360);
        early.profile_id = "prof-1".to_string();
        fixture.blocks.create(&monday_only).expect("create");
        fixture.blocks.create(&early).expect("create");

        // 2026-03-02 is a Monday; both blocks appear, earliest first.
        let monday_view = fixture
            .aggregator
            .build_day_view("prof-1", date("2026-03-02"), Tz::UTC)
            .expect("day view");
        let ids = monday_view
            .instances
            .iter()
            .map(|instance| instance.block_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["blk-early", "blk-monday"]);

        // On Tuesday only the every-day block remains.
        let tuesday_view = fixture
            .aggregator
            .build_day_view("prof-1", date("2026-03-03"), Tz::UTC)
            .expect("day view");
        assert_eq!(tuesday_view.instances.len(), 1);
        assert_eq!(tuesday_view.instances[0].block_id, "blk-early");
    }

    #[test]
    fn assigned_tasks_group_into_their_instance_sorted_by_start() {
        let fixture = fixture();
        fixture
            .blocks
            .create(&block("blk-admin", BlockType::Admin, 540, 660))
            .expect("create");

        let mut second = task("tsk-second", TaskQueue::Admin);
        second.scheduled_block_id = Some("blk-admin".to_string());
        second.scheduled_start = Some(fixed_time("2026-03-02T10:00:00Z"));
        second.scheduled_end = Some(fixed_time("2026-03-02T10:30:00Z"));
        second.scheduled_date_key = Some("2026-03-02".to_string());

        let mut first = task("tsk-first", TaskQueue::Admin);
        first.scheduled_block_id = Some("blk-admin".to_string());
        first.scheduled_start = Some(fixed_time("2026-03-02T09:00:00Z"));
        first.scheduled_end = Some(fixed_time("2026-03-02T09:30:00Z"));
        first.scheduled_date_key = Some("2026-03-02".to_string());

        fixture.tasks.create(&second).expect("create");
        fixture.tasks.create(&first).expect("create");

        let view = fixture
            .aggregator
            .build_day_view("prof-1", date("2026-03-02"), Tz::UTC)
            .expect("day view");
        let titles = view.instances[0]
            .tasks
            .iter()
            .map(|task| task.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["tsk-first", "tsk-second"]);
    }

    #[test]
    fn legacy_assignment_appears_in_day_view() {
        let fixture = fixture();
        fixture
            .blocks
            .create(&block("blk-deep", BlockType::Deep, 540, 600))
            .expect("create");

        let mut legacy = task("tsk-legacy", TaskQueue::Deep);
        legacy.scheduled_block_id = Some("blk-deep".to_string());
        legacy.scheduled_start = Some(fixed_time("2026-03-02T09:00:00Z"));
        fixture.tasks.create(&legacy).expect("create");

        let view = fixture
            .aggregator
            .build_day_view("prof-1", date("2026-03-02"), Tz::UTC)
            .expect("day view");
        assert_eq!(view.instances[0].tasks.len(), 1);
        assert_eq!(view.instances[0].tasks[0].id, "tsk-legacy");

        let other_day = fixture
            .aggregator
            .build_day_view("prof-1", date("2026-03-04"), Tz::UTC)
            .expect("day view");
        assert!(other_day.instances[0].tasks.is_empty());
    }

    #[test]
    fn unscheduled_keeps_assigned_deep_tasks_but_not_assigned_admin_tasks() {
        let fixture = fixture();
        fixture
            .blocks
            .create(&block("blk-deep", BlockType::Deep, 540, 600))
            .expect("create");

        let mut assigned_deep = task("tsk-deep", TaskQueue::Deep);
        assigned_deep.scheduled_block_id = Some("blk-deep".to_string());
        assigned_deep.scheduled_date_key = Some("2026-03-02".to_string());
        assigned_deep.scheduled_start = Some(fixed_time("2026-03-02T09:00:00Z"));
        assigned_deep.scheduled_end = Some(fixed_time("2026-03-02T10:00:00Z"));

        let mut assigned_admin = task("tsk-admin-assigned", TaskQueue::Admin);
        assigned_admin.scheduled_block_id = Some("blk-deep".to_string());
        assigned_admin.scheduled_date_key = Some("2026-03-02".to_string());

        let free_admin = task("tsk-admin-free", TaskQueue::Admin);
        let mut done_deep = task("tsk-deep-done", TaskQueue::Deep);
        done_deep.status = TaskStatus::Completed;

        for value in [&assigned_deep, &assigned_admin, &free_admin, &done_deep] {
            fixture.tasks.create(value).expect("create");
        }

        let view = fixture
            .aggregator
            .build_day_view("prof-1", date("2026-03-02"), Tz::UTC)
            .expect("day view");
        let ids = view
            .unscheduled
            .iter()
            .map(|task| task.id.as_str())
            .collect::<Vec<_>>();
        assert!(ids.contains(&"tsk-deep"));
        assert!(ids.contains(&"tsk-admin-free"));
        assert!(!ids.contains(&"tsk-admin-assigned"));
        assert!(!ids.contains(&"tsk-deep-done"));
    }

    #[test]
    fn other_profiles_are_invisible() {
        let fixture = fixture();
        let mut foreign_block = block("blk-foreign", BlockType::Deep, 540, 600);
        foreign_block.profile_id = "prof-2".to_string();
        fixture.blocks.create(&foreign_block).expect("create");
        let mut foreign_task = task("tsk-foreign", TaskQueue::Deep);
        foreign_task.assigned_profile_id = "prof-2".to_string();
        fixture.tasks.create(&foreign_task).expect("create");

        let view = fixture
            .aggregator
            .build_day_view("prof-1", date("2026-03-02"), Tz::UTC)
            .expect("day view");
        assert!(view.instances.is_empty());
        assert!(view.unscheduled.is_empty());
    }
}
