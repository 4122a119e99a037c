use crate::domain::models::{Task, TaskQueue, TaskStatus};
use crate::infrastructure::block_repository::parse_stored_datetime;
use crate::infrastructure::error::ScheduleError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The four assignment fields, written or cleared together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAssignment {
    pub block_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub date_key: String,
}

pub trait TaskRepository: Send + Sync {
    fn get(&self, task_id: &str) -> Result<Option<Task>, ScheduleError>;
    fn create(&self, task: &Task) -> Result<(), ScheduleError>;
    fn list_pending_by_profile(&self, profile_id: &str) -> Result<Vec<Task>, ScheduleError>;
    /// Tasks assigned to a block on the given day, matched by
    /// `assignment_matches_day`.
    fn list_assigned_for_date(
        &self,
        profile_id: &str,
        date_key: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<Vec<Task>, ScheduleError>;
    fn update_assignment(
        &self,
        task_id: &str,
        assignment: &TaskAssignment,
    ) -> Result<Task, ScheduleError>;
    fn clear_assignment(&self, task_id: &str) -> Result<Task, ScheduleError>;
    fn clear_assignments_for_block(&self, block_id: &str) -> Result<usize, ScheduleError>;
}

/// Backward-compatibility shim for records that predate `scheduled_date_key`.
/// A task matches a day when its date key equals `date_key` exactly; a task
/// without a date key matches when its `scheduled_start` falls inside
/// `[day_start, day_end)`, or unconditionally when it has no start either.
/// Once every record carries a date key the two legacy branches can go.
pub fn assignment_matches_day(
    task: &Task,
    date_key: &str,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
) -> bool {
    if let Some(key) = task.scheduled_date_key.as_deref() {
        return key == date_key;
    }
    match task.scheduled_start {
        Some(start) => day_start <= start && start < day_end,
        None => true,
    }
}

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, ScheduleError> {
        Connection::open(&self.db_path).map_err(ScheduleError::from)
    }

    fn get_with(
        &self,
        connection: &Connection,
        task_id: &str,
    ) -> Result<Option<Task>, ScheduleError> {
        let row = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                read_task_row,
            )
            .optional()?;
        row.map(row_to_task).transpose()
    }
}

const TASK_COLUMNS: &str = "id, title, description, queue, status, assigned_profile_id, \
     scheduled_block_id, scheduled_start, scheduled_end, scheduled_date_key, created_at";

type TaskRow = (
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn read_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn row_to_task(row: TaskRow) -> Result<Task, ScheduleError> {
    let (
        id,
        title,
        description,
        queue,
        status,
        assigned_profile_id,
        scheduled_block_id,
        scheduled_start,
        scheduled_end,
        scheduled_date_key,
        created_at,
    ) = row;

    let scheduled_start = scheduled_start
        .map(|raw| parse_stored_datetime(&raw, "scheduled_start", &id))
        .transpose()?;
    let scheduled_end = scheduled_end
        .map(|raw| parse_stored_datetime(&raw, "scheduled_end", &id))
        .transpose()?;

    Ok(Task {
        created_at: parse_stored_datetime(&created_at, "created_at", &id)?,
        queue: parse_queue_column(&queue)?,
        status: parse_status_column(&status)?,
        id,
        title,
        description,
        assigned_profile_id,
        scheduled_block_id,
        scheduled_start,
        scheduled_end,
        scheduled_date_key,
    })
}

fn queue_column(queue: TaskQueue) -> &'static str {
    match queue {
        TaskQueue::Deep => "deep",
        TaskQueue::Admin => "admin",
    }
}

fn parse_queue_column(value: &str) -> Result<TaskQueue, ScheduleError> {
    match value {
        "deep" => Ok(TaskQueue::Deep),
        "admin" => Ok(TaskQueue::Admin),
        other => Err(ScheduleError::Storage(format!("unknown queue '{other}'"))),
    }
}

fn status_column(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Completed => "completed",
        TaskStatus::Cancelled => "cancelled",
        TaskStatus::Archived => "archived",
    }
}

fn parse_status_column(value: &str) -> Result<TaskStatus, ScheduleError> {
    match value {
        "pending" => Ok(TaskStatus::Pending),
        "completed" => Ok(TaskStatus::Completed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        "archived" => Ok(TaskStatus::Archived),
        other => Err(ScheduleError::Storage(format!("unknown status '{other}'"))),
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn get(&self, task_id: &str) -> Result<Option<Task>, ScheduleError> {
        let connection = self.connect()?;
        self.get_with(&connection, task_id)
    }

    fn create(&self, task: &Task) -> Result<(), ScheduleError> {
        let connection = self.connect()?;
        if self.get_with(&connection, &task.id)?.is_some() {
            return Err(ScheduleError::Conflict(format!(
                "task already exists: {}",
                task.id
            )));
        }
        connection.execute(
            "INSERT INTO tasks (id, title, description, queue, status, assigned_profile_id, \
             scheduled_block_id, scheduled_start, scheduled_end, scheduled_date_key, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.id,
                task.title,
                task.description,
                queue_column(task.queue),
                status_column(task.status),
                task.assigned_profile_id,
                task.scheduled_block_id,
                task.scheduled_start.map(|value| value.to_rfc3339()),
                task.scheduled_end.map(|value| value.to_rfc3339()),
                task.scheduled_date_key,
                task.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_pending_by_profile(&self, profile_id: &str) -> Result<Vec<Task>, ScheduleError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE assigned_profile_id = ?1 AND status = 'pending' \
             ORDER BY created_at, id"
        ))?;
        let rows = statement
            .query_map(params![profile_id], read_task_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_task).collect()
    }

    fn list_assigned_for_date(
        &self,
        profile_id: &str,
        date_key: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<Vec<Task>, ScheduleError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE assigned_profile_id = ?1 AND scheduled_block_id IS NOT NULL \
             ORDER BY scheduled_start, id"
        ))?;
        let rows = statement
            .query_map(params![profile_id], read_task_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let tasks = rows
            .into_iter()
            .map(row_to_task)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks
            .into_iter()
            .filter(|task| assignment_matches_day(task, date_key, day_start, day_end))
            .collect())
    }

    fn update_assignment(
        &self,
        task_id: &str,
        assignment: &TaskAssignment,
    ) -> Result<Task, ScheduleError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE tasks SET scheduled_block_id = ?2, scheduled_start = ?3, \
             scheduled_end = ?4, scheduled_date_key = ?5 WHERE id = ?1",
            params![
                task_id,
                assignment.block_id,
                assignment.start.to_rfc3339(),
                assignment.end.to_rfc3339(),
                assignment.date_key,
            ],
        )?;
        if updated == 0 {
            return Err(ScheduleError::NotFound(format!(
                "task not found: {task_id}"
            )));
        }
        self.get_with(&connection, task_id)?
            .ok_or_else(|| ScheduleError::NotFound(format!("task not found: {task_id}")))
    }

    fn clear_assignment(&self, task_id: &str) -> Result<Task, ScheduleError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE tasks SET scheduled_block_id = NULL, scheduled_start = NULL, \
             scheduled_end = NULL, scheduled_date_key = NULL WHERE id = ?1",
            params![task_id],
        )?;
        if updated == 0 {
            return Err(ScheduleError::NotFound(format!(
                "task not found: {task_id}"
            )));
        }
        self.get_with(&connection, task_id)?
            .ok_or_else(|| ScheduleError::NotFound(format!("task not found: {task_id}")))
    }

    fn clear_assignments_for_block(&self, block_id: &str) -> Result<usize, ScheduleError> {
        let connection = self.connect()?;
        let cleared = connection.execute(
            "UPDATE tasks SET scheduled_block_id = NULL, scheduled_start = NULL, \
             scheduled_end = NULL, scheduled_date_key = NULL WHERE scheduled_block_id = ?1",
            params![block_id],
        )?;
        Ok(cleared)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Task>>, ScheduleError> {
        self.tasks
            .lock()
            .map_err(|error| ScheduleError::Storage(format!("task store lock poisoned: {error}")))
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn get(&self, task_id: &str) -> Result<Option<Task>, ScheduleError> {
        Ok(self.lock()?.get(task_id).cloned())
    }

    fn create(&self, task: &Task) -> Result<(), ScheduleError> {
        let mut tasks = self.lock()?;
        if tasks.contains_key(&task.id) {
            return Err(ScheduleError::Conflict(format!(
                "task already exists: {}",
                task.id
            )));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn list_pending_by_profile(&self, profile_id: &str) -> Result<Vec<Task>, ScheduleError> {
        let tasks = self.lock()?;
        let mut matched = tasks
            .values()
            .filter(|task| {
                task.assigned_profile_id == profile_id && task.status == TaskStatus::Pending
            })
            .cloned()
            .collect::<Vec<_>>();
        matched.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(matched)
    }

    fn list_assigned_for_date(
        &self,
        profile_id: &str,
        date_key: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<Vec<Task>, ScheduleError> {
        let tasks = self.lock()?;
        let mut matched = tasks
            .values()
            .filter(|task| {
                task.assigned_profile_id == profile_id
                    && task.scheduled_block_id.is_some()
                    && assignment_matches_day(task, date_key, day_start, day_end)
            })
            .cloned()
            .collect::<Vec<_>>();
        matched.sort_by(|left, right| {
            left.scheduled_start
                .cmp(&right.scheduled_start)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(matched)
    }

    fn update_assignment(
        &self,
        task_id: &str,
        assignment: &TaskAssignment,
    ) -> Result<Task, ScheduleError> {
        let mut tasks = self.lock()?;
        let Some(task) = tasks.get_mut(task_id) else {
            return Err(ScheduleError::NotFound(format!(
                "task not found: {task_id}"
            )));
        };
        task.set_assignment(
            assignment.block_id.clone(),
            assignment.start,
            assignment.end,
            assignment.date_key.clone(),
        );
        Ok(task.clone())
    }

    fn clear_assignment(&self, task_id: &str) -> Result<Task, ScheduleError> {
        let mut tasks = self.lock()?;
        let Some(task) = tasks.get_mut(task_id) else {
            return Err(ScheduleError::NotFound(format!(
                "task not found: {task_id}"
            )));
        };
        task.clear_assignment();
        Ok(task.clone())
    }

    fn clear_assignments_for_block(&self, block_id: &str) -> Result<usize, ScheduleError> {
        let mut tasks = self.lock()?;
        let mut cleared = 0;
        for task in tasks.values_mut() {
            if task.scheduled_block_id.as_deref() == Some(block_id) {
                task.clear_assignment();
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}
