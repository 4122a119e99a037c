use crate::application::assignment::{AssignmentCoordinator, AssignmentRequest};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::day_view::ScheduleAggregator;
use crate::domain::minutes::clamp_range;
use crate::domain::models::{
    parse_date_key, BlockType, DayView, Recurrence, ScheduleBlock, Task,
};
use crate::domain::recurrence::{apply_minute_range, day_start};
use crate::infrastructure::block_repository::{BlockRepository, SqliteBlockRepository};
use crate::infrastructure::config::resolve_timezone;
use crate::infrastructure::error::ScheduleError;
use crate::infrastructure::task_repository::{SqliteTaskRepository, TaskRepository};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    blocks: Arc<dyn BlockRepository>,
    tasks: Arc<dyn TaskRepository>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, ScheduleError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let blocks: Arc<dyn BlockRepository> =
            Arc::new(SqliteBlockRepository::new(&bootstrap.database_path));
        let tasks: Arc<dyn TaskRepository> =
            Arc::new(SqliteTaskRepository::new(&bootstrap.database_path));

        Ok(Self {
            config_dir,
            database_path: bootstrap.database_path,
            logs_dir,
            blocks,
            tasks,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// The block store, shared with embedding surfaces.
    pub fn blocks(&self) -> &Arc<dyn BlockRepository> {
        &self.blocks
    }

    /// The task store. Task lifecycle is owned by the caller; the engine
    /// only reads tasks and writes their assignment fields.
    pub fn tasks(&self) -> &Arc<dyn TaskRepository> {
        &self.tasks
    }

    pub fn timezone(&self) -> Tz {
        resolve_timezone(&self.config_dir)
    }

    pub fn command_error(&self, command: &str, error: &ScheduleError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateBlockRequest {
    pub profile_id: String,
    pub block_type: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub start_minute_of_day: Option<i64>,
    pub end_minute_of_day: Option<i64>,
    pub is_recurring: Option<bool>,
    pub days_of_week: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBlockRequest {
    pub block_type: Option<String>,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub start_minute_of_day: Option<i64>,
    pub end_minute_of_day: Option<i64>,
    pub days_of_week: Option<Vec<u8>>,
}

pub fn create_block_impl(
    state: &AppState,
    request: CreateBlockRequest,
) -> Result<ScheduleBlock, ScheduleError> {
    let profile_id = request.profile_id.trim();
    if profile_id.is_empty() {
        return Err(ScheduleError::Validation(
            "profile_id must not be empty".to_string(),
        ));
    }
    let block_type = parse_block_type(&request.block_type)?;
    let tz = state.timezone();

    let recurrence = if request.is_recurring.unwrap_or(true) {
        let mut days = request.days_of_week.unwrap_or_default();
        if days.iter().any(|day| *day > 6) {
            return Err(ScheduleError::Validation(
                "days_of_week entries must be in 0..=6".to_string(),
            ));
        }
        days.sort_unstable();
        days.dedup();
        Recurrence::Weekly { days_of_week: days }
    } else {
        let start = parse_rfc3339_input(required_field(request.start.as_deref(), "start")?, "start")?;
        let end = parse_rfc3339_input(required_field(request.end.as_deref(), "end")?, "end")?;
        if end <= start {
            return Err(ScheduleError::Validation(
                "end must be after start".to_string(),
            ));
        }
        Recurrence::OneOff { start, end }
    };

    let minutes = match (request.start_minute_of_day, request.end_minute_of_day) {
        (Some(start), Some(end)) => Some(clamp_range(start, end)),
        _ => match &recurrence {
            Recurrence::OneOff { start, end } => {
                let start_of_day = day_start(start.with_timezone(&tz).date_naive(), tz);
                Some(clamp_range(
                    (*start - start_of_day).num_minutes(),
                    (*end - start_of_day).num_minutes(),
                ))
            }
            Recurrence::Weekly { .. } => None,
        },
    };

    let block = ScheduleBlock {
        id: next_id("blk"),
        profile_id: profile_id.to_string(),
        block_type,
        title: normalized_optional(request.title),
        notes: normalized_optional(request.notes),
        start_minute_of_day: minutes.map(|range| range.0),
        end_minute_of_day: minutes.map(|range| range.1),
        recurrence,
        created_at: Utc::now(),
    };
    block.validate().map_err(ScheduleError::Validation)?;
    state.blocks.create(&block)?;

    state.log_info("create_block", &format!("created block_id={}", block.id));
    Ok(block)
}

pub fn update_block_impl(
    state: &AppState,
    block_id: String,
    request: UpdateBlockRequest,
) -> Result<ScheduleBlock, ScheduleError> {
    let block_id = block_id.trim();
    if block_id.is_empty() {
        return Err(ScheduleError::Validation(
            "block_id must not be empty".to_string(),
        ));
    }
    let tz = state.timezone();
    let mut block = state
        .blocks
        .get(block_id)?
        .ok_or_else(|| ScheduleError::NotFound(format!("block not found: {block_id}")))?;

    if let Some(raw) = request.block_type.as_deref() {
        block.block_type = parse_block_type(raw)?;
    }
    if let Some(title) = request.title {
        block.title = normalized_optional(Some(title));
    }
    if let Some(notes) = request.notes {
        block.notes = normalized_optional(Some(notes));
    }

    if let Some(days) = request.days_of_week {
        let Recurrence::Weekly { days_of_week } = &mut block.recurrence else {
            return Err(ScheduleError::Validation(
                "days_of_week only applies to recurring blocks".to_string(),
            ));
        };
        if days.iter().any(|day| *day > 6) {
            return Err(ScheduleError::Validation(
                "days_of_week entries must be in 0..=6".to_string(),
            ));
        }
        let mut days = days;
        days.sort_unstable();
        days.dedup();
        *days_of_week = days;
    }

    if request.start.is_some() || request.end.is_some() {
        let Recurrence::OneOff { start, end } = &mut block.recurrence else {
            return Err(ScheduleError::Validation(
                "start/end only apply to one-off blocks".to_string(),
            ));
        };
        if let Some(raw) = request.start.as_deref() {
            *start = parse_rfc3339_input(raw, "start")?;
        }
        if let Some(raw) = request.end.as_deref() {
            *end = parse_rfc3339_input(raw, "end")?;
        }
        if *end <= *start {
            return Err(ScheduleError::Validation(
                "end must be after start".to_string(),
            ));
        }
    }

    if request.start_minute_of_day.is_some() || request.end_minute_of_day.is_some() {
        let start_minute = request
            .start_minute_of_day
            .or(block.start_minute_of_day)
            .ok_or_else(|| {
                ScheduleError::Validation(
                    "start_minute_of_day is required with end_minute_of_day".to_string(),
                )
            })?;
        let end_minute = request
            .end_minute_of_day
            .or(block.end_minute_of_day)
            .ok_or_else(|| {
                ScheduleError::Validation(
                    "end_minute_of_day is required with start_minute_of_day".to_string(),
                )
            })?;
        apply_minute_range(&mut block, start_minute, end_minute, tz);
    }

    block.validate().map_err(ScheduleError::Validation)?;
    state.blocks.update(&block)?;

    state.log_info("update_block", &format!("updated block_id={block_id}"));
    Ok(block)
}

/// Deletes a block and cascades: every task pointing at it has its four
/// assignment fields cleared.
pub fn delete_block_impl(state: &AppState, block_id: String) -> Result<bool, ScheduleError> {
    let block_id = block_id.trim();
    if block_id.is_empty() {
        return Err(ScheduleError::Validation(
            "block_id must not be empty".to_string(),
        ));
    }

    let removed = state.blocks.delete(block_id)?;
    if !removed {
        return Ok(false);
    }
    let cleared = state.tasks.clear_assignments_for_block(block_id)?;

    state.log_info(
        "delete_block",
        &format!("deleted block_id={block_id} cleared_assignments={cleared}"),
    );
    Ok(true)
}

pub fn list_blocks_impl(
    state: &AppState,
    profile_id: String,
) -> Result<Vec<ScheduleBlock>, ScheduleError> {
    let profile_id = profile_id.trim();
    if profile_id.is_empty() {
        return Err(ScheduleError::Validation(
            "profile_id must not be empty".to_string(),
        ));
    }
    state.blocks.list_by_profile(profile_id)
}

pub fn day_view_impl(
    state: &AppState,
    profile_id: String,
    date: String,
) -> Result<DayView, ScheduleError> {
    let profile_id = profile_id.trim();
    if profile_id.is_empty() {
        return Err(ScheduleError::Validation(
            "profile_id must not be empty".to_string(),
        ));
    }
    let date = parse_date_key(&date)
        .ok_or_else(|| ScheduleError::Validation(format!("date must be YYYY-MM-DD: {date}")))?;

    let aggregator = ScheduleAggregator::new(Arc::clone(&state.blocks), Arc::clone(&state.tasks));
    let view = aggregator.build_day_view(profile_id, date, state.timezone())?;

    state.log_info(
        "day_view",
        &format!(
            "built day view profile_id={profile_id} date={} instances={} unscheduled={}",
            view.date_key,
            view.instances.len(),
            view.unscheduled.len()
        ),
    );
    Ok(view)
}

pub fn assign_task_impl(
    state: &AppState,
    block_id: String,
    task_id: String,
    start: Option<String>,
    end: Option<String>,
    date_key: Option<String>,
) -> Result<Task, ScheduleError> {
    let block_id = block_id.trim();
    let task_id = task_id.trim();
    if block_id.is_empty() || task_id.is_empty() {
        return Err(ScheduleError::Validation(
            "block_id and task_id must not be empty".to_string(),
        ));
    }

    let request = AssignmentRequest {
        block_id: block_id.to_string(),
        task_id: task_id.to_string(),
        start: parse_optional_rfc3339(start.as_deref(), "start")?,
        end: parse_optional_rfc3339(end.as_deref(), "end")?,
        date_key,
    };

    let coordinator =
        AssignmentCoordinator::new(Arc::clone(&state.blocks), Arc::clone(&state.tasks));
    let task = coordinator.assign(&request, Utc::now(), state.timezone())?;

    state.log_info(
        "assign_task",
        &format!(
            "assigned task_id={task_id} block_id={block_id} date_key={}",
            task.scheduled_date_key.as_deref().unwrap_or("")
        ),
    );
    Ok(task)
}

pub fn unassign_task_impl(state: &AppState, task_id: String) -> Result<Task, ScheduleError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(ScheduleError::Validation(
            "task_id must not be empty".to_string(),
        ));
    }

    let coordinator =
        AssignmentCoordinator::new(Arc::clone(&state.blocks), Arc::clone(&state.tasks));
    let task = coordinator.unassign(task_id)?;

    state.log_info("unassign_task", &format!("unassigned task_id={task_id}"));
    Ok(task)
}

fn parse_block_type(value: &str) -> Result<BlockType, ScheduleError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "deep" => Ok(BlockType::Deep),
        "admin" => Ok(BlockType::Admin),
        other => Err(ScheduleError::Validation(format!(
            "unsupported block type: {other}"
        ))),
    }
}

fn normalized_optional(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn required_field<'a>(value: Option<&'a str>, field_name: &str) -> Result<&'a str, ScheduleError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ScheduleError::Validation(format!("{field_name} is required")))
}

fn parse_rfc3339_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, ScheduleError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            ScheduleError::Validation(format!("{field_name} must be RFC3339 date-time: {error}"))
        })
}

fn parse_optional_rfc3339(
    value: Option<&str>,
    field_name: &str,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_rfc3339_input(value, field_name))
        .transpose()
}
