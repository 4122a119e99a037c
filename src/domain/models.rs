use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Deep,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskQueue {
    Deep,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Cancelled,
    Archived,
}

/// How a block occurs over time. A one-off block exists on the single day its
/// absolute range overlaps; a weekly block repeats on the listed weekdays,
/// or every day when the list is empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Recurrence {
    OneOff {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Weekly {
        days_of_week: Vec<u8>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleBlock {
    pub id: String,
    pub profile_id: String,
    pub block_type: BlockType,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub start_minute_of_day: Option<i64>,
    pub end_minute_of_day: Option<i64>,
    pub recurrence: Recurrence,
    pub created_at: DateTime<Utc>,
}

impl ScheduleBlock {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "block.id")?;
        validate_non_empty(&self.profile_id, "block.profile_id")?;
        if let (Some(start), Some(end)) = (self.start_minute_of_day, self.end_minute_of_day) {
            if !(0..=super::minutes::MINUTES_IN_DAY).contains(&start)
                || !(0..=super::minutes::MINUTES_IN_DAY).contains(&end)
            {
                return Err("block minute range must lie within [0, 1440]".to_string());
            }
            if end - start < super::minutes::MIN_BLOCK_DURATION_MINUTES {
                return Err("block must span at least 15 minutes".to_string());
            }
        }
        match &self.recurrence {
            Recurrence::OneOff { start, end } => {
                if end <= start {
                    return Err("block.end must be after block.start".to_string());
                }
            }
            Recurrence::Weekly { days_of_week } => {
                if days_of_week.iter().any(|day| *day > 6) {
                    return Err("block.days_of_week entries must be in 0..=6".to_string());
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub queue: TaskQueue,
    pub status: TaskStatus,
    pub assigned_profile_id: String,
    pub scheduled_block_id: Option<String>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub scheduled_date_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        validate_non_empty(&self.assigned_profile_id, "task.assigned_profile_id")?;
        if let Some(date_key) = self.scheduled_date_key.as_deref() {
            validate_date_key(date_key, "task.scheduled_date_key")?;
        }
        if let (Some(start), Some(end)) = (self.scheduled_start, self.scheduled_end) {
            if end <= start {
                return Err("task.scheduled_end must be after task.scheduled_start".to_string());
            }
        }
        Ok(())
    }

    /// Sets the four assignment fields together.
    pub fn set_assignment(
        &mut self,
        block_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        date_key: String,
    ) {
        self.scheduled_block_id = Some(block_id);
        self.scheduled_start = Some(start);
        self.scheduled_end = Some(end);
        self.scheduled_date_key = Some(date_key);
    }

    /// Clears the four assignment fields together.
    pub fn clear_assignment(&mut self) {
        self.scheduled_block_id = None;
        self.scheduled_start = None;
        self.scheduled_end = None;
        self.scheduled_date_key = None;
    }
}

/// One concrete occurrence of a block on a calendar day. Derived on demand,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockInstance {
    pub block_id: String,
    pub profile_id: String,
    pub block_type: BlockType,
    pub title: Option<String>,
    pub date_key: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub start_minute_of_day: i64,
    pub end_minute_of_day: i64,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayView {
    pub date_key: String,
    pub instances: Vec<BlockInstance>,
    pub unscheduled: Vec<Task>,
}

pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub fn validate_date_key(value: &str, field_name: &str) -> Result<(), String> {
    parse_date_key(value).ok_or_else(|| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}

pub fn parse_date_key(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub fn format_date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Weekday as stored in `days_of_week`: 0 = Sunday through 6 = Saturday.
pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}
