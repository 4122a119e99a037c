use crate::domain::minutes::{clamp_range, MINUTES_IN_DAY};
use crate::domain::models::{
    format_date_key, weekday_index, BlockInstance, Recurrence, ScheduleBlock,
};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Window used when a block has neither a minute range nor absolute
/// timestamps to project: 09:00 for one hour.
pub const DEFAULT_WINDOW_START_MINUTE: i64 = 9 * 60;
pub const DEFAULT_WINDOW_MINUTES: i64 = 60;

/// Resolves local midnight of `date` in `tz` to a UTC instant. A midnight
/// skipped by a DST jump falls forward hour by hour; an ambiguous midnight
/// resolves to the earlier offset.
pub fn day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    for hour in 0..4 {
        let Some(naive) = date.and_hms_opt(hour, 0, 0) else {
            continue;
        };
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(resolved) => return resolved.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => continue,
        }
    }
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("valid midnight"))
}

/// Half-open UTC bounds `[start, end)` of a calendar day in `tz`.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day_start(date, tz);
    let end = match date.succ_opt() {
        Some(next) => day_start(next, tz),
        None => start + Duration::minutes(MINUTES_IN_DAY),
    };
    (start, end)
}

/// Whether `block` occurs on `date`. Pure in its arguments.
pub fn applies(block: &ScheduleBlock, date: NaiveDate, tz: Tz) -> bool {
    match &block.recurrence {
        Recurrence::OneOff { start, end } => {
            let (bound_start, bound_end) = day_bounds(date, tz);
            *start < bound_end && *end > bound_start
        }
        Recurrence::Weekly { days_of_week } => {
            days_of_week.is_empty() || days_of_week.contains(&weekday_index(date.weekday()))
        }
    }
}

/// Materializes `block` for `date`. The minute range prefers the stored
/// minute fields, then a projection of the one-off timestamps onto the day,
/// then the default window; the result always passes through `clamp_range`.
pub fn resolve_instance(block: &ScheduleBlock, date: NaiveDate, tz: Tz) -> BlockInstance {
    let start_of_day = day_start(date, tz);
    let minutes = match (block.start_minute_of_day, block.end_minute_of_day) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => match &block.recurrence {
            Recurrence::OneOff { start, end } => Some((
                (*start - start_of_day).num_minutes(),
                (*end - start_of_day).num_minutes(),
            )),
            Recurrence::Weekly { .. } => None,
        },
    };
    let (start_minute, end_minute) = match minutes {
        Some((start, end)) => clamp_range(start, end),
        None => clamp_range(
            DEFAULT_WINDOW_START_MINUTE,
            DEFAULT_WINDOW_START_MINUTE + DEFAULT_WINDOW_MINUTES,
        ),
    };

    BlockInstance {
        block_id: block.id.clone(),
        profile_id: block.profile_id.clone(),
        block_type: block.block_type,
        title: block.title.clone(),
        date_key: format_date_key(date),
        start: start_of_day + Duration::minutes(start_minute),
        end: start_of_day + Duration::minutes(end_minute),
        start_minute_of_day: start_minute,
        end_minute_of_day: end_minute,
        tasks: Vec::new(),
    }
}

/// Writes a clamped minute range onto `block`. A one-off block also has its
/// absolute timestamps re-anchored to the new minutes on its own day.
pub fn apply_minute_range(block: &mut ScheduleBlock, start_minute: i64, end_minute: i64, tz: Tz) {
    let (start_minute, end_minute) = clamp_range(start_minute, end_minute);
    block.start_minute_of_day = Some(start_minute);
    block.end_minute_of_day = Some(end_minute);
    if let Recurrence::OneOff { start, end } = &mut block.recurrence {
        let date = start.with_timezone(&tz).date_naive();
        let start_of_day = day_start(date, tz);
        *start = start_of_day + Duration::minutes(start_minute);
        *end = start_of_day + Duration::minutes(end_minute);
    }
}
