use crate::domain::models::{BlockType, Recurrence, ScheduleBlock};
use crate::infrastructure::error::ScheduleError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait BlockRepository: Send + Sync {
    fn get(&self, block_id: &str) -> Result<Option<ScheduleBlock>, ScheduleError>;
    fn list_by_profile(&self, profile_id: &str) -> Result<Vec<ScheduleBlock>, ScheduleError>;
    fn create(&self, block: &ScheduleBlock) -> Result<(), ScheduleError>;
    fn update(&self, block: &ScheduleBlock) -> Result<(), ScheduleError>;
    fn delete(&self, block_id: &str) -> Result<bool, ScheduleError>;
}

#[derive(Debug, Clone)]
pub struct SqliteBlockRepository {
    db_path: PathBuf,
}

impl SqliteBlockRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, ScheduleError> {
        Connection::open(&self.db_path).map_err(ScheduleError::from)
    }
}

const BLOCK_COLUMNS: &str = "id, profile_id, block_type, title, notes, start_minute_of_day, \
     end_minute_of_day, recurrence_mode, days_of_week, one_off_start, one_off_end, created_at";

type BlockRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<i64>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn read_block_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockRow> {
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
        row.get(11)?,
    ))
}

fn row_to_block(row: BlockRow) -> Result<ScheduleBlock, ScheduleError> {
    let (
        id,
        profile_id,
        block_type,
        title,
        notes,
        start_minute_of_day,
        end_minute_of_day,
        recurrence_mode,
        days_of_week,
        one_off_start,
        one_off_end,
        created_at,
    ) = row;

    let recurrence = match recurrence_mode.as_str() {
        "weekly" => {
            let days = match days_of_week.as_deref() {
                Some(raw) => serde_json::from_str::<Vec<u8>>(raw).map_err(|error| {
                    ScheduleError::Storage(format!("invalid days_of_week for block {id}: {error}"))
                })?,
                None => Vec::new(),
            };
            Recurrence::Weekly { days_of_week: days }
        }
        "one_off" => {
            let start = one_off_start.ok_or_else(|| {
                ScheduleError::Storage(format!("one-off block {id} is missing one_off_start"))
            })?;
            let end = one_off_end.ok_or_else(|| {
                ScheduleError::Storage(format!("one-off block {id} is missing one_off_end"))
            })?;
            Recurrence::OneOff {
                start: parse_stored_datetime(&start, "one_off_start", &id)?,
                end: parse_stored_datetime(&end, "one_off_end", &id)?,
            }
        }
        other => {
            return Err(ScheduleError::Storage(format!(
                "unknown recurrence_mode '{other}' for block {id}"
            )));
        }
    };

    Ok(ScheduleBlock {
        created_at: parse_stored_datetime(&created_at, "created_at", &id)?,
        id,
        profile_id,
        block_type: parse_block_type_column(&block_type)?,
        title,
        notes,
        start_minute_of_day,
        end_minute_of_day,
        recurrence,
    })
}

fn block_write_params(block: &ScheduleBlock) -> Result<BlockRow, ScheduleError> {
    let (recurrence_mode, days_of_week, one_off_start, one_off_end) = match &block.recurrence {
        Recurrence::Weekly { days_of_week } => (
            "weekly".to_string(),
            Some(serde_json::to_string(days_of_week)?),
            None,
            None,
        ),
        Recurrence::OneOff { start, end } => (
            "one_off".to_string(),
            None,
            Some(start.to_rfc3339()),
            Some(end.to_rfc3339()),
        ),
    };
    Ok((
        block.id.clone(),
        block.profile_id.clone(),
        block_type_column(block.block_type).to_string(),
        block.title.clone(),
        block.notes.clone(),
        block.start_minute_of_day,
        block.end_minute_of_day,
        recurrence_mode,
        days_of_week,
        one_off_start,
        one_off_end,
        block.created_at.to_rfc3339(),
    ))
}

pub(crate) fn parse_stored_datetime(
    raw: &str,
    column: &str,
    row_id: &str,
) -> Result<DateTime<Utc>, ScheduleError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            ScheduleError::Storage(format!("invalid {column} '{raw}' for {row_id}: {error}"))
        })
}

fn block_type_column(block_type: BlockType) -> &'static str {
    match block_type {
        BlockType::Deep => "deep",
        BlockType::Admin => "admin",
    }
}

fn parse_block_type_column(value: &str) -> Result<BlockType, ScheduleError> {
    match value {
        "deep" => Ok(BlockType::Deep),
        "admin" => Ok(BlockType::Admin),
        other => Err(ScheduleError::Storage(format!(
            "unknown block_type '{other}'"
        ))),
    }
}

impl BlockRepository for SqliteBlockRepository {
    fn get(&self, block_id: &str) -> Result<Option<ScheduleBlock>, ScheduleError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {BLOCK_COLUMNS} FROM schedule_blocks WHERE id = ?1"),
                params![block_id],
                read_block_row,
            )
            .optional()?;
        row.map(row_to_block).transpose()
    }

    fn list_by_profile(&self, profile_id: &str) -> Result<Vec<ScheduleBlock>, ScheduleError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM schedule_blocks WHERE profile_id = ?1 \
             ORDER BY start_minute_of_day, id"
        ))?;
        let rows = statement
            .query_map(params![profile_id], read_block_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_block).collect()
    }

    fn create(&self, block: &ScheduleBlock) -> Result<(), ScheduleError> {
        let connection = self.connect()?;
        let existing: Option<String> = connection
            .query_row(
                "SELECT id FROM schedule_blocks WHERE id = ?1",
                params![block.id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(ScheduleError::Conflict(format!(
                "block already exists: {}",
                block.id
            )));
        }
        let values = block_write_params(block)?;
        connection.execute(
            "INSERT INTO schedule_blocks (id, profile_id, block_type, title, notes, \
             start_minute_of_day, end_minute_of_day, recurrence_mode, days_of_week, \
             one_off_start, one_off_end, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                values.0, values.1, values.2, values.3, values.4, values.5, values.6, values.7,
                values.8, values.9, values.10, values.11
            ],
        )?;
        Ok(())
    }

    fn update(&self, block: &ScheduleBlock) -> Result<(), ScheduleError> {
        let connection = self.connect()?;
        let values = block_write_params(block)?;
        let updated = connection.execute(
            "UPDATE schedule_blocks SET profile_id = ?2, block_type = ?3, title = ?4, \
             notes = ?5, start_minute_of_day = ?6, end_minute_of_day = ?7, \
             recurrence_mode = ?8, days_of_week = ?9, one_off_start = ?10, \
             one_off_end = ?11, created_at = ?12 WHERE id = ?1",
            params![
                values.0, values.1, values.2, values.3, values.4, values.5, values.6, values.7,
                values.8, values.9, values.10, values.11
            ],
        )?;
        if updated == 0 {
            return Err(ScheduleError::NotFound(format!(
                "block not found: {}",
                block.id
            )));
        }
        Ok(())
    }

    fn delete(&self, block_id: &str) -> Result<bool, ScheduleError> {
        let connection = self.connect()?;
        let deleted = connection.execute(
            "DELETE FROM schedule_blocks WHERE id = ?1",
            params![block_id],
        )?;
        Ok(deleted > 0)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlockRepository {
    blocks: Mutex<HashMap<String, ScheduleBlock>>,
}

impl InMemoryBlockRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ScheduleBlock>>, ScheduleError>
    {
        self.blocks
            .lock()
            .map_err(|error| ScheduleError::Storage(format!("block store lock poisoned: {error}")))
    }
}

impl BlockRepository for InMemoryBlockRepository {
    fn get(&self, block_id: &str) -> Result<Option<ScheduleBlock>, ScheduleError> {
        Ok(self.lock()?.get(block_id).cloned())
    }

    fn list_by_profile(&self, profile_id: &str) -> Result<Vec<ScheduleBlock>, ScheduleError> {
        let blocks = self.lock()?;
        let mut matched = blocks
            .values()
            .filter(|block| block.profile_id == profile_id)
            .cloned()
            .collect::<Vec<_>>();
        matched.sort_by(|left, right| {
            left.start_minute_of_day
                .cmp(&right.start_minute_of_day)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(matched)
    }

    fn create(&self, block: &ScheduleBlock) -> Result<(), ScheduleError> {
        let mut blocks = self.lock()?;
        if blocks.contains_key(&block.id) {
            return Err(ScheduleError::Conflict(format!(
                "block already exists: {}",
                block.id
            )));
        }
        blocks.insert(block.id.clone(), block.clone());
        Ok(())
    }

    fn update(&self, block: &ScheduleBlock) -> Result<(), ScheduleError> {
        let mut blocks = self.lock()?;
        let Some(stored) = blocks.get_mut(&block.id) else {
            return Err(ScheduleError::NotFound(format!(
                "block not found: {}",
                block.id
            )));
        };
        *stored = block.clone();
        Ok(())
    }

    fn delete(&self, block_id: &str) -> Result<bool, ScheduleError> {
        Ok(self.lock()?.remove(block_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_block(id: &str) -> ScheduleBlock {
        ScheduleBlock {
            id: id.to_string(),
            profile_id: "prof-1".to_string(),
            block_type: BlockType::Deep,
            title: Some("Focus".to_string()),
            notes: None,
            start_minute_of_day: Some(540),
            end_minute_of_day: Some(600),
            recurrence: Recurrence::Weekly {
                days_of_week: vec![1, 3, 5],
            },
            created_at: fixed_time("2026-03-02T08:00:00Z"),
        }
    }

    fn temp_database(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "homeblocks-block-repo-{}-{tag}.sqlite",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        initialize_database(&path).expect("initialize database");
        path
    }

    #[test]
    fn sqlite_roundtrips_weekly_and_one_off_blocks() {
        let db_path = temp_database("roundtrip");
        let repository = SqliteBlockRepository::new(&db_path);

        let weekly = sample_block("blk-weekly");
        let mut one_off = sample_block("blk-once");
        one_off.start_minute_of_day = None;
        one_off.end_minute_of_day = None;
        one_off.recurrence = Recurrence::OneOff {
            start: fixed_time("2026-03-02T09:00:00Z"),
            end: fixed_time("2026-03-02T10:00:00Z"),
        };

        repository.create(&weekly).expect("create weekly");
        repository.create(&one_off).expect("create one-off");

        assert_eq!(
            repository.get("blk-weekly").expect("get weekly"),
            Some(weekly)
        );
        assert_eq!(
            repository.get("blk-once").expect("get one-off"),
            Some(one_off)
        );
        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn sqlite_list_filters_by_profile_and_orders_by_start() {
        let db_path = temp_database("list");
        let repository = SqliteBlockRepository::new(&db_path);

        let mut early = sample_block("blk-early");
        early.start_minute_of_day = Some(300);
        early.end_minute_of_day = Some(360);
        let late = sample_block("blk-late");
        let mut other = sample_block("blk-other");
        other.profile_id = "prof-2".to_string();

        repository.create(&late).expect("create late");
        repository.create(&early).expect("create early");
        repository.create(&other).expect("create other profile");

        let listed = repository.list_by_profile("prof-1").expect("list blocks");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "blk-early");
        assert_eq!(listed[1].id, "blk-late");
        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn sqlite_create_rejects_duplicate_id() {
        let db_path = temp_database("duplicate");
        let repository = SqliteBlockRepository::new(&db_path);
        repository.create(&sample_block("blk-1")).expect("create");
        assert!(matches!(
            repository.create(&sample_block("blk-1")),
            Err(ScheduleError::Conflict(_))
        ));
        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn sqlite_update_missing_block_is_not_found() {
        let db_path = temp_database("missing");
        let repository = SqliteBlockRepository::new(&db_path);
        assert!(matches!(
            repository.update(&sample_block("blk-ghost")),
            Err(ScheduleError::NotFound(_))
        ));
        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn in_memory_mirrors_sqlite_contract() {
        let repository = InMemoryBlockRepository::default();
        let block = sample_block("blk-1");

        repository.create(&block).expect("create");
        assert!(matches!(
            repository.create(&block),
            Err(ScheduleError::Conflict(_))
        ));

        let mut updated = block.clone();
        updated.end_minute_of_day = Some(660);
        repository.update(&updated).expect("update");
        assert_eq!(repository.get("blk-1").expect("get"), Some(updated));

        assert!(repository.delete("blk-1").expect("delete"));
        assert!(!repository.delete("blk-1").expect("second delete"));
        assert!(matches!(
            repository.update(&block),
            Err(ScheduleError::NotFound(_))
        ));
    }
}
