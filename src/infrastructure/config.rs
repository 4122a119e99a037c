use crate::infrastructure::error::ScheduleError;
use chrono_tz::Tz;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), ScheduleError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let defaults = serde_json::json!({
            "schema": 1,
            "appName": "HomeBlocks",
            "timezone": "UTC"
        });
        let formatted = serde_json::to_string_pretty(&defaults)?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, ScheduleError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| {
            ScheduleError::Validation(format!("missing schema in {}", path.display()))
        })?;
    if schema != 1 {
        return Err(ScheduleError::Validation(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, ScheduleError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

/// The timezone anchoring day boundaries. Falls back to UTC when the config
/// is missing or names an unknown zone.
pub fn resolve_timezone(config_dir: &Path) -> Tz {
    read_timezone(config_dir)
        .ok()
        .flatten()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_dir(tag: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "homeblocks-config-tests-{}-{tag}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("create temp config dir");
        path
    }

    #[test]
    fn defaults_are_written_once_and_parse() {
        let dir = temp_config_dir("defaults");
        ensure_default_configs(&dir).expect("write defaults");
        assert_eq!(read_timezone(&dir).expect("read timezone"), Some("UTC".to_string()));
        assert_eq!(resolve_timezone(&dir), Tz::UTC);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn configured_timezone_is_resolved() {
        let dir = temp_config_dir("zone");
        fs::write(
            dir.join("app.json"),
            r#"{"schema": 1, "appName": "HomeBlocks", "timezone": "America/New_York"}"#,
        )
        .expect("write config");
        let tz: Tz = "America/New_York".parse().expect("valid timezone");
        assert_eq!(resolve_timezone(&dir), tz);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let dir = temp_config_dir("fallback");
        fs::write(
            dir.join("app.json"),
            r#"{"schema": 1, "appName": "HomeBlocks", "timezone": "Mars/Olympus"}"#,
        )
        .expect("write config");
        assert_eq!(resolve_timezone(&dir), Tz::UTC);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = temp_config_dir("schema");
        fs::write(dir.join("app.json"), r#"{"schema": 2, "timezone": "UTC"}"#)
            .expect("write config");
        assert!(read_timezone(&dir).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
