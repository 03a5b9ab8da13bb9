use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::models::{DashboardPage, Dataset};

pub const BACKUP_VERSION: u32 = 1;

/// Full snapshot of every dataset and page.
#[derive(Debug, Clone, Serialize)]
pub struct Backup {
    pub version: u32,
    pub timestamp: i64,
    pub datasets: Vec<Dataset>,
    pub pages: Vec<DashboardPage>,
}

impl Backup {
    pub fn new(datasets: Vec<Dataset>, pages: Vec<DashboardPage>) -> Self {
        Self {
            version: BACKUP_VERSION,
            timestamp: Utc::now().timestamp_millis(),
            datasets,
            pages,
        }
    }

    /// Download name dated by the document's own timestamp.
    pub fn file_name(&self) -> String {
        let at = DateTime::<Utc>::from_timestamp_millis(self.timestamp).unwrap_or_else(Utc::now);
        backup_file_name(at)
    }
}

/// Entities recovered from a backup document.
#[derive(Debug, Default)]
pub struct BackupContents {
    pub datasets: Vec<Dataset>,
    pub pages: Vec<DashboardPage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub datasets_imported: usize,
    pub datasets_skipped: usize,
    pub pages_imported: usize,
}

pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!("datadeck-backup-{}.json", at.format("%Y-%m-%d"))
}

fn entries<T: DeserializeOwned>(document: &mut serde_json::Map<String, Value>, key: &str) -> Result<Vec<T>, AppError> {
    match document.remove(key) {
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item)
                    .map_err(|e| AppError::BackupFormat(format!("{} entry {}: {}", key, i, e)))
            })
            .collect(),
        _ => Ok(Vec::new()),
    }
}

/// Parses a backup document completely before anything is imported.
/// `datasets` or `pages` that are absent or not arrays are treated as empty.
pub fn parse_backup(raw: &[u8]) -> Result<BackupContents, AppError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| AppError::BackupFormat(format!("not valid JSON: {}", e)))?;
    let Value::Object(mut document) = value else {
        return Err(AppError::BackupFormat("expected a JSON object".to_string()));
    };

    Ok(BackupContents {
        datasets: entries(&mut document, "datasets")?,
        pages: entries(&mut document, "pages")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_uses_the_export_date() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 0).unwrap();
        assert_eq!(backup_file_name(at), "datadeck-backup-2024-03-07.json");
    }

    #[test]
    fn download_name_follows_the_document_timestamp() {
        let mut backup = Backup::new(Vec::new(), Vec::new());
        backup.timestamp = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap().timestamp_millis();
        assert_eq!(backup.file_name(), "datadeck-backup-2023-12-31.json");
    }

    #[test]
    fn invalid_json_is_a_format_error() {
        assert!(matches!(parse_backup(b"{not json"), Err(AppError::BackupFormat(_))));
        assert!(matches!(parse_backup(b"[1, 2]"), Err(AppError::BackupFormat(_))));
    }

    #[test]
    fn missing_or_odd_sections_are_skipped() {
        let contents = parse_backup(br#"{"version": 1, "datasets": "nope"}"#).unwrap();
        assert!(contents.datasets.is_empty());
        assert!(contents.pages.is_empty());
    }

    #[test]
    fn pages_are_read() {
        let raw = br#"{"pages": [{"id": "p1", "name": "Sales", "widgets": [], "createdAt": 5}]}"#;
        let contents = parse_backup(raw).unwrap();
        assert_eq!(contents.pages.len(), 1);
        assert_eq!(contents.pages[0].name, "Sales");
        assert!(contents.pages[0].filters.is_empty());
    }

    #[test]
    fn malformed_entry_rejects_the_whole_document() {
        let raw = br#"{"pages": [{"id": "p1"}]}"#;
        assert!(matches!(parse_backup(raw), Err(AppError::BackupFormat(_))));
    }
}
