use crate::scanner::MODIFIED_FORMAT;
use crate::storage::models::SearchRow;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::path::Path;

/// One search result as the presentation layer shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub path: String,
    pub name: String,
    pub size: i64,
    pub modified: String,
    pub is_favorite: bool,
}

impl From<SearchRow> for ResultRow {
    fn from(row: SearchRow) -> Self {
        let name = Path::new(&row.file.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| row.file.path.clone());
        Self {
            path: row.file.path,
            name,
            size: row.file.size,
            modified: row.file.modified,
            is_favorite: row.is_favorite,
        }
    }
}

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;

pub fn format_file_size(bytes: i64) -> String {
    let size = bytes as f64;
    if size < KB {
        format!("{} B", bytes)
    } else if size < MB {
        format!("{:.1} KB", size / KB)
    } else if size < GB {
        format!("{:.1} MB", size / MB)
    } else {
        format!("{:.1} GB", size / GB)
    }
}

/// Relative rendering of a stored `modified` string against the local clock.
pub fn format_date(modified: &str) -> String {
    format_date_at(modified, Local::now().naive_local())
}

/// Strings that do not parse as `%Y-%m-%d %H:%M:%S` come back unchanged.
pub fn format_date_at(modified: &str, now: NaiveDateTime) -> String {
    let Ok(timestamp) = NaiveDateTime::parse_from_str(modified, MODIFIED_FORMAT) else {
        return modified.to_string();
    };
    // Whole elapsed days, floored, so a future timestamp lands on -1.
    let days = (now - timestamp).num_seconds().div_euclid(86_400);
    match days {
        0 => format!("Today {}", timestamp.format("%H:%M")),
        1 => format!("Yesterday {}", timestamp.format("%H:%M")),
        d if d < 7 => timestamp.format("%A %H:%M").to_string(),
        d if d < 365 => timestamp.format("%b %d, %H:%M").to_string(),
        _ => timestamp.format("%b %d, %Y").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::IndexedFile;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, MODIFIED_FORMAT).unwrap()
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_date_buckets() {
        let now = at("2024-06-15 12:00:00");
        assert_eq!(format_date_at("2024-06-15 09:30:00", now), "Today 09:30");
        assert_eq!(format_date_at("2024-06-14 08:05:00", now), "Yesterday 08:05");
        // 2024-06-11 was a Tuesday.
        assert_eq!(format_date_at("2024-06-11 17:45:00", now), "Tuesday 17:45");
        assert_eq!(format_date_at("2024-02-03 10:00:00", now), "Feb 03, 10:00");
        assert_eq!(format_date_at("2022-01-20 10:00:00", now), "Jan 20, 2022");
    }

    #[test]
    fn test_format_date_passes_through_garbage() {
        let now = at("2024-06-15 12:00:00");
        assert_eq!(format_date_at("not a date", now), "not a date");
    }

    #[test]
    fn test_result_row_from_search_row() {
        let row = SearchRow {
            file: IndexedFile {
                path: "/home/u/docs/report.pdf".to_string(),
                size: 2048,
                modified: "2024-01-01 00:00:00".to_string(),
                root: "/home/u".to_string(),
            },
            is_favorite: true,
        };
        let result = ResultRow::from(row);
        assert_eq!(result.name, "report.pdf");
        assert_eq!(result.path, "/home/u/docs/report.pdf");
        assert!(result.is_favorite);
    }
}
