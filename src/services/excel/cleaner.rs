use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::utils::parse_number;
use crate::models::{CellValue, Row};

/// Which cleaning passes to run. Every pass is on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleanOptions {
    pub remove_empty_rows: bool,
    pub trim_strings: bool,
    pub convert_numbers: bool,
    pub drop_duplicates: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            remove_empty_rows: true,
            trim_strings: true,
            convert_numbers: true,
            drop_duplicates: true,
        }
    }
}

fn is_empty_row(row: &Row) -> bool {
    row.values().all(|value| match value {
        CellValue::Missing => true,
        other => other.to_string().trim().is_empty(),
    })
}

fn convert_value(value: &CellValue) -> CellValue {
    if matches!(value, CellValue::Missing) {
        return CellValue::Missing;
    }
    let text = value.to_string();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return CellValue::Text(String::new());
    }
    let number = parse_number(trimmed);
    if number.is_nan() {
        CellValue::Text(trimmed.to_string())
    } else {
        CellValue::Number(number)
    }
}

/// Applies the selected passes in order: trim, convert, drop empty rows,
/// drop duplicates (first occurrence wins, keyed on `columns`).
pub fn clean_rows(rows: &[Row], columns: &[String], options: CleanOptions) -> Vec<Row> {
    let mut cleaned: Vec<Row> = rows.to_vec();

    if options.trim_strings {
        for row in &mut cleaned {
            for value in row.values_mut() {
                if let CellValue::Text(s) = value {
                    let trimmed = s.trim();
                    if trimmed.len() != s.len() {
                        *s = trimmed.to_string();
                    }
                }
            }
        }
    }

    if options.convert_numbers {
        for row in &mut cleaned {
            for value in row.values_mut() {
                *value = convert_value(value);
            }
        }
    }

    if options.remove_empty_rows {
        cleaned.retain(|row| !is_empty_row(row));
    }

    if options.drop_duplicates {
        let mut seen = HashSet::new();
        cleaned.retain(|row| {
            let key = columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_else(|| "undefined".to_string()))
                .collect::<Vec<_>>()
                .join("||");
            seen.insert(key)
        });
    }

    tracing::debug!("Cleaning kept {} of {} rows", cleaned.len(), rows.len());
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn columns() -> Vec<String> {
        vec!["name".to_string(), "qty".to_string()]
    }

    #[test]
    fn all_passes_clean_typical_input() {
        let rows = vec![
            row(&[("name", " apple ".into()), ("qty", " 12 ".into())]),
            row(&[("name", "".into()), ("qty", CellValue::Missing)]),
            row(&[("name", "apple".into()), ("qty", 12.0.into())]),
            row(&[("name", "pear".into()), ("qty", "n/a".into())]),
        ];

        let cleaned = clean_rows(&rows, &columns(), CleanOptions::default());
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0]["name"], CellValue::from("apple"));
        assert_eq!(cleaned[0]["qty"], CellValue::Number(12.0));
        assert_eq!(cleaned[1]["qty"], CellValue::from("n/a"));
    }

    #[test]
    fn conversion_stringifies_booleans() {
        let rows = vec![row(&[("name", true.into()), ("qty", "0x10".into())])];
        let options = CleanOptions { drop_duplicates: false, ..CleanOptions::default() };

        let cleaned = clean_rows(&rows, &columns(), options);
        assert_eq!(cleaned[0]["name"], CellValue::from("true"));
        assert_eq!(cleaned[0]["qty"], CellValue::Number(16.0));
    }

    #[test]
    fn disabled_passes_leave_rows_alone() {
        let rows = vec![
            row(&[("name", " a ".into()), ("qty", "1".into())]),
            row(&[("name", " a ".into()), ("qty", "1".into())]),
            row(&[("name", CellValue::Missing), ("qty", CellValue::Missing)]),
        ];
        let options = CleanOptions {
            remove_empty_rows: false,
            trim_strings: false,
            convert_numbers: false,
            drop_duplicates: false,
        };

        assert_eq!(clean_rows(&rows, &columns(), options), rows);
    }

    #[test]
    fn options_default_when_fields_absent() {
        let options: CleanOptions = serde_json::from_str(r#"{"dropDuplicates": false}"#).unwrap();
        assert!(!options.drop_duplicates);
        assert!(options.trim_strings);
    }
}
