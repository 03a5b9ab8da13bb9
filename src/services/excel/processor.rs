use super::types::{DecodedSheet, RawSheet};
use super::utils::unique_header;
use std::io::Cursor;
use bytes::Bytes;
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use once_cell::sync::Lazy;
use polars::prelude::{AnyValue, CsvReader, SerReader};
use regex::Regex;
use std::collections::HashSet;
use crate::error::AppError;
use crate::models::CellValue;

static SUPPORTED_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(xlsx|xls|csv)$").expect("file name pattern is valid"));

/// Decodes uploaded spreadsheet bytes into rows keyed by column name.
/// Only the first sheet is read; its first row is the header.
pub struct SheetDecoder;

impl SheetDecoder {
    pub fn is_supported(file_name: &str) -> bool {
        SUPPORTED_FILE.is_match(file_name)
    }

    pub fn decode(&self, file_name: &str, file_data: Bytes) -> Result<DecodedSheet, AppError> {
        if !Self::is_supported(file_name) {
            tracing::warn!("Rejected unsupported file: {}", file_name);
            return Err(AppError::UnsupportedFile(
                "Please upload a valid Excel (.xlsx, .xls) or CSV file.".to_string(),
            ));
        }

        let start = std::time::Instant::now();
        tracing::info!("Decoding {} ({}KB)", file_name, file_data.len() / 1024);

        let raw = if file_name.ends_with(".csv") {
            self.read_csv(file_data)
        } else {
            self.read_workbook(file_data)
        }
        .map_err(|e| {
            tracing::error!("Failed to parse {}: {}", file_name, e);
            AppError::FileProcessingError(format!(
                "Failed to parse file. Please check the format. ({})",
                e
            ))
        })?;

        let sheet = raw.into_decoded();
        tracing::info!(
            "Decoded {} rows x {} columns from {} in {:?}",
            sheet.rows.len(),
            sheet.columns.len(),
            file_name,
            start.elapsed()
        );
        Ok(sheet)
    }

    fn read_workbook(&self, file_data: Bytes) -> Result<RawSheet, AppError> {
        let cursor = Cursor::new(file_data);
        let mut workbook = open_workbook_auto_from_rs(cursor)?;

        let sheet_names = workbook.sheet_names().to_vec();
        let sheet_name = sheet_names
            .first()
            .ok_or_else(|| AppError::FileProcessingError("No sheets found in workbook".to_string()))?;
        tracing::debug!("Reading sheet {} of {:?}", sheet_name, sheet_names);

        let range = workbook.worksheet_range(sheet_name)?;
        let mut rows = range.rows();

        let Some(header_row) = rows.next() else {
            tracing::warn!("Sheet {} is empty", sheet_name);
            return Ok(RawSheet::default());
        };

        let mut existing_names = HashSet::new();
        let headers = header_row
            .iter()
            .map(|cell| unique_header(&cell.to_string(), &mut existing_names))
            .collect();

        let cells = rows
            .map(|row| row.iter().map(cell_value).collect())
            .collect();

        Ok(RawSheet { headers, cells })
    }

    fn read_csv(&self, file_data: Bytes) -> Result<RawSheet, AppError> {
        let df = CsvReader::new(Cursor::new(file_data))
            .has_header(true)
            .finish()?;
        tracing::debug!("CSV shape: {} rows x {} columns", df.height(), df.width());

        let mut existing_names = HashSet::new();
        let headers = df
            .get_column_names()
            .iter()
            .map(|name| unique_header(name, &mut existing_names))
            .collect();

        let cells = (0..df.height())
            .map(|row_idx| {
                df.get_columns()
                    .iter()
                    .map(|series| match series.get(row_idx) {
                        Ok(value) => any_value(value),
                        Err(e) => {
                            tracing::warn!("Error getting value at row {}: {}", row_idx, e);
                            CellValue::Missing
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(RawSheet { headers, cells })
    }
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::Text(s.clone()),
        // Dates keep their spreadsheet serial number
        Data::DateTime(d) => CellValue::Number(d.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
        Data::Empty => CellValue::Missing,
    }
}

fn any_value(value: AnyValue) -> CellValue {
    match value {
        AnyValue::Null => CellValue::Missing,
        AnyValue::Boolean(v) => CellValue::Bool(v),
        AnyValue::Int32(v) => CellValue::Number(v as f64),
        AnyValue::Int64(v) => CellValue::Number(v as f64),
        AnyValue::UInt32(v) => CellValue::Number(v as f64),
        AnyValue::UInt64(v) => CellValue::Number(v as f64),
        AnyValue::Float32(v) => CellValue::Number(v as f64),
        AnyValue::Float64(v) => CellValue::Number(v),
        AnyValue::String(v) => CellValue::Text(v.to_string()),
        other => CellValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_matched_case_sensitively() {
        assert!(SheetDecoder::is_supported("sales.xlsx"));
        assert!(SheetDecoder::is_supported("legacy.xls"));
        assert!(SheetDecoder::is_supported("export.csv"));
        assert!(!SheetDecoder::is_supported("SALES.XLSX"));
        assert!(!SheetDecoder::is_supported("notes.txt"));
        assert!(!SheetDecoder::is_supported("csv"));
    }

    #[test]
    fn unsupported_files_are_rejected_before_decoding() {
        let result = SheetDecoder.decode("notes.txt", Bytes::from_static(b"a,b\n1,2\n"));
        assert!(matches!(result, Err(AppError::UnsupportedFile(_))));
    }

    #[test]
    fn csv_is_decoded_with_typed_cells() {
        let data = Bytes::from_static(b"region,sales\nNorth,120\nSouth,80.5\n");
        let sheet = SheetDecoder.decode("sales.csv", data).unwrap();

        assert_eq!(sheet.columns, vec!["region", "sales"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0]["region"], CellValue::from("North"));
        assert_eq!(sheet.rows[0]["sales"], CellValue::Number(120.0));
        assert_eq!(sheet.rows[1]["sales"], CellValue::Number(80.5));
    }

    #[test]
    fn garbage_workbook_is_a_parse_failure() {
        let result = SheetDecoder.decode("broken.xlsx", Bytes::from_static(b"not a zip archive"));
        assert!(matches!(result, Err(AppError::FileProcessingError(_))));
    }
}
