use super::utils::{is_missing, to_number};
use crate::models::{CellValue, ColumnAnalysis, ColumnType, Row};
use rayon::prelude::*;
use std::collections::HashSet;

/// Distinct-value key. Missing cells and empty strings share one bucket;
/// numbers and numeric text stay distinct.
#[derive(Debug, PartialEq, Eq, Hash)]
enum DistinctKey<'a> {
    Missing,
    Bool(bool),
    Number(u64),
    Text(&'a str),
}

impl<'a> From<&'a CellValue> for DistinctKey<'a> {
    fn from(value: &'a CellValue) -> Self {
        match value {
            v if is_missing(v) => DistinctKey::Missing,
            CellValue::Bool(b) => DistinctKey::Bool(*b),
            // -0 and 0 are the same value
            CellValue::Number(n) if *n == 0.0 => DistinctKey::Number(0f64.to_bits()),
            CellValue::Number(n) if n.is_nan() => DistinctKey::Number(f64::NAN.to_bits()),
            CellValue::Number(n) => DistinctKey::Number(n.to_bits()),
            CellValue::Text(s) => DistinctKey::Text(s),
            CellValue::Missing => DistinctKey::Missing,
        }
    }
}

/// Classifies columns and computes their summary statistics.
pub struct ColumnAnalyzer;

impl ColumnAnalyzer {
    /// One analysis per column name, in the given order.
    pub fn analyze(&self, rows: &[Row], columns: &[String]) -> Vec<ColumnAnalysis> {
        let start = std::time::Instant::now();

        let analysis: Vec<ColumnAnalysis> = columns
            .par_iter()
            .map(|name| self.analyze_column(rows, name))
            .collect();

        tracing::debug!(
            "Analyzed {} columns over {} rows in {:?}",
            columns.len(),
            rows.len(),
            start.elapsed()
        );
        analysis
    }

    fn analyze_column(&self, rows: &[Row], name: &str) -> ColumnAnalysis {
        let missing = CellValue::Missing;
        let values = rows.iter().map(|row| row.get(name).unwrap_or(&missing));

        let mut seen_values = HashSet::new();
        let mut is_number = true;
        let mut min_max: Option<(f64, f64)> = None;

        for value in values {
            seen_values.insert(DistinctKey::from(value));

            if is_missing(value) || !is_number {
                continue;
            }
            let number = to_number(value);
            if number.is_nan() {
                is_number = false;
                continue;
            }
            min_max = Some(match min_max {
                Some((min, max)) => (min.min(number), max.max(number)),
                None => (number, number),
            });
        }

        // A column with no values at all is vacuously numeric
        let (column_type, min, max) = match (is_number, min_max) {
            (true, Some((min, max))) => (ColumnType::Number, Some(min), Some(max)),
            (true, None) => (ColumnType::Number, None, None),
            (false, _) => (ColumnType::String, None, None),
        };

        ColumnAnalysis {
            key: name.to_string(),
            column_type,
            unique_values: seen_values.len(),
            min,
            max,
        }
    }
}
