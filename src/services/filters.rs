use std::collections::{BTreeSet, HashSet};

use crate::models::{CellValue, DashboardPage, Dataset, Filter, Row};
use crate::services::excel::utils::loose_eq;

/// Cap on the number of values offered for a filter column.
pub const MAX_FILTER_VALUES: usize = 500;

/// A row passes a filter when its value is loosely equal to the filter
/// value. A cell the row does not carry compares as missing. Filters are
/// AND-combined.
pub fn row_matches(row: &Row, filters: &[&Filter]) -> bool {
    filters.iter().all(|filter| match row.get(&filter.column) {
        Some(value) => loose_eq(value, &filter.value),
        None => matches!(filter.value, CellValue::Missing),
    })
}

/// Rows satisfying every filter, in their original order. Filters on a
/// column the dataset does not have are ignored.
pub fn apply_filters<'a>(rows: &'a [Row], columns: &[String], filters: &[Filter]) -> Vec<&'a Row> {
    let active: Vec<&Filter> = filters
        .iter()
        .filter(|f| columns.iter().any(|c| c == &f.column))
        .collect();
    if active.is_empty() {
        return rows.iter().collect();
    }
    rows.iter().filter(|row| row_matches(row, &active)).collect()
}

fn page_datasets<'a>(page: &DashboardPage, datasets: &'a [Dataset]) -> impl Iterator<Item = &'a Dataset> {
    let used: HashSet<String> = page.widgets.iter().map(|w| w.dataset_id.clone()).collect();
    datasets.iter().filter(move |d| used.contains(&d.id))
}

/// Sorted union of the columns of every dataset used on the page.
pub fn filter_columns(page: &DashboardPage, datasets: &[Dataset]) -> Vec<String> {
    page_datasets(page, datasets)
        .flat_map(|d| d.columns.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sorted distinct values of `column` across the page's datasets, rendered
/// as text and capped at [`MAX_FILTER_VALUES`].
pub fn filter_values(page: &DashboardPage, datasets: &[Dataset], column: &str) -> Vec<String> {
    page_datasets(page, datasets)
        .filter(|d| d.columns.iter().any(|c| c == column))
        .flat_map(|d| d.rows.iter())
        .filter_map(|row| match row.get(column) {
            None | Some(CellValue::Missing) => None,
            Some(value) => Some(value.to_string()),
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(MAX_FILTER_VALUES)
        .collect()
}
