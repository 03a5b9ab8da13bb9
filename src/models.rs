use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;

use crate::services::charts::MAX_METRICS;

/// A single spreadsheet cell. Serialized untagged so rows read and write as
/// plain JSON objects (`{"region": "North", "sales": 12}`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Missing,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Missing => f.write_str("null"),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Number(n) => f.write_str(&crate::services::excel::utils::number_to_string(*n)),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

pub type Row = HashMap<String, CellValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Date,
    Boolean,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAnalysis {
    pub key: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub unique_values: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// One ingested file. `columns` is the key set of every row and `analysis`
/// is order-aligned with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: String,
    pub file_name: String,
    #[serde(rename = "data")]
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
    pub analysis: Vec<ColumnAnalysis>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

impl Dataset {
    /// Gives every row a cell for each column, missing where absent.
    pub fn fill_missing_cells(&mut self) {
        for row in self.rows.iter_mut() {
            for column in &self.columns {
                row.entry(column.clone()).or_insert(CellValue::Missing);
            }
        }
    }
}

/// Listing shape for a dataset, without its rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: String,
    pub file_name: String,
    pub columns: Vec<String>,
    pub analysis: Vec<ColumnAnalysis>,
    pub row_count: usize,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl From<&Dataset> for DatasetSummary {
    fn from(dataset: &Dataset) -> Self {
        Self {
            id: dataset.id.clone(),
            file_name: dataset.file_name.clone(),
            columns: dataset.columns.clone(),
            analysis: dataset.analysis.clone(),
            row_count: dataset.rows.len(),
            created_at: dataset.created_at,
            folder: dataset.folder.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMapping {
    pub x_axis_key: String,
    pub data_keys: SmallVec<[String; MAX_METRICS]>,
    pub bar_chart_title: String,
    pub area_chart_title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetType {
    Bar,
    Area,
    Line,
    Pie,
    Table,
}

impl WidgetType {
    pub fn default_title(&self) -> &'static str {
        match self {
            WidgetType::Bar => "Metric Breakdown",
            WidgetType::Area => "Trend Analysis",
            WidgetType::Line => "Growth Trend",
            WidgetType::Pie => "Distribution",
            WidgetType::Table => "Data Table",
        }
    }

    pub fn default_width(&self) -> WidgetWidth {
        match self {
            WidgetType::Table => WidgetWidth::Full,
            _ => WidgetWidth::Half,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetWidth {
    Half,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    pub x_axis_key: String,
    pub data_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortConfig {
    pub sort_key: String,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: String,
    pub dataset_id: String,
    #[serde(rename = "type")]
    pub kind: WidgetType,
    pub title: String,
    pub width: WidgetWidth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_config: Option<ColumnConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_config: Option<SortConfig>,
}

/// Partial widget update. `column_config` and `sort_config` distinguish
/// "absent" (leave as is) from `null` (clear the override).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub width: Option<WidgetWidth>,
    #[serde(default, deserialize_with = "nullable")]
    pub column_config: Option<Option<ColumnConfig>>,
    #[serde(default, deserialize_with = "nullable")]
    pub sort_config: Option<Option<SortConfig>>,
}

impl WidgetPatch {
    pub fn apply(self, widget: &mut Widget) {
        if let Some(title) = self.title {
            widget.title = title;
        }
        if let Some(width) = self.width {
            widget.width = width;
        }
        if let Some(column_config) = self.column_config {
            widget.column_config = column_config;
        }
        if let Some(sort_config) = self.sort_config {
            widget.sort_config = sort_config;
        }
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub id: String,
    pub column: String,
    pub value: CellValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPage {
    pub id: String,
    pub name: String,
    pub widgets: Vec<Widget>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_values_read_plain_json() {
        let row: Row = serde_json::from_str(r#"{"a": null, "b": true, "c": 4.5, "d": "x"}"#).unwrap();
        assert_eq!(row["a"], CellValue::Missing);
        assert_eq!(row["b"], CellValue::Bool(true));
        assert_eq!(row["c"], CellValue::Number(4.5));
        assert_eq!(row["d"], CellValue::Text("x".into()));
    }

    #[test]
    fn widget_patch_distinguishes_null_from_absent() {
        let mut widget = Widget {
            id: "w".into(),
            dataset_id: "d".into(),
            kind: WidgetType::Bar,
            title: "t".into(),
            width: WidgetWidth::Half,
            column_config: None,
            sort_config: Some(SortConfig { sort_key: "s".into(), sort_order: SortOrder::Asc }),
        };

        let keep: WidgetPatch = serde_json::from_str(r#"{"title": "new"}"#).unwrap();
        keep.apply(&mut widget);
        assert_eq!(widget.title, "new");
        assert!(widget.sort_config.is_some());

        let clear: WidgetPatch = serde_json::from_str(r#"{"sortConfig": null}"#).unwrap();
        clear.apply(&mut widget);
        assert!(widget.sort_config.is_none());
    }

    #[test]
    fn page_without_filters_deserializes() {
        let page: DashboardPage =
            serde_json::from_str(r#"{"id": "p", "name": "n", "widgets": [], "createdAt": 1}"#).unwrap();
        assert!(page.filters.is_empty());
    }
}
