use std::cmp::Ordering;

use serde::Serialize;

use crate::models::{
    CellValue, ChartMapping, Dataset, Filter, Row, SortConfig, SortOrder, Widget, WidgetType,
    WidgetWidth,
};
use crate::services::charts::suggest_chart;
use crate::services::excel::utils::{format_number, format_number_short, to_number};
use crate::services::filters::apply_filters;

/// Rows handed to a bar/area/line chart.
pub const CHART_ROW_LIMIT: usize = 1_000;
/// Rows handed to a table.
pub const TABLE_ROW_LIMIT: usize = 100;
/// Smallest share of the metric total a pie slice may represent.
pub const PIE_MIN_SHARE_PERCENT: f64 = 0.5;
pub const PIE_MAX_SLICES: usize = 10;

const LINE_TITLE: &str = "Trend Analysis";
const PIE_TITLE: &str = "Distribution";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetView {
    pub widget_id: String,
    #[serde(rename = "type")]
    pub kind: WidgetType,
    pub title: String,
    pub width: WidgetWidth,
    pub body: WidgetBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WidgetBody {
    /// The widget's dataset no longer exists.
    MissingSource,
    /// No chart mapping could be derived or was configured.
    NoChart,
    Chart {
        mapping: ChartMapping,
        rows: Vec<Row>,
        y_axis: Option<AxisExtent>,
    },
    Pie {
        mapping: ChartMapping,
        rows: Vec<Row>,
        slices: Vec<PieSlice>,
        total_rows: usize,
        truncated: bool,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Row>,
        shown: usize,
        total: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisExtent {
    pub min: f64,
    pub max: f64,
    pub min_label: String,
    pub max_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    pub formatted_value: String,
}

/// Renders a widget using the heuristic suggestion when it carries no
/// explicit mapping.
pub fn render_widget(dataset: Option<&Dataset>, filters: &[Filter], widget: &Widget) -> WidgetView {
    render_widget_with(dataset, filters, widget, |d| suggest_chart(&d.analysis))
}

/// Like [`render_widget`], with the suggestion supplied by the caller
/// (e.g. from a per-dataset cache).
pub fn render_widget_with<F>(
    dataset: Option<&Dataset>,
    filters: &[Filter],
    widget: &Widget,
    suggest: F,
) -> WidgetView
where
    F: FnOnce(&Dataset) -> Option<ChartMapping>,
{
    let view = |title: &str, body: WidgetBody| WidgetView {
        widget_id: widget.id.clone(),
        kind: widget.kind,
        title: resolve_title(widget, title),
        width: widget.width,
        body,
    };

    let Some(dataset) = dataset else {
        tracing::debug!("Widget {} references missing dataset {}", widget.id, widget.dataset_id);
        return view(widget.kind.default_title(), WidgetBody::MissingSource);
    };

    let filtered = apply_filters(&dataset.rows, &dataset.columns, filters);

    if widget.kind == WidgetType::Table {
        return view(widget.kind.default_title(), table_body(&dataset.columns, &filtered));
    }

    let mapping = match &widget.column_config {
        Some(config) => ChartMapping::from_override(config),
        None => suggest(dataset),
    };
    let Some(mapping) = mapping else {
        return view(widget.kind.default_title(), WidgetBody::NoChart);
    };

    match widget.kind {
        WidgetType::Pie => {
            let rows = pie_rows(&filtered, &mapping.data_keys[0]);
            let slices = pie_slices(&rows, &mapping);
            let body = WidgetBody::Pie {
                truncated: rows.len() < filtered.len(),
                total_rows: filtered.len(),
                rows: rows.into_iter().cloned().collect(),
                slices,
                mapping,
            };
            view(PIE_TITLE, body)
        }
        kind => {
            let title = match kind {
                WidgetType::Bar => mapping.bar_chart_title.clone(),
                WidgetType::Area => mapping.area_chart_title.clone(),
                _ => LINE_TITLE.to_string(),
            };
            let rows = chart_rows(&filtered, widget.sort_config.as_ref());
            let body = WidgetBody::Chart {
                y_axis: axis_extent(&rows, &mapping.data_keys),
                rows: rows.into_iter().cloned().collect(),
                mapping,
            };
            view(&title, body)
        }
    }
}

fn resolve_title(widget: &Widget, default_title: &str) -> String {
    if widget.title.trim().is_empty() {
        default_title.to_string()
    } else {
        widget.title.clone()
    }
}

fn table_body(columns: &[String], filtered: &[&Row]) -> WidgetBody {
    let rows: Vec<Row> = filtered.iter().take(TABLE_ROW_LIMIT).map(|r| (*r).clone()).collect();
    WidgetBody::Table {
        columns: columns.to_vec(),
        shown: rows.len(),
        total: filtered.len(),
        rows,
    }
}

fn sort_value(row: &Row, key: &str) -> f64 {
    let value = row.get(key).map(to_number).unwrap_or(f64::NAN);
    if value.is_nan() { 0.0 } else { value }
}

/// First [`CHART_ROW_LIMIT`] filtered rows, then stably sorted when a sort
/// override is set. The cap is positional, applied before sorting.
pub fn chart_rows<'a>(filtered: &[&'a Row], sort: Option<&SortConfig>) -> Vec<&'a Row> {
    let mut rows: Vec<&Row> = filtered.iter().take(CHART_ROW_LIMIT).copied().collect();

    if let Some(sort) = sort {
        rows.sort_by(|a, b| {
            let (va, vb) = (sort_value(a, &sort.sort_key), sort_value(b, &sort.sort_key));
            let ordering = match sort.sort_order {
                SortOrder::Asc => va.partial_cmp(&vb),
                SortOrder::Desc => vb.partial_cmp(&va),
            };
            ordering.unwrap_or(Ordering::Equal)
        });
    }

    rows
}

fn metric_value(row: &Row, key: &str) -> f64 {
    row.get(key).map(to_number).unwrap_or(f64::NAN)
}

fn share_percent(value: f64, total: f64) -> f64 {
    if total == 0.0 { 0.0 } else { value / total * 100.0 }
}

/// Rows kept for a pie: positive metric values holding at least
/// [`PIE_MIN_SHARE_PERCENT`] of the metric total over all filtered rows,
/// in filtered order, truncated to [`PIE_MAX_SLICES`].
pub fn pie_rows<'a>(filtered: &[&'a Row], metric: &str) -> Vec<&'a Row> {
    let total: f64 = filtered
        .iter()
        .map(|row| metric_value(row, metric))
        .filter(|v| !v.is_nan())
        .sum();

    filtered
        .iter()
        .filter(|row| {
            let value = metric_value(row, metric);
            if value.is_nan() || value <= 0.0 {
                return false;
            }
            share_percent(value, total) >= PIE_MIN_SHARE_PERCENT
        })
        .take(PIE_MAX_SLICES)
        .copied()
        .collect()
}

fn pie_slices(rows: &[&Row], mapping: &ChartMapping) -> Vec<PieSlice> {
    let metric = &mapping.data_keys[0];
    let values: Vec<f64> = rows.iter().map(|row| metric_value(row, metric)).collect();
    let slice_total: f64 = values.iter().sum();

    rows.iter()
        .zip(values)
        .map(|(row, value)| {
            let name = row.get(&mapping.x_axis_key).cloned().unwrap_or_default();
            PieSlice {
                label: format!("{} {:.0}%", name, share_percent(value, slice_total)),
                value,
                formatted_value: format_number(&CellValue::Number(value)),
            }
        })
        .collect()
}

fn axis_extent(rows: &[&Row], data_keys: &[String]) -> Option<AxisExtent> {
    let (min, max) = rows
        .iter()
        .flat_map(|row| data_keys.iter().filter_map(move |key| row.get(key)))
        .filter(|value| !matches!(value, CellValue::Missing))
        .map(to_number)
        .filter(|n| n.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, n| match acc {
            Some((min, max)) => Some((min.min(n), max.max(n))),
            None => Some((n, n)),
        })?;

    Some(AxisExtent {
        min,
        max,
        min_label: format_number_short(&CellValue::Number(min)),
        max_label: format_number_short(&CellValue::Number(max)),
    })
}
