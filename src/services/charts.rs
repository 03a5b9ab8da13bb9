use moka::sync::Cache;
use smallvec::SmallVec;

use crate::models::{ChartMapping, ColumnAnalysis, ColumnConfig, ColumnType, Dataset};
use crate::services::excel::utils::capitalize;

/// Most metric columns a suggested chart plots.
pub const MAX_METRICS: usize = 3;
/// Numeric columns with fewer distinct values than this can act as categories.
pub const CATEGORY_CARDINALITY_LIMIT: usize = 50;

const SUGGESTION_CACHE_CAPACITY: u64 = 1_024;

fn is_category(column: &ColumnAnalysis) -> bool {
    match column.column_type {
        ColumnType::String => true,
        ColumnType::Number => column.unique_values < CATEGORY_CARDINALITY_LIMIT,
        _ => false,
    }
}

/// Picks the first categorical column as the X axis and up to
/// [`MAX_METRICS`] of the remaining numeric columns as series.
///
/// Selection is first-match in column order, not best-match.
pub fn suggest_chart(analysis: &[ColumnAnalysis]) -> Option<ChartMapping> {
    let category = analysis.iter().find(|c| is_category(c))?;

    let data_keys: SmallVec<[String; MAX_METRICS]> = analysis
        .iter()
        .filter(|c| c.column_type == ColumnType::Number && c.key != category.key)
        .take(MAX_METRICS)
        .map(|c| c.key.clone())
        .collect();

    let primary = data_keys.first()?;
    let dimension = &category.key;

    Some(ChartMapping {
        bar_chart_title: format!("{} by {}", capitalize(primary), capitalize(dimension)),
        area_chart_title: format!("{} Trends & Overview", capitalize(primary)),
        x_axis_key: dimension.clone(),
        data_keys,
    })
}

impl ChartMapping {
    /// Mapping from an explicit widget override. Titles are built from the
    /// raw key names. An override without data keys yields no chart.
    pub fn from_override(config: &ColumnConfig) -> Option<Self> {
        let primary = config.data_keys.first()?;

        Some(ChartMapping {
            bar_chart_title: format!("{} by {}", primary, config.x_axis_key),
            area_chart_title: format!("{} Trends & Overview", primary),
            x_axis_key: config.x_axis_key.clone(),
            data_keys: config.data_keys.iter().cloned().collect(),
        })
    }
}

/// Memoized [`suggest_chart`] results keyed by dataset id. Entries must be
/// invalidated whenever the dataset's rows are replaced.
pub struct ChartSuggestions {
    cache: Cache<String, Option<ChartMapping>>,
}

impl Default for ChartSuggestions {
    fn default() -> Self {
        Self::new(SUGGESTION_CACHE_CAPACITY)
    }
}

impl ChartSuggestions {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    pub fn for_dataset(&self, dataset: &Dataset) -> Option<ChartMapping> {
        self.cache
            .get_with(dataset.id.clone(), || suggest_chart(&dataset.analysis))
    }

    pub fn invalidate(&self, dataset_id: &str) {
        self.cache.invalidate(dataset_id);
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}
