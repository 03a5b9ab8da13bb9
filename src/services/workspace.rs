use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CellValue, DashboardPage, Dataset, DatasetSummary, Filter, MoveDirection,
    Widget, WidgetPatch, WidgetType, WidgetWidth,
};
use crate::services::backup::{self, Backup, BackupContents, ImportSummary};
use crate::services::charts::ChartSuggestions;
use crate::services::db_loader::{Collection, EntityStore, StoredEntity};
use crate::services::excel::cleaner::{clean_rows, CleanOptions};
use crate::services::excel::types::DecodedSheet;
use crate::services::excel::{ColumnAnalyzer, SheetDecoder};
use crate::services::filters;
use crate::services::pipeline::{render_widget_with, WidgetView};

pub const DEFAULT_PAGE_NAME: &str = "New Dashboard";
pub const OVERVIEW_PAGE_NAME: &str = "Overview";

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn stored<T: Serialize>(id: &str, created_at: i64, value: &T) -> Result<StoredEntity, AppError> {
    Ok(StoredEntity {
        id: id.to_string(),
        created_at,
        body: serde_json::to_string(value)?,
    })
}

fn stored_dataset(dataset: &Dataset) -> Result<StoredEntity, AppError> {
    stored(&dataset.id, dataset.created_at, dataset)
}

fn stored_page(page: &DashboardPage) -> Result<StoredEntity, AppError> {
    stored(&page.id, page.created_at, page)
}

fn decode_all<T: DeserializeOwned>(collection: Collection, entities: Vec<StoredEntity>) -> Vec<T> {
    entities
        .into_iter()
        .filter_map(|entity| match serde_json::from_str(&entity.body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping unreadable {:?} entry {}: {}", collection, entity.id, e);
                None
            }
        })
        .collect()
}

fn seeded_widgets(dataset_id: &str) -> Vec<Widget> {
    [
        (WidgetType::Bar, "Key Metrics", WidgetWidth::Half),
        (WidgetType::Line, "Trend Analysis", WidgetWidth::Half),
        (WidgetType::Table, "Raw Data View", WidgetWidth::Full),
    ]
    .into_iter()
    .map(|(kind, title, width)| Widget {
        id: new_id(),
        dataset_id: dataset_id.to_string(),
        kind,
        title: title.to_string(),
        width,
        column_config: None,
        sort_config: None,
    })
    .collect()
}

fn new_page(name: Option<&str>, widgets: Vec<Widget>) -> DashboardPage {
    DashboardPage {
        id: new_id(),
        name: name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(DEFAULT_PAGE_NAME)
            .to_string(),
        widgets,
        filters: Vec::new(),
        created_at: now_millis(),
    }
}

/// Live datasets and pages, mirrored to an [`EntityStore`].
///
/// Every mutation is applied in memory first and then written through to
/// the store as a whole-entity snapshot. A failed write is logged and
/// returned, but the in-memory change is kept.
pub struct Workspace {
    store: Arc<dyn EntityStore>,
    datasets: RwLock<Vec<Dataset>>,
    pages: RwLock<Vec<DashboardPage>>,
    suggestions: ChartSuggestions,
    decoder: SheetDecoder,
    analyzer: ColumnAnalyzer,
}

impl Workspace {
    /// Loads all state from the store. When there are datasets but no
    /// pages an overview page is seeded with the newest dataset.
    pub fn load(store: Arc<dyn EntityStore>) -> Result<Self, AppError> {
        let workspace = Self {
            store,
            datasets: RwLock::new(Vec::new()),
            pages: RwLock::new(Vec::new()),
            suggestions: ChartSuggestions::default(),
            decoder: SheetDecoder,
            analyzer: ColumnAnalyzer,
        };
        workspace.reload()?;

        let seed = {
            let datasets = workspace.datasets.read();
            let pages = workspace.pages.read();
            match (pages.is_empty(), datasets.first()) {
                (true, Some(dataset)) => Some(dataset.id.clone()),
                _ => None,
            }
        };
        if let Some(dataset_id) = seed {
            workspace.create_page(Some(OVERVIEW_PAGE_NAME), Some(dataset_id.as_str()))?;
        }

        Ok(workspace)
    }

    /// Replaces the in-memory view with what the store holds.
    pub fn reload(&self) -> Result<(), AppError> {
        let datasets: Vec<Dataset> =
            decode_all(Collection::Datasets, self.store.get_all(Collection::Datasets)?);
        let pages: Vec<DashboardPage> =
            decode_all(Collection::Pages, self.store.get_all(Collection::Pages)?);
        info!("Loaded {} datasets and {} pages", datasets.len(), pages.len());

        *self.datasets.write() = datasets;
        *self.pages.write() = pages;
        self.suggestions.clear();
        Ok(())
    }

    fn persist(&self, collection: Collection, entity: StoredEntity) -> Result<(), AppError> {
        self.store.put(collection, &entity).map_err(|e| {
            error!("Failed to save {:?} entry {}: {}", collection, entity.id, e);
            e
        })
    }

    fn persist_dataset(&self, dataset: &Dataset) -> Result<(), AppError> {
        self.persist(Collection::Datasets, stored_dataset(dataset)?)
    }

    fn persist_page(&self, page: &DashboardPage) -> Result<(), AppError> {
        self.persist(Collection::Pages, stored_page(page)?)
    }

    // --- Datasets ---

    pub fn dataset_summaries(&self) -> Vec<DatasetSummary> {
        self.datasets.read().iter().map(DatasetSummary::from).collect()
    }

    pub fn dataset(&self, id: &str) -> Result<Dataset, AppError> {
        self.datasets
            .read()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("dataset {}", id)))
    }

    /// Decodes an uploaded file and adds it as a new dataset.
    pub fn import_dataset(
        &self,
        file_name: &str,
        file_data: Bytes,
        folder: Option<String>,
    ) -> Result<DatasetSummary, AppError> {
        let sheet = self.decoder.decode(file_name, file_data)?;
        self.add_dataset(file_name, sheet, folder)
    }

    /// Adds already decoded rows as a new dataset. The first dataset of a
    /// workspace without pages also gets an overview page.
    pub fn add_dataset(
        &self,
        file_name: &str,
        sheet: DecodedSheet,
        folder: Option<String>,
    ) -> Result<DatasetSummary, AppError> {
        let analysis = self.analyzer.analyze(&sheet.rows, &sheet.columns);
        let dataset = Dataset {
            id: new_id(),
            file_name: file_name.to_string(),
            rows: sheet.rows,
            columns: sheet.columns,
            analysis,
            created_at: now_millis(),
            folder: normalize_folder(folder),
            data_source: None,
        };
        info!(
            "Adding dataset {} ({}) with {} rows",
            dataset.id,
            dataset.file_name,
            dataset.rows.len()
        );

        let summary = DatasetSummary::from(&dataset);
        let entity = stored_dataset(&dataset)?;
        self.datasets.write().insert(0, dataset);
        self.persist(Collection::Datasets, entity)?;

        let overview = {
            let mut pages = self.pages.write();
            if pages.is_empty() {
                let page = new_page(Some(OVERVIEW_PAGE_NAME), seeded_widgets(&summary.id));
                pages.push(page.clone());
                Some(page)
            } else {
                None
            }
        };
        if let Some(page) = overview {
            info!("Creating page {} ({})", page.id, page.name);
            self.persist_page(&page)?;
        }

        Ok(summary)
    }

    fn replace_rows<F>(&self, id: &str, replace: F) -> Result<DatasetSummary, AppError>
    where
        F: FnOnce(&mut Dataset) -> Result<(), AppError>,
    {
        let updated = {
            let mut datasets = self.datasets.write();
            let dataset = datasets
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| AppError::NotFound(format!("dataset {}", id)))?;
            replace(dataset)?;
            dataset.analysis = self.analyzer.analyze(&dataset.rows, &dataset.columns);
            dataset.clone()
        };
        self.suggestions.invalidate(id);
        self.persist_dataset(&updated)?;
        Ok(DatasetSummary::from(&updated))
    }

    /// Replaces a dataset's rows with a freshly uploaded file, keeping its
    /// identity, creation time and folder.
    pub fn refresh_dataset(
        &self,
        id: &str,
        file_name: &str,
        file_data: Bytes,
    ) -> Result<DatasetSummary, AppError> {
        let sheet = self.decoder.decode(file_name, file_data)?;
        info!("Refreshing dataset {} from {}", id, file_name);
        self.replace_rows(id, |dataset| {
            dataset.file_name = file_name.to_string();
            dataset.rows = sheet.rows;
            dataset.columns = sheet.columns;
            Ok(())
        })
    }

    pub fn clean_dataset(&self, id: &str, options: CleanOptions) -> Result<DatasetSummary, AppError> {
        self.replace_rows(id, |dataset| {
            let before = dataset.rows.len();
            dataset.rows = clean_rows(&dataset.rows, &dataset.columns, options);
            info!("Cleaned dataset {}: {} -> {} rows", dataset.id, before, dataset.rows.len());
            Ok(())
        })
    }

    pub fn set_dataset_folder(&self, id: &str, folder: Option<String>) -> Result<DatasetSummary, AppError> {
        let updated = {
            let mut datasets = self.datasets.write();
            let dataset = datasets
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| AppError::NotFound(format!("dataset {}", id)))?;
            dataset.folder = normalize_folder(folder);
            dataset.clone()
        };
        self.persist_dataset(&updated)?;
        Ok(DatasetSummary::from(&updated))
    }

    /// Removes a dataset and every widget referencing it, on every page.
    /// The dataset delete and the page rewrites are one store transaction.
    pub fn delete_dataset(&self, id: &str) -> Result<(), AppError> {
        {
            let mut datasets = self.datasets.write();
            let before = datasets.len();
            datasets.retain(|d| d.id != id);
            if datasets.len() == before {
                return Err(AppError::NotFound(format!("dataset {}", id)));
            }
        }
        self.suggestions.invalidate(id);

        let touched: Vec<DashboardPage> = {
            let mut pages = self.pages.write();
            pages
                .iter_mut()
                .filter_map(|page| {
                    let before = page.widgets.len();
                    page.widgets.retain(|w| w.dataset_id != id);
                    (page.widgets.len() != before).then(|| page.clone())
                })
                .collect()
        };
        info!("Deleted dataset {}, updated {} pages", id, touched.len());

        let entities = touched.iter().map(stored_page).collect::<Result<Vec<_>, _>>()?;
        self.store
            .delete_and_put_many(Collection::Datasets, id, Collection::Pages, &entities)
            .map_err(|e| {
                error!("Failed to delete dataset {}: {}", id, e);
                e
            })
    }

    // --- Pages ---

    pub fn pages(&self) -> Vec<DashboardPage> {
        self.pages.read().clone()
    }

    pub fn page(&self, id: &str) -> Result<DashboardPage, AppError> {
        self.pages
            .read()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("page {}", id)))
    }

    /// Creates a page, seeded with a bar, line and table widget when an
    /// initial dataset is given.
    pub fn create_page(&self, name: Option<&str>, initial_dataset: Option<&str>) -> Result<DashboardPage, AppError> {
        // Hold the dataset list until the page is in place so a concurrent
        // delete cannot leave widgets pointing at a removed dataset.
        let datasets = self.datasets.read();
        let widgets = match initial_dataset {
            Some(dataset_id) => {
                require_dataset(&datasets, dataset_id)?;
                seeded_widgets(dataset_id)
            }
            None => Vec::new(),
        };

        let page = new_page(name, widgets);
        info!("Creating page {} ({})", page.id, page.name);

        self.pages.write().push(page.clone());
        drop(datasets);
        self.persist_page(&page)?;
        Ok(page)
    }

    fn update_page<F>(&self, page_id: &str, mutate: F) -> Result<DashboardPage, AppError>
    where
        F: FnOnce(&mut DashboardPage) -> Result<(), AppError>,
    {
        let updated = {
            let mut pages = self.pages.write();
            let page = pages
                .iter_mut()
                .find(|p| p.id == page_id)
                .ok_or_else(|| AppError::NotFound(format!("page {}", page_id)))?;
            mutate(page)?;
            page.clone()
        };
        self.persist_page(&updated)?;
        Ok(updated)
    }

    pub fn rename_page(&self, id: &str, name: &str) -> Result<DashboardPage, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput("page name must not be empty".to_string()));
        }
        self.update_page(id, |page| {
            page.name = name.to_string();
            Ok(())
        })
    }

    pub fn delete_page(&self, id: &str) -> Result<(), AppError> {
        {
            let mut pages = self.pages.write();
            let before = pages.len();
            pages.retain(|p| p.id != id);
            if pages.len() == before {
                return Err(AppError::NotFound(format!("page {}", id)));
            }
        }
        info!("Deleted page {}", id);
        self.store.delete(Collection::Pages, id).map_err(|e| {
            error!("Failed to delete page {}: {}", id, e);
            e
        })
    }

    // --- Filters ---

    pub fn add_filter(&self, page_id: &str, column: &str, value: CellValue) -> Result<Filter, AppError> {
        let blank = matches!(&value, CellValue::Missing) || matches!(&value, CellValue::Text(s) if s.is_empty());
        if column.is_empty() || blank {
            return Err(AppError::InvalidInput("filter needs a column and a value".to_string()));
        }

        let filter = Filter {
            id: new_id(),
            column: column.to_string(),
            value,
        };
        let added = filter.clone();
        self.update_page(page_id, move |page| {
            page.filters.push(added);
            Ok(())
        })?;
        Ok(filter)
    }

    pub fn remove_filter(&self, page_id: &str, filter_id: &str) -> Result<DashboardPage, AppError> {
        self.update_page(page_id, |page| {
            page.filters.retain(|f| f.id != filter_id);
            Ok(())
        })
    }

    pub fn filter_columns(&self, page_id: &str) -> Result<Vec<String>, AppError> {
        let page = self.page(page_id)?;
        Ok(filters::filter_columns(&page, &self.datasets.read()))
    }

    pub fn filter_values(&self, page_id: &str, column: &str) -> Result<Vec<String>, AppError> {
        let page = self.page(page_id)?;
        Ok(filters::filter_values(&page, &self.datasets.read(), column))
    }

    // --- Widgets ---

    pub fn add_widget(&self, page_id: &str, dataset_id: &str, kind: WidgetType) -> Result<Widget, AppError> {
        let datasets = self.datasets.read();
        require_dataset(&datasets, dataset_id)?;

        let widget = Widget {
            id: new_id(),
            dataset_id: dataset_id.to_string(),
            kind,
            title: kind.default_title().to_string(),
            width: kind.default_width(),
            column_config: None,
            sort_config: None,
        };
        let added = widget.clone();
        self.update_page(page_id, move |page| {
            page.widgets.push(added);
            Ok(())
        })?;
        drop(datasets);
        debug!("Added {:?} widget {} to page {}", kind, widget.id, page_id);
        Ok(widget)
    }

    pub fn remove_widget(&self, page_id: &str, widget_id: &str) -> Result<DashboardPage, AppError> {
        self.update_page(page_id, |page| {
            page.widgets.retain(|w| w.id != widget_id);
            Ok(())
        })
    }

    pub fn update_widget(&self, page_id: &str, widget_id: &str, patch: WidgetPatch) -> Result<Widget, AppError> {
        let page = self.update_page(page_id, |page| {
            let widget = page
                .widgets
                .iter_mut()
                .find(|w| w.id == widget_id)
                .ok_or_else(|| AppError::NotFound(format!("widget {}", widget_id)))?;
            patch.apply(widget);
            Ok(())
        })?;

        page.widgets
            .into_iter()
            .find(|w| w.id == widget_id)
            .ok_or_else(|| AppError::NotFound(format!("widget {}", widget_id)))
    }

    /// Swaps the widget at `index` with its neighbour. Moves past either
    /// end leave the page untouched and unwritten.
    pub fn move_widget(&self, page_id: &str, index: usize, direction: MoveDirection) -> Result<DashboardPage, AppError> {
        let current = self.page(page_id)?;
        let target = match direction {
            MoveDirection::Left if index > 0 && index < current.widgets.len() => index - 1,
            MoveDirection::Right if index + 1 < current.widgets.len() => index + 1,
            _ => return Ok(current),
        };

        self.update_page(page_id, |page| {
            if index < page.widgets.len() && target < page.widgets.len() {
                page.widgets.swap(index, target);
            }
            Ok(())
        })
    }

    /// Runs the widget pipeline for every widget of a page, in layout order.
    pub fn render_page(&self, page_id: &str) -> Result<Vec<WidgetView>, AppError> {
        let page = self.page(page_id)?;
        let datasets = self.datasets.read();

        Ok(page
            .widgets
            .iter()
            .map(|widget| {
                let dataset = datasets.iter().find(|d| d.id == widget.dataset_id);
                render_widget_with(dataset, &page.filters, widget, |d| self.suggestions.for_dataset(d))
            })
            .collect())
    }

    // --- Backup ---

    pub fn export_backup(&self) -> Backup {
        Backup::new(self.datasets.read().clone(), self.pages.read().clone())
    }

    /// Restores a backup document. Datasets whose file name is already
    /// present are skipped; all pages are upserted; state is then reloaded
    /// from the store.
    pub fn import_backup(&self, raw: &[u8]) -> Result<ImportSummary, AppError> {
        let BackupContents { datasets, pages } = backup::parse_backup(raw)?;

        let existing_names: HashSet<String> =
            self.datasets.read().iter().map(|d| d.file_name.clone()).collect();

        let mut summary = ImportSummary::default();
        let mut to_store = Vec::new();
        for mut dataset in datasets {
            if existing_names.contains(&dataset.file_name) {
                debug!("Skipping dataset {} ({}): file name exists", dataset.id, dataset.file_name);
                summary.datasets_skipped += 1;
                continue;
            }
            dataset.fill_missing_cells();
            to_store.push(stored_dataset(&dataset)?);
        }
        summary.datasets_imported = to_store.len();

        let page_entities = pages.iter().map(stored_page).collect::<Result<Vec<_>, _>>()?;
        summary.pages_imported = page_entities.len();

        let written = self
            .store
            .put_many(Collection::Datasets, &to_store)
            .and_then(|_| self.store.put_many(Collection::Pages, &page_entities));
        if let Err(e) = written {
            error!("Failed to restore backup: {}", e);
            self.reload()?;
            return Err(e);
        }

        self.reload()?;
        info!(
            "Restored {} datasets ({} skipped) and {} dashboards",
            summary.datasets_imported, summary.datasets_skipped, summary.pages_imported
        );
        Ok(summary)
    }
}

fn require_dataset(datasets: &[Dataset], id: &str) -> Result<(), AppError> {
    if datasets.iter().any(|d| d.id == id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("dataset {}", id)))
    }
}

fn normalize_folder(folder: Option<String>) -> Option<String> {
    folder
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
}
