use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};

use datadeck::error::AppError;
use datadeck::models::{
    CellValue, ColumnConfig, MoveDirection, Row, WidgetPatch, WidgetType, WidgetWidth,
};
use datadeck::services::db_loader::{Collection, DbLoader, EntityStore, StoredEntity};
use datadeck::services::excel::cleaner::CleanOptions;
use datadeck::services::excel::types::DecodedSheet;
use datadeck::services::pipeline::WidgetBody;
use datadeck::services::workspace::{Workspace, OVERVIEW_PAGE_NAME};

fn sheet(rows: &[(&str, f64)]) -> DecodedSheet {
    DecodedSheet {
        columns: vec!["region".to_string(), "sales".to_string()],
        rows: rows
            .iter()
            .map(|(region, sales)| {
                let mut row = Row::new();
                row.insert("region".to_string(), CellValue::from(*region));
                row.insert("sales".to_string(), CellValue::Number(*sales));
                row
            })
            .collect(),
    }
}

fn sales() -> DecodedSheet {
    sheet(&[("North", 10.0), ("South", 20.0), ("North", 5.0)])
}

fn memory_store() -> Arc<DbLoader> {
    Arc::new(assert_ok!(DbLoader::open_in_memory()))
}

fn empty_workspace() -> (Arc<DbLoader>, Workspace) {
    let store = memory_store();
    let workspace = assert_ok!(Workspace::load(store.clone()));
    (store, workspace)
}

/// Store that can be switched into failing every write.
struct FlakyStore {
    inner: DbLoader,
    failing: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::DatabaseError("disk full".to_string()))
        } else {
            Ok(())
        }
    }
}

impl EntityStore for FlakyStore {
    fn get_all(&self, collection: Collection) -> Result<Vec<StoredEntity>, AppError> {
        self.inner.get_all(collection)
    }

    fn put(&self, collection: Collection, entity: &StoredEntity) -> Result<(), AppError> {
        self.check()?;
        self.inner.put(collection, entity)
    }

    fn put_many(&self, collection: Collection, entities: &[StoredEntity]) -> Result<(), AppError> {
        self.check()?;
        self.inner.put_many(collection, entities)
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<(), AppError> {
        self.check()?;
        self.inner.delete(collection, id)
    }

    fn delete_and_put_many(
        &self,
        delete_from: Collection,
        id: &str,
        put_into: Collection,
        entities: &[StoredEntity],
    ) -> Result<(), AppError> {
        self.check()?;
        self.inner.delete_and_put_many(delete_from, id, put_into, entities)
    }
}

#[test]
fn first_dataset_gets_an_overview_page() {
    let (_, workspace) = empty_workspace();
    let summary = assert_ok!(workspace.add_dataset("sales.xlsx", sales(), None));
    assert_eq!(summary.row_count, 3);

    let pages = workspace.pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].name, OVERVIEW_PAGE_NAME);

    let kinds: Vec<_> = pages[0].widgets.iter().map(|w| (w.kind, w.title.as_str(), w.width)).collect();
    assert_eq!(
        kinds,
        vec![
            (WidgetType::Bar, "Key Metrics", WidgetWidth::Half),
            (WidgetType::Line, "Trend Analysis", WidgetWidth::Half),
            (WidgetType::Table, "Raw Data View", WidgetWidth::Full),
        ]
    );
    assert!(pages[0].widgets.iter().all(|w| w.dataset_id == summary.id));

    // A second dataset does not add another page.
    assert_ok!(workspace.add_dataset("costs.csv", sales(), None));
    assert_eq!(workspace.pages().len(), 1);
}

#[test]
fn load_seeds_overview_when_pages_are_gone() {
    let (store, workspace) = empty_workspace();
    assert_ok!(workspace.add_dataset("old.csv", sales(), None));
    let page_id = workspace.pages()[0].id.clone();
    assert_ok!(workspace.delete_page(&page_id));
    assert!(workspace.pages().is_empty());

    let reloaded = assert_ok!(Workspace::load(store));
    let pages = reloaded.pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].widgets.len(), 3);
}

#[test]
fn rendering_the_overview_suggests_a_chart() {
    let (_, workspace) = empty_workspace();
    assert_ok!(workspace.add_dataset("sales.xlsx", sales(), None));
    let page = workspace.pages().remove(0);

    let views = assert_ok!(workspace.render_page(&page.id));
    assert_eq!(views.len(), 3);
    assert_eq!(views[0].title, "Key Metrics");
    match &views[0].body {
        WidgetBody::Chart { mapping, rows, .. } => {
            assert_eq!(mapping.x_axis_key, "region");
            assert_eq!(mapping.data_keys.as_slice(), ["sales".to_string()]);
            assert_eq!(rows.len(), 3);
        }
        other => panic!("expected a chart, got {:?}", other),
    }
    match &views[2].body {
        WidgetBody::Table { shown, total, .. } => assert_eq!((*shown, *total), (3, 3)),
        other => panic!("expected a table, got {:?}", other),
    }
}

#[test]
fn page_filters_narrow_every_widget() {
    let (_, workspace) = empty_workspace();
    assert_ok!(workspace.add_dataset("sales.xlsx", sales(), None));
    let page_id = workspace.pages()[0].id.clone();

    assert_err!(workspace.add_filter(&page_id, "region", CellValue::from("")));
    assert_err!(workspace.add_filter(&page_id, "", CellValue::from("North")));

    let filter = assert_ok!(workspace.add_filter(&page_id, "region", CellValue::from("North")));
    let views = assert_ok!(workspace.render_page(&page_id));
    match &views[2].body {
        WidgetBody::Table { total, .. } => assert_eq!(*total, 2),
        other => panic!("expected a table, got {:?}", other),
    }

    assert_ok!(workspace.remove_filter(&page_id, &filter.id));
    assert!(workspace.page(&page_id).unwrap().filters.is_empty());
}

#[test]
fn filter_options_cover_page_datasets() {
    let (_, workspace) = empty_workspace();
    assert_ok!(workspace.add_dataset("sales.xlsx", sales(), None));
    let page_id = workspace.pages()[0].id.clone();

    assert_eq!(assert_ok!(workspace.filter_columns(&page_id)), vec!["region", "sales"]);
    assert_eq!(assert_ok!(workspace.filter_values(&page_id, "region")), vec!["North", "South"]);
    assert_eq!(assert_ok!(workspace.filter_values(&page_id, "sales")), vec!["10", "20", "5"]);
}

#[test]
fn deleting_a_dataset_removes_its_widgets_everywhere() {
    let (store, workspace) = empty_workspace();
    let kept = assert_ok!(workspace.add_dataset("kept.csv", sales(), None));
    let gone = assert_ok!(workspace.add_dataset("gone.csv", sales(), None));

    let first = workspace.pages()[0].id.clone();
    assert_ok!(workspace.add_widget(&first, &gone.id, WidgetType::Pie));
    let second = assert_ok!(workspace.create_page(Some("Costs"), Some(gone.id.as_str())));
    let untouched = assert_ok!(workspace.create_page(Some("Empty"), None));

    assert_ok!(workspace.delete_dataset(&gone.id));

    assert!(workspace.dataset(&gone.id).is_err());
    assert_eq!(workspace.page(&first).unwrap().widgets.len(), 3);
    assert!(workspace.page(&first).unwrap().widgets.iter().all(|w| w.dataset_id == kept.id));
    assert!(workspace.page(&second.id).unwrap().widgets.is_empty());
    assert!(workspace.page(&untouched.id).unwrap().widgets.is_empty());

    // The store agrees after a reload.
    let reloaded = assert_ok!(Workspace::load(store));
    assert_eq!(reloaded.dataset_summaries().len(), 1);
    assert!(reloaded.page(&second.id).unwrap().widgets.is_empty());

    assert!(matches!(workspace.delete_dataset(&gone.id), Err(AppError::NotFound(_))));
}

#[test]
fn widgets_can_be_added_moved_and_patched() {
    let (_, workspace) = empty_workspace();
    let dataset = assert_ok!(workspace.add_dataset("sales.xlsx", sales(), None));
    let page = assert_ok!(workspace.create_page(None, None));
    assert_eq!(page.name, "New Dashboard");

    assert!(matches!(
        workspace.add_widget(&page.id, "missing", WidgetType::Bar),
        Err(AppError::NotFound(_))
    ));

    let table = assert_ok!(workspace.add_widget(&page.id, &dataset.id, WidgetType::Table));
    assert_eq!(table.title, "Data Table");
    assert_eq!(table.width, WidgetWidth::Full);
    let area = assert_ok!(workspace.add_widget(&page.id, &dataset.id, WidgetType::Area));
    assert_eq!(area.width, WidgetWidth::Half);

    let moved = assert_ok!(workspace.move_widget(&page.id, 1, MoveDirection::Left));
    assert_eq!(moved.widgets[0].id, area.id);
    let unchanged = assert_ok!(workspace.move_widget(&page.id, 1, MoveDirection::Right));
    assert_eq!(unchanged.widgets[1].id, table.id);
    let unchanged = assert_ok!(workspace.move_widget(&page.id, 0, MoveDirection::Left));
    assert_eq!(unchanged.widgets[0].id, area.id);

    let patch: WidgetPatch = serde_json::from_str(
        r#"{"title": "Sales", "columnConfig": {"xAxisKey": "region", "dataKeys": []}}"#,
    )
    .unwrap();
    let patched = assert_ok!(workspace.update_widget(&page.id, &area.id, patch));
    assert_eq!(patched.title, "Sales");
    assert_eq!(
        patched.column_config,
        Some(ColumnConfig { x_axis_key: "region".to_string(), data_keys: vec![] })
    );
    let views = assert_ok!(workspace.render_page(&page.id));
    assert_eq!(views[0].body, WidgetBody::NoChart);

    let cleared: WidgetPatch = serde_json::from_str(r#"{"columnConfig": null}"#).unwrap();
    let patched = assert_ok!(workspace.update_widget(&page.id, &area.id, cleared));
    assert_eq!(patched.title, "Sales");
    assert!(patched.column_config.is_none());

    let page = assert_ok!(workspace.remove_widget(&page.id, &table.id));
    assert_eq!(page.widgets.len(), 1);
}

#[test]
fn renaming_requires_a_name() {
    let (_, workspace) = empty_workspace();
    let page = assert_ok!(workspace.create_page(Some("Draft"), None));

    assert!(matches!(workspace.rename_page(&page.id, "  "), Err(AppError::InvalidInput(_))));
    let renamed = assert_ok!(workspace.rename_page(&page.id, "Final"));
    assert_eq!(renamed.name, "Final");
    assert!(matches!(workspace.rename_page("nope", "x"), Err(AppError::NotFound(_))));
}

#[test]
fn cleaning_and_folders_keep_dataset_identity() {
    let (_, workspace) = empty_workspace();
    let mut dirty = sheet(&[("North", 1.0), ("North", 1.0)]);
    dirty.rows[0].insert("region".to_string(), CellValue::from(" North "));
    let dataset = assert_ok!(workspace.add_dataset("dirty.csv", dirty, Some(" 2024 ".to_string())));
    assert_eq!(dataset.folder.as_deref(), Some("2024"));

    let cleaned = assert_ok!(workspace.clean_dataset(&dataset.id, CleanOptions::default()));
    assert_eq!(cleaned.id, dataset.id);
    assert_eq!(cleaned.row_count, 1);
    assert_eq!(cleaned.created_at, dataset.created_at);

    let moved = assert_ok!(workspace.set_dataset_folder(&dataset.id, Some("".to_string())));
    assert!(moved.folder.is_none());
}

#[test]
fn backup_round_trip_skips_known_files() {
    let (_, source) = empty_workspace();
    assert_ok!(source.add_dataset("sales.xlsx", sales(), Some("2024".to_string())));
    assert_ok!(source.add_dataset("costs.csv", sheet(&[("East", 1.5)]), None));
    let raw = serde_json::to_vec(&source.export_backup()).unwrap();

    let (_, target) = empty_workspace();
    let summary = assert_ok!(target.import_backup(&raw));
    assert_eq!(summary.datasets_imported, 2);
    assert_eq!(summary.datasets_skipped, 0);
    assert_eq!(summary.pages_imported, 1);
    assert_eq!(target.pages(), source.pages());

    let mut source_ids: Vec<String> = source.dataset_summaries().into_iter().map(|d| d.id).collect();
    let mut target_ids: Vec<String> = target.dataset_summaries().into_iter().map(|d| d.id).collect();
    source_ids.sort();
    target_ids.sort();
    assert_eq!(target_ids, source_ids);
    for id in &source_ids {
        assert_eq!(assert_ok!(target.dataset(id)), assert_ok!(source.dataset(id)));
    }

    let again = assert_ok!(target.import_backup(&raw));
    assert_eq!(again.datasets_imported, 0);
    assert_eq!(again.datasets_skipped, 2);
    assert_eq!(target.pages().len(), 1);
    assert_eq!(target.dataset_summaries().len(), 2);
}

#[test]
fn sparse_backup_rows_fail_filters_on_known_columns() {
    let (_, workspace) = empty_workspace();
    let raw = br#"{
        "datasets": [{
            "id": "d1", "fileName": "legacy.xlsx", "createdAt": 1,
            "columns": ["region", "sales"], "analysis": [],
            "data": [{"region": "North", "sales": 5}, {"sales": 7}]
        }],
        "pages": [{"id": "p1", "name": "Legacy", "createdAt": 1,
            "widgets": [{"id": "w1", "datasetId": "d1", "type": "table", "title": "", "width": "full"}]}]
    }"#;
    assert_ok!(workspace.import_backup(raw));

    let dataset = assert_ok!(workspace.dataset("d1"));
    assert_eq!(dataset.rows[1]["region"], CellValue::Missing);

    assert_ok!(workspace.add_filter("p1", "region", CellValue::from("North")));
    let views = assert_ok!(workspace.render_page("p1"));
    match &views[0].body {
        WidgetBody::Table { total, rows, .. } => {
            assert_eq!(*total, 1);
            assert_eq!(rows[0]["sales"], CellValue::Number(5.0));
        }
        other => panic!("expected a table, got {:?}", other),
    }
}

#[test]
fn concurrent_uploads_seed_a_single_overview() {
    let (_, workspace) = empty_workspace();

    std::thread::scope(|scope| {
        for i in 0..8 {
            let workspace = &workspace;
            scope.spawn(move || {
                assert_ok!(workspace.add_dataset(&format!("upload-{}.csv", i), sales(), None));
            });
        }
    });

    assert_eq!(workspace.dataset_summaries().len(), 8);
    let pages = workspace.pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].name, OVERVIEW_PAGE_NAME);
}

#[test]
fn widgets_never_outlive_a_concurrently_deleted_dataset() {
    let (store, workspace) = empty_workspace();
    let doomed = assert_ok!(workspace.add_dataset("doomed.csv", sales(), None));
    let page = assert_ok!(workspace.create_page(Some("Race"), None));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let (workspace, page_id, dataset_id) = (&workspace, &page.id, &doomed.id);
            scope.spawn(move || {
                for _ in 0..25 {
                    let _ = workspace.add_widget(page_id, dataset_id, WidgetType::Bar);
                }
            });
        }
        scope.spawn(|| assert_ok!(workspace.delete_dataset(&doomed.id)));
    });

    assert!(workspace.page(&page.id).unwrap().widgets.is_empty());
    let reloaded = assert_ok!(Workspace::load(store));
    assert!(reloaded.pages().iter().all(|p| p.widgets.is_empty()));
}

#[test]
fn broken_backup_writes_nothing() {
    let (_, workspace) = empty_workspace();
    let raw = br#"{"datasets": [], "pages": [{"id": "p1", "name": "x", "widgets": [], "createdAt": 1}, {"id": 7}]}"#;

    assert!(matches!(workspace.import_backup(raw), Err(AppError::BackupFormat(_))));
    assert!(workspace.pages().is_empty());
}

#[test]
fn imported_page_without_its_dataset_renders_missing_source() {
    let (_, workspace) = empty_workspace();
    let raw = br#"{"pages": [{"id": "p1", "name": "Orphans", "createdAt": 1,
        "widgets": [{"id": "w1", "datasetId": "gone", "type": "bar", "title": "", "width": "half"}]}]}"#;
    assert_ok!(workspace.import_backup(raw));

    let views = assert_ok!(workspace.render_page("p1"));
    assert_eq!(views[0].body, WidgetBody::MissingSource);
    assert_eq!(views[0].title, "Metric Breakdown");
}

#[test]
fn failed_write_keeps_the_change_in_memory() {
    let store = Arc::new(FlakyStore {
        inner: assert_ok!(DbLoader::open_in_memory()),
        failing: AtomicBool::new(false),
    });
    let workspace = assert_ok!(Workspace::load(store.clone()));
    let page = assert_ok!(workspace.create_page(Some("Before"), None));

    store.failing.store(true, Ordering::SeqCst);
    assert!(matches!(
        workspace.rename_page(&page.id, "After"),
        Err(AppError::DatabaseError(_))
    ));
    assert_eq!(workspace.page(&page.id).unwrap().name, "After");

    store.failing.store(false, Ordering::SeqCst);
    assert_ok!(workspace.reload());
    assert_eq!(workspace.page(&page.id).unwrap().name, "Before");
}
