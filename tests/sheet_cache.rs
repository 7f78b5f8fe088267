mod support;

use std::fs;

use assert_matches::assert_matches;
use support::{TestWorkspace, touch_into_past, touch_now};
use tablegraph::cache::{CacheOutcome, SheetCache};
use tablegraph::model::CellValue;
use tablegraph::{EngineConfig, EngineError};

#[test]
fn second_read_is_served_from_the_artifact() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("population.csv", &[&["Chad", "17"], &["Niger", "25"]]);
    let cache = SheetCache::new(&workspace.config());

    let (first, outcome) = cache
        .get_grid_with_outcome(&file, "population.csv")
        .expect("first read");
    assert_eq!(outcome, CacheOutcome::Miss);

    let (second, outcome) = cache
        .get_grid_with_outcome(&file, "population.csv")
        .expect("second read");
    assert_eq!(outcome, CacheOutcome::Hit);
    assert_eq!(first, second);
    assert_eq!(second.get(1, 1), Ok(Some(&CellValue::Number(25.0))));

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[test]
fn touching_the_source_forces_a_rebuild() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("gdp.csv", &[&["Chad", "1.5"]]);
    let cache = SheetCache::new(&workspace.config());

    cache.get_grid(&file, "gdp.csv").expect("initial read");
    let before = cache.artifact(&file, "gdp.csv").expect("artifact written");

    touch_into_past(&file);

    let (_, outcome) = cache
        .get_grid_with_outcome(&file, "gdp.csv")
        .expect("read after touch");
    assert_eq!(outcome, CacheOutcome::Miss);
    let after = cache.artifact(&file, "gdp.csv").expect("artifact rewritten");
    assert!(after.built_at > before.built_at);
    assert_ne!(after.source_modified, before.source_modified);

    let (_, outcome) = cache
        .get_grid_with_outcome(&file, "gdp.csv")
        .expect("read after rebuild");
    assert_eq!(outcome, CacheOutcome::Hit);
}

#[test]
fn touching_forward_also_forces_a_rebuild() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("gdp.csv", &[&["Chad", "1.5"]]);
    let cache = SheetCache::new(&workspace.config());

    cache.get_grid(&file, "gdp.csv").expect("initial read");
    let before = cache.artifact(&file, "gdp.csv").expect("artifact written");

    touch_now(&file);

    let (_, outcome) = cache
        .get_grid_with_outcome(&file, "gdp.csv")
        .expect("read after touch");
    assert_eq!(outcome, CacheOutcome::Miss);
    let after = cache.artifact(&file, "gdp.csv").expect("artifact rewritten");
    assert!(after.built_at > before.built_at);
    assert!(after.source_modified > before.source_modified);

    let (_, outcome) = cache
        .get_grid_with_outcome(&file, "gdp.csv")
        .expect("read after rebuild");
    assert_eq!(outcome, CacheOutcome::Hit);
}

#[test]
fn codes_with_leading_zeros_keep_their_text() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write_csv("codes.csv", &[&["02139", "1.50", "42"]]);
    let book = workspace.create_workbook("codes.xlsx", |book| {
        let sheet = book.get_sheet_mut(&0).expect("default sheet");
        sheet.set_name("Codes");
        sheet.get_cell_mut("A1").set_value_string("007");
        sheet.get_cell_mut("B1").set_value("42");
    });
    let cache = SheetCache::new(&workspace.config());

    let grid = cache.get_grid(&csv, "codes.csv").expect("csv");
    assert_eq!(grid.get(0, 0), Ok(Some(&CellValue::Text("02139".into()))));
    assert_eq!(grid.get(0, 1), Ok(Some(&CellValue::Text("1.50".into()))));
    assert_eq!(grid.get(0, 2), Ok(Some(&CellValue::Number(42.0))));

    let grid = cache.get_grid(&book, "Codes").expect("xlsx");
    assert_eq!(grid.get(0, 0), Ok(Some(&CellValue::Text("007".into()))));
    assert_eq!(grid.get(0, 1), Ok(Some(&CellValue::Number(42.0))));
}

#[test]
fn every_sheet_of_a_workbook_is_materialized() {
    let workspace = TestWorkspace::new();
    let file = workspace.create_workbook("book.xlsx", |book| {
        let first = book.get_sheet_mut(&0).expect("default sheet");
        first.set_name("Data");
        first.get_cell_mut("A1").set_value("Chad");
        first.get_cell_mut("B1").set_value("17");
        let notes = book.new_sheet("Notes").expect("add sheet");
        notes.get_cell_mut("A1").set_value("source: survey");
    });
    let cache = SheetCache::new(&workspace.config());

    let grid = cache.get_grid(&file, "Data").expect("data sheet");
    assert_eq!(grid.get(0, 1), Ok(Some(&CellValue::Number(17.0))));
    assert!(cache.artifact(&file, "Notes").is_some());

    let (_, outcome) = cache.get_grid_with_outcome(&file, "Notes").expect("notes");
    assert_eq!(outcome, CacheOutcome::Hit);
}

#[test]
fn unknown_sheet_and_missing_file_are_errors() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("one.csv", &[&["x"]]);
    let cache = SheetCache::new(&workspace.config());

    assert_matches!(
        cache.get_grid(&file, "Sheet9"),
        Err(EngineError::SheetNotFound { sheet, .. }) if sheet == "Sheet9"
    );
    assert_matches!(
        cache.get_grid(&workspace.path("absent.csv"), "absent.csv"),
        Err(EngineError::SourceUnavailable { .. })
    );
}

#[test]
fn write_failure_still_returns_the_grid() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("data.csv", &[&["a", "1"]]);
    let blocker = workspace.path("blocker");
    fs::write(&blocker, b"not a directory").expect("write blocker");
    let config = EngineConfig {
        cache_directory: blocker.join("cache"),
        ..workspace.config()
    };
    let cache = SheetCache::new(&config);

    let grid = cache.get_grid(&file, "data.csv").expect("grid despite failure");
    assert_eq!(grid.row_count(), 1);
    assert_eq!(cache.stats().write_failures, 1);

    let (_, outcome) = cache.get_grid_with_outcome(&file, "data.csv").expect("again");
    assert_eq!(outcome, CacheOutcome::Miss);
}

#[test]
fn disabled_cache_bypasses_disk() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("data.csv", &[&["a", "1"]]);
    let cache = SheetCache::new(&workspace.config_without_cache());

    for _ in 0..2 {
        let (_, outcome) = cache.get_grid_with_outcome(&file, "data.csv").expect("read");
        assert_eq!(outcome, CacheOutcome::Bypass);
    }
    assert!(!workspace.cache_dir().exists());
}

#[test]
fn atomic_writes_leave_only_artifacts() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("data.csv", &[&["a", "1"], &["b", "2"]]);
    let config = workspace.config();
    let cache = SheetCache::new(&config);
    cache.get_grid(&file, "data.csv").expect("read");
    cache.warm(&file).expect("warm");

    let names = workspace.list(&config.sheets_directory());
    assert_eq!(names.len(), 1, "unexpected files: {names:?}");
    assert!(names[0].ends_with("__data.csv.json"));
}

#[test]
fn corrupt_artifact_reads_as_a_miss() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("data.csv", &[&["a", "1"]]);
    let cache = SheetCache::new(&workspace.config());
    cache.get_grid(&file, "data.csv").expect("read");

    fs::write(cache.artifact_path(&file, "data.csv"), b"{ truncated").expect("corrupt");

    let (grid, outcome) = cache.get_grid_with_outcome(&file, "data.csv").expect("read");
    assert_eq!(outcome, CacheOutcome::Miss);
    assert_eq!(grid.column_count(), 2);
}

#[test]
fn purge_removes_only_that_files_artifacts() {
    let workspace = TestWorkspace::new();
    let first = workspace.write_csv("first.csv", &[&["a"]]);
    let second = workspace.write_csv("second.csv", &[&["b"]]);
    let cache = SheetCache::new(&workspace.config());
    cache.warm(&first).expect("warm first");
    cache.warm(&second).expect("warm second");

    assert_eq!(cache.purge(&first).expect("purge"), 1);
    assert!(cache.artifact(&first, "first.csv").is_none());
    assert!(cache.artifact(&second, "second.csv").is_some());
}

#[test]
fn same_stem_in_different_folders_does_not_collide() {
    let workspace = TestWorkspace::new();
    fs::create_dir_all(workspace.path("a")).expect("dir a");
    fs::create_dir_all(workspace.path("b")).expect("dir b");
    let left = workspace.write_csv("a/data.csv", &[&["left"]]);
    let right = workspace.write_csv("b/data.csv", &[&["right"]]);
    let cache = SheetCache::new(&workspace.config());

    assert_ne!(
        cache.artifact_path(&left, "data.csv"),
        cache.artifact_path(&right, "data.csv")
    );
    let left_grid = cache.get_grid(&left, "data.csv").expect("left");
    let right_grid = cache.get_grid(&right, "data.csv").expect("right");
    assert_ne!(left_grid, right_grid);
}
