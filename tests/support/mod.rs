#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tablegraph::EngineConfig;
use tablegraph::annotation::{Annotation, Rect, Region, Source, SubjectRegion};
use tablegraph::wikify::{ItemRow, ItemTable};
use tempfile::{TempDir, tempdir};
use umya_spreadsheet::{self, Spreadsheet};

pub fn write_workbook_to_path<F>(path: &Path, f: F)
where
    F: FnOnce(&mut Spreadsheet),
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create dir");
    }
    let mut book = umya_spreadsheet::new_file();
    f(&mut book);
    umya_spreadsheet::writer::xlsx::write(&book, path).expect("write workbook");
}

pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Writes `rows` as CSV; cells are quoted as needed.
    pub fn write_csv(&self, name: &str, rows: &[&[&str]]) -> PathBuf {
        let path = self.path(name);
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&path)
            .expect("open csv");
        for row in rows {
            writer.write_record(*row).expect("write row");
        }
        writer.flush().expect("flush csv");
        path
    }

    pub fn create_workbook<F>(&self, name: &str, f: F) -> PathBuf
    where
        F: FnOnce(&mut Spreadsheet),
    {
        let path = self.path(name);
        write_workbook_to_path(&path, f);
        path
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            cache_enabled: true,
            cache_directory: self.cache_dir(),
            endpoint: None,
            cache_capacity: 8,
            warn_for_empty_cells: false,
        }
    }

    pub fn config_without_cache(&self) -> EngineConfig {
        EngineConfig {
            cache_enabled: false,
            ..self.config()
        }
    }

    /// Files directly under `dir`, sorted by name.
    pub fn list(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Moves the mtime of `path` an hour into the past, so it differs from
/// whatever a cache recorded while the previous artifact stays older.
pub fn touch_into_past(path: &Path) {
    let file = File::options().write(true).open(path).expect("open for touch");
    let earlier = SystemTime::now() - Duration::from_secs(3600);
    file.set_modified(earlier).expect("set mtime");
}

/// Sets the mtime of `path` to the current time, after any artifact built
/// from its previous contents.
pub fn touch_now(path: &Path) {
    let file = File::options().write(true).open(path).expect("open for touch");
    file.set_modified(SystemTime::now()).expect("set mtime");
}

/// Subjects in column A, values in column B, rows 1..=`rows`, fixed property.
pub fn column_annotation(rows: u32, property: &str) -> Annotation {
    let data = Region::new(Rect::parse(&format!("B1:B{rows}")).expect("data range"))
        .with_property(Source::Fixed(property.to_string()));
    let mut annotation = Annotation::new(data);
    annotation.subject = Some(SubjectRegion {
        rect: Rect::parse(&format!("A1:A{rows}")).expect("subject range"),
        context: None,
    });
    annotation
}

pub fn subject_table(pairs: &[(&str, &str)]) -> ItemTable {
    let mut table = ItemTable::new();
    table
        .merge_from(
            pairs
                .iter()
                .map(|(value, item)| ItemRow::by_value(*value, *item)),
            "main subject",
        )
        .expect("merge subjects");
    table
}

/// Table whose `contexts` exist but map only a far-away cell, so cells that
/// already hold identifiers pass through unchanged.
pub fn id_only_table(contexts: &[&str]) -> ItemTable {
    let mut table = ItemTable::new();
    for context in contexts {
        table
            .merge_from(vec![ItemRow::at_cell(999, 999, "Q0")], context)
            .expect("merge placeholder");
    }
    table
}
