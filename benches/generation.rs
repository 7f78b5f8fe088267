//! Generation pass and item table lookup benchmarks.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tablegraph::annotation::{Rect, Region, Source, SubjectRegion};
use tablegraph::model::CellValue;
use tablegraph::wikify::{ItemRow, ItemTable};
use tablegraph::{Annotation, EngineConfig, Grid, StatementGenerator, ValueType, Window};

/// `rows` subjects in column A and `columns` yearly values beside them.
fn build_grid(rows: usize, columns: usize) -> Grid {
    let grid_rows = (0..rows)
        .map(|row| {
            let mut cells = vec![Some(CellValue::Text(format!("country {row}")))];
            cells.extend((0..columns).map(|col| Some(CellValue::Number((row * col) as f64))));
            cells
        })
        .collect();
    Grid::from_rows(grid_rows)
}

fn build_annotation(rows: usize, columns: usize) -> Annotation {
    let data = Region::new(Rect::parse(&format!("B1:{}", end_cell(columns, rows))).expect("data"))
        .with_property(Source::Fixed("P1082".into()))
        .with_type(ValueType::Quantity);
    let mut annotation = Annotation::new(data);
    annotation.subject = Some(SubjectRegion {
        rect: Rect::parse(&format!("A1:A{rows}")).expect("subject"),
        context: None,
    });
    annotation
}

fn end_cell(columns: usize, rows: usize) -> String {
    tablegraph::utils::to_excel(columns as u32, rows as u32 - 1)
}

fn build_table(rows: usize) -> ItemTable {
    let mut table = ItemTable::new();
    table
        .merge_from(
            (0..rows)
                .map(|row| ItemRow::by_value(format!("country {row}"), format!("Q{}", row + 1))),
            "main subject",
        )
        .expect("merge");
    table
}

fn bench_generation(c: &mut Criterion) {
    let generator = StatementGenerator::new(&EngineConfig::default());
    let mut group = c.benchmark_group("generation");
    for rows in [100usize, 1_000] {
        let columns = 10;
        let grid = build_grid(rows, columns);
        let annotation = build_annotation(rows, columns);
        let table = build_table(rows);
        group.bench_with_input(BenchmarkId::new("full_pass", rows * columns), &rows, |b, _| {
            b.iter(|| {
                generator
                    .generate(black_box(&annotation), &grid, &table, Window::ALL)
                    .expect("generate")
            })
        });
        group.bench_with_input(BenchmarkId::new("first_page", rows * columns), &rows, |b, _| {
            b.iter(|| {
                generator
                    .generate(black_box(&annotation), &grid, &table, Window::new(0, 50))
                    .expect("generate")
            })
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let table = build_table(10_000);
    c.bench_function("item_table_resolve", |b| {
        b.iter(|| table.resolve(0, black_box(4_321), black_box("country 4321"), "main subject"))
    });
}

criterion_group!(benches, bench_generation, bench_lookup);
criterion_main!(benches);
