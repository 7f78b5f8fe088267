use crate::error::Severity;
use crate::model::{CellCoord, ErrorMap, Highlights, StatementMap};
use indexmap::IndexSet;

/// Overlay lists derived from one generation result.
///
/// Cells whose errors include a fatal one are error cells; cells with only
/// warnings are danger cells.
pub fn highlights(statements: &StatementMap, errors: &ErrorMap) -> Highlights {
    let mut data_region = IndexSet::new();
    let mut items = IndexSet::new();
    let mut qualifier_region = IndexSet::new();
    let mut reference_region = IndexSet::new();

    for (cell, statement) in statements {
        data_region.insert(*cell);
        if let Some(subject_cell) = statement.subject_cell {
            items.insert(subject_cell);
        }
        qualifier_region.extend(statement.qualifiers.iter().filter_map(|q| q.cell));
        reference_region.extend(statement.references.iter().filter_map(|r| r.cell));
    }

    let mut error_cells = IndexSet::new();
    let mut danger_cells = IndexSet::new();
    for (cell, cell_errors) in errors {
        if cell_errors.iter().any(|e| e.severity() == Severity::Error) {
            error_cells.insert(*cell);
        } else if !cell_errors.is_empty() {
            danger_cells.insert(*cell);
        }
    }

    Highlights {
        data_region: sorted(data_region),
        items: sorted(items),
        qualifier_region: sorted(qualifier_region),
        reference_region: sorted(reference_region),
        error_cells: sorted(error_cells),
        danger_cells: sorted(danger_cells),
    }
}

fn sorted(cells: IndexSet<CellCoord>) -> Vec<CellCoord> {
    let mut cells: Vec<CellCoord> = cells.into_iter().collect();
    cells.sort_by(CellCoord::row_major);
    cells
}
