use std::collections::HashSet;

use crate::table::{Cell, Grid};

// Trailing summary rows banks append under the data; excluded from the
// duplicate-column equality check so a merged footer cannot veto a dedup.
const FOOTER_PHRASES: &[&str] = &[
    "total",
    "grand total",
    "tổng",
    "tổng cộng",
    "tổng phát sinh",
    "cộng phát sinh",
    "số dư cuối kỳ",
    "số dư đầu kỳ",
    "closing balance",
    "opening balance",
];

/// Normalize a spreadsheet grid for header detection and row extraction:
/// unmerge ranges at/after the header row, forward-fill sparse columns, drop
/// empty rows, deduplicate columns produced by horizontally merged headers,
/// and drop exact-duplicate rows.
///
/// `header_row_index` comes from a first detection pass over the raw grid;
/// merge ranges above it belong to title/metadata blocks and are left alone.
/// Returns the cleaned rows and the header index shifted past dropped rows.
pub fn resolve(grid: &Grid, header_row_index: usize) -> (Vec<Vec<Cell>>, usize) {
    let width = grid.rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut rows: Vec<Vec<Cell>> = grid
        .rows
        .iter()
        .map(|r| {
            let mut r = r.clone();
            r.resize(width, Cell::Empty);
            r
        })
        .collect();
    if rows.is_empty() || width == 0 {
        return (rows, header_row_index);
    }

    unmerge(&mut rows, grid, header_row_index);
    forward_fill(&mut rows, header_row_index);
    let (mut rows, header) = drop_empty_rows(rows, header_row_index);
    dedup_columns(&mut rows, header);
    let rows = dedup_rows(rows, header);
    (rows, header)
}

/// Step 1: copy each merge range's top-left value into every covered cell.
fn unmerge(rows: &mut [Vec<Cell>], grid: &Grid, header_row_index: usize) {
    let height = rows.len();
    let width = rows.first().map(Vec::len).unwrap_or(0);
    for m in &grid.merges {
        if m.start_row < header_row_index || m.start_row >= height || m.start_col >= width {
            continue;
        }
        let value = rows[m.start_row][m.start_col].clone();
        for r in m.start_row..=m.end_row.min(height - 1) {
            for c in m.start_col..=m.end_col.min(width - 1) {
                rows[r][c] = value.clone();
            }
        }
    }
}

/// Step 2: a column whose data rows are more than 20% blank was probably a
/// vertical merge Excel collapsed to one physical cell; carry the nearest
/// previous value down into the gaps.
fn forward_fill(rows: &mut [Vec<Cell>], header_row_index: usize) {
    let data_start = header_row_index + 1;
    if data_start >= rows.len() {
        return;
    }
    let width = rows.first().map(Vec::len).unwrap_or(0);
    let total = rows.len() - data_start;

    for c in 0..width {
        let blank = rows[data_start..].iter().filter(|r| r[c].is_blank()).count();
        if (blank as f64) / (total as f64) <= 0.2 {
            continue;
        }
        let mut last: Option<Cell> = None;
        for row in rows[data_start..].iter_mut() {
            if row[c].is_blank() {
                if let Some(v) = &last {
                    row[c] = v.clone();
                }
            } else {
                last = Some(row[c].clone());
            }
        }
    }
}

/// Step 3: drop fully blank rows, shifting the header index accordingly.
fn drop_empty_rows(rows: Vec<Vec<Cell>>, header_row_index: usize) -> (Vec<Vec<Cell>>, usize) {
    let mut header = header_row_index;
    let mut kept = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        if row.iter().all(Cell::is_blank) {
            if i < header_row_index && header > 0 {
                header -= 1;
            }
            continue;
        }
        kept.push(row);
    }
    let header = header.min(kept.len().saturating_sub(1));
    (kept, header)
}

/// Step 4: a horizontally merged header cell unmerges into identically-named
/// columns. Drop the later column only when every non-footer data row holds
/// byte-identical values in both; otherwise both survive (suffixed later).
fn dedup_columns(rows: &mut Vec<Vec<Cell>>, header: usize) {
    let Some(header_row) = rows.get(header) else {
        return;
    };
    let names: Vec<String> = header_row.iter().map(Cell::display).collect();

    let mut drop: Vec<usize> = Vec::new();
    for i in 0..names.len() {
        if names[i].is_empty() || drop.contains(&i) {
            continue;
        }
        for j in (i + 1)..names.len() {
            if drop.contains(&j) || names[j] != names[i] {
                continue;
            }
            let identical = rows
                .iter()
                .enumerate()
                .filter(|(r, row)| *r > header && !is_footer_row(row))
                .all(|(_, row)| row[i] == row[j]);
            if identical {
                drop.push(j);
            }
        }
    }

    if drop.is_empty() {
        return;
    }
    for row in rows.iter_mut() {
        let mut idx = 0;
        row.retain(|_| {
            let keep = !drop.contains(&idx);
            idx += 1;
            keep
        });
    }
}

/// Step 5: drop later rows identical to an earlier data row.
fn dedup_rows(rows: Vec<Vec<Cell>>, header: usize) -> Vec<Vec<Cell>> {
    let names: Vec<String> = rows
        .get(header)
        .map(|r| r.iter().map(Cell::display).collect())
        .unwrap_or_default();

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        if i > header {
            let mut pairs: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(c, cell)| {
                    let name = names.get(c).map(String::as_str).unwrap_or("");
                    format!("{name}={}", cell.display())
                })
                .collect();
            pairs.sort();
            if !seen.insert(pairs.join("\u{1f}")) {
                continue;
            }
        }
        out.push(row);
    }
    out
}

fn is_footer_row(row: &[Cell]) -> bool {
    row.iter().any(|cell| {
        let text = cell.display().to_lowercase();
        !text.is_empty() && FOOTER_PHRASES.iter().any(|p| text.starts_with(p))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MergeRange;

    fn t(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    fn grid(rows: Vec<Vec<Cell>>, merges: Vec<MergeRange>) -> Grid {
        Grid { rows, merges }
    }

    #[test]
    fn test_unmerge_at_or_after_header() {
        // Vertically merged 2-row-tall Date cell in the data block.
        let g = grid(
            vec![
                vec![t("Date"), t("Amount")],
                vec![t("01/02/2024"), t("100")],
                vec![Cell::Empty, t("200")],
            ],
            vec![MergeRange {
                start_row: 1,
                start_col: 0,
                end_row: 2,
                end_col: 0,
            }],
        );
        let (rows, header) = resolve(&g, 0);
        assert_eq!(header, 0);
        assert_eq!(rows[1][0], t("01/02/2024"));
        assert_eq!(rows[2][0], t("01/02/2024"));
    }

    #[test]
    fn test_merge_in_preheader_block_ignored() {
        // Title merged across two rows above the header stays put.
        let g = grid(
            vec![
                vec![t("SAO KÊ TÀI KHOẢN"), Cell::Empty],
                vec![t("Date"), t("Amount")],
                vec![t("01/02/2024"), t("100")],
            ],
            vec![MergeRange {
                start_row: 0,
                start_col: 0,
                end_row: 0,
                end_col: 1,
            }],
        );
        let (rows, header) = resolve(&g, 1);
        assert_eq!(header, 1);
        assert_eq!(rows[0][1], Cell::Empty);
    }

    #[test]
    fn test_forward_fill_sparse_column() {
        let g = grid(
            vec![
                vec![t("Date"), t("Amount")],
                vec![t("01/02/2024"), t("100")],
                vec![Cell::Empty, t("200")],
                vec![Cell::Empty, t("300")],
            ],
            vec![],
        );
        let (rows, _) = resolve(&g, 0);
        assert_eq!(rows[2][0], t("01/02/2024"));
        assert_eq!(rows[3][0], t("01/02/2024"));
    }

    #[test]
    fn test_no_fill_for_dense_column() {
        // One blank out of six data rows: below the 20% threshold.
        let mut data = vec![vec![t("Date"), t("Amount")]];
        for i in 0..5 {
            data.push(vec![t("01/02/2024"), Cell::Text(format!("{i}"))]);
        }
        data.push(vec![Cell::Empty, t("600")]);
        let (rows, _) = resolve(&grid(data, vec![]), 0);
        assert_eq!(rows[6][0], Cell::Empty);
    }

    #[test]
    fn test_drop_empty_rows_shifts_header() {
        let g = grid(
            vec![
                vec![t("Title"), Cell::Empty],
                vec![Cell::Empty, Cell::Empty],
                vec![t("Date"), t("Amount")],
                vec![t("01/02/2024"), t("100")],
            ],
            vec![],
        );
        let (rows, header) = resolve(&g, 2);
        assert_eq!(rows.len(), 3);
        assert_eq!(header, 1);
        assert_eq!(rows[header][0], t("Date"));
    }

    #[test]
    fn test_dedup_identical_columns() {
        let g = grid(
            vec![
                vec![t("Date"), t("Date"), t("Amount")],
                vec![t("01/02/2024"), t("01/02/2024"), t("100")],
                vec![t("Tổng cộng"), t("x"), t("100")],
            ],
            vec![],
        );
        let (rows, header) = resolve(&g, 0);
        // Footer row disagreement is ignored; the duplicate column goes away.
        assert_eq!(rows[header].len(), 2);
        assert_eq!(rows[header][0], t("Date"));
        assert_eq!(rows[header][1], t("Amount"));
    }

    #[test]
    fn test_keep_differing_duplicate_columns() {
        let g = grid(
            vec![
                vec![t("Amount"), t("Amount")],
                vec![t("100"), t("200")],
            ],
            vec![],
        );
        let (rows, header) = resolve(&g, 0);
        assert_eq!(rows[header].len(), 2);
    }

    #[test]
    fn test_dedup_duplicate_rows() {
        let g = grid(
            vec![
                vec![t("Date"), t("Amount")],
                vec![t("01/02/2024"), t("100")],
                vec![t("01/02/2024"), t("100")],
                vec![t("01/02/2024"), t("200")],
            ],
            vec![],
        );
        let (rows, _) = resolve(&g, 0);
        assert_eq!(rows.len(), 3);
    }
}
