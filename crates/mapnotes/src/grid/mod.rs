//! Cell grid storage for mapnotes.
//!
//! A [`Grid`] is a single spreadsheet-like sheet addressed by 1-based
//! row/column coordinates. The record store only ever talks to this trait, so
//! it runs the same against [`MemoryGrid`] in tests and [`SqliteGrid`] on disk.

pub mod migrations;
pub mod schema;
mod sqlite;

pub use sqlite::SqliteGrid;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A cell as read from the grid; `None` when nothing was ever written there.
pub type Cell = Option<String>;

/// Visual styling applied to a header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderStyle {
    /// Render header text in bold.
    pub bold: bool,
    /// Header background color, as `#rrggbb`.
    pub background: String,
    /// Header text color, as `#rrggbb`.
    pub foreground: String,
    /// Number of rows frozen at the top of the sheet.
    pub frozen_rows: usize,
}

impl Default for HeaderStyle {
    fn default() -> Self {
        Self {
            bold: true,
            background: "#1a73e8".to_string(),
            foreground: "#ffffff".to_string(),
            frozen_rows: 1,
        }
    }
}

/// Storage primitives of a single sheet.
///
/// Rows and columns are 1-based. Implementations do not interpret cell
/// contents; header handling lives in the record store.
pub trait Grid {
    /// Index of the last row holding any cell, or 0 for an empty sheet.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn last_row(&self) -> Result<usize>;

    /// Index of the last column holding any cell, or 0 for an empty sheet.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn last_column(&self) -> Result<usize>;

    /// Read a `rows` x `columns` rectangle starting at (`row`, `column`).
    ///
    /// The result always has exactly the requested shape.
    ///
    /// # Errors
    ///
    /// Returns an error for zero coordinates or if the store cannot be read.
    fn get_range(
        &self,
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    ) -> Result<Vec<Vec<Cell>>>;

    /// Write a rectangle of values starting at (`row`, `column`).
    ///
    /// # Errors
    ///
    /// Returns an error for zero coordinates, ragged input, or a store failure.
    fn set_range(&mut self, row: usize, column: usize, values: &[Vec<String>]) -> Result<()>;

    /// Write `values` into the row after [`Grid::last_row`], from column 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn append_row(&mut self, values: &[String]) -> Result<()>;

    /// Delete `row`, moving every row below it up by one.
    ///
    /// # Errors
    ///
    /// Returns an error for a row outside the sheet or a store failure.
    fn delete_row(&mut self, row: usize) -> Result<()>;

    /// Apply header styling to the first `columns` cells of row 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn style_header(&mut self, columns: usize, style: &HeaderStyle) -> Result<()>;
}

/// Reject zero coordinates before they reach a backend.
pub(crate) fn check_origin(row: usize, column: usize) -> Result<()> {
    if row == 0 || column == 0 {
        return Err(Error::grid(format!(
            "coordinates are 1-based, got row {row} column {column}"
        )));
    }
    Ok(())
}

/// Reject rectangles whose rows differ in width.
pub(crate) fn check_rectangular(values: &[Vec<String>]) -> Result<()> {
    if let Some(first) = values.first() {
        if values.iter().any(|row| row.len() != first.len()) {
            return Err(Error::grid("range rows must all have the same width"));
        }
    }
    Ok(())
}

/// In-memory grid used by tests and by callers that need a scratch sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryGrid {
    rows: Vec<Vec<Cell>>,
    header_style: Option<(usize, HeaderStyle)>,
}

impl MemoryGrid {
    /// Create an empty grid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a grid pre-filled with rows of text, starting at row 1.
    ///
    /// Rows may have different lengths; missing trailing cells stay empty.
    #[must_use]
    pub fn from_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|cell| Some(cell.into())).collect())
                .collect(),
            header_style: None,
        }
    }

    /// The header style last applied, with the number of styled columns.
    #[must_use]
    pub fn header_style(&self) -> Option<&(usize, HeaderStyle)> {
        self.header_style.as_ref()
    }

    /// Read a single cell as text, `None` if absent.
    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row.checked_sub(1)?)?
            .get(column.checked_sub(1)?)?
            .as_deref()
    }

    fn put(&mut self, row: usize, column: usize, value: String) {
        if self.rows.len() < row {
            self.rows.resize(row, Vec::new());
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < column {
            cells.resize(column, None);
        }
        cells[column - 1] = Some(value);
    }
}

impl Grid for MemoryGrid {
    fn last_row(&self) -> Result<usize> {
        Ok(self
            .rows
            .iter()
            .rposition(|row| row.iter().any(Option::is_some))
            .map_or(0, |index| index + 1))
    }

    fn last_column(&self) -> Result<usize> {
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.iter().rposition(Option::is_some))
            .max()
            .map_or(0, |index| index + 1))
    }

    fn get_range(
        &self,
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    ) -> Result<Vec<Vec<Cell>>> {
        check_origin(row, column)?;
        Ok((row..row + rows)
            .map(|r| {
                (column..column + columns)
                    .map(|c| self.cell(r, c).map(str::to_string))
                    .collect()
            })
            .collect())
    }

    fn set_range(&mut self, row: usize, column: usize, values: &[Vec<String>]) -> Result<()> {
        check_origin(row, column)?;
        check_rectangular(values)?;
        for (dr, cells) in values.iter().enumerate() {
            for (dc, value) in cells.iter().enumerate() {
                self.put(row + dr, column + dc, value.clone());
            }
        }
        Ok(())
    }

    fn append_row(&mut self, values: &[String]) -> Result<()> {
        let row = self.last_row()? + 1;
        self.set_range(row, 1, &[values.to_vec()])
    }

    fn delete_row(&mut self, row: usize) -> Result<()> {
        let last = self.last_row()?;
        if row == 0 || row > last {
            return Err(Error::grid(format!(
                "cannot delete row {row}: sheet has {last} rows"
            )));
        }
        self.rows.remove(row - 1);
        Ok(())
    }

    fn style_header(&mut self, columns: usize, style: &HeaderStyle) -> Result<()> {
        self.header_style = Some((columns, style.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_empty_grid_extent() {
        let grid = MemoryGrid::new();
        assert_eq!(grid.last_row().unwrap(), 0);
        assert_eq!(grid.last_column().unwrap(), 0);
    }

    #[test]
    fn test_append_row_grows_extent() {
        let mut grid = MemoryGrid::new();
        grid.append_row(&row(&["a", "b", "c"])).unwrap();
        grid.append_row(&row(&["d"])).unwrap();

        assert_eq!(grid.last_row().unwrap(), 2);
        assert_eq!(grid.last_column().unwrap(), 3);
        assert_eq!(grid.cell(2, 1), Some("d"));
        assert_eq!(grid.cell(2, 2), None);
    }

    #[test]
    fn test_get_range_pads_missing_cells() {
        let grid = MemoryGrid::from_rows([vec!["a", "b"], vec!["c"]]);
        let range = grid.get_range(1, 1, 3, 3).unwrap();

        assert_eq!(range.len(), 3);
        assert!(range.iter().all(|r| r.len() == 3));
        assert_eq!(range[0][1].as_deref(), Some("b"));
        assert_eq!(range[1][1], None);
        assert_eq!(range[2][0], None);
    }

    #[test]
    fn test_get_range_rejects_zero_origin() {
        let grid = MemoryGrid::new();
        assert!(grid.get_range(0, 1, 1, 1).is_err());
        assert!(grid.get_range(1, 0, 1, 1).is_err());
    }

    #[test]
    fn test_set_range_overwrites() {
        let mut grid = MemoryGrid::from_rows([vec!["a", "b"], vec!["c", "d"]]);
        grid.set_range(2, 1, &[row(&["x", "y"])]).unwrap();
        assert_eq!(grid.cell(2, 1), Some("x"));
        assert_eq!(grid.cell(2, 2), Some("y"));
        assert_eq!(grid.cell(1, 1), Some("a"));
    }

    #[test]
    fn test_set_range_rejects_ragged_rows() {
        let mut grid = MemoryGrid::new();
        let result = grid.set_range(1, 1, &[row(&["a", "b"]), row(&["c"])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_row_shifts_up() {
        let mut grid = MemoryGrid::from_rows([vec!["h"], vec!["1"], vec!["2"], vec!["3"]]);
        grid.delete_row(2).unwrap();

        assert_eq!(grid.last_row().unwrap(), 3);
        assert_eq!(grid.cell(2, 1), Some("2"));
        assert_eq!(grid.cell(3, 1), Some("3"));
    }

    #[test]
    fn test_delete_row_out_of_range() {
        let mut grid = MemoryGrid::from_rows([vec!["h"]]);
        assert!(grid.delete_row(0).is_err());
        assert!(grid.delete_row(2).is_err());
    }

    #[test]
    fn test_style_header_is_recorded() {
        let mut grid = MemoryGrid::new();
        grid.style_header(11, &HeaderStyle::default()).unwrap();

        let (columns, style) = grid.header_style().unwrap();
        assert_eq!(*columns, 11);
        assert!(style.bold);
        assert_eq!(style.background, "#1a73e8");
        assert_eq!(style.foreground, "#ffffff");
        assert_eq!(style.frozen_rows, 1);
    }
}
