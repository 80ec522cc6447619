//! `SQLite` schema definitions for the grid store.
//!
//! A database holds any number of sheets; every written cell is one row of
//! the `cells` table keyed by sheet, row and column.

/// SQL statement to create the sheets table.
pub const CREATE_SHEETS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sheets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the cells table.
pub const CREATE_CELLS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS cells (
    sheet_id INTEGER NOT NULL REFERENCES sheets(id) ON DELETE CASCADE,
    row INTEGER NOT NULL,
    col INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (sheet_id, row, col)
)
";

/// SQL statement to create an index on column for extent queries.
pub const CREATE_CELLS_COL_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_cells_col ON cells(sheet_id, col)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Version 2: per-sheet header presentation.
pub const ADD_SHEET_FORMAT_COLUMNS: &str = r"
ALTER TABLE sheets ADD COLUMN frozen_rows INTEGER NOT NULL DEFAULT 0;
ALTER TABLE sheets ADD COLUMN header_style TEXT;
";

/// All base schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_SHEETS_TABLE,
    CREATE_CELLS_TABLE,
    CREATE_CELLS_COL_INDEX,
    CREATE_METADATA_TABLE,
];
