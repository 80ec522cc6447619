//! `SQLite`-backed grid.
//!
//! Each database holds named sheets; a [`SqliteGrid`] is bound to one of them
//! for its lifetime.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{check_origin, check_rectangular, migrations, Cell, Grid, HeaderStyle};
use crate::error::{Error, Result};

/// Sheet created when a database has none and no name was configured.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// Persisted form of a header style.
#[derive(Debug, Serialize, Deserialize)]
struct StoredHeaderStyle {
    columns: usize,
    #[serde(flatten)]
    style: HeaderStyle,
}

/// A single sheet stored in an `SQLite` database.
#[derive(Debug)]
pub struct SqliteGrid {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
    /// Row id of the bound sheet.
    sheet_id: i64,
    /// Name of the bound sheet.
    sheet_name: String,
}

impl SqliteGrid {
    /// Open the database at `path` and bind to an existing sheet.
    ///
    /// With no sheet name the first sheet is used, and `Sheet1` is created if
    /// the database is empty. A named sheet must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SheetNotFound`] for a missing named sheet, or an error
    /// if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>, sheet: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Self::connect(&path)?;
        Self::bind(path, conn, sheet, false)
    }

    /// Open the database at `path`, creating the named sheet if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or written.
    pub fn open_or_create(path: impl AsRef<Path>, sheet: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Self::connect(&path)?;
        Self::bind(path, conn, sheet, true)
    }

    /// Create an in-memory grid for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory(sheet: Option<&str>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Self::bind(PathBuf::from(":memory:"), conn, sheet, true)
    }

    fn connect(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(path).map_err(|source| Error::DatabaseOpen {
            path: path.to_path_buf(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(conn)
    }

    fn bind(path: PathBuf, conn: Connection, sheet: Option<&str>, create: bool) -> Result<Self> {
        let existing: Option<(i64, String)> = match sheet {
            Some(name) => conn
                .query_row(
                    "SELECT id, name FROM sheets WHERE name = ?1",
                    [name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT id, name FROM sheets ORDER BY position, id LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?,
        };

        let (sheet_id, sheet_name) = match (existing, sheet) {
            (Some(found), _) => found,
            (None, Some(name)) if !create => {
                return Err(Error::SheetNotFound {
                    name: name.to_string(),
                })
            }
            (None, name) => {
                let name = name.unwrap_or(DEFAULT_SHEET_NAME);
                conn.execute(
                    "INSERT INTO sheets (name, position)
                     VALUES (?1, (SELECT COALESCE(MAX(position), 0) + 1 FROM sheets))",
                    [name],
                )?;
                info!("Created sheet '{}'", name);
                (conn.last_insert_rowid(), name.to_string())
            }
        };

        debug!("Bound to sheet '{}' (id {})", sheet_name, sheet_id);
        Ok(Self {
            path,
            conn,
            sheet_id,
            sheet_name,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the sheet this grid is bound to.
    #[must_use]
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Names of every sheet in the database, in position order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn sheet_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sheets ORDER BY position, id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// The stored header style and the number of columns it covers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored style
    /// is not valid JSON.
    pub fn header_style(&self) -> Result<Option<(usize, HeaderStyle)>> {
        let raw: Option<String> = self.conn.query_row(
            "SELECT header_style FROM sheets WHERE id = ?1",
            [self.sheet_id],
            |row| row.get(0),
        )?;
        raw.map(|json| -> Result<(usize, HeaderStyle)> {
            let stored: StoredHeaderStyle = serde_json::from_str(&json)?;
            Ok((stored.columns, stored.style))
        })
        .transpose()
    }

    #[cfg(test)]
    fn frozen_rows(&self) -> Result<usize> {
        let frozen: i64 = self.conn.query_row(
            "SELECT frozen_rows FROM sheets WHERE id = ?1",
            [self.sheet_id],
            |row| row.get(0),
        )?;
        to_usize(frozen)
    }

    fn max_of(&self, column: &str) -> Result<usize> {
        let max: i64 = self.conn.query_row(
            &format!("SELECT COALESCE(MAX({column}), 0) FROM cells WHERE sheet_id = ?1"),
            [self.sheet_id],
            |row| row.get(0),
        )?;
        to_usize(max)
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_usize(value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::grid(format!("invalid coordinate {value}")))
}

impl Grid for SqliteGrid {
    fn last_row(&self) -> Result<usize> {
        self.max_of("row")
    }

    fn last_column(&self) -> Result<usize> {
        self.max_of("col")
    }

    fn get_range(
        &self,
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    ) -> Result<Vec<Vec<Cell>>> {
        check_origin(row, column)?;
        let mut range = vec![vec![None; columns]; rows];
        if rows == 0 || columns == 0 {
            return Ok(range);
        }

        let mut stmt = self.conn.prepare(
            r"
            SELECT row, col, value FROM cells
            WHERE sheet_id = ?1 AND row BETWEEN ?2 AND ?3 AND col BETWEEN ?4 AND ?5
            ",
        )?;
        let cells = stmt
            .query_map(
                params![
                    self.sheet_id,
                    to_i64(row),
                    to_i64(row + rows - 1),
                    to_i64(column),
                    to_i64(column + columns - 1),
                ],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (r, c, value) in cells {
            let r = to_usize(r)? - row;
            let c = to_usize(c)? - column;
            range[r][c] = Some(value);
        }
        Ok(range)
    }

    fn set_range(&mut self, row: usize, column: usize, values: &[Vec<String>]) -> Result<()> {
        check_origin(row, column)?;
        check_rectangular(values)?;

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO cells (sheet_id, row, col, value) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (dr, cells) in values.iter().enumerate() {
                for (dc, value) in cells.iter().enumerate() {
                    stmt.execute(params![
                        self.sheet_id,
                        to_i64(row + dr),
                        to_i64(column + dc),
                        value,
                    ])?;
                }
            }
        }
        tx.commit()?;
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

        // Shift through negative rows so the primary key never collides
        // mid-update.
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM cells WHERE sheet_id = ?1 AND row = ?2",
            params![self.sheet_id, to_i64(row)],
        )?;
        tx.execute(
            "UPDATE cells SET row = -(row - 1) WHERE sheet_id = ?1 AND row > ?2",
            params![self.sheet_id, to_i64(row)],
        )?;
        tx.execute(
            "UPDATE cells SET row = -row WHERE sheet_id = ?1 AND row < 0",
            [self.sheet_id],
        )?;
        tx.commit()?;

        debug!("Deleted row {} from sheet '{}'", row, self.sheet_name);
        Ok(())
    }

    fn style_header(&mut self, columns: usize, style: &HeaderStyle) -> Result<()> {
        let stored = serde_json::to_string(&StoredHeaderStyle {
            columns,
            style: style.clone(),
        })?;
        self.conn.execute(
            "UPDATE sheets SET frozen_rows = ?1, header_style = ?2 WHERE id = ?3",
            params![to_i64(style.frozen_rows), stored, self.sheet_id],
        )?;
        Ok(())
    }
}
