//! Record store over a cell grid.
//!
//! [`SheetStore`] maps canonical record fields onto a [`Grid`] whose first row
//! holds header labels. Every operation re-reads the header, so a sheet whose
//! columns were relabelled or reordered by hand keeps working.
//!
//! Appends write columns in canonical order while updates follow whatever
//! header order is on the sheet. Both behaviors are relied on: appends define
//! the layout of a fresh sheet, and updates must not disturb a layout that
//! already exists.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use chrono_tz::Tz;
use rand::Rng;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::grid::{Cell, Grid, HeaderStyle};
use crate::record::{self, Record, COLUMNS, ID, TIMESTAMP};

/// Caller-supplied field values keyed by field key.
pub type Fields = BTreeMap<String, String>;

/// `yyyy-MM-dd HH:mm:ss`, the stored creation time format.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Prefix of generated ids: creation time down to the second.
const ID_PREFIX_FORMAT: &str = "%Y%m%d%H%M%S";

/// Random characters appended to a generated id.
const ID_SUFFIX_LEN: usize = 6;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Attempts at drawing an unused id before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// Operations the request handler needs from a record store.
pub trait RecordStore {
    /// Every stored record, in sheet order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing grid cannot be read.
    fn list_all(&self) -> Result<Vec<Record>>;

    /// Store a new record and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateId`] if the caller's id is taken, or an error
    /// if the grid cannot be written.
    fn append(&mut self, fields: &Fields) -> Result<String>;

    /// 1-based grid row of the record with `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing grid cannot be read.
    fn find_position(&self, id: &str) -> Result<Option<usize>>;

    /// Overwrite the supplied fields of the record with `id`.
    ///
    /// Returns `false` if no record has that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the grid cannot be read or written.
    fn update(&mut self, id: &str, fields: &Fields) -> Result<bool>;

    /// Delete the record with `id`.
    ///
    /// Returns `false` if no record has that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the grid cannot be read or written.
    fn remove(&mut self, id: &str) -> Result<bool>;
}

/// Time zone records and ids are stamped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// The server's local zone.
    #[default]
    Local,
    /// A fixed UTC offset such as `+08:00`.
    Fixed(FixedOffset),
    /// An IANA zone such as `Asia/Taipei`, following its daylight-saving rules.
    Named(Tz),
}

impl Zone {
    /// The current time in this zone.
    #[must_use]
    pub fn now(self) -> DateTime<FixedOffset> {
        match self {
            Self::Local => {
                let now = Local::now();
                now.with_timezone(&now.offset().fix())
            }
            Self::Fixed(offset) => Utc::now().with_timezone(&offset),
            Self::Named(tz) => {
                let now = Utc::now().with_timezone(&tz);
                now.with_timezone(&now.offset().fix())
            }
        }
    }
}

impl FromStr for Zone {
    type Err = Error;

    /// Parse a `+HH:MM` offset or an IANA zone name.
    fn from_str(raw: &str) -> Result<Self> {
        if let Ok(offset) = raw.parse::<FixedOffset>() {
            return Ok(Self::Fixed(offset));
        }
        raw.parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| Error::ConfigValidation {
                message: format!("invalid time_zone: {raw}"),
            })
    }
}

/// [`RecordStore`] backed by a header-labelled [`Grid`].
#[derive(Debug)]
pub struct SheetStore<G> {
    grid: G,
    zone: Zone,
    header_style: HeaderStyle,
}

impl<G: Grid> SheetStore<G> {
    /// Create a store over `grid` using the server's local time zone.
    #[must_use]
    pub fn new(grid: G) -> Self {
        Self {
            grid,
            zone: Zone::Local,
            header_style: HeaderStyle::default(),
        }
    }

    /// Stamp records and ids in `zone` instead of local time.
    #[must_use]
    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zone = zone;
        self
    }

    /// Borrow the underlying grid.
    #[must_use]
    pub fn grid(&self) -> &G {
        &self.grid
    }

    /// Header cells of row 1, empty when the sheet has no columns.
    fn headers(&self) -> Result<Vec<String>> {
        let last_column = self.grid.last_column()?;
        if last_column == 0 {
            return Ok(Vec::new());
        }
        let mut range = self.grid.get_range(1, 1, 1, last_column)?;
        Ok(range
            .pop()
            .unwrap_or_default()
            .into_iter()
            .map(Cell::unwrap_or_default)
            .collect())
    }

    /// Write the styled header row if the sheet has no columns yet.
    ///
    /// Returns whether a header was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the grid cannot be read or written.
    pub fn ensure_header(&mut self) -> Result<bool> {
        if self.grid.last_column()? > 0 {
            return Ok(false);
        }

        let labels = record::header_labels();
        let columns = labels.len();
        self.grid.set_range(1, 1, &[labels])?;
        self.grid.style_header(columns, &self.header_style)?;
        info!("Wrote header row with {} columns", columns);
        Ok(true)
    }

    fn unused_id(&self, now: &DateTime<FixedOffset>) -> Result<String> {
        let mut rng = rand::thread_rng();
        let mut candidate = generate_id(now, &mut rng);
        for _ in 1..MAX_ID_ATTEMPTS {
            if self.find_position(&candidate)?.is_none() {
                return Ok(candidate);
            }
            debug!("Generated id {} is taken, drawing again", candidate);
            candidate = generate_id(now, &mut rng);
        }
        Err(Error::DuplicateId { id: candidate })
    }
}

impl<G: Grid> RecordStore for SheetStore<G> {
    fn list_all(&self) -> Result<Vec<Record>> {
        let last_row = self.grid.last_row()?;
        let last_column = self.grid.last_column()?;
        if last_row <= 1 || last_column == 0 {
            return Ok(Vec::new());
        }

        let headers = self.headers()?;
        let rows = self.grid.get_range(2, 1, last_row - 1, last_column)?;
        let records: Vec<Record> = rows
            .into_iter()
            .map(|row| {
                headers
                    .iter()
                    .zip(row)
                    .map(|(header, cell)| (record::resolve_key(header), cell.unwrap_or_default()))
                    .collect()
            })
            .collect();

        debug!("Listed {} records", records.len());
        Ok(records)
    }

    fn append(&mut self, fields: &Fields) -> Result<String> {
        self.ensure_header()?;

        let now = self.zone.now();
        let id = match fields.get(ID).filter(|id| !id.is_empty()) {
            Some(id) => {
                if self.find_position(id)?.is_some() {
                    return Err(Error::DuplicateId { id: id.clone() });
                }
                id.clone()
            }
            None => self.unused_id(&now)?,
        };
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();

        let row: Vec<String> = COLUMNS
            .iter()
            .map(|&column| match column {
                ID => id.clone(),
                TIMESTAMP => timestamp.clone(),
                _ => fields.get(column).cloned().unwrap_or_default(),
            })
            .collect();
        self.grid.append_row(&row)?;

        info!("Appended record {}", id);
        Ok(id)
    }

    fn find_position(&self, id: &str) -> Result<Option<usize>> {
        let last_row = self.grid.last_row()?;
        if last_row <= 1 {
            return Ok(None);
        }

        let headers = self.headers()?;
        let Some(index) = headers
            .iter()
            .position(|header| record::resolve_key(header) == ID)
        else {
            debug!("Sheet has no id column");
            return Ok(None);
        };

        let ids = self.grid.get_range(2, index + 1, last_row - 1, 1)?;
        Ok(ids
            .iter()
            .position(|row| row.first().and_then(Option::as_deref).unwrap_or_default() == id)
            .map(|offset| offset + 2))
    }

    fn update(&mut self, id: &str, fields: &Fields) -> Result<bool> {
        let Some(row) = self.find_position(id)? else {
            debug!("Update skipped, no record {}", id);
            return Ok(false);
        };

        let headers = self.headers()?;
        let existing = self
            .grid
            .get_range(row, 1, 1, headers.len())?
            .pop()
            .unwrap_or_default();

        let values: Vec<String> = headers
            .iter()
            .zip(existing)
            .map(|(header, current)| {
                let key = record::resolve_key(header);
                match (key, fields.get(key)) {
                    (ID | TIMESTAMP, _) | (_, None) => current.unwrap_or_default(),
                    (_, Some(value)) => value.clone(),
                }
            })
            .collect();
        self.grid.set_range(row, 1, &[values])?;

        info!("Updated record {} at row {}", id, row);
        Ok(true)
    }

    fn remove(&mut self, id: &str) -> Result<bool> {
        let Some(row) = self.find_position(id)? else {
            debug!("Delete skipped, no record {}", id);
            return Ok(false);
        };

        self.grid.delete_row(row)?;
        info!("Deleted record {} at row {}", id, row);
        Ok(true)
    }
}

/// Build an id from the creation second plus a short random suffix.
fn generate_id<R: Rng>(now: &DateTime<FixedOffset>, rng: &mut R) -> String {
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect();
    format!("{}_{suffix}", now.format(ID_PREFIX_FORMAT))
}
