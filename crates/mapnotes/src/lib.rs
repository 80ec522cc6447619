//! `mapnotes` - Map annotation collector backed by a spreadsheet-style grid
//!
//! Records are rows of a header-labelled sheet. The [`store`] adapter maps
//! them onto any [`grid::Grid`], the [`handler`] turns requests into JSON or
//! JSONP envelopes, and [`server`] exposes both over HTTP.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod frontend;
pub mod grid;
pub mod handler;
pub mod logging;
pub mod record;
pub mod server;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use grid::{Grid, MemoryGrid, SqliteGrid};
pub use handler::{handle_list, handle_write, Reply};
pub use logging::init_logging;
pub use record::Record;
pub use store::{RecordStore, SheetStore, Zone};
