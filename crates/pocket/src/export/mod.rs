//! Export adapter
//!
//! Reads the store and serializes rows to an output stream. Export is
//! read-only: nothing here mutates the store. Rows are streamed in chunks so
//! large exports do not load the whole table.

mod formats;

use log::{debug, info};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::storage::{ItemFilter, ItemStore, Window};
use formats::{accepts, writer_for};

/// Rows read from the store per query
pub const EXPORT_CHUNK_SIZE: usize = 200;

/// Output serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// A pretty-printed JSON array
    Json,
    /// CSV with a header row
    Csv,
    /// JSON lines of Karakeep bookmark-create requests
    Karakeep,
}

impl ExportFormat {
    pub const ALL: [Self; 3] = [Self::Json, Self::Csv, Self::Karakeep];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Karakeep => "karakeep",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    /// Case-insensitive; anything outside the allow-set is rejected
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == wanted)
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "unknown format '{}' (expected one of: json, csv, karakeep)",
                    s.trim()
                ))
            })
    }
}

/// Table to export
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ExportTable {
    #[default]
    Items,
    ItemTags,
}

impl fmt::Display for ExportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Items => f.write_str("items"),
            Self::ItemTags => f.write_str("item_tags"),
        }
    }
}

impl FromStr for ExportTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "items" => Ok(Self::Items),
            "item_tags" => Ok(Self::ItemTags),
            other => Err(Error::InvalidFilter(format!(
                "unknown table '{other}' (expected items or item_tags)"
            ))),
        }
    }
}

/// What to export and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub table: ExportTable,
    pub format: ExportFormat,
    pub filter: ItemFilter,
    pub window: Window,
    /// Report what would be exported without writing anything
    pub dry_run: bool,
}

impl ExportRequest {
    /// Export every item in `format`
    pub fn new(format: ExportFormat) -> Self {
        Self {
            table: ExportTable::Items,
            format,
            filter: ItemFilter::default(),
            window: Window::default(),
            dry_run: false,
        }
    }

    /// Reject option combinations that cannot be honored
    pub fn validate(&self) -> Result<()> {
        if self.window.limit == Some(0) {
            return Err(Error::InvalidFilter("limit must be at least 1".to_string()));
        }
        if self.table == ExportTable::ItemTags {
            if !self.filter.is_empty() {
                return Err(Error::InvalidFilter(
                    "status and favorite filters only apply to the items table".to_string(),
                ));
            }
            if self.format == ExportFormat::Karakeep {
                return Err(Error::InvalidFormat(
                    "karakeep export only supports the items table".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of an export
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// Rows written (or that would be written, for a dry run)
    pub exported: usize,
    /// Rows the format could not represent
    pub skipped: usize,
    /// Item ids of exported rows; only collected for dry runs
    pub ids: Vec<String>,
}

/// Serializes store contents
pub struct Exporter<'a> {
    store: &'a dyn ItemStore,
}

impl<'a> Exporter<'a> {
    pub fn new(store: &'a dyn ItemStore) -> Self {
        Self { store }
    }

    /// Number of rows the request's filter and window select
    pub fn count(&self, request: &ExportRequest) -> Result<usize> {
        request.validate()?;
        let total = match request.table {
            ExportTable::Items => self.store.count_items(&request.filter),
            ExportTable::ItemTags => self.store.count_item_tags(),
        }
        .map_err(Error::Store)?;
        Ok(request.window.span(total))
    }

    /// Stream the selected rows to `out`
    ///
    /// Validation happens before the store is read. A dry run never writes
    /// to `out`.
    pub fn export(&self, request: &ExportRequest, out: &mut dyn Write) -> Result<ExportReport> {
        request.validate()?;

        let mut report = ExportReport::default();
        let mut writer = (!request.dry_run).then(|| writer_for(request.format, out));

        match request.table {
            ExportTable::Items => {
                if let Some(writer) = writer.as_deref_mut() {
                    writer.begin_items()?;
                }
                for_each_chunk(
                    request.window,
                    |window| self.store.list_items(&request.filter, window),
                    |item| {
                        if !accepts(request.format, item) {
                            debug!("[EXPORT] Skipping item {}: no URL", item.id);
                            report.skipped += 1;
                            return Ok(());
                        }
                        report.exported += 1;
                        match writer.as_deref_mut() {
                            Some(writer) => writer.item(item)?,
                            None => report.ids.push(item.id.to_string()),
                        }
                        Ok(())
                    },
                )?;
            }
            ExportTable::ItemTags => {
                if let Some(writer) = writer.as_deref_mut() {
                    writer.begin_tags()?;
                }
                for_each_chunk(
                    request.window,
                    |window| self.store.list_item_tags(window),
                    |row| {
                        report.exported += 1;
                        match writer.as_deref_mut() {
                            Some(writer) => writer.tag(row)?,
                            None => report.ids.push(row.item_id.clone()),
                        }
                        Ok(())
                    },
                )?;
            }
        }

        if let Some(writer) = writer.as_deref_mut() {
            writer.finish()?;
        }

        info!(
            "[EXPORT] {} {} rows as {}{} ({} skipped)",
            if request.dry_run { "Would export" } else { "Exported" },
            report.exported,
            request.format,
            if request.table == ExportTable::ItemTags { " from item_tags" } else { "" },
            report.skipped
        );
        Ok(report)
    }
}

/// Page through `window` in chunks of [`EXPORT_CHUNK_SIZE`]
fn for_each_chunk<T>(
    window: Window,
    mut fetch: impl FnMut(Window) -> anyhow::Result<Vec<T>>,
    mut visit: impl FnMut(&T) -> Result<()>,
) -> Result<()> {
    let mut offset = window.offset;
    let mut remaining = window.limit;

    loop {
        let take = remaining.map_or(EXPORT_CHUNK_SIZE, |r| r.min(EXPORT_CHUNK_SIZE));
        if take == 0 {
            return Ok(());
        }

        let rows = fetch(Window::new(offset, Some(take))).map_err(Error::Store)?;
        for row in &rows {
            visit(row)?;
        }
        if rows.len() < take {
            return Ok(());
        }

        offset += rows.len();
        if let Some(remaining) = remaining.as_mut() {
            *remaining -= rows.len();
        }
    }
}
