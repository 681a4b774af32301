//! Raw schedule tables as read from the extracted feed.
//!
//! Rows are kept as unparsed string records so that every column survives
//! untouched into the output. Filters look at a row through a small typed
//! [`KeyView`] deserialized with serde; columns the view does not name are
//! ignored.

use std::fs::File;
use std::io;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::de::DeserializeOwned;

use crate::error::ScheduleError;

/// The seven files of a static schedule snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Routes,
    CalendarDates,
    Trips,
    StopTimes,
    StopTimeOverrides,
    Stops,
    Transfers,
}

impl TableKind {
    pub const ALL: [TableKind; 7] = [
        TableKind::Routes,
        TableKind::CalendarDates,
        TableKind::Trips,
        TableKind::StopTimes,
        TableKind::StopTimeOverrides,
        TableKind::Stops,
        TableKind::Transfers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TableKind::Routes => "routes",
            TableKind::CalendarDates => "calendar_dates",
            TableKind::Trips => "trips",
            TableKind::StopTimes => "stop_times",
            TableKind::StopTimeOverrides => "stop_time_overrides",
            TableKind::Stops => "stops",
            TableKind::Transfers => "transfers",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.txt", self.name())
    }
}

/// A typed projection of the columns a filter step needs.
pub trait KeyView: DeserializeOwned {
    const COLUMNS: &'static [&'static str];
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    kind: TableKind,
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl Table {
    pub fn new(kind: TableKind, headers: StringRecord, rows: Vec<StringRecord>) -> Self {
        Self { kind, headers, rows }
    }

    pub fn from_reader<R: io::Read>(kind: TableKind, reader: R) -> Result<Self, csv::Error> {
        let mut rdr = ReaderBuilder::new().from_reader(reader);
        let headers = rdr.headers()?.clone();
        let rows = rdr.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(kind, headers, rows))
    }

    /// Reads `<dir>/<kind>.txt`. A missing or unreadable file is fatal.
    pub fn load(dir: &Path, kind: TableKind) -> Result<Self, ScheduleError> {
        let path = dir.join(kind.file_name());
        File::open(&path)
            .map_err(csv::Error::from)
            .and_then(|file| Self::from_reader(kind, file))
            .map_err(|source| ScheduleError::MissingInput {
                table: kind.name(),
                path,
                source,
            })
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &'static str) -> Result<usize, ScheduleError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or(ScheduleError::MissingColumn {
                table: self.kind.name(),
                column: name,
            })
    }

    fn key_of<K: KeyView>(&self, index: usize) -> Result<K, ScheduleError> {
        self.rows[index]
            .deserialize(Some(&self.headers))
            .map_err(|source| ScheduleError::MalformedRow {
                table: self.kind.name(),
                line: index + 2,
                source,
            })
    }

    /// Typed keys of every row, in row order.
    pub fn keys<K: KeyView>(&self) -> Result<Vec<K>, ScheduleError> {
        for column in K::COLUMNS {
            self.column(*column)?;
        }
        (0..self.rows.len()).map(|i| self.key_of(i)).collect()
    }

    /// Keeps the rows whose key satisfies `keep`, preserving their order.
    /// Returns the filtered table and the keys of the kept rows.
    pub fn retain<K, F>(&self, mut keep: F) -> Result<(Table, Vec<K>), ScheduleError>
    where
        K: KeyView,
        F: FnMut(&K) -> bool,
    {
        let keys = self.keys::<K>()?;
        let mut rows = Vec::new();
        let mut kept = Vec::new();
        for (row, key) in self.rows.iter().zip(keys) {
            if keep(&key) {
                rows.push(row.clone());
                kept.push(key);
            }
        }
        Ok((Table::new(self.kind, self.headers.clone(), rows), kept))
    }

    pub fn to_writer<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = WriterBuilder::new().from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Writes the table as `<dir>/<kind>.txt`.
    pub fn write(&self, dir: &Path) -> Result<(), ScheduleError> {
        let path = dir.join(self.kind.file_name());
        File::create(&path)
            .map_err(csv::Error::from)
            .and_then(|file| self.to_writer(file))
            .map_err(|source| ScheduleError::Write {
                table: self.kind.name(),
                path,
                source,
            })
    }
}
