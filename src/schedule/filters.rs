//! The referential cascade: routes, service dates, trips, stop times and
//! stop-time overrides, each filtered against the key sets of the previous
//! steps.
//!
//! Every step takes immutable tables and returns a new table plus the keys
//! the next step needs.

use std::collections::{BTreeMap, HashSet};

use chrono::{Days, NaiveDate};
use csv::StringRecord;
use serde::Deserialize;
use tracing::debug;

use crate::error::ScheduleError;
use crate::schedule::diagnostics::{DataQualityWarning, Diagnostics};
use crate::schedule::table::{KeyView, Table};

pub type RouteIds = HashSet<String>;
pub type TripIds = HashSet<String>;

#[derive(Debug, Deserialize)]
struct RouteKey {
    route_id: String,
    route_short_name: Option<String>,
}

impl KeyView for RouteKey {
    const COLUMNS: &'static [&'static str] = &["route_id", "route_short_name"];
}

#[derive(Debug, Deserialize)]
struct CalendarDateKey {
    service_id: String,
    date: String,
    exception_type: String,
}

impl KeyView for CalendarDateKey {
    const COLUMNS: &'static [&'static str] = &["service_id", "date", "exception_type"];
}

#[derive(Debug, Deserialize)]
struct TripKey {
    trip_id: String,
    route_id: String,
    service_id: String,
}

impl KeyView for TripKey {
    const COLUMNS: &'static [&'static str] = &["trip_id", "route_id", "service_id"];
}

#[derive(Debug, Deserialize)]
struct StopTimeKey {
    trip_id: String,
}

impl KeyView for StopTimeKey {
    const COLUMNS: &'static [&'static str] = &["trip_id"];
}

#[derive(Debug, Deserialize)]
struct OverrideKey {
    trip_id: String,
    service_id: String,
}

impl KeyView for OverrideKey {
    const COLUMNS: &'static [&'static str] = &["trip_id", "service_id", "stop_id"];
}

/// Inclusive range of calendar days a reduction keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ServiceWindow {
    /// `[today, today + days]`, both ends included.
    pub fn new(today: NaiveDate, days: u32) -> Self {
        let end = today
            .checked_add_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MAX);
        Self { start: today, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Service ids that run at least once inside the window, with the
/// qualifying dates of each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetainedServices {
    dates: BTreeMap<String, Vec<NaiveDate>>,
}

impl RetainedServices {
    pub fn insert(&mut self, service_id: String, date: NaiveDate) {
        self.dates.entry(service_id).or_default().push(date);
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.dates.contains_key(service_id)
    }

    pub fn dates(&self, service_id: &str) -> Option<&[NaiveDate]> {
        self.dates.get(service_id).map(Vec::as_slice)
    }

    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.dates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Parses a strict 8-digit `YYYYMMDD` calendar date.
pub fn parse_service_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y%m%d").ok()
}

/// Drops routes whose `route_short_name` equals `excluded`.
pub fn filter_routes(routes: &Table, excluded: &str) -> Result<(Table, RouteIds), ScheduleError> {
    let (table, kept) = routes.retain(|r: &RouteKey| r.route_short_name.as_deref() != Some(excluded))?;
    let ids: RouteIds = kept.into_iter().map(|r| r.route_id).collect();
    debug!(kept = table.len(), dropped = routes.len() - table.len(), "Filtered routes");
    Ok((table, ids))
}

/// Keeps `calendar_dates` rows whose date lies inside `window`.
///
/// Rows with an `exception_type` other than `1` are reported to
/// `diagnostics` but otherwise treated like any other row. Rows with an
/// unparseable date are reported and dropped.
pub fn filter_service_dates(
    calendar_dates: &Table,
    window: &ServiceWindow,
    diagnostics: &mut Diagnostics,
) -> Result<(Table, RetainedServices), ScheduleError> {
    let mut services = RetainedServices::default();

    let (table, _) = calendar_dates.retain(|row: &CalendarDateKey| {
        if row.exception_type.trim() != "1" {
            diagnostics.record(DataQualityWarning::ExceptionType {
                service_id: row.service_id.clone(),
                date: row.date.clone(),
                exception_type: row.exception_type.clone(),
            });
        }

        let Some(date) = parse_service_date(&row.date) else {
            diagnostics.record(DataQualityWarning::UnparseableDate {
                service_id: row.service_id.clone(),
                date: row.date.clone(),
            });
            return false;
        };

        if !window.contains(date) {
            return false;
        }
        services.insert(row.service_id.clone(), date);
        true
    })?;

    debug!(
        kept = table.len(),
        services = services.len(),
        start = %window.start,
        end = %window.end,
        "Filtered service dates"
    );
    Ok((table, services))
}

/// Keeps trips whose route and service both survived the earlier steps.
pub fn filter_trips(
    trips: &Table,
    routes: &RouteIds,
    services: &RetainedServices,
) -> Result<(Table, TripIds), ScheduleError> {
    let (table, kept) = trips
        .retain(|t: &TripKey| routes.contains(&t.route_id) && services.contains(&t.service_id))?;
    let ids: TripIds = kept.into_iter().map(|t| t.trip_id).collect();
    debug!(kept = table.len(), dropped = trips.len() - table.len(), "Filtered trips");
    Ok((table, ids))
}

pub fn filter_stop_times(stop_times: &Table, trips: &TripIds) -> Result<Table, ScheduleError> {
    let (table, _) = stop_times.retain(|s: &StopTimeKey| trips.contains(&s.trip_id))?;
    debug!(kept = table.len(), dropped = stop_times.len() - table.len(), "Filtered stop times");
    Ok(table)
}

/// Splits `"<numeric-id>_<platform>"` at the first underscore.
///
/// `"1234_A"` gives `(1234, "A")`. A value without an underscore or with a
/// non-numeric id is an error.
pub fn split_composite_stop_id(value: &str) -> Result<(i64, String), ScheduleError> {
    let malformed = || ScheduleError::MalformedCompositeKey {
        value: value.to_string(),
    };
    let (id, platform) = value.split_once('_').ok_or_else(malformed)?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let id = id.parse::<i64>().map_err(|_| malformed())?;
    Ok((id, platform.to_string()))
}

/// Keeps overrides of retained trips on retained services, then rewrites
/// `stop_id` as the integer part of the composite key and appends the
/// platform code as a new `platform` column.
pub fn filter_stop_time_overrides(
    overrides: &Table,
    trips: &TripIds,
    services: &RetainedServices,
) -> Result<Table, ScheduleError> {
    let (kept, _) = overrides
        .retain(|o: &OverrideKey| trips.contains(&o.trip_id) && services.contains(&o.service_id))?;
    let stop_id_col = kept.column("stop_id")?;

    let mut headers = kept.headers().clone();
    headers.push_field("platform");

    let rows = kept
        .rows()
        .iter()
        .map(|row| {
            let (stop_id, platform) = split_composite_stop_id(&row[stop_id_col])?;
            let stop_id = stop_id.to_string();
            let mut out: StringRecord = row
                .iter()
                .enumerate()
                .map(|(i, field)| if i == stop_id_col { stop_id.as_str() } else { field })
                .collect();
            out.push_field(&platform);
            Ok(out)
        })
        .collect::<Result<Vec<_>, ScheduleError>>()?;

    debug!(kept = rows.len(), dropped = overrides.len() - rows.len(), "Filtered stop time overrides");
    Ok(Table::new(kept.kind(), headers, rows))
}
