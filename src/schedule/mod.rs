//! Static pipeline: reduce a full schedule snapshot to the rows relevant to
//! the next few days.

pub mod diagnostics;
pub mod filters;
pub mod table;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ScheduleError;

pub use diagnostics::{DataQualityWarning, Diagnostics};
pub use filters::{RetainedServices, RouteIds, ServiceWindow, TripIds};
pub use table::{Table, TableKind};

/// Number of days after the reference date kept by default.
pub const DEFAULT_WINDOW_DAYS: u32 = 8;

/// `route_short_name` of the routes dropped by default.
pub const DEFAULT_EXCLUDED_ROUTE: &str = "BUS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceOptions {
    pub window_days: u32,
    pub excluded_route_short_name: String,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            excluded_route_short_name: DEFAULT_EXCLUDED_ROUTE.to_string(),
        }
    }
}

/// The seven source tables of one run, fully loaded.
#[derive(Debug, Clone)]
pub struct ScheduleSnapshot {
    pub routes: Table,
    pub calendar_dates: Table,
    pub trips: Table,
    pub stop_times: Table,
    pub stop_time_overrides: Table,
    pub stops: Table,
    pub transfers: Table,
}

impl ScheduleSnapshot {
    /// Loads every table from `dir`; the first missing or unreadable one
    /// aborts the load.
    #[tracing::instrument(skip_all, fields(dir = %dir.display()))]
    pub fn load(dir: &Path) -> Result<Self, ScheduleError> {
        let snapshot = ScheduleSnapshot {
            routes: Table::load(dir, TableKind::Routes)?,
            calendar_dates: Table::load(dir, TableKind::CalendarDates)?,
            trips: Table::load(dir, TableKind::Trips)?,
            stop_times: Table::load(dir, TableKind::StopTimes)?,
            stop_time_overrides: Table::load(dir, TableKind::StopTimeOverrides)?,
            stops: Table::load(dir, TableKind::Stops)?,
            transfers: Table::load(dir, TableKind::Transfers)?,
        };
        debug!(
            routes = snapshot.routes.len(),
            trips = snapshot.trips.len(),
            stop_times = snapshot.stop_times.len(),
            "Schedule snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn tables(&self) -> [&Table; 7] {
        [
            &self.routes,
            &self.calendar_dates,
            &self.trips,
            &self.stop_times,
            &self.stop_time_overrides,
            &self.stops,
            &self.transfers,
        ]
    }
}

/// Output of a reduction: the reduced tables plus the retained key sets.
#[derive(Debug, Clone)]
pub struct ReducedSchedule {
    pub tables: ScheduleSnapshot,
    pub window: ServiceWindow,
    pub route_ids: RouteIds,
    pub services: RetainedServices,
    pub trip_ids: TripIds,
}

/// Runs the filter cascade over `snapshot` for the window starting `today`.
pub fn reduce(
    snapshot: &ScheduleSnapshot,
    today: NaiveDate,
    options: &ReduceOptions,
    diagnostics: &mut Diagnostics,
) -> Result<ReducedSchedule, ScheduleError> {
    let window = ServiceWindow::new(today, options.window_days);

    let (routes, route_ids) =
        filters::filter_routes(&snapshot.routes, &options.excluded_route_short_name)?;
    let (calendar_dates, services) =
        filters::filter_service_dates(&snapshot.calendar_dates, &window, diagnostics)?;
    let (trips, trip_ids) = filters::filter_trips(&snapshot.trips, &route_ids, &services)?;
    let stop_times = filters::filter_stop_times(&snapshot.stop_times, &trip_ids)?;
    let stop_time_overrides =
        filters::filter_stop_time_overrides(&snapshot.stop_time_overrides, &trip_ids, &services)?;

    Ok(ReducedSchedule {
        tables: ScheduleSnapshot {
            routes,
            calendar_dates,
            trips,
            stop_times,
            stop_time_overrides,
            stops: snapshot.stops.clone(),
            transfers: snapshot.transfers.clone(),
        },
        window,
        route_ids,
        services,
        trip_ids,
    })
}

fn fs_err(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> ScheduleError {
    let path = path.to_path_buf();
    move |source| ScheduleError::Filesystem {
        action,
        path,
        source,
    }
}

/// Splits `out_dir` into its normalized form and a sibling staging path
/// `<parent>/<name>.partial`. Trailing separators are ignored.
fn staging_paths(out_dir: &Path) -> Result<(PathBuf, PathBuf), ScheduleError> {
    let name = out_dir
        .file_name()
        .ok_or_else(|| ScheduleError::InvalidOutputDir {
            path: out_dir.to_path_buf(),
        })?;
    let mut staged = OsString::from(name);
    staged.push(".partial");
    Ok((out_dir.with_file_name(name), out_dir.with_file_name(staged)))
}

impl ReducedSchedule {
    /// Writes all tables under `out_dir`.
    ///
    /// Tables go to a sibling staging directory first, which replaces
    /// `out_dir` only once every table has been written.
    #[tracing::instrument(skip_all, fields(out_dir = %out_dir.display()))]
    pub fn write_to(&self, out_dir: &Path) -> Result<(), ScheduleError> {
        let (target, staging) = staging_paths(out_dir)?;
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(fs_err("remove", &staging))?;
        }
        fs::create_dir_all(&staging).map_err(fs_err("create", &staging))?;

        let written = self
            .tables
            .tables()
            .iter()
            .try_for_each(|table| table.write(&staging));
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        if target.exists() {
            fs::remove_dir_all(&target).map_err(fs_err("remove", &target))?;
        }
        fs::rename(&staging, &target).map_err(fs_err("rename staging directory to", &target))?;
        debug!(dir = %target.display(), "Reduced tables in place");
        Ok(())
    }
}

/// Row counts of one table before and after the reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows_in: usize,
    pub rows_out: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReductionSummary {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub routes: usize,
    pub services: usize,
    pub trips: usize,
    pub tables: Vec<TableCount>,
    pub warnings: Vec<DataQualityWarning>,
}

impl ReductionSummary {
    pub fn new(input: &ScheduleSnapshot, reduced: &ReducedSchedule, diagnostics: &Diagnostics) -> Self {
        let tables = input
            .tables()
            .iter()
            .zip(reduced.tables.tables())
            .map(|(before, after)| TableCount {
                table: before.kind().name(),
                rows_in: before.len(),
                rows_out: after.len(),
            })
            .collect();

        Self {
            window_start: reduced.window.start,
            window_end: reduced.window.end,
            routes: reduced.route_ids.len(),
            services: reduced.services.len(),
            trips: reduced.trip_ids.len(),
            tables,
            warnings: diagnostics.warnings().to_vec(),
        }
    }
}

/// Loads the snapshot in `input_dir`, reduces it and writes the result to
/// `output_dir`. Nothing is written unless every step succeeds.
#[tracing::instrument(skip_all, fields(input_dir = %input_dir.display(), output_dir = %output_dir.display(), today = %today))]
pub fn reduce_directory(
    input_dir: &Path,
    output_dir: &Path,
    today: NaiveDate,
    options: &ReduceOptions,
) -> Result<ReductionSummary, ScheduleError> {
    let snapshot = ScheduleSnapshot::load(input_dir)?;
    let mut diagnostics = Diagnostics::new();
    let reduced = reduce(&snapshot, today, options, &mut diagnostics)?;
    reduced.write_to(output_dir)?;

    let summary = ReductionSummary::new(&snapshot, &reduced, &diagnostics);
    info!(
        trips = summary.trips,
        services = summary.services,
        warnings = summary.warnings.len(),
        "Schedule reduced"
    );
    Ok(summary)
}
