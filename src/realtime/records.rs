//! Flattening of trip updates into per-stop rows.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::DecodeError;
use crate::realtime::feed::{FeedMessage, StopTimeEvent, TripUpdate, parse_feed};

/// Rendering used for timestamp columns in the CSV output.
pub const INSTANT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of the realtime output table: a single stop-time update together
/// with the fields of the trip it belongs to.
///
/// Absent arrival/departure events leave both of their columns `None`. An
/// event that is present but carries no `time` (or no `delay`) leaves that
/// column `None` as well rather than falling back to the schema default of
/// zero, so a missing value is never rendered as `1970-01-01 00:00:00` or as
/// an on-time arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopRecord {
    pub trip_id: String,
    pub start_time: String,
    pub start_date: String,
    pub stop_id: String,
    #[serde(serialize_with = "serialize_instant")]
    pub departure_time: Option<i64>,
    pub departure_delay: Option<i32>,
    #[serde(serialize_with = "serialize_instant")]
    pub arrival_time: Option<i64>,
    pub arrival_delay: Option<i32>,
}

impl StopRecord {
    pub fn arrival_instant(&self) -> Option<DateTime<Utc>> {
        to_instant(self.arrival_time)
    }

    pub fn departure_instant(&self) -> Option<DateTime<Utc>> {
        to_instant(self.departure_time)
    }
}

/// Converts POSIX seconds to an instant; out-of-range values become `None`.
pub fn to_instant(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}

fn serialize_instant<S: Serializer>(seconds: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
    match to_instant(*seconds) {
        Some(instant) => serializer.collect_str(&instant.format(INSTANT_FORMAT)),
        None => serializer.serialize_none(),
    }
}

fn event_fields(event: Option<&StopTimeEvent>) -> (Option<i64>, Option<i32>) {
    event.map_or((None, None), |e| (e.time, e.delay))
}

fn trip_records(update: &TripUpdate, out: &mut Vec<StopRecord>) {
    let trip = update.trip.clone().unwrap_or_default();
    let trip_id = trip.trip_id.unwrap_or_default();
    let start_time = trip.start_time.unwrap_or_default();
    let start_date = trip.start_date.unwrap_or_default();

    for stu in &update.stop_time_update {
        let (arrival_time, arrival_delay) = event_fields(stu.arrival.as_ref());
        let (departure_time, departure_delay) = event_fields(stu.departure.as_ref());

        out.push(StopRecord {
            trip_id: trip_id.clone(),
            start_time: start_time.clone(),
            start_date: start_date.clone(),
            stop_id: stu.stop_id.clone().unwrap_or_default(),
            departure_time,
            departure_delay,
            arrival_time,
            arrival_delay,
        });
    }
}

/// Produces one [`StopRecord`] per stop-time update, in feed order.
/// Entities without a trip update contribute nothing.
pub fn flatten_feed(feed: &FeedMessage) -> Vec<StopRecord> {
    let mut records = Vec::new();
    for entity in &feed.entity {
        if let Some(update) = &entity.trip_update {
            trip_records(update, &mut records);
        }
    }
    records
}

/// Counts describing one decoded snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeSummary {
    pub gtfs_realtime_version: String,
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub entities: usize,
    pub trip_updates: usize,
    pub skipped_entities: usize,
    pub records: usize,
}

impl DecodeSummary {
    pub fn from_feed(feed: &FeedMessage, records: usize) -> Self {
        let trip_updates = feed
            .entity
            .iter()
            .filter(|e| e.trip_update.is_some())
            .count();

        let header = feed.header.as_ref();
        DecodeSummary {
            gtfs_realtime_version: header
                .and_then(|h| h.gtfs_realtime_version.clone())
                .unwrap_or_default(),
            feed_timestamp: header
                .and_then(|h| h.timestamp)
                .and_then(|t| i64::try_from(t).ok())
                .and_then(|t| DateTime::from_timestamp(t, 0)),
            entities: feed.entity.len(),
            trip_updates,
            skipped_entities: feed.entity.len() - trip_updates,
            records,
        }
    }
}

/// The realtime pipeline result for one snapshot.
#[derive(Debug, Clone)]
pub struct DecodedSnapshot {
    pub records: Vec<StopRecord>,
    pub summary: DecodeSummary,
}

/// Decodes raw snapshot bytes and flattens them into [`StopRecord`]s.
///
/// # Errors
///
/// Any [`DecodeError`] aborts the whole snapshot; no partial rows are returned.
pub fn decode_stop_records(bytes: &[u8]) -> Result<DecodedSnapshot, DecodeError> {
    let feed = parse_feed(bytes)?;
    let records = flatten_feed(&feed);
    let summary = DecodeSummary::from_feed(&feed, records.len());
    debug!(
        entities = summary.entities,
        trip_updates = summary.trip_updates,
        records = summary.records,
        "Flattened feed"
    );
    Ok(DecodedSnapshot { records, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::feed::{FeedEntity, FeedHeader, StopTimeUpdate, TripDescriptor};

    fn create_header() -> Option<FeedHeader> {
        Some(FeedHeader {
            gtfs_realtime_version: Some("2.0".to_string()),
            incrementality: None,
            timestamp: Some(1_700_000_000),
        })
    }

    fn trip_entity(id: &str, stops: Vec<StopTimeUpdate>) -> FeedEntity {
        FeedEntity {
            id: Some(id.to_string()),
            trip_update: Some(TripUpdate {
                trip: Some(TripDescriptor {
                    trip_id: Some(format!("trip-{id}")),
                    start_time: Some("08:15:00".to_string()),
                    start_date: Some("20240301".to_string()),
                    ..Default::default()
                }),
                stop_time_update: stops,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn stop(stop_id: &str, arrival: Option<StopTimeEvent>, departure: Option<StopTimeEvent>) -> StopTimeUpdate {
        StopTimeUpdate {
            stop_id: Some(stop_id.to_string()),
            arrival,
            departure,
            ..Default::default()
        }
    }

    fn event(time: i64, delay: i32) -> StopTimeEvent {
        StopTimeEvent {
            time: Some(time),
            delay: Some(delay),
            uncertainty: None,
        }
    }

    #[test]
    fn test_one_record_per_stop_time_update() {
        let feed = FeedMessage {
            header: create_header(),
            entity: vec![
                trip_entity("a", vec![stop("1", None, None), stop("2", None, None)]),
                FeedEntity {
                    id: Some("vehicle-only".to_string()),
                    ..Default::default()
                },
                trip_entity("b", vec![stop("3", None, None)]),
            ],
        };

        let records = flatten_feed(&feed);
        let ids: Vec<_> = records
            .iter()
            .map(|r| (r.trip_id.as_str(), r.stop_id.as_str()))
            .collect();
        assert_eq!(ids, vec![("trip-a", "1"), ("trip-a", "2"), ("trip-b", "3")]);
        assert!(records.iter().all(|r| r.start_time == "08:15:00"));
        assert!(records.iter().all(|r| r.start_date == "20240301"));
    }

    #[test]
    fn test_absent_events_stay_null() {
        let feed = FeedMessage {
            header: create_header(),
            entity: vec![trip_entity(
                "a",
                vec![
                    stop("1", Some(event(1_700_000_100, 0)), None),
                    stop("2", None, Some(event(1_700_000_200, -30))),
                ],
            )],
        };

        let records = flatten_feed(&feed);
        assert_eq!(records[0].arrival_time, Some(1_700_000_100));
        assert_eq!(records[0].arrival_delay, Some(0));
        assert_eq!(records[0].departure_time, None);
        assert_eq!(records[0].departure_delay, None);

        assert_eq!(records[1].arrival_time, None);
        assert_eq!(records[1].arrival_delay, None);
        assert_eq!(records[1].departure_delay, Some(-30));
    }

    #[test]
    fn test_event_without_time_or_delay_stays_null() {
        let feed = FeedMessage {
            header: create_header(),
            entity: vec![trip_entity(
                "a",
                vec![stop("1", Some(StopTimeEvent::default()), None)],
            )],
        };

        let records = flatten_feed(&feed);
        assert_eq!(records[0].arrival_time, None);
        assert_eq!(records[0].arrival_delay, None);
        assert_eq!(records[0].arrival_instant(), None);
    }

    #[test]
    fn test_summary_counts() {
        let feed = FeedMessage {
            header: create_header(),
            entity: vec![
                trip_entity("a", vec![stop("1", None, None), stop("2", None, None)]),
                FeedEntity {
                    id: Some("x".to_string()),
                    ..Default::default()
                },
            ],
        };
        let records = flatten_feed(&feed);
        let summary = DecodeSummary::from_feed(&feed, records.len());

        assert_eq!(summary.entities, 2);
        assert_eq!(summary.trip_updates, 1);
        assert_eq!(summary.skipped_entities, 1);
        assert_eq!(summary.records, 2);
        assert_eq!(
            summary.feed_timestamp.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_instant_conversion() {
        assert_eq!(
            to_instant(Some(0)).map(|t| t.format(INSTANT_FORMAT).to_string()),
            Some("1970-01-01 00:00:00".to_string())
        );
        assert_eq!(to_instant(None), None);
        assert_eq!(to_instant(Some(i64::MAX)), None);
    }

    #[test]
    fn test_csv_rendering_of_nulls_and_instants() {
        let record = StopRecord {
            trip_id: "t1".to_string(),
            start_time: "08:00:00".to_string(),
            start_date: "20240301".to_string(),
            stop_id: "s1".to_string(),
            departure_time: None,
            departure_delay: None,
            arrival_time: Some(1_709_280_000),
            arrival_delay: Some(60),
        };

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(&record).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(
            out,
            "trip_id,start_time,start_date,stop_id,departure_time,departure_delay,arrival_time,arrival_delay\n\
             t1,08:00:00,20240301,s1,,,2024-03-01 08:00:00,60\n"
        );
    }
}
