//! GTFS Realtime message model.
//!
//! Hand-written decoders for the part of `gtfs-realtime.proto` the stop-time
//! pipeline reads. Field numbers follow the published schema; fields not
//! listed here (vehicle positions, alerts, extensions, ...) are skipped.

use crate::error::DecodeError;
use crate::realtime::wire::{Field, WireMessage, required};

/// The contents of one feed snapshot.
///
/// Fields that are `required` in the schema are `Option`s here so that their
/// presence can be checked after all occurrences have been merged; a decoded
/// feed always has them set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedMessage {
    pub header: Option<FeedHeader>,
    pub entity: Vec<FeedEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedHeader {
    pub gtfs_realtime_version: Option<String>,
    /// 0 = FULL_DATASET, 1 = DIFFERENTIAL
    pub incrementality: Option<i32>,
    /// POSIX seconds at which the snapshot was produced.
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntity {
    pub id: Option<String>,
    pub is_deleted: Option<bool>,
    pub trip_update: Option<TripUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripUpdate {
    pub trip: Option<TripDescriptor>,
    pub stop_time_update: Vec<StopTimeUpdate>,
    pub timestamp: Option<u64>,
    pub delay: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripDescriptor {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<u32>,
    /// `HH:MM:SS`, may exceed 24h for trips past midnight.
    pub start_time: Option<String>,
    /// `YYYYMMDD`
    pub start_date: Option<String>,
    pub schedule_relationship: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopTimeUpdate {
    pub stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
    pub schedule_relationship: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopTimeEvent {
    /// Seconds, positive when late.
    pub delay: Option<i32>,
    /// POSIX seconds.
    pub time: Option<i64>,
    pub uncertainty: Option<i32>,
}

impl WireMessage for FeedMessage {
    const NAME: &'static str = "FeedMessage";

    fn merge_field(&mut self, field: Field<'_>) -> Result<(), DecodeError> {
        match field.tag {
            1 => field.merge_message(
                self.header.get_or_insert_default(),
                Self::NAME,
                "header",
            )?,
            2 => self.entity.push(field.message(Self::NAME, "entity")?),
            _ => {}
        }
        Ok(())
    }

    fn check_required(&self) -> Result<(), DecodeError> {
        required(self.header.as_ref(), Self::NAME, "header")?.check_required()?;
        self.entity.iter().try_for_each(FeedEntity::check_required)
    }
}

impl WireMessage for FeedHeader {
    const NAME: &'static str = "FeedHeader";

    fn merge_field(&mut self, field: Field<'_>) -> Result<(), DecodeError> {
        match field.tag {
            1 => self.gtfs_realtime_version = field.string(),
            2 => self.incrementality = field.int32(),
            3 => self.timestamp = field.uint64(),
            _ => {}
        }
        Ok(())
    }

    fn check_required(&self) -> Result<(), DecodeError> {
        required(
            self.gtfs_realtime_version.as_ref(),
            Self::NAME,
            "gtfs_realtime_version",
        )?;
        Ok(())
    }
}

impl WireMessage for FeedEntity {
    const NAME: &'static str = "FeedEntity";

    fn merge_field(&mut self, field: Field<'_>) -> Result<(), DecodeError> {
        match field.tag {
            1 => self.id = field.string(),
            2 => self.is_deleted = field.bool(),
            3 => field.merge_message(
                self.trip_update.get_or_insert_default(),
                Self::NAME,
                "trip_update",
            )?,
            _ => {}
        }
        Ok(())
    }

    fn check_required(&self) -> Result<(), DecodeError> {
        required(self.id.as_ref(), Self::NAME, "id")?;
        match &self.trip_update {
            Some(update) => update.check_required(),
            None => Ok(()),
        }
    }
}

impl WireMessage for TripUpdate {
    const NAME: &'static str = "TripUpdate";

    fn merge_field(&mut self, field: Field<'_>) -> Result<(), DecodeError> {
        match field.tag {
            1 => field.merge_message(self.trip.get_or_insert_default(), Self::NAME, "trip")?,
            2 => self
                .stop_time_update
                .push(field.message(Self::NAME, "stop_time_update")?),
            4 => self.timestamp = field.uint64(),
            5 => self.delay = field.int32(),
            _ => {}
        }
        Ok(())
    }

    fn check_required(&self) -> Result<(), DecodeError> {
        required(self.trip.as_ref(), Self::NAME, "trip")?;
        Ok(())
    }
}

impl WireMessage for TripDescriptor {
    const NAME: &'static str = "TripDescriptor";

    fn merge_field(&mut self, field: Field<'_>) -> Result<(), DecodeError> {
        match field.tag {
            1 => self.trip_id = field.string(),
            2 => self.start_time = field.string(),
            3 => self.start_date = field.string(),
            4 => self.schedule_relationship = field.int32(),
            5 => self.route_id = field.string(),
            6 => self.direction_id = field.uint32(),
            _ => {}
        }
        Ok(())
    }
}

impl WireMessage for StopTimeUpdate {
    const NAME: &'static str = "StopTimeUpdate";

    fn merge_field(&mut self, field: Field<'_>) -> Result<(), DecodeError> {
        match field.tag {
            1 => self.stop_sequence = field.uint32(),
            2 => field.merge_message(self.arrival.get_or_insert_default(), Self::NAME, "arrival")?,
            3 => field.merge_message(
                self.departure.get_or_insert_default(),
                Self::NAME,
                "departure",
            )?,
            4 => self.stop_id = field.string(),
            5 => self.schedule_relationship = field.int32(),
            _ => {}
        }
        Ok(())
    }
}

impl WireMessage for StopTimeEvent {
    const NAME: &'static str = "StopTimeEvent";

    fn merge_field(&mut self, field: Field<'_>) -> Result<(), DecodeError> {
        match field.tag {
            1 => self.delay = field.int32(),
            2 => self.time = field.int64(),
            3 => self.uncertainty = field.int32(),
            _ => {}
        }
        Ok(())
    }
}

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the framing is corrupt or truncated, if a nested
/// message is carried with the wrong wire type, or if a required field
/// (header, header version, entity id, trip descriptor) is missing.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, DecodeError> {
    FeedMessage::decode(bytes)
}
