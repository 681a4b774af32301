//! Realtime pipeline: one binary GTFS-RT snapshot in, flat per-stop rows out.

pub mod feed;
pub mod records;
pub mod wire;

pub use feed::{FeedMessage, parse_feed};
pub use records::{DecodeSummary, DecodedSnapshot, StopRecord, decode_stop_records, flatten_feed};
