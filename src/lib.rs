pub mod archive;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod output;
pub mod realtime;
pub mod schedule;
