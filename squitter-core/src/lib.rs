//! squitter-core: Pure decode + tracking library for ADS-B extended squitter.
//!
//! No async, no I/O beyond the config file. Raw captures go in through the
//! capture queue or [`AircraftDirectory::ingest_packet`]; aircraft records
//! come out of the directory accessors. Used by `squitter-feeder`.

pub mod aircraft;
pub mod capture;
pub mod config;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod directory;
pub mod frame;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export commonly used types at crate root
pub use aircraft::{AircraftRecord, PositionUpdate};
pub use capture::CaptureQueue;
pub use config::{AdmissionPolicy, Config};
pub use cpr::{CprPairing, Fix};
pub use decode::decode_me;
pub use directory::{AircraftDirectory, DirectoryStats, IngestOutcome};
pub use frame::{parse_hex, parse_message, DecodedMessage, RawMessage};
pub use types::*;
