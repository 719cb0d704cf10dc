//! FDSN data service access for seistomo.
//!
//! [`FdsnClient`] fetches the event bulletin (QuakeML) and station inventory
//! (StationXML) for an acquisition request. [`FdsnXmlParser`] turns the two
//! payloads into an [`ObservationBatch`](seistomo_core::ObservationBatch),
//! matching arrival picks into P/S pairs along the way.

pub mod client;
pub mod error;
pub mod matcher;
pub mod parser;
pub mod quakeml;
pub mod retry;
pub mod stationxml;

pub use client::{event_query, station_query, FdsnClient, FdsnPayloads};
pub use error::{FetchError, ParseError};
pub use matcher::{match_triplets, MatchedPair};
pub use parser::{FdsnXmlParser, ObservationParser, DEFAULT_REFERENCE_CHANNEL};
pub use retry::RetryPolicy;
