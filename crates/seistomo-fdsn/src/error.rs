//! Error types for the FDSN client and parsers.

use thiserror::Error;

/// Errors that can occur when fetching from the data service.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure that survived every retry.
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered outside the success range.
    #[error("request to {url} returned HTTP {status} after {attempts} attempt(s)")]
    Status {
        url: String,
        status: u16,
        attempts: u32,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors raised while turning raw payloads into observations.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Payload is not valid UTF-8.
    #[error("{document} payload is not valid UTF-8: {source}")]
    Encoding {
        document: &'static str,
        #[source]
        source: std::str::Utf8Error,
    },

    /// Payload does not follow the expected document structure.
    #[error("malformed {document}: {message}")]
    Malformed {
        document: &'static str,
        message: String,
    },

    /// An event's picks cannot be split into complete triplets.
    #[error("event {event} has {count} picks, which is not a multiple of 3")]
    IncompleteTriplets { event: String, count: usize },

    /// A matched pick names a phase other than P or S.
    #[error("event {event}: unsupported phase {phase:?} on station {station}")]
    UnknownPhase {
        event: String,
        station: String,
        phase: String,
    },

    /// A matched pick refers to a station missing from the inventory.
    #[error("event {event}: station {station} is not in the inventory")]
    UnknownStation { event: String, station: String },

    /// A timestamp could not be parsed.
    #[error("invalid timestamp {value:?}")]
    Timestamp { value: String },
}
