//! Turning raw bulletin and inventory payloads into an observation batch.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use seistomo_core::{EventObservations, EventRecord, ObservationBatch, Phase, PickRecord};
use tracing::debug;

use crate::error::ParseError;
use crate::matcher::match_triplets;
use crate::quakeml::{parse_bulletin, BulletinEvent, Pick};
use crate::stationxml::parse_inventory;

/// Channel whose picks are paired by default.
pub const DEFAULT_REFERENCE_CHANNEL: &str = "HHN";

/// Converts the two fetched payloads into stations, events and detections.
///
/// Implementations are CPU-bound and synchronous; callers run them on the
/// blocking pool.
pub trait ObservationParser: Send + Sync {
    fn parse(&self, bulletin: &[u8], inventory: &[u8]) -> Result<ObservationBatch, ParseError>;
}

/// Parser for QuakeML bulletins and StationXML inventories.
#[derive(Debug, Clone)]
pub struct FdsnXmlParser {
    reference_channel: String,
}

impl Default for FdsnXmlParser {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_CHANNEL)
    }
}

impl FdsnXmlParser {
    pub fn new(reference_channel: impl Into<String>) -> Self {
        Self {
            reference_channel: reference_channel.into(),
        }
    }

    pub fn reference_channel(&self) -> &str {
        &self.reference_channel
    }
}

impl ObservationParser for FdsnXmlParser {
    fn parse(&self, bulletin: &[u8], inventory: &[u8]) -> Result<ObservationBatch, ParseError> {
        let stations = parse_inventory(inventory)?;
        let events = parse_bulletin(bulletin)?;

        let known: HashSet<(&str, &str)> = stations
            .iter()
            .map(|s| (s.network.as_str(), s.code.as_str()))
            .collect();
        let mut batch = ObservationBatch::default();

        for (index, event) in events.iter().enumerate() {
            let name = event_name(event, index, &batch);

            let pairs = match_triplets(&name, &event.picks, &self.reference_channel)?;
            let Some(origin) = event.origins.first() else {
                debug!(event = %name, "Skipping event without origin");
                continue;
            };
            if pairs.is_empty() {
                debug!(event = %name, "Skipping event without matched picks");
                continue;
            }

            let mut picks = Vec::with_capacity(pairs.len() * 2);
            for pair in &pairs {
                for pick in [pair.first, pair.second] {
                    if !known.contains(&(pick.network.as_str(), pick.station.as_str())) {
                        return Err(ParseError::UnknownStation {
                            event: name.clone(),
                            station: format!("{}.{}", pick.network, pick.station),
                        });
                    }
                    picks.push(PickRecord {
                        network: pick.network.clone(),
                        station_code: pick.station.clone(),
                        phase: pick_phase(&name, pick)?,
                        arrival_offset: arrival_offset(origin.time, pick.time),
                    });
                }
            }

            batch.events.push(EventObservations {
                name,
                origin: EventRecord {
                    network: pairs[0].first.network.clone(),
                    time: origin.time,
                    magnitude: event.magnitudes.first().copied(),
                    longitude: origin.longitude,
                    latitude: origin.latitude,
                    depth_km: origin.depth_m / 1000.0,
                },
                picks,
            });
        }

        batch.stations = stations;
        debug!(
            stations = batch.stations.len(),
            events = batch.events.len(),
            detections = batch.detection_count(),
            "Parsed observations"
        );
        Ok(batch)
    }
}

/// Event public id, or its position in the bulletin when it has none.
fn event_name(event: &BulletinEvent, index: usize, batch: &ObservationBatch) -> String {
    match &event.public_id {
        Some(id) if batch.event(id).is_none() => id.clone(),
        Some(id) => format!("{}#{}", id, index),
        None => format!("event-{}", index),
    }
}

fn pick_phase(event: &str, pick: &Pick) -> Result<Phase, ParseError> {
    let hint = pick.phase_hint.as_deref().unwrap_or_default();
    hint.parse().map_err(|_| ParseError::UnknownPhase {
        event: event.to_string(),
        station: pick.station.clone(),
        phase: hint.to_string(),
    })
}

/// Seconds between origin and arrival, rounded to 1e-4 s.
fn arrival_offset(origin: DateTime<Utc>, arrival: DateTime<Utc>) -> f64 {
    let delta = arrival - origin;
    let seconds = match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    };
    (seconds.abs() * 1e4).round() / 1e4
}
