//! Stations, events and detections.
//!
//! `*Record` types are what the parser produces; they carry names rather than
//! ids. The store resolves names to generated ids when it commits a batch and
//! hands back the persisted [`Station`], [`Event`] and [`Detection`] rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::TaskId;

/// Seismic phase of a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    P,
    S,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P => "P",
            Self::S => "S",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "P" | "p" => Ok(Self::P),
            "S" | "s" => Ok(Self::S),
            other => Err(CoreError::UnknownValue {
                kind: "phase",
                value: other.to_string(),
            }),
        }
    }
}

/// Station as read from an inventory document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub network: String,
    pub code: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Elevation above sea level, km.
    pub elevation_km: f64,
}

/// Event origin as read from a bulletin document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub network: String,
    pub time: DateTime<Utc>,
    pub magnitude: Option<f64>,
    pub longitude: f64,
    pub latitude: f64,
    /// Depth below sea level, km.
    pub depth_km: f64,
}

/// A matched pick, referencing its station by network and code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickRecord {
    pub network: String,
    pub station_code: String,
    pub phase: Phase,
    /// Seconds between origin time and arrival.
    pub arrival_offset: f64,
}

/// One bulletin event with its matched picks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventObservations {
    pub name: String,
    pub origin: EventRecord,
    /// Matched picks, in emission order.
    pub picks: Vec<PickRecord>,
}

/// Everything one acquisition run produces, committed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationBatch {
    /// One record per (network, code).
    pub stations: Vec<StationRecord>,
    /// Events in bulletin order.
    pub events: Vec<EventObservations>,
}

impl ObservationBatch {
    /// Total number of detections across all events.
    pub fn detection_count(&self) -> usize {
        self.events.iter().map(|e| e.picks.len()).sum()
    }

    pub fn event(&self, name: &str) -> Option<&EventObservations> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn event_mut(&mut self, name: &str) -> Option<&mut EventObservations> {
        self.events.iter_mut().find(|e| e.name == name)
    }
}

/// Persisted station. `x`/`y` are longitude/latitude in degrees, `z` is
/// elevation in km.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: i64,
    pub task_id: TaskId,
    pub network: String,
    pub code: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Persisted event. `x`/`y` are longitude/latitude in degrees, `z` is depth
/// in km.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub task_id: TaskId,
    pub name: String,
    pub time: DateTime<Utc>,
    pub magnitude: Option<f64>,
    pub network: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Persisted detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: i64,
    pub event_id: i64,
    pub station_id: i64,
    pub phase: Phase,
    pub arrival_offset: f64,
}

/// All observations stored for one task, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSet {
    pub stations: Vec<Station>,
    pub events: Vec<Event>,
    pub detections: Vec<Detection>,
}

impl ObservationSet {
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty() && self.events.is_empty() && self.detections.is_empty()
    }

    /// Arrival offsets of every detection with the given phase.
    pub fn arrival_times(&self, phase: Phase) -> Vec<f64> {
        self.detections
            .iter()
            .filter(|d| d.phase == phase)
            .map(|d| d.arrival_offset)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_parsing() {
        assert_eq!("P".parse::<Phase>().unwrap(), Phase::P);
        assert_eq!(" s ".parse::<Phase>().unwrap(), Phase::S);
        assert!("Pn".parse::<Phase>().is_err());
    }

    #[test]
    fn test_arrival_times_by_phase() {
        let detection = |id, phase, t| Detection {
            id,
            event_id: 1,
            station_id: 1,
            phase,
            arrival_offset: t,
        };
        let set = ObservationSet {
            stations: vec![],
            events: vec![],
            detections: vec![
                detection(1, Phase::P, 1.5),
                detection(2, Phase::S, 2.5),
                detection(3, Phase::P, 1.7),
            ],
        };
        assert_eq!(set.arrival_times(Phase::P), vec![1.5, 1.7]);
        assert_eq!(set.arrival_times(Phase::S), vec![2.5]);
    }
}
