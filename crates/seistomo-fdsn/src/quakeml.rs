//! Minimal QuakeML decoding.
//!
//! Only the elements the pipeline consumes are read: event ids, picks
//! (time, waveform id, phase hint), origins (time, position, depth) and
//! magnitudes. Everything else in the document is skipped.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::ParseError;

const DOCUMENT: &str = "QuakeML";

/// One bulletin event with its picks in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct BulletinEvent {
    pub public_id: Option<String>,
    pub origins: Vec<Origin>,
    pub magnitudes: Vec<f64>,
    pub picks: Vec<Pick>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub time: DateTime<Utc>,
    pub longitude: f64,
    pub latitude: f64,
    /// Depth in metres, as QuakeML reports it.
    pub depth_m: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    pub time: DateTime<Utc>,
    pub network: String,
    pub station: String,
    pub channel: String,
    pub phase_hint: Option<String>,
}

/// Decode every event of a QuakeML document.
pub fn parse_bulletin(payload: &[u8]) -> Result<Vec<BulletinEvent>, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|source| ParseError::Encoding {
        document: DOCUMENT,
        source,
    })?;

    let doc: XmlQuakeMl = quick_xml::de::from_str(text).map_err(|e| ParseError::Malformed {
        document: DOCUMENT,
        message: e.to_string(),
    })?;

    let Some(parameters) = doc.event_parameters else {
        return Ok(Vec::new());
    };

    parameters
        .events
        .into_iter()
        .map(BulletinEvent::try_from)
        .collect()
}

impl TryFrom<XmlEvent> for BulletinEvent {
    type Error = ParseError;

    fn try_from(event: XmlEvent) -> Result<Self, Self::Error> {
        let origins = event
            .origins
            .into_iter()
            .map(|o| {
                Ok(Origin {
                    time: parse_time(&o.time.value)?,
                    longitude: o.longitude.value,
                    latitude: o.latitude.value,
                    depth_m: o.depth.map(|d| d.value).unwrap_or(0.0),
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        let picks = event
            .picks
            .into_iter()
            .map(|p| {
                Ok(Pick {
                    time: parse_time(&p.time.value)?,
                    network: p.waveform_id.network_code,
                    station: p.waveform_id.station_code,
                    channel: p.waveform_id.channel_code.unwrap_or_default(),
                    phase_hint: p.phase_hint.map(|h| h.trim().to_string()),
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(Self {
            public_id: event.public_id,
            origins,
            magnitudes: event.magnitudes.into_iter().map(|m| m.mag.value).collect(),
            picks,
        })
    }
}

/// Parse a QuakeML timestamp. A missing zone designator means UTC.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, ParseError> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|t| t.and_utc())
        .map_err(|_| ParseError::Timestamp {
            value: value.to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct XmlQuakeMl {
    #[serde(rename = "eventParameters")]
    event_parameters: Option<XmlEventParameters>,
}

#[derive(Debug, Deserialize)]
struct XmlEventParameters {
    #[serde(rename = "event", default)]
    events: Vec<XmlEvent>,
}

#[derive(Debug, Deserialize)]
struct XmlEvent {
    #[serde(rename = "@publicID")]
    public_id: Option<String>,
    #[serde(rename = "pick", default)]
    picks: Vec<XmlPick>,
    #[serde(rename = "origin", default)]
    origins: Vec<XmlOrigin>,
    #[serde(rename = "magnitude", default)]
    magnitudes: Vec<XmlMagnitude>,
}

#[derive(Debug, Deserialize)]
struct XmlPick {
    time: XmlTimeQuantity,
    #[serde(rename = "waveformID")]
    waveform_id: XmlWaveformId,
    #[serde(rename = "phaseHint")]
    phase_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlWaveformId {
    #[serde(rename = "@networkCode")]
    network_code: String,
    #[serde(rename = "@stationCode")]
    station_code: String,
    #[serde(rename = "@channelCode")]
    channel_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlOrigin {
    time: XmlTimeQuantity,
    latitude: XmlRealQuantity,
    longitude: XmlRealQuantity,
    depth: Option<XmlRealQuantity>,
}

#[derive(Debug, Deserialize)]
struct XmlMagnitude {
    mag: XmlRealQuantity,
}

#[derive(Debug, Deserialize)]
struct XmlTimeQuantity {
    value: String,
}

#[derive(Debug, Deserialize)]
struct XmlRealQuantity {
    value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BULLETIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<q:quakeml xmlns:q="http://quakeml.org/xmlns/quakeml/1.2" xmlns="http://quakeml.org/xmlns/bed/1.2">
  <eventParameters publicID="smi:local/catalog">
    <event publicID="smi:local/event/1">
      <pick publicID="smi:local/pick/1">
        <time><value>2024-03-01T10:00:02.5Z</value></time>
        <waveformID networkCode="XX" stationCode="ST01" channelCode="HHN"/>
        <phaseHint>P</phaseHint>
      </pick>
      <origin publicID="smi:local/origin/1">
        <time><value>2024-03-01T10:00:00Z</value><uncertainty>0.1</uncertainty></time>
        <latitude><value>70.1</value></latitude>
        <longitude><value>30.2</value></longitude>
        <depth><value>5000</value></depth>
      </origin>
      <pick publicID="smi:local/pick/2">
        <time><value>2024-03-01T10:00:04.25</value></time>
        <waveformID networkCode="XX" stationCode="ST01" channelCode="HHE"/>
        <phaseHint>S</phaseHint>
      </pick>
      <magnitude publicID="smi:local/mag/1">
        <mag><value>1.7</value></mag>
      </magnitude>
    </event>
    <event publicID="smi:local/event/2"/>
  </eventParameters>
</q:quakeml>"#;

    #[test]
    fn test_parse_bulletin() {
        let events = parse_bulletin(BULLETIN.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);

        let event = &events[0];
        assert_eq!(event.public_id.as_deref(), Some("smi:local/event/1"));
        assert_eq!(event.picks.len(), 2);
        assert_eq!(event.picks[0].station, "ST01");
        assert_eq!(event.picks[0].channel, "HHN");
        assert_eq!(event.picks[1].phase_hint.as_deref(), Some("S"));
        assert_eq!(event.magnitudes, vec![1.7]);

        let origin = &event.origins[0];
        assert_eq!(origin.depth_m, 5000.0);
        assert_eq!(origin.latitude, 70.1);
        assert_eq!(
            origin.time,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );

        assert!(events[1].picks.is_empty());
        assert!(events[1].origins.is_empty());
    }

    #[test]
    fn test_empty_document() {
        let events = parse_bulletin(b"<q:quakeml xmlns:q=\"x\"></q:quakeml>").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_malformed_document() {
        let err = parse_bulletin(b"<q:quakeml><eventParameters><event>").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_parse_time_without_zone() {
        let t = parse_time("2024-03-01T10:00:04.25").unwrap();
        assert_eq!(t.timestamp_millis() % 1000, 250);
        assert!(parse_time("yesterday").is_err());
    }
}
