//! Minimal FDSN StationXML decoding: network and station codes plus
//! station coordinates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use seistomo_core::StationRecord;
use serde::Deserialize;

use crate::error::ParseError;
use crate::quakeml::parse_time;

const DOCUMENT: &str = "StationXML";

/// Decode every station of every network in an inventory document, one
/// record per (network, code). Elevations are converted from metres to km.
pub fn parse_inventory(payload: &[u8]) -> Result<Vec<StationRecord>, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|source| ParseError::Encoding {
        document: DOCUMENT,
        source,
    })?;

    let doc: XmlFdsnStationXml =
        quick_xml::de::from_str(text).map_err(|e| ParseError::Malformed {
            document: DOCUMENT,
            message: e.to_string(),
        })?;

    // Inventories repeat a station once per epoch; keep the latest one in
    // the position where the station first appeared.
    let mut stations: Vec<StationRecord> = Vec::new();
    let mut epochs: Vec<Option<DateTime<Utc>>> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for network in doc.networks {
        for station in network.stations {
            let start = station.start_date.as_deref().map(parse_time).transpose()?;
            let record = StationRecord {
                network: network.code.clone(),
                code: station.code,
                longitude: station.longitude.value,
                latitude: station.latitude.value,
                elevation_km: station.elevation.value / 1000.0,
            };

            let key = (record.network.clone(), record.code.clone());
            match index.get(&key) {
                Some(&i) => {
                    if start >= epochs[i] {
                        stations[i] = record;
                        epochs[i] = start;
                    }
                }
                None => {
                    index.insert(key, stations.len());
                    stations.push(record);
                    epochs.push(start);
                }
            }
        }
    }

    Ok(stations)
}

#[derive(Debug, Deserialize)]
struct XmlFdsnStationXml {
    #[serde(rename = "Network", default)]
    networks: Vec<XmlNetwork>,
}

#[derive(Debug, Deserialize)]
struct XmlNetwork {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "Station", default)]
    stations: Vec<XmlStation>,
}

#[derive(Debug, Deserialize)]
struct XmlStation {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "@startDate")]
    start_date: Option<String>,
    #[serde(rename = "Latitude")]
    latitude: XmlMeasure,
    #[serde(rename = "Longitude")]
    longitude: XmlMeasure,
    #[serde(rename = "Elevation")]
    elevation: XmlMeasure,
}

#[derive(Debug, Deserialize)]
struct XmlMeasure {
    #[serde(rename = "$text")]
    value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<FDSNStationXML xmlns="http://www.fdsn.org/xml/station/1" schemaVersion="1.1">
  <Source>local</Source>
  <Created>2024-03-01T00:00:00</Created>
  <Network code="XX" startDate="2020-01-01T00:00:00">
    <Description>Test network</Description>
    <Station code="ST01" startDate="2020-01-01T00:00:00">
      <Latitude unit="DEGREES">70.0</Latitude>
      <Longitude>30.0</Longitude>
      <Elevation>250.0</Elevation>
      <Site><Name>One</Name></Site>
    </Station>
    <TotalNumberStations>2</TotalNumberStations>
    <Station code="ST02">
      <Latitude>70.5</Latitude>
      <Longitude>30.5</Longitude>
      <Elevation>-20</Elevation>
    </Station>
  </Network>
</FDSNStationXML>"#;

    #[test]
    fn test_parse_inventory() {
        let stations = parse_inventory(INVENTORY.as_bytes()).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].network, "XX");
        assert_eq!(stations[0].code, "ST01");
        assert_eq!(stations[0].latitude, 70.0);
        assert_eq!(stations[0].elevation_km, 0.25);
        assert_eq!(stations[1].code, "ST02");
        assert_eq!(stations[1].elevation_km, -0.02);
    }

    #[test]
    fn test_repeated_epochs_keep_latest() {
        let doc = r#"<FDSNStationXML>
  <Network code="XX">
    <Station code="ST01" startDate="2021-06-01T00:00:00">
      <Latitude>70.1</Latitude><Longitude>30.1</Longitude><Elevation>300</Elevation>
    </Station>
    <Station code="ST02">
      <Latitude>70.5</Latitude><Longitude>30.5</Longitude><Elevation>10</Elevation>
    </Station>
    <Station code="ST01" startDate="2019-01-01T00:00:00">
      <Latitude>70.0</Latitude><Longitude>30.0</Longitude><Elevation>250</Elevation>
    </Station>
  </Network>
  <Network code="YY">
    <Station code="ST01">
      <Latitude>60.0</Latitude><Longitude>10.0</Longitude><Elevation>0</Elevation>
    </Station>
  </Network>
</FDSNStationXML>"#;

        let stations = parse_inventory(doc.as_bytes()).unwrap();
        let keys: Vec<(&str, &str)> = stations
            .iter()
            .map(|s| (s.network.as_str(), s.code.as_str()))
            .collect();
        assert_eq!(keys, vec![("XX", "ST01"), ("XX", "ST02"), ("YY", "ST01")]);
        assert_eq!(stations[0].latitude, 70.1);
        assert_eq!(stations[0].elevation_km, 0.3);
    }

    #[test]
    fn test_later_epoch_in_document_wins_without_dates() {
        let doc = r#"<FDSNStationXML><Network code="XX">
    <Station code="ST01"><Latitude>70.0</Latitude><Longitude>30.0</Longitude><Elevation>0</Elevation></Station>
    <Station code="ST01"><Latitude>71.0</Latitude><Longitude>31.0</Longitude><Elevation>0</Elevation></Station>
</Network></FDSNStationXML>"#;
        let stations = parse_inventory(doc.as_bytes()).unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].latitude, 71.0);
    }

    #[test]
    fn test_invalid_utf8() {
        let err = parse_inventory(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ParseError::Encoding { .. }));
    }
}
