//! Acquisition request owned by a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// What to fetch from the data service for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    /// Start of the bulletin time window.
    pub start_time: DateTime<Utc>,

    /// End of the bulletin time window.
    pub end_time: DateTime<Utc>,

    /// Network code used for the inventory query.
    pub network: String,

    /// Optional geographic restriction for the bulletin query.
    #[serde(flatten)]
    pub bbox: BoundingBox,
}

/// Geographic bounding box; every edge is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_longitude: Option<f64>,
}

impl BoundingBox {
    /// True when no edge is set.
    pub fn is_empty(&self) -> bool {
        self.min_latitude.is_none()
            && self.max_latitude.is_none()
            && self.min_longitude.is_none()
            && self.max_longitude.is_none()
    }

    fn validate(&self) -> Result<(), CoreError> {
        for (name, value, limit) in [
            ("min_latitude", self.min_latitude, 90.0),
            ("max_latitude", self.max_latitude, 90.0),
            ("min_longitude", self.min_longitude, 180.0),
            ("max_longitude", self.max_longitude, 180.0),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v.abs() > limit {
                    return Err(CoreError::InvalidInput(format!(
                        "{} must be within ±{}, got {}",
                        name, limit, v
                    )));
                }
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_latitude, self.max_latitude) {
            if lo > hi {
                return Err(CoreError::InvalidInput(format!(
                    "min_latitude {} is greater than max_latitude {}",
                    lo, hi
                )));
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_longitude, self.max_longitude) {
            if lo > hi {
                return Err(CoreError::InvalidInput(format!(
                    "min_longitude {} is greater than max_longitude {}",
                    lo, hi
                )));
            }
        }
        Ok(())
    }
}

impl AcquisitionRequest {
    /// Create a request without a bounding box.
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            start_time,
            end_time,
            network: network.into(),
            bbox: BoundingBox::default(),
        }
    }

    /// Builder method to set the bounding box.
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }

    /// Check the request before it is persisted.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.network.trim().is_empty() {
            return Err(CoreError::InvalidInput("network is required".to_string()));
        }
        if self.start_time >= self.end_time {
            return Err(CoreError::InvalidInput(format!(
                "start_time {} must be before end_time {}",
                self.start_time, self.end_time
            )));
        }
        self.bbox.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day() -> AcquisitionRequest {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        AcquisitionRequest::new(start, start + Duration::days(1), "XX")
    }

    #[test]
    fn test_valid_request() {
        assert!(day().validate().is_ok());
    }

    #[test]
    fn test_empty_network_rejected() {
        let mut req = day();
        req.network = "  ".to_string();
        assert!(matches!(req.validate(), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut req = day();
        std::mem::swap(&mut req.start_time, &mut req.end_time);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_bbox_checks() {
        let req = day().with_bbox(BoundingBox {
            min_latitude: Some(72.0),
            max_latitude: Some(71.0),
            ..Default::default()
        });
        assert!(req.validate().is_err());

        let req = day().with_bbox(BoundingBox {
            max_longitude: Some(200.0),
            ..Default::default()
        });
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_bbox_is_flattened_in_json() {
        let json = serde_json::json!({
            "start_time": "2024-03-01T00:00:00Z",
            "end_time": "2024-03-02T00:00:00Z",
            "network": "XX",
            "min_latitude": 70.5
        });
        let req: AcquisitionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.bbox.min_latitude, Some(70.5));
        assert!(req.bbox.max_latitude.is_none());
        assert!(!req.bbox.is_empty());
    }
}
