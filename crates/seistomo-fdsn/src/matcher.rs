//! Pairing of arrival picks into P/S detections.
//!
//! Picks are expected in groups of three per station (one per component).
//! Only picks on the reference channel take part in matching. The first such
//! pick seen for a station is remembered; every later one on the same
//! station closes a pair with that first pick.

use crate::error::ParseError;
use crate::quakeml::Pick;

/// Two picks on the same station, in document order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair<'a> {
    pub first: &'a Pick,
    pub second: &'a Pick,
}

/// Match the picks of one event.
///
/// Fails when the event's pick count is not a multiple of three.
pub fn match_triplets<'a>(
    event: &str,
    picks: &'a [Pick],
    reference_channel: &str,
) -> Result<Vec<MatchedPair<'a>>, ParseError> {
    if picks.len() % 3 != 0 {
        return Err(ParseError::IncompleteTriplets {
            event: event.to_string(),
            count: picks.len(),
        });
    }

    let mut seen: Vec<&Pick> = Vec::new();
    let mut pairs = Vec::new();

    for pick in picks.iter().filter(|p| p.channel == reference_channel) {
        if let Some(first) = seen.iter().copied().find(|s| s.station == pick.station) {
            pairs.push(MatchedPair {
                first,
                second: pick,
            });
        }
        seen.push(pick);
    }

    Ok(pairs)
}
