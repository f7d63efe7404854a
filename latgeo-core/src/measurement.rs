use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::ReferenceNode;
use crate::distance::rtt_to_distance_km;

/// One successful reference probe, compared against the target.
///
/// Built once by the orchestrator and never changed afterwards. `delta` is the
/// absolute RTT difference, so it and `distance_km` are never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "MeasurementRecord")]
pub struct Measurement {
    node: ReferenceNode,
    #[serde(rename = "rttMs", with = "duration_ms")]
    rtt: Duration,
    #[serde(rename = "deltaMs", with = "duration_ms")]
    delta: Duration,
    distance_km: f64,
}

impl Measurement {
    pub fn new(node: ReferenceNode, rtt: Duration, target_rtt: Duration) -> Self {
        let delta = if rtt >= target_rtt {
            rtt - target_rtt
        } else {
            target_rtt - rtt
        };
        Self {
            node,
            rtt,
            delta,
            distance_km: rtt_to_distance_km(delta),
        }
    }

    pub fn node(&self) -> &ReferenceNode {
        &self.node
    }

    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    /// Rebuilds delta and distance against another target RTT.
    pub(crate) fn rebase(self, target_rtt: Duration) -> Self {
        Self::new(self.node, self.rtt, target_rtt)
    }
}

/// Wire form of a measurement. Distance is re-derived from the delta on load.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeasurementRecord {
    node: ReferenceNode,
    #[serde(rename = "rttMs", with = "duration_ms")]
    rtt: Duration,
    #[serde(rename = "deltaMs", with = "duration_ms")]
    delta: Duration,
    distance_km: f64,
}

impl TryFrom<MeasurementRecord> for Measurement {
    type Error = String;

    fn try_from(rec: MeasurementRecord) -> Result<Self, Self::Error> {
        if !rec.distance_km.is_finite() || rec.distance_km < 0.0 {
            return Err(format!("invalid distance {}km", rec.distance_km));
        }
        Ok(Self {
            node: rec.node,
            rtt: rec.rtt,
            delta: rec.delta,
            distance_km: rtt_to_distance_km(rec.delta),
        })
    }
}

/// Durations as fractional milliseconds on the wire.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    const NANOS_PER_MS: f64 = 1_000_000.0;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_nanos() as f64 / NANOS_PER_MS)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(D::Error::custom(format!("invalid duration {ms}ms")));
        }
        Ok(Duration::from_nanos((ms * NANOS_PER_MS).round() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, lat: f64, lon: f64) -> ReferenceNode {
        ReferenceNode {
            name: name.to_string(),
            address: "192.0.2.1".to_string(),
            country: "Test".to_string(),
            city: "Test".to_string(),
            lat,
            lon,
        }
    }

    #[test]
    fn delta_is_absolute_difference() {
        let target = Duration::from_millis(40);
        let faster = Measurement::new(node("a", 0.0, 0.0), Duration::from_millis(25), target);
        let slower = Measurement::new(node("b", 0.0, 0.0), Duration::from_millis(55), target);
        assert_eq!(faster.delta(), Duration::from_millis(15));
        assert_eq!(slower.delta(), Duration::from_millis(15));
        assert_eq!(faster.distance_km(), slower.distance_km());
        assert!(faster.distance_km() > 0.0);
    }

    #[test]
    fn equal_rtt_gives_zero_distance() {
        let rtt = Duration::from_millis(12);
        let m = Measurement::new(node("a", 0.0, 0.0), rtt, rtt);
        assert_eq!(m.delta(), Duration::ZERO);
        assert_eq!(m.distance_km(), 0.0);
    }

    #[test]
    fn serializes_durations_as_milliseconds() {
        let m = Measurement::new(
            node("a", 1.0, 2.0),
            Duration::from_micros(12_500),
            Duration::from_millis(10),
        );
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["rttMs"], 12.5);
        assert_eq!(value["deltaMs"], 2.5);
        assert_eq!(value["node"]["name"], "a");
        let back: Measurement = serde_json::from_value(value).unwrap();
        assert_eq!(back.delta(), Duration::from_micros(2_500));
    }

    #[test]
    fn negative_milliseconds_are_rejected() {
        let json = r#"{"node": {"name": "a", "address": "x", "country": "c", "city": "c",
            "lat": 0.0, "lon": 0.0}, "rttMs": -1.0, "deltaMs": 0.0, "distanceKm": 0.0}"#;
        assert!(serde_json::from_str::<Measurement>(json).is_err());
    }

    fn with_distance(distance: &str) -> String {
        format!(
            r#"{{"node": {{"name": "a", "address": "x", "country": "c", "city": "c",
            "lat": 0.0, "lon": 0.0}}, "rttMs": 5.0, "deltaMs": 2.0, "distanceKm": {distance}}}"#
        )
    }

    #[test]
    fn negative_distance_is_rejected() {
        assert!(serde_json::from_str::<Measurement>(&with_distance("-1.0")).is_err());
    }

    #[test]
    fn loaded_distance_follows_delta() {
        let m: Measurement = serde_json::from_str(&with_distance("12345.0")).unwrap();
        assert_eq!(m.delta(), Duration::from_millis(2));
        assert_eq!(m.distance_km(), rtt_to_distance_km(Duration::from_millis(2)));
    }

    #[test]
    fn rebase_recomputes_delta() {
        let m = Measurement::new(node("a", 0.0, 0.0), Duration::from_millis(5), Duration::from_millis(999));
        let m = m.rebase(Duration::from_millis(3));
        assert_eq!(m.delta(), Duration::from_millis(2));
        assert_eq!(m.distance_km(), rtt_to_distance_km(Duration::from_millis(2)));
    }
}
