use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::geo::{great_circle_km, Location};
use crate::measurement::duration_ms;
use crate::rank::RankedSet;
use crate::solve::MIN_SOLVER_POINTS;

pub const COHERENCE_SAMPLE: usize = 5;

const CLOSE_MS: u64 = 50;
const NEAR_MS: u64 = 100;
const FAR_MS: u64 = 200;

/// How closely one reference node's latency tracks the target's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Proximity {
    Close,
    Near,
    Far,
    Remote,
}

impl Proximity {
    pub fn of(delta: Duration) -> Self {
        if delta > Duration::from_millis(FAR_MS) {
            Proximity::Remote
        } else if delta > Duration::from_millis(NEAR_MS) {
            Proximity::Far
        } else if delta > Duration::from_millis(CLOSE_MS) {
            Proximity::Near
        } else {
            Proximity::Close
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Proximity::Close => "[+++]",
            Proximity::Near => "[++ ]",
            Proximity::Far => "[+  ]",
            Proximity::Remote => "[   ]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Coherence {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Coherence {
    pub fn of(mean_delta: Duration) -> Self {
        match Proximity::of(mean_delta) {
            Proximity::Close => Coherence::Excellent,
            Proximity::Near => Coherence::Good,
            Proximity::Far => Coherence::Fair,
            Proximity::Remote => Coherence::Poor,
        }
    }
}

impl fmt::Display for Coherence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Coherence::Excellent => "EXCELLENT",
            Coherence::Good => "GOOD",
            Coherence::Fair => "FAIR",
            Coherence::Poor => "POOR",
        };
        f.write_str(s)
    }
}

/// Mean delta over the first `min(k, len)` entries; zero for an empty set.
pub fn mean_top_delta(ranked: &RankedSet, k: usize) -> Duration {
    let top = ranked.top(k);
    if top.is_empty() {
        return Duration::ZERO;
    }
    let total: Duration = top.iter().map(|m| m.delta()).sum();
    total / top.len() as u32
}

/// Rough error radius in km for a given mean top delta.
pub fn precision_km(mean_delta: Duration) -> f64 {
    if mean_delta < Duration::from_millis(20) {
        100.0
    } else if mean_delta < Duration::from_millis(50) {
        200.0
    } else if mean_delta < Duration::from_millis(100) {
        300.0
    } else {
        500.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    #[serde(rename = "meanTopDeltaMs", with = "duration_ms")]
    pub mean_top_delta: Duration,
    pub coherence: Coherence,
    pub precision_km: f64,
    pub analyzed: usize,
}

impl Assessment {
    pub fn of(ranked: &RankedSet) -> Self {
        let mean = mean_top_delta(ranked, COHERENCE_SAMPLE);
        Self {
            mean_top_delta: mean,
            coherence: Coherence::of(mean),
            precision_km: precision_km(mean),
            analyzed: ranked.len(),
        }
    }
}

/// Great-circle sides of the trilateration triangle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Triangle {
    pub anchors: [String; 3],
    /// Sides 1-2, 1-3 and 2-3, in km.
    pub sides_km: [f64; 3],
    /// From the first anchor to the estimate.
    pub first_to_estimate_km: f64,
}

impl Triangle {
    pub fn of(ranked: &RankedSet, estimate: &Location) -> Option<Self> {
        let [a, b, c] = ranked.top(MIN_SOLVER_POINTS) else {
            return None;
        };
        let (a, b, c) = (a.node(), b.node(), c.node());
        Some(Self {
            anchors: [a.name.clone(), b.name.clone(), c.name.clone()],
            sides_km: [
                great_circle_km(a.lat, a.lon, b.lat, b.lon),
                great_circle_km(a.lat, a.lon, c.lat, c.lon),
                great_circle_km(b.lat, b.lon, c.lat, c.lon),
            ],
            first_to_estimate_km: great_circle_km(a.lat, a.lon, estimate.lat, estimate.lon),
        })
    }
}
