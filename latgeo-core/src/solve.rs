//! Position solvers over a ranked set.
//!
//! Both solvers are weighted centroids rather than true sphere intersection:
//! they pull the estimate toward the reference nodes whose latency is closest
//! to the target's. With fewer than three measurements they have nothing
//! meaningful to say; the `try_` forms return `None` and the plain forms
//! return `Location::SENTINEL`.

use crate::catalog::ReferenceNode;
use crate::geo::{cartesian_to_geo, geo_to_cartesian, Location, EARTH_RADIUS_KM};
use crate::rank::RankedSet;

pub const MIN_SOLVER_POINTS: usize = 3;

const DEGENERATE_CENTROID_RATIO: f64 = 1e-9;

/// Weight of a trilateration anchor; the +1 keeps a zero distance finite.
pub fn trilateration_weight(distance_km: f64) -> f64 {
    1.0 / (distance_km + 1.0)
}

/// Weight of a multilateration entry from its delta in whole milliseconds.
pub fn multilateration_weight(delta_ms: u128) -> f64 {
    1.0 / (delta_ms as f64 + 1.0)
}

/// Weighted 3D centroid of three anchors, projected back onto the sphere.
///
/// Returns `None` only when the centroid lands on the Earth's center, which
/// leaves no direction to project along.
pub fn try_trilaterate(anchors: [(&ReferenceNode, f64); 3]) -> Option<Location> {
    let mut sum = (0.0, 0.0, 0.0);
    let mut total_weight = 0.0;
    for (node, distance_km) in anchors {
        let (x, y, z) = geo_to_cartesian(node.lat, node.lon);
        let w = trilateration_weight(distance_km);
        sum.0 += x * w;
        sum.1 += y * w;
        sum.2 += z * w;
        total_weight += w;
    }
    let (x, y, z) = (
        sum.0 / total_weight,
        sum.1 / total_weight,
        sum.2 / total_weight,
    );

    let norm = (x * x + y * y + z * z).sqrt();
    if !norm.is_finite() || norm < EARTH_RADIUS_KM * DEGENERATE_CENTROID_RATIO {
        return None;
    }
    let scale = EARTH_RADIUS_KM / norm;
    let (lat, lon) = cartesian_to_geo(x * scale, y * scale, z * scale);
    Some(Location::new(lat, lon))
}

pub fn trilaterate(anchors: [(&ReferenceNode, f64); 3]) -> Location {
    try_trilaterate(anchors).unwrap_or(Location::SENTINEL)
}

/// Trilateration over the three lowest-delta entries.
pub fn try_trilaterate_ranked(ranked: &RankedSet) -> Option<Location> {
    let [a, b, c] = ranked.top(MIN_SOLVER_POINTS) else {
        return None;
    };
    try_trilaterate([
        (a.node(), a.distance_km()),
        (b.node(), b.distance_km()),
        (c.node(), c.distance_km()),
    ])
}

pub fn trilaterate_ranked(ranked: &RankedSet) -> Location {
    try_trilaterate_ranked(ranked).unwrap_or(Location::SENTINEL)
}

/// Weighted mean of latitude and longitude over the top `count` entries.
///
/// This is a flat approximation; it only holds up because the best latency
/// matches tend to sit close together. It also does not handle the
/// antimeridian.
pub fn try_multilaterate(ranked: &RankedSet, count: usize) -> Option<Location> {
    if ranked.len() < MIN_SOLVER_POINTS || count == 0 {
        return None;
    }

    let mut total_lat = 0.0;
    let mut total_lon = 0.0;
    let mut total_weight = 0.0;
    for m in ranked.top(count) {
        let w = multilateration_weight(m.delta().as_millis());
        total_lat += m.node().lat * w;
        total_lon += m.node().lon * w;
        total_weight += w;
    }
    Some(Location::new(
        total_lat / total_weight,
        total_lon / total_weight,
    ))
}

pub fn multilaterate(ranked: &RankedSet, count: usize) -> Location {
    try_multilaterate(ranked, count).unwrap_or(Location::SENTINEL)
}
