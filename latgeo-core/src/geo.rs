use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees.
///
/// `Location::SENTINEL` (0, 0) is what the solvers return when they are handed
/// too little data. It is a valid coordinate in the Gulf of Guinea as well, so
/// callers that need to tell the two apart should use the `try_` solver forms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub const SENTINEL: Location = Location { lat: 0.0, lon: 0.0 };

    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_sentinel(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }

    pub fn distance_km(&self, other: &Location) -> f64 {
        great_circle_km(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Haversine distance on a sphere of radius `EARTH_RADIUS_KM`.
pub fn great_circle_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Earth-centered coordinates (km) of a point on the sphere surface.
pub fn geo_to_cartesian(lat: f64, lon: f64) -> (f64, f64, f64) {
    let lat = lat.to_radians();
    let lon = lon.to_radians();
    let x = EARTH_RADIUS_KM * lat.cos() * lon.cos();
    let y = EARTH_RADIUS_KM * lat.cos() * lon.sin();
    let z = EARTH_RADIUS_KM * lat.sin();
    (x, y, z)
}

pub fn cartesian_to_geo(x: f64, y: f64, z: f64) -> (f64, f64) {
    let lon = y.atan2(x).to_degrees();
    let lat = z.atan2(x.hypot(y)).to_degrees();
    (lat, lon)
}
