use std::time::Duration;

pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;
pub const FIBER_VELOCITY_FACTOR: f64 = 0.67;
pub const FIBER_SPEED_KM_S: f64 = SPEED_OF_LIGHT_KM_S * FIBER_VELOCITY_FACTOR;

/// Converts a latency delta into a one-way distance estimate in km.
///
/// This is a rough proxy, not a measurement: the whole delta is attributed to
/// propagation through fiber at 67% of light speed, with no allowance for
/// processing or queueing delay and no outlier handling. The halving turns a
/// round-trip time into a one-way distance.
pub fn rtt_to_distance_km(delta: Duration) -> f64 {
    delta.as_secs_f64() * FIBER_SPEED_KM_S / 2.0
}
