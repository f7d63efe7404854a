//! Latency-based geolocation: probe a target and a catalog of reference nodes,
//! rank the nodes by how closely their round-trip time matches the target's,
//! and turn the best matches into latitude/longitude estimates.

mod analysis;
mod assess;
mod catalog;
mod config;
mod distance;
mod error;
mod geo;
mod measurement;
mod orchestrate;
mod rank;
mod record;
mod solve;

pub use analysis::Analysis;
pub use assess::{
    mean_top_delta, precision_km, Assessment, Coherence, Proximity, Triangle, COHERENCE_SAMPLE,
};
pub use catalog::{Catalog, ReferenceNode};
pub use config::Config;
pub use distance::{rtt_to_distance_km, FIBER_SPEED_KM_S, SPEED_OF_LIGHT_KM_S};
pub use error::{ConfigError, ProbeError, RunError};
pub use geo::{cartesian_to_geo, geo_to_cartesian, great_circle_km, Location, EARTH_RADIUS_KM};
pub use measurement::Measurement;
pub use orchestrate::{run, NoProgress, ProbeOutcome, ProbePlan, ProbeTransport, ProgressObserver, RunReport};
pub use rank::{rank, summarize, CountryCount, RankedSet, Summary};
pub use record::{load_jsonl, now_unix_ms, read_jsonl, RunRecord};
pub use solve::{
    multilateration_weight, multilaterate, trilaterate, trilaterate_ranked,
    trilateration_weight, try_multilaterate, try_trilaterate, try_trilaterate_ranked,
    MIN_SOLVER_POINTS,
};
