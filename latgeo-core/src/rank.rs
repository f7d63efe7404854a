use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::measurement::{duration_ms, Measurement};

/// Measurements in ascending delta order, closest latency match first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedSet(Vec<Measurement>);

impl RankedSet {
    pub fn as_slice(&self) -> &[Measurement] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.0.iter()
    }

    /// The first `n` entries, or all of them when there are fewer.
    pub(crate) fn into_vec(self) -> Vec<Measurement> {
        self.0
    }

    pub fn top(&self, n: usize) -> &[Measurement] {
        &self.0[..n.min(self.0.len())]
    }
}

impl<'a> IntoIterator for &'a RankedSet {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Stable sort by delta: equal deltas keep their input (catalog) order.
pub fn rank(mut measurements: Vec<Measurement>) -> RankedSet {
    measurements.sort_by_key(|m| m.delta());
    RankedSet(measurements)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryCount {
    pub country: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Descending by count; equal counts in order of first appearance.
    pub countries: Vec<CountryCount>,
    #[serde(rename = "meanRttMs", with = "duration_ms")]
    pub mean_rtt: Duration,
    pub total: usize,
}

/// Per-country counts and mean RTT. `None` for empty input.
pub fn summarize(measurements: &[Measurement]) -> Option<Summary> {
    if measurements.is_empty() {
        return None;
    }

    let mut countries: Vec<CountryCount> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();
    let mut total_rtt = Duration::ZERO;
    for m in measurements {
        let country = m.node().country.as_str();
        match slot.get(country) {
            Some(&i) => countries[i].count += 1,
            None => {
                slot.insert(country, countries.len());
                countries.push(CountryCount {
                    country: country.to_string(),
                    count: 1,
                });
            }
        }
        total_rtt += m.rtt();
    }
    countries.sort_by(|a, b| b.count.cmp(&a.count));

    Some(Summary {
        countries,
        mean_rtt: total_rtt / measurements.len() as u32,
        total: measurements.len(),
    })
}
