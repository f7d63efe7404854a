use serde::Serialize;

use crate::assess::{Assessment, Triangle};
use crate::geo::Location;
use crate::orchestrate::RunReport;
use crate::rank::{summarize, RankedSet, Summary};
use crate::solve::{try_multilaterate, try_trilaterate_ranked};

/// Everything derived from a ranked set after probing is done.
///
/// Solver results are `None` when there were fewer than three measurements;
/// the report sink decides how to show that.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub trilateration: Option<Location>,
    pub multilateration: Option<Location>,
    /// Entries actually fed to multilateration after clamping.
    pub multilateration_count: usize,
    pub triangle: Option<Triangle>,
    pub assessment: Assessment,
    pub summary: Option<Summary>,
}

impl Analysis {
    pub fn of(ranked: &RankedSet, multilateration_count: usize) -> Self {
        let trilateration = try_trilaterate_ranked(ranked);
        Self {
            trilateration,
            multilateration: try_multilaterate(ranked, multilateration_count),
            multilateration_count: multilateration_count.min(ranked.len()),
            triangle: trilateration.and_then(|est| Triangle::of(ranked, &est)),
            assessment: Assessment::of(ranked),
            summary: summarize(ranked.as_slice()),
        }
    }

    pub fn of_report(report: &RunReport, multilateration_count: usize) -> Self {
        Self::of(&report.ranked, multilateration_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReferenceNode;
    use crate::measurement::Measurement;
    use crate::rank::rank;
    use std::time::Duration;

    fn ranked(n: usize) -> RankedSet {
        rank(
            (0..n)
                .map(|i| {
                    let node = ReferenceNode {
                        name: format!("n{i}"),
                        address: "192.0.2.1".to_string(),
                        country: if i % 2 == 0 { "Even" } else { "Odd" }.to_string(),
                        city: "Test".to_string(),
                        lat: 45.0 + i as f64,
                        lon: 5.0,
                    };
                    Measurement::new(node, Duration::from_millis(10 + i as u64), Duration::from_millis(10))
                })
                .collect(),
        )
    }

    #[test]
    fn full_analysis_with_enough_measurements() {
        let analysis = Analysis::of(&ranked(12), 10);
        assert!(analysis.trilateration.is_some());
        assert!(analysis.multilateration.is_some());
        assert_eq!(analysis.multilateration_count, 10);
        assert!(analysis.triangle.is_some());
        let summary = analysis.summary.unwrap();
        assert_eq!(summary.total, 12);
        assert_eq!(summary.countries[0].country, "Even");
    }

    #[test]
    fn two_measurements_yield_no_estimates_but_a_summary() {
        let analysis = Analysis::of(&ranked(2), 10);
        assert!(analysis.trilateration.is_none());
        assert!(analysis.multilateration.is_none());
        assert!(analysis.triangle.is_none());
        assert_eq!(analysis.multilateration_count, 2);
        assert_eq!(analysis.summary.unwrap().total, 2);
    }

    #[test]
    fn empty_set_has_no_summary() {
        let analysis = Analysis::of(&RankedSet::default(), 10);
        assert!(analysis.summary.is_none());
        assert_eq!(analysis.assessment.analyzed, 0);
    }
}
