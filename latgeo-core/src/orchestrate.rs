//! Target and reference probing.
//!
//! The target is probed once on the calling thread. Reference nodes are then
//! probed by a bounded pool of scoped worker threads that pull catalog indices
//! from a job channel and push results into a single result channel. The
//! calling thread drains that channel and is the only writer of the result
//! slots, so no lock guards the measurements themselves.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{Catalog, ReferenceNode};
use crate::error::{ProbeError, RunError};
use crate::measurement::{duration_ms, Measurement};
use crate::rank::{rank, RankedSet};

/// Source of average round-trip times. Any error means "no measurement".
pub trait ProbeTransport: Send + Sync {
    fn measure(&self, address: &str, samples: usize, timeout: Duration)
        -> Result<Duration, ProbeError>;
}

#[derive(Debug, Clone)]
pub struct ProbePlan {
    pub target_samples: usize,
    pub reference_samples: usize,
    pub timeout: Duration,
    /// Delay between job hand-offs. Best-effort pacing, not a rate limit.
    pub stagger: Duration,
    pub max_workers: usize,
}

impl Default for ProbePlan {
    fn default() -> Self {
        Self {
            target_samples: 5,
            reference_samples: 3,
            timeout: Duration::from_secs(10),
            stagger: Duration::from_millis(10),
            max_workers: 64,
        }
    }
}

pub enum ProbeOutcome<'a> {
    Measured(&'a Measurement),
    Failed {
        node: &'a ReferenceNode,
        error: &'a ProbeError,
    },
}

/// Receives progress callbacks on the thread that called `run`.
pub trait ProgressObserver {
    fn target_measured(&mut self, _address: &str, _rtt: Duration) {}

    fn probe_finished(&mut self, completed: usize, total: usize, outcome: ProbeOutcome<'_>);
}

pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn probe_finished(&mut self, _completed: usize, _total: usize, _outcome: ProbeOutcome<'_>) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RunReportRecord")]
pub struct RunReport {
    pub target: String,
    #[serde(rename = "targetRttMs", with = "duration_ms")]
    pub target_rtt: Duration,
    pub attempted: usize,
    /// Names of the reference nodes that produced no measurement.
    #[serde(default)]
    pub failed: Vec<String>,
    pub ranked: RankedSet,
}

/// Wire form of a report. Loading re-derives every delta from `target_rtt`
/// and ranks again, so stored deltas never disagree with stored RTTs.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunReportRecord {
    target: String,
    #[serde(rename = "targetRttMs", with = "duration_ms")]
    target_rtt: Duration,
    attempted: usize,
    #[serde(default)]
    failed: Vec<String>,
    ranked: RankedSet,
}

impl From<RunReportRecord> for RunReport {
    fn from(rec: RunReportRecord) -> Self {
        let target_rtt = rec.target_rtt;
        let measurements = rec
            .ranked
            .into_vec()
            .into_iter()
            .map(|m| m.rebase(target_rtt))
            .collect();
        Self {
            target: rec.target,
            target_rtt,
            attempted: rec.attempted,
            failed: rec.failed,
            ranked: rank(measurements),
        }
    }
}

/// Probes `target`, then every catalog node, and ranks the successes.
///
/// Errors only for an empty catalog, an unreachable target, or when not a
/// single reference node answered. Individual reference failures are logged
/// and listed in `RunReport::failed`.
pub fn run<T: ProbeTransport + ?Sized>(
    target: &str,
    catalog: &Catalog,
    transport: &T,
    plan: &ProbePlan,
    observer: &mut dyn ProgressObserver,
) -> Result<RunReport, RunError> {
    if catalog.is_empty() {
        return Err(RunError::EmptyCatalog);
    }

    let target_rtt = transport
        .measure(target, plan.target_samples, plan.timeout)
        .map_err(|source| RunError::TargetUnreachable {
            address: target.to_string(),
            source,
        })?;
    info!(address = target, rtt_ms = target_rtt.as_secs_f64() * 1000.0, "target measured");
    observer.target_measured(target, target_rtt);

    let (measurements, failed) = probe_references(catalog, transport, plan, target_rtt, observer);
    if measurements.is_empty() {
        return Err(RunError::NoResponses {
            attempted: catalog.len(),
        });
    }
    info!(
        answered = measurements.len(),
        failed = failed.len(),
        "reference probing finished"
    );

    Ok(RunReport {
        target: target.to_string(),
        target_rtt,
        attempted: catalog.len(),
        failed,
        ranked: rank(measurements),
    })
}

/// Returns the successful measurements in catalog order, plus failed names.
fn probe_references<T: ProbeTransport + ?Sized>(
    catalog: &Catalog,
    transport: &T,
    plan: &ProbePlan,
    target_rtt: Duration,
    observer: &mut dyn ProgressObserver,
) -> (Vec<Measurement>, Vec<String>) {
    let nodes = catalog.nodes();
    let total = nodes.len();
    let workers = plan.max_workers.clamp(1, total.max(1));
    info!(total, workers, "probing reference nodes");

    let (job_tx, job_rx) = mpsc::channel::<usize>();
    let job_rx = Mutex::new(job_rx);
    let (result_tx, result_rx) = mpsc::channel::<(usize, Result<Measurement, ProbeError>)>();
    let mut slots: Vec<Option<Measurement>> = vec![None; total];
    let mut failed_at: Vec<usize> = Vec::new();

    thread::scope(|scope| {
        for _ in 0..workers {
            let result_tx = result_tx.clone();
            let job_rx = &job_rx;
            scope.spawn(move || {
                probe_worker(nodes, transport, plan, target_rtt, job_rx, result_tx)
            });
        }
        drop(result_tx);

        let stagger = plan.stagger;
        scope.spawn(move || dispatch_jobs(job_tx, total, stagger));

        let mut completed = 0;
        for (index, result) in result_rx {
            completed += 1;
            match result {
                Ok(measurement) => {
                    observer.probe_finished(completed, total, ProbeOutcome::Measured(&measurement));
                    slots[index] = Some(measurement);
                }
                Err(error) => {
                    let node = &nodes[index];
                    debug!(
                        node = %node.name,
                        address = %node.address,
                        %error,
                        "reference probe failed"
                    );
                    observer.probe_finished(completed, total, ProbeOutcome::Failed { node, error: &error });
                    failed_at.push(index);
                }
            }
        }
    });

    failed_at.sort_unstable();
    let failed = failed_at.into_iter().map(|i| nodes[i].name.clone()).collect();
    (slots.into_iter().flatten().collect(), failed)
}

fn dispatch_jobs(jobs: Sender<usize>, total: usize, stagger: Duration) {
    for index in 0..total {
        if index > 0 && !stagger.is_zero() {
            thread::sleep(stagger);
        }
        if jobs.send(index).is_err() {
            break;
        }
    }
}

fn probe_worker<T: ProbeTransport + ?Sized>(
    nodes: &[ReferenceNode],
    transport: &T,
    plan: &ProbePlan,
    target_rtt: Duration,
    jobs: &Mutex<Receiver<usize>>,
    results: Sender<(usize, Result<Measurement, ProbeError>)>,
) {
    loop {
        let next = match jobs.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => break,
        };
        let Ok(index) = next else { break };

        let node = nodes[index].clone();
        let result = transport
            .measure(&node.address, plan.reference_samples, plan.timeout)
            .map(|rtt| Measurement::new(node, rtt, target_rtt));
        if results.send((index, result)).is_err() {
            break;
        }
    }
}
