mod constants;

use clap::Parser;
use latgeo_core::{load_jsonl, Analysis, Location, RunRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use constants::*;

#[derive(Parser, Debug)]
#[command(about = "Re-analyze logged latgeo runs and check estimates against a known location")]
struct Args {
    /// JSONL run log written by `latgeo --output`.
    #[arg(long)]
    session: PathBuf,

    /// Second run log to compare the latest session run against.
    #[arg(long)]
    baseline: Option<PathBuf>,

    #[arg(long, allow_hyphen_values = true)]
    claim_lat: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    claim_lon: Option<f64>,

    #[arg(long, default_value_t = DEFAULT_MULTILATERATION_COUNT)]
    multilateration: usize,

    /// Analyze every run in the log instead of only the latest.
    #[arg(long)]
    all: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOutput {
    ts_unix_ms: i64,
    target: String,
    target_rtt_ms: f64,
    answered: usize,
    attempted: usize,
    analysis: Analysis,
    claim_check: Option<ClaimCheck>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimCheck {
    claim: Location,
    precision_km: f64,
    trilateration_km: Option<f64>,
    multilateration_km: Option<f64>,
    /// True when an estimate lies farther from the claim than the precision radius.
    falsify_trilateration: Option<bool>,
    falsify_multilateration: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Delta {
    node: String,
    delta_rtt_ms: f64,
    baseline_rtt_ms: f64,
    session_rtt_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Comparison {
    baseline: RunOutput,
    deltas: Vec<Delta>,
    trilateration_separation_km: Option<f64>,
    multilateration_separation_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisOutput {
    records: usize,
    runs: Vec<RunOutput>,
    comparison: Option<Comparison>,
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    if args.multilateration < 3 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "--multilateration must be >= 3",
        ));
    }
    let claim = match (args.claim_lat, args.claim_lon) {
        (Some(lat), Some(lon)) => Some(Location::new(lat, lon)),
        (None, None) => None,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "--claim-lat and --claim-lon go together",
            ));
        }
    };

    let records = load_jsonl(&args.session)?;
    info!(records = records.len(), path = %args.session.display(), "loaded session log");
    let Some(latest) = records.last() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "session log holds no run records",
        ));
    };

    let selected: Vec<&RunRecord> = if args.all {
        records.iter().collect()
    } else {
        vec![latest]
    };
    let runs: Vec<RunOutput> = selected
        .into_iter()
        .map(|rec| run_output(rec, args.multilateration, claim))
        .collect();

    let comparison = match &args.baseline {
        Some(path) => {
            let baseline_records = load_jsonl(path)?;
            baseline_records
                .last()
                .map(|base| compare(base, latest, args.multilateration, claim))
        }
        None => None,
    };

    let output = AnalysisOutput {
        records: records.len(),
        runs,
        comparison,
    };

    if args.json {
        let text = serde_json::to_string_pretty(&output)
            .unwrap_or_else(|_| "{\"error\":\"failed to serialize\"}".to_string());
        println!("{text}");
        return Ok(());
    }

    println!("Session: {} records", output.records);
    for run in &output.runs {
        print_run("session", run);
    }

    match (&args.baseline, &output.comparison) {
        (Some(_), Some(cmp)) => {
            print_run("baseline", &cmp.baseline);
            println!("\nBaseline vs session rtt deltas:");
            print_deltas(&cmp.deltas);
            if let Some(km) = cmp.trilateration_separation_km {
                println!("\nTrilateration estimate moved {:.1} km", km);
            }
            if let Some(km) = cmp.multilateration_separation_km {
                println!("Multilateration estimate moved {:.1} km", km);
            }
        }
        (Some(_), None) => println!("\nBaseline log holds no run records."),
        _ => {}
    }

    Ok(())
}

fn run_output(rec: &RunRecord, multilateration: usize, claim: Option<Location>) -> RunOutput {
    let report = &rec.report;
    let analysis = Analysis::of_report(report, multilateration);
    let claim_check = claim.map(|c| claim_check(&analysis, c));
    RunOutput {
        ts_unix_ms: rec.ts_unix_ms,
        target: report.target.clone(),
        target_rtt_ms: to_ms(report.target_rtt),
        answered: report.ranked.len(),
        attempted: report.attempted,
        analysis,
        claim_check,
    }
}

fn claim_check(analysis: &Analysis, claim: Location) -> ClaimCheck {
    let precision_km = analysis.assessment.precision_km;
    let trilateration_km = analysis.trilateration.map(|est| est.distance_km(&claim));
    let multilateration_km = analysis.multilateration.map(|est| est.distance_km(&claim));
    ClaimCheck {
        claim,
        precision_km,
        trilateration_km,
        multilateration_km,
        falsify_trilateration: trilateration_km.map(|d| d > precision_km),
        falsify_multilateration: multilateration_km.map(|d| d > precision_km),
    }
}

fn compare(
    base: &RunRecord,
    sess: &RunRecord,
    multilateration: usize,
    claim: Option<Location>,
) -> Comparison {
    let baseline = run_output(base, multilateration, claim);
    let session = Analysis::of_report(&sess.report, multilateration);
    let separation = |a: Option<Location>, b: Option<Location>| match (a, b) {
        (Some(a), Some(b)) => Some(a.distance_km(&b)),
        _ => None,
    };
    Comparison {
        trilateration_separation_km: separation(
            baseline.analysis.trilateration,
            session.trilateration,
        ),
        multilateration_separation_km: separation(
            baseline.analysis.multilateration,
            session.multilateration,
        ),
        deltas: deltas(base, sess),
        baseline,
    }
}

/// RTT change per node name, for nodes that answered in both runs.
fn deltas(base: &RunRecord, sess: &RunRecord) -> Vec<Delta> {
    let session_rtts: HashMap<&str, Duration> = sess
        .report
        .ranked
        .iter()
        .map(|m| (m.node().name.as_str(), m.rtt()))
        .collect();
    let mut out: Vec<Delta> = base
        .report
        .ranked
        .iter()
        .filter_map(|m| {
            let s = session_rtts.get(m.node().name.as_str())?;
            let (b, s) = (to_ms(m.rtt()), to_ms(*s));
            Some(Delta {
                node: m.node().name.clone(),
                delta_rtt_ms: s - b,
                baseline_rtt_ms: b,
                session_rtt_ms: s,
            })
        })
        .collect();
    out.sort_by(|a, b| a.node.cmp(&b.node));
    out
}

fn print_run(label: &str, run: &RunOutput) {
    println!(
        "\n{} run @{}: target={} rtt={:.2}ms answered={}/{}",
        label, run.ts_unix_ms, run.target, run.target_rtt_ms, run.answered, run.attempted
    );
    let a = &run.analysis;
    match a.trilateration {
        Some(est) => println!("- trilateration:   lat={:.4}, lon={:.4}", est.lat, est.lon),
        None => println!("- trilateration:   insufficient data (need 3 answering nodes)"),
    }
    match a.multilateration {
        Some(est) => println!(
            "- multilateration: lat={:.4}, lon={:.4} (top {})",
            est.lat, est.lon, a.multilateration_count
        ),
        None => println!("- multilateration: insufficient data (need 3 answering nodes)"),
    }
    println!(
        "- coherence={} mean_top_delta={:.2}ms precision=+/-{:.0}km",
        a.assessment.coherence,
        to_ms(a.assessment.mean_top_delta),
        a.assessment.precision_km
    );
    if let Some(c) = &run.claim_check {
        println!(
            "- claim lat={:.4}, lon={:.4}: tri_dist={:.1}km multi_dist={:.1}km falsify_tri={} falsify_multi={}",
            c.claim.lat,
            c.claim.lon,
            c.trilateration_km.unwrap_or(f64::NAN),
            c.multilateration_km.unwrap_or(f64::NAN),
            c.falsify_trilateration.unwrap_or(false),
            c.falsify_multilateration.unwrap_or(false)
        );
    }
}

fn print_deltas(deltas: &[Delta]) {
    for d in deltas {
        println!(
            "- {} delta={:.2}ms (baseline {:.2} -> session {:.2})",
            d.node, d.delta_rtt_ms, d.baseline_rtt_ms, d.session_rtt_ms
        );
    }
}

fn to_ms(d: Duration) -> f64 {
    d.as_secs_f64() * MS_PER_SEC
}
