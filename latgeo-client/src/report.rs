use std::io::{self, Write};
use std::time::Duration;

use latgeo_core::{
    Analysis, Location, Measurement, ProbeOutcome, ProgressObserver, Proximity, RunReport,
    Triangle, MIN_SOLVER_POINTS,
};
use serde::Serialize;

const WIDE: usize = 80;
const TOP_COUNTRIES: usize = 10;

/// One-line progress counter on stdout.
pub struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn target_measured(&mut self, address: &str, rtt: Duration) {
        println!("target {} rtt {}", address, fmt_ms(rtt));
        println!("[+] probing reference nodes (this can take a minute or two)...");
        println!("{}", "-".repeat(WIDE));
    }

    fn probe_finished(&mut self, completed: usize, total: usize, outcome: ProbeOutcome<'_>) {
        match outcome {
            ProbeOutcome::Measured(m) => print!(
                "\r\x1b[2K[{:3}/{:3}] [OK] {}: {}",
                completed,
                total,
                m.node().name,
                fmt_ms(m.rtt())
            ),
            ProbeOutcome::Failed { node, .. } => {
                print!("\r\x1b[2K[{:3}/{:3}] [X] {}: error", completed, total, node.name)
            }
        }
        let _ = io::stdout().flush();
        if completed == total {
            println!("\n");
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonReport<'a> {
    pub report: &'a RunReport,
    pub analysis: &'a Analysis,
}

pub fn print_json(report: &RunReport, analysis: &Analysis) {
    let out = JsonReport { report, analysis };
    let text = serde_json::to_string_pretty(&out)
        .unwrap_or_else(|_| "{\"error\":\"failed to serialize\"}".to_string());
    println!("{text}");
}

pub fn print_text(report: &RunReport, analysis: &Analysis, top: usize) -> io::Result<()> {
    print_ranked(report, top);
    write_estimates(&mut io::stdout().lock(), report, analysis)?;
    print_statistics(analysis);
    println!("\n{}", "=".repeat(WIDE));
    println!("ANALYSIS COMPLETE");
    println!("{}", "=".repeat(WIDE));
    Ok(())
}

fn print_ranked(report: &RunReport, top: usize) {
    banner(&format!(
        "RESULTS - target: {} (rtt {})",
        report.target,
        fmt_ms(report.target_rtt)
    ));
    println!("\nTOP {} REFERENCE NODES (by latency similarity)", top);
    println!("{}", "-".repeat(WIDE));
    for (i, m) in report.ranked.top(top).iter().enumerate() {
        print_entry(i + 1, m);
    }
    if !report.failed.is_empty() {
        println!(
            "{} of {} reference nodes did not answer",
            report.failed.len(),
            report.attempted
        );
    }
}

fn print_entry(rank: usize, m: &Measurement) {
    let node = m.node();
    println!(
        "{} {:2}) {:<20} | {:<15} | {:<12}",
        Proximity::of(m.delta()).marker(),
        rank,
        node.name,
        node.country,
        node.city
    );
    println!(
        "        rtt: {:>9} | delta: {:>9} | est. distance: {:.0} km",
        fmt_ms(m.rtt()),
        fmt_ms(m.delta()),
        m.distance_km()
    );
    println!();
}

fn write_estimates<W: Write>(
    out: &mut W,
    report: &RunReport,
    analysis: &Analysis,
) -> io::Result<()> {
    if report.ranked.len() < MIN_SOLVER_POINTS {
        writeln!(
            out,
            "\nNot enough reference nodes answered to triangulate (need {}).",
            MIN_SOLVER_POINTS
        )?;
        return Ok(());
    }
    write_banner(out, "TRIANGULATION")?;

    writeln!(out, "\nMETHOD 1: 3-point trilateration")?;
    writeln!(out, "{}", "-".repeat(WIDE))?;
    for (i, m) in report.ranked.top(3).iter().enumerate() {
        writeln!(
            out,
            "Node {}: {} ({}) - distance: {:.0} km",
            i + 1,
            m.node().name,
            m.node().city,
            m.distance_km()
        )?;
    }
    match &analysis.trilateration {
        Some(tri) => write_location(out, tri)?,
        None => writeln!(out, "\nThe three anchors cancel out; no 3-point estimate.")?,
    }

    if let Some(multi) = &analysis.multilateration {
        writeln!(
            out,
            "\nMETHOD 2: weighted multilateration (top {} nodes)",
            analysis.multilateration_count
        )?;
        writeln!(out, "{}", "-".repeat(WIDE))?;
        write_location(out, multi)?;
        if let Some(tri) = &analysis.trilateration {
            writeln!(out, "Separation between methods: {:.0} km", tri.distance_km(multi))?;
        }
    }

    if let Some(triangle) = &analysis.triangle {
        write_triangle(out, report, triangle)?;
    }

    let assessment = &analysis.assessment;
    writeln!(out, "\nCOHERENCE")?;
    writeln!(out, "{}", "-".repeat(WIDE))?;
    writeln!(out, "Triangulation coherence: {}", assessment.coherence)?;
    writeln!(out, "Mean delta (top 5): {}", fmt_ms(assessment.mean_top_delta))?;
    writeln!(out, "Reference nodes analyzed: {}", assessment.analyzed)?;
    writeln!(out, "Estimated precision: +/- {:.0} km", assessment.precision_km)?;
    Ok(())
}

fn write_triangle<W: Write>(
    out: &mut W,
    report: &RunReport,
    triangle: &Triangle,
) -> io::Result<()> {
    let [a, b, c] = &triangle.anchors;
    writeln!(out, "\nTRIANGULATION TRIANGLE")?;
    writeln!(out, "{}", "-".repeat(WIDE))?;
    writeln!(out, "\n              {}", a)?;
    writeln!(out, "                /  \\")?;
    writeln!(out, "               /    \\")?;
    writeln!(
            out,
        "          {:.0} km    {:.0} km",
        report.ranked.as_slice()[0].distance_km(),
        triangle.first_to_estimate_km
    )?;
    writeln!(out, "             /        \\")?;
    writeln!(out, "            /   [*]    \\")?;
    writeln!(out, "           /  TARGET    \\")?;
    writeln!(out, "          /              \\")?;
    writeln!(out, "    {} ----------- {}", b, c)?;
    writeln!(out, "               {:.0} km", triangle.sides_km[2])?;

    writeln!(out, "\nGEOGRAPHIC DISTANCES BETWEEN ANCHORS")?;
    writeln!(out, "{}", "-".repeat(WIDE))?;
    writeln!(out, "{} <-> {}: {:.0} km", a, b, triangle.sides_km[0])?;
    writeln!(out, "{} <-> {}: {:.0} km", a, c, triangle.sides_km[1])?;
    writeln!(out, "{} <-> {}: {:.0} km", b, c, triangle.sides_km[2])?;
    Ok(())
}

fn print_statistics(analysis: &Analysis) {
    let Some(summary) = &analysis.summary else {
        return;
    };
    banner("STATISTICS");
    println!("\nBy country (top {}):", TOP_COUNTRIES);
    for c in summary.countries.iter().take(TOP_COUNTRIES) {
        println!("  {:<20} {} {}", c.country, "#".repeat(c.count), c.count);
    }
    println!("\nMean rtt over all answering nodes: {}", fmt_ms(summary.mean_rtt));
    println!("Answering nodes: {}", summary.total);
}

fn write_location<W: Write>(out: &mut W, loc: &Location) -> io::Result<()> {
    writeln!(out, "\nEstimated position: {:.4}, {:.4}", loc.lat, loc.lon)?;
    writeln!(out, "Map: {}", map_link(loc))
}

pub fn map_link(loc: &Location) -> String {
    format!("https://www.google.com/maps?q={:.4},{:.4}", loc.lat, loc.lon)
}

fn banner(title: &str) {
    let _ = write_banner(&mut io::stdout().lock(), title);
}

fn write_banner<W: Write>(out: &mut W, title: &str) -> io::Result<()> {
    writeln!(out, "\n{}", "=".repeat(WIDE))?;
    writeln!(out, "{}", title)?;
    writeln!(out, "{}", "=".repeat(WIDE))
}

pub fn fmt_ms(d: Duration) -> String {
    format!("{:.2}ms", d.as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use latgeo_core::{rank, ReferenceNode};

    #[test]
    fn map_link_uses_four_decimals() {
        let link = map_link(&Location::new(48.85661, 2.35222));
        assert_eq!(link, "https://www.google.com/maps?q=48.8566,2.3522");
    }

    #[test]
    fn durations_render_in_milliseconds() {
        assert_eq!(fmt_ms(Duration::from_micros(12_346)), "12.35ms");
        assert_eq!(fmt_ms(Duration::ZERO), "0.00ms");
    }

    fn report_of(nodes: &[(&str, f64, f64, u64)], target_ms: u64) -> RunReport {
        let target_rtt = Duration::from_millis(target_ms);
        let measurements = nodes
            .iter()
            .map(|&(name, lat, lon, rtt)| {
                let node = ReferenceNode {
                    name: name.to_string(),
                    address: "192.0.2.1".to_string(),
                    country: "Test".to_string(),
                    city: "Test".to_string(),
                    lat,
                    lon,
                };
                Measurement::new(node, Duration::from_millis(rtt), target_rtt)
            })
            .collect();
        RunReport {
            target: "example.org".to_string(),
            target_rtt,
            attempted: nodes.len(),
            failed: Vec::new(),
            ranked: rank(measurements),
        }
    }

    fn estimates_text(report: &RunReport) -> String {
        let analysis = Analysis::of_report(report, 10);
        let mut out = Vec::new();
        write_estimates(&mut out, report, &analysis).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn cancelling_anchors_keep_other_sections() {
        // Three equatorial anchors 120 degrees apart with equal deltas.
        let report = report_of(
            &[("a", 0.0, 0.0, 15), ("b", 0.0, 120.0, 15), ("c", 0.0, -120.0, 15)],
            10,
        );
        let text = estimates_text(&report);
        assert!(text.contains("cancel out"));
        assert!(!text.contains("Not enough reference nodes"));
        assert!(text.contains("METHOD 2"));
        assert!(text.contains("COHERENCE"));
        assert!(!text.contains("TRIANGULATION TRIANGLE"));
    }

    #[test]
    fn too_few_nodes_say_so() {
        let report = report_of(&[("a", 0.0, 0.0, 15), ("b", 0.0, 120.0, 15)], 10);
        let text = estimates_text(&report);
        assert!(text.contains("Not enough reference nodes"));
        assert!(!text.contains("COHERENCE"));
    }

    #[test]
    fn clustered_anchors_print_every_section() {
        let report = report_of(
            &[
                ("paris", 48.8566, 2.3522, 11),
                ("london", 51.5074, -0.1278, 12),
                ("frankfurt", 50.1109, 8.6821, 13),
            ],
            10,
        );
        let text = estimates_text(&report);
        assert!(text.contains("Separation between methods"));
        assert!(text.contains("TRIANGULATION TRIANGLE"));
        assert!(text.contains("COHERENCE"));
    }
}
