mod report;
mod transport;

use clap::Parser;
use latgeo_core::{run, Analysis, Catalog, Config, NoProgress, ProgressObserver, RunError, RunRecord};
use std::env;
use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use tracing::{info, warn};

use report::ConsoleProgress;
use transport::IcmpTransport;

#[derive(Parser, Debug)]
#[command(about = "Estimate where a host is by comparing its latency to known reference nodes")]
struct Args {
    /// Address or host name to locate; prompted for when omitted.
    target: Option<String>,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Reference catalog JSON; overrides the config file and the built-in catalog.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Append a JSON line per run to this file.
    #[arg(long)]
    output: Option<String>,

    #[arg(long)]
    top: Option<usize>,

    #[arg(long)]
    multilateration: Option<usize>,

    #[arg(long)]
    max_workers: Option<usize>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    json: bool,
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

    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    apply_overrides(&mut cfg, &args);
    cfg.validate()?;

    let catalog = match &cfg.catalog_path {
        Some(path) => Catalog::load(expand_tilde(path))?,
        None => Catalog::builtin()?,
    };

    let target = match args.target.clone() {
        Some(t) => t.trim().to_string(),
        None => prompt_target()?,
    };
    if target.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "no target given"));
    }
    info!(%target, nodes = catalog.len(), "starting run");

    let writer = cfg.output_path.as_deref().map(|path| {
        let (tx, rx) = mpsc::channel::<RunRecord>();
        let path = expand_tilde(path);
        (tx, thread::spawn(move || writer_thread(path, rx)))
    });

    let transport = IcmpTransport::new(cfg.spacing(), cfg.pacing_spin_us);
    let mut console = ConsoleProgress;
    let mut quiet = NoProgress;
    let observer: &mut dyn ProgressObserver = if args.json { &mut quiet } else { &mut console };

    let report = match run(&target, &catalog, &transport, &cfg.probe_plan(), observer) {
        Ok(report) => report,
        Err(err) => {
            if let RunError::TargetUnreachable { .. } = err {
                eprintln!("[!!] {}", err);
                eprintln!("\nCheck that:");
                eprintln!("   - the address or host name is valid");
                eprintln!("   - you have the privileges to send ICMP (root, CAP_NET_RAW or ping_group_range)");
                eprintln!("   - the firewall allows ICMP echo");
            } else {
                eprintln!("[!!] {}", err);
            }
            return Err(err.into());
        }
    };

    let analysis = Analysis::of_report(&report, cfg.multilateration_count);
    if args.json {
        report::print_json(&report, &analysis);
    } else {
        report::print_text(&report, &analysis, cfg.top_count)?;
    }

    if let Some((tx, handle)) = writer {
        if tx.send(RunRecord::new(report)).is_err() {
            warn!("run log writer exited early");
        }
        drop(tx);
        let _ = handle.join();
    }
    Ok(())
}

fn apply_overrides(cfg: &mut Config, args: &Args) {
    if let Some(path) = &args.catalog {
        cfg.catalog_path = Some(path.display().to_string());
    }
    if let Some(path) = &args.output {
        cfg.output_path = Some(path.clone());
    }
    if let Some(top) = args.top {
        cfg.top_count = top;
    }
    if let Some(n) = args.multilateration {
        cfg.multilateration_count = n;
    }
    if let Some(n) = args.max_workers {
        cfg.max_workers = n;
    }
    if let Some(ms) = args.timeout_ms {
        cfg.timeout_ms = ms;
    }
}

fn prompt_target() -> io::Result<String> {
    println!("\n{}", "=".repeat(63));
    println!("       LATENCY TRIANGULATION");
    println!("{}", "=".repeat(63));
    print!("\nTarget address or host name: ");
    io::stdout().flush()?;
    read_target(io::stdin().lock())
}

fn read_target<R: BufRead>(mut reader: R) -> io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

fn writer_thread(path: PathBuf, rx: mpsc::Receiver<RunRecord>) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            eprintln!("[!!] failed to create log dir: {}", err);
            return;
        }
    }
    let file = match File::options().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("[!!] failed to open run log: {}", err);
            return;
        }
    };
    let mut writer = BufWriter::new(file);

    for rec in rx {
        if let Err(err) = serde_json::to_writer(&mut writer, &rec) {
            eprintln!("[!!] log write failed: {}", err);
            continue;
        }
        if let Err(err) = writer.write_all(b"\n") {
            eprintln!("[!!] log write failed: {}", err);
            continue;
        }
        if let Err(err) = writer.flush() {
            eprintln!("[!!] log flush failed: {}", err);
        }
        info!(path = %path.display(), target = %rec.report.target, "run logged");
    }
}
