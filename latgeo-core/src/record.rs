use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::orchestrate::RunReport;

/// One line of the JSONL run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub ts_unix_ms: i64,
    #[serde(flatten)]
    pub report: RunReport,
}

impl RunRecord {
    pub fn new(report: RunReport) -> Self {
        Self {
            ts_unix_ms: now_unix_ms(),
            report,
        }
    }
}

pub fn now_unix_ms() -> i64 {
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (dur.as_secs() as i64) * 1000 + (dur.subsec_millis() as i64)
}

/// Reads a run log, skipping blank and unparsable lines.
pub fn load_jsonl<P: AsRef<Path>>(path: P) -> io::Result<Vec<RunRecord>> {
    let file = File::open(path)?;
    read_jsonl(BufReader::new(file))
}

pub fn read_jsonl<R: BufRead>(reader: R) -> io::Result<Vec<RunRecord>> {
    let mut out = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RunRecord>(&line) {
            Ok(rec) => out.push(rec),
            Err(err) => warn!(line = lineno + 1, %err, "skipping malformed run record"),
        }
    }
    Ok(out)
}
