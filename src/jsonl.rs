/// JSON Lines Output
///
/// Simulation logs are written one JSON object per line so they can be
/// streamed into analysis tools. Every writer truncates its file; a run
/// replaces the logs of the previous one.
use crate::config::SweepConfig;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SINGLE_RUN_LOG: &str = "single_run.log";
pub const SINGLE_RUN_STEPS_LOG: &str = "single_run_steps.log";
pub const MANIFEST_FILE: &str = "run_manifest.json";

/// File name of the aggregated log for one bus speed
pub fn sweep_log_name(bus_speed_kbps: u32) -> String {
    format!("attack_{}kbps.log", bus_speed_kbps)
}

/// Create the log directory if needed
pub fn prepare_log_dir(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

pub struct JsonLinesWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    records_written: usize,
}

impl JsonLinesWriter {
    /// Create (or truncate) `path`
    pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            records_written: 0,
        })
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> std::io::Result<()> {
        let json = serde_json::to_string(record).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{}", json)?;
        self.records_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Flush buffered lines; returns the number of records written
    pub fn finish(mut self) -> std::io::Result<usize> {
        self.writer.flush()?;
        Ok(self.records_written)
    }
}

/// Write all `records` to `path`, one per line
pub fn write_jsonl<'a, T, I>(path: &Path, records: I) -> std::io::Result<usize>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut writer = JsonLinesWriter::create(path)?;
    for record in records {
        writer.write_record(record)?;
    }
    writer.finish()
}

/// Read a JSON Lines file back; blank lines are skipped
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, String> {
    let file = File::open(path).map_err(|e| format!("Failed to open log: {}", e))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Line {} read error: {}", line_num + 1, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| format!("Line {} parse error: {}", line_num + 1, e))?;
        records.push(record);
    }
    Ok(records)
}

/// Summary of one simulator invocation, written next to the logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub generated_at: DateTime<Utc>,
    pub seed: u64,
    pub bus_speeds_kbps: Vec<u32>,
    pub num_trials: u32,
    pub single_run_speed_kbps: u32,
    pub files: Vec<String>,
}

impl RunManifest {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            generated_at: Utc::now(),
            seed: config.seed,
            bus_speeds_kbps: config.bus_speeds_kbps.clone(),
            num_trials: config.num_trials,
            single_run_speed_kbps: config.single_run_speed_kbps,
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, name: impl Into<String>) {
        self.files.push(name.into());
    }

    pub fn write(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, self).map_err(std::io::Error::other)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(path)
    }
}
