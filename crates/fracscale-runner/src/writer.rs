//! Append-only result files for one run.
//!
//! ```text
//! <results_dir>/<controller>-<epoch_secs>/
//!   config.json    the effective configuration, one line
//!   trace.jsonl    one completion record per line
//!   status.jsonl   one tick record per line
//!   result.json    final totals, written when the run ends
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use fracscale_core::CompletionRecord;
use fracscale_core::clock::epoch_secs;

pub struct ResultWriter {
    dir: PathBuf,
    trace: BufWriter<File>,
    status: BufWriter<File>,
}

impl ResultWriter {
    /// Create the run directory and write `config.json`.
    pub fn create(
        results_dir: &Path,
        controller: &str,
        config: &impl Serialize,
    ) -> anyhow::Result<Self> {
        let dir = results_dir.join(format!("{controller}-{}", epoch_secs()));
        std::fs::create_dir_all(&dir)?;

        let mut config_file = BufWriter::new(open_append(&dir.join("config.json"))?);
        write_line(&mut config_file, config)?;

        let writer = Self {
            trace: BufWriter::new(open_append(&dir.join("trace.jsonl"))?),
            status: BufWriter::new(open_append(&dir.join("status.jsonl"))?),
            dir,
        };
        info!(dir = ?writer.dir, "result directory created");
        Ok(writer)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append this tick's completion records.
    pub fn append_trace(&mut self, records: &[CompletionRecord]) -> anyhow::Result<()> {
        for record in records {
            serde_json::to_writer(&mut self.trace, record)?;
            self.trace.write_all(b"\n")?;
        }
        self.trace.flush()?;
        Ok(())
    }

    /// Append one tick record.
    pub fn append_status(&mut self, record: &impl Serialize) -> anyhow::Result<()> {
        write_line(&mut self.status, record)
    }

    /// Write `result.json` and close the run. Returns the run directory.
    pub fn finish(mut self, result: &impl Serialize) -> anyhow::Result<PathBuf> {
        self.trace.flush()?;
        self.status.flush()?;

        let mut file = BufWriter::new(open_append(&self.dir.join("result.json"))?);
        write_line(&mut file, result)?;
        info!(dir = ?self.dir, "results written");
        Ok(self.dir)
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn write_line(out: &mut BufWriter<File>, value: &impl Serialize) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
