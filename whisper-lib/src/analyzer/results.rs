use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::MAX_RESULT_BUFFER_SIZE;
use crate::error::{Result, WhisperError};

/// Per-flow detection outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowRecord {
    /// Source address, host order.
    pub address: u32,
    /// Bounded anomaly score: max-over-windows of the min center distance.
    pub distance: f64,
    /// Packets of this flow in the analysis pass.
    pub packet_count: u64,
}

/// Fixed-capacity record ring; the write cursor wraps and overwrites the
/// oldest entry once the ring is full.
pub struct ResultRing {
    records: Vec<FlowRecord>,
    capacity: usize,
    written: u64,
}

#[derive(Serialize)]
struct ResultsFile {
    #[serde(rename = "Results")]
    results: Vec<(u32, f64, u64)>,
}

impl ResultRing {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_RESULT_BUFFER_SIZE {
            return Err(WhisperError::Allocation(format!(
                "result ring capacity {capacity} outside (0, {MAX_RESULT_BUFFER_SIZE}]"
            )));
        }
        Ok(Self { records: Vec::with_capacity(capacity.min(4096)), capacity, written: 0 })
    }

    pub fn push(&mut self, rec: FlowRecord) {
        if self.records.len() < self.capacity {
            self.records.push(rec);
        } else {
            let slot = (self.written % self.capacity as u64) as usize;
            self.records[slot] = rec;
        }
        self.written += 1;
    }

    /// Records written since start, including overwritten ones.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn records(&self) -> &[FlowRecord] {
        &self.records
    }

    /// Persists the ring in storage order as one JSON document:
    /// `{"Results": [[address, distance, packet_count], …]}`.
    pub fn save(&self, dir: &str, prefix: &str, core_id: u16) -> Result<PathBuf> {
        let dir = Path::new(dir);
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{prefix}_{core_id}.json"));

        let doc = ResultsFile {
            results: self
                .records
                .iter()
                .map(|r| (r.address, r.distance, r.packet_count))
                .collect(),
        };
        let file = File::create(&path)?;
        serde_json::to_writer(BufWriter::new(file), &doc)
            .map_err(|e| WhisperError::Io(e.into()))?;

        info!(core = core_id, path = %path.display(), records = doc.results.len(), "results saved");
        Ok(path)
    }
}
