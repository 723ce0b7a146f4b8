use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::analyzer::results::{FlowRecord, ResultRing};
use crate::analyzer::spectral::{l2_distance, FftSpectral, SpectralOps, Spectrogram};
use crate::config::{verbose_ip_of, AnalyzerSection};
use crate::error::{Result, WhisperError};
use crate::handoff::MetadataHandoff;
use crate::learner::{Clusterer, Learner, LloydKmeans};
use crate::metadata::MetadataRecord;

/// Soft cap on one bulk drain, keeps the handoff critical section short.
const MAX_FETCH: usize = 1 << 17;
/// Upper bound of every anomaly score.
const MAX_CLUSTER_DIST: f64 = 1e12;
/// Floor for inter-arrival deltas; non-positive deltas clamp here.
const MIN_INTERVAL: f64 = 1e-5;

/// Scalar encoding of one record: length, protocol weight, and the log of
/// its inter-arrival delta folded into a single sample. The protocol term
/// is truncating integer division, so weights below 10 contribute nothing.
fn weight_transform(rec: &MetadataRecord) -> f64 {
    f64::from(rec.pkt_len) * 10.0
        + f64::from(rec.proto.weight() / 10)
        + -rec.timestamp.log2() * 15.68
}

/// Final throughput summary of one analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzerReport {
    pub core_id: u16,
    pub mpps: f64,
    pub gbps: f64,
    pub runtime_s: f64,
}

/// Per-core analysis worker: drains its parsers every tick, groups records
/// by source address, projects each flow into the frequency domain, and
/// either feeds the learner (training) or scores against the centers
/// (detection).
pub struct AnalyzerWorker {
    core_id: u16,
    config: Arc<AnalyzerSection>,
    handoffs: Vec<Arc<MetadataHandoff>>,
    learner: Arc<Learner>,
    spectral: Box<dyn SpectralOps>,
    clusterer: Box<dyn Clusterer>,
    stop: Arc<AtomicBool>,
    is_train: bool,
    /// Copied by value from the learner on entering detection mode.
    centers: Vec<Vec<f64>>,
    scratch: Vec<MetadataRecord>,
    ring: ResultRing,
    verbose_ip: Option<u32>,
    rng: StdRng,
    pkt_num: u64,
    pkt_len: u64,
    sum_pkt_num: u64,
    sum_pkt_len: u64,
    detect_start: Instant,
}

impl AnalyzerWorker {
    pub fn new(
        core_id: u16,
        handoffs: Vec<Arc<MetadataHandoff>>,
        learner: Arc<Learner>,
        config: Arc<AnalyzerSection>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        let ring = ResultRing::new(config.result_buffer_size)?;
        let verbose_ip = verbose_ip_of(&config);
        Ok(Self {
            core_id,
            handoffs,
            learner,
            spectral: Box::new(FftSpectral::new()),
            clusterer: Box::new(LloydKmeans::default()),
            stop,
            is_train: true,
            centers: Vec::new(),
            scratch: Vec::new(),
            ring,
            verbose_ip,
            rng: StdRng::from_entropy(),
            pkt_num: 0,
            pkt_len: 0,
            sum_pkt_num: 0,
            sum_pkt_len: 0,
            detect_start: Instant::now(),
            config,
        })
    }

    pub fn in_training_mode(&self) -> bool {
        self.is_train
    }

    /// One drain-and-analyze pass without pacing. `run` calls this in its
    /// tick loop; tests call it directly for deterministic stepping.
    pub fn poll_once(&mut self) -> Result<usize> {
        self.enter_detection_if_ready()?;

        let mut fetched = 0;
        for handoff in &self.handoffs {
            fetched +=
                handoff.drain_into(&mut self.scratch, self.config.meta_pkt_arr_size, MAX_FETCH);
        }
        self.analyze()?;
        self.pkt_num += fetched as u64;
        Ok(fetched)
    }

    /// Blocking tick loop; returns the throughput summary once stopped.
    pub fn run(mut self) -> Result<AnalyzerReport> {
        if self.handoffs.is_empty() {
            warn!(core = self.core_id, "no parser bound for analyzer");
            return Ok(AnalyzerReport { core_id: self.core_id, ..AnalyzerReport::default() });
        }
        if self.config.init_verbose {
            info!(core = self.core_id, "analyzer start");
        }

        let mut window_start = Instant::now();
        while !self.stop.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_micros(self.config.pause_time));

            let elapsed = window_start.elapsed().as_secs_f64();
            if elapsed > self.config.verbose_interval {
                if self.config.speed_verbose && !self.is_train {
                    info!(
                        core = self.core_id,
                        mpps = self.pkt_num as f64 / elapsed / 1e6,
                        gbps = self.pkt_len as f64 * 8.0 / elapsed / 1e9,
                        "analyzer rate"
                    );
                }
                if !self.is_train {
                    self.sum_pkt_num += self.pkt_num;
                    self.sum_pkt_len += self.pkt_len;
                }
                self.pkt_num = 0;
                self.pkt_len = 0;
                window_start = Instant::now();
            }

            self.poll_once()?;
        }
        self.finish()
    }

    /// Stop path: rolls counters, persists the result ring when configured,
    /// emits the runtime summary.
    pub fn finish(mut self) -> Result<AnalyzerReport> {
        self.sum_pkt_num += self.pkt_num;
        self.sum_pkt_len += self.pkt_len;
        let runtime = self.detect_start.elapsed().as_secs_f64().max(f64::EPSILON);

        if self.config.save_to_file {
            self.ring.save(&self.config.save_dir, &self.config.save_file_prefix, self.core_id)?;
        }

        let report = AnalyzerReport {
            core_id: self.core_id,
            mpps: self.sum_pkt_num as f64 / runtime / 1e6,
            gbps: self.sum_pkt_len as f64 * 8.0 / runtime / 1e9,
            runtime_s: runtime,
        };
        info!(
            core = self.core_id,
            runtime_s = report.runtime_s,
            mpps = report.mpps,
            gbps = report.gbps,
            "analyzer summary"
        );
        Ok(report)
    }

    /// Flips into detection mode once the learner is done: copies the
    /// centers, resets the counters, notes the detection start time.
    fn enter_detection_if_ready(&mut self) -> Result<()> {
        if !self.is_train || !self.learner.training_finished() {
            return Ok(());
        }
        let centers = self.learner.centers_snapshot().ok_or_else(|| {
            WhisperError::Learner("training finished without published centers".into())
        })?;
        self.centers = (*centers).clone();
        self.is_train = false;
        self.pkt_num = 0;
        self.pkt_len = 0;
        self.detect_start = Instant::now();

        if self.config.mode_verbose {
            info!(core = self.core_id, "enter execution mode");
        }
        if self.config.center_verbose && self.core_id == self.config.verbose_center_core {
            for (i, center) in self.centers.iter().enumerate() {
                info!(core = self.core_id, center = i, values = ?center, "cluster center");
            }
        }
        Ok(())
    }

    fn analyze(&mut self) -> Result<()> {
        let mut records = std::mem::take(&mut self.scratch);
        let outcome = self.analyze_records(&mut records);
        // The scratch index resets regardless of outcome.
        records.clear();
        self.scratch = records;
        outcome
    }

    fn analyze_records(&mut self, records: &mut [MetadataRecord]) -> Result<()> {
        let mut groups: AHashMap<u32, Vec<usize>> = AHashMap::new();
        for (i, rec) in records.iter().enumerate() {
            self.pkt_len += u64::from(rec.pkt_len);
            groups.entry(rec.src_addr).or_default().push(i);
        }

        for (addr, idxs) in &groups {
            if idxs.len() < 2 * self.config.n_fft {
                continue;
            }

            // Inter-arrival deltas, rewritten in place back-to-front. Records
            // reordered across parsers degrade to the clamp floor; the flow
            // still scores, just with a compressed timing signal.
            for i in (1..idxs.len()).rev() {
                let prev = records[idxs[i - 1]].timestamp;
                let rec = &mut records[idxs[i]];
                rec.timestamp -= prev;
                if rec.timestamp <= 0.0 {
                    rec.timestamp = MIN_INTERVAL;
                }
            }
            records[idxs[0]].timestamp = MIN_INTERVAL;

            let signal: Vec<f64> =
                idxs.iter().map(|&i| weight_transform(&records[i])).collect();
            let mut spec = self.spectral.stft_power(&signal, self.config.n_fft);
            spec.log2_plus_one();

            if self.is_train {
                self.train_on(&spec)?;
                // Let the learner settle; remaining groups wait for the
                // next pass.
                thread::sleep(Duration::from_millis(50));
                return Ok(());
            }
            self.score_group(*addr, idxs.len(), &spec);
        }
        Ok(())
    }

    /// Feeds one spectrogram to the learner and runs the trigger election.
    fn train_on(&mut self, spec: &Spectrogram) -> Result<()> {
        let frames = spec.frames();
        let win = self.config.mean_win_train;
        let samples = self.config.num_train_sample;

        if frames > win + 1 && !self.learner.reach_learn() {
            let mut batch = Vec::with_capacity(samples);
            for _ in 0..samples {
                let start = self.rng.gen_range(0..frames - 1 - win);
                batch.push(spec.mean_rows(start..start + win));
            }
            self.learner.add_train_data(batch);
        } else {
            self.learner.add_train_data(vec![spec.mean_all()]);
        }

        let triggered = self.learner.maybe_start_train(self.clusterer.as_ref())?;
        if triggered && self.config.mode_verbose {
            info!(core = self.core_id, "triggered the training of learner");
        }
        self.enter_detection_if_ready()
    }

    /// Scores one flow group against the centers and records the outcome.
    fn score_group(&mut self, addr: u32, packets: usize, spec: &Spectrogram) {
        let win = self.config.mean_win_test;
        let frames = spec.frames();

        let score = if frames > win {
            // Non-overlapping windows; the flow scores as the worst window.
            let mut max_over_windows: f64 = 0.0;
            let mut i = 0;
            while i + win < frames {
                let mean = spec.mean_rows(i..i + win);
                max_over_windows = max_over_windows.max(self.min_center_distance(&mean));
                i += win;
            }
            max_over_windows
        } else {
            self.min_center_distance(&spec.mean_all())
        };

        if let Some(target) = self.verbose_ip {
            if target == addr {
                info!(
                    core = self.core_id,
                    addr = %Ipv4Addr::from(addr),
                    packets,
                    score,
                    "flow trace"
                );
            }
        }
        if self.config.save_to_file {
            self.ring.push(FlowRecord {
                address: addr,
                distance: score,
                packet_count: packets as u64,
            });
        }
    }

    /// Minimum L2 distance to any center, bounded by `MAX_CLUSTER_DIST`.
    fn min_center_distance(&self, sample: &[f64]) -> f64 {
        self.centers
            .iter()
            .fold(MAX_CLUSTER_DIST, |best, c| best.min(l2_distance(sample, c)))
    }
}
