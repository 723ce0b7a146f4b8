use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::capture::{RawFrame, RxQueue};
use crate::config::{ParserSection, ParserVerbose};
use crate::error::Result;
use crate::handoff::MetadataHandoff;
use crate::parser::decode::decode_frame;

/// One (port, queue) receive endpoint assigned to a parser.
pub struct QueueBinding {
    pub port: u16,
    pub queue: u16,
    pub source: Box<dyn RxQueue>,
}

/// Per-queue packet/byte counters. The receive loop increments the window
/// counters; the sampler thread rolls them into the cumulative sums, so both
/// sides touch them lock-free.
struct QueueCounter {
    port: u16,
    pkts: AtomicU64,
    bytes: AtomicU64,
    sum_pkts: AtomicU64,
    sum_bytes: AtomicU64,
}

struct ParserStats {
    queues: Vec<QueueCounter>,
}

impl ParserStats {
    /// Folds the current window into the cumulative sums.
    fn roll(&self) {
        for q in &self.queues {
            q.sum_pkts.fetch_add(q.pkts.swap(0, Ordering::Relaxed), Ordering::Relaxed);
            q.sum_bytes.fetch_add(q.bytes.swap(0, Ordering::Relaxed), Ordering::Relaxed);
        }
    }

    /// (packets, bytes) accumulated per port, in first-seen port order.
    fn per_port_sums(&self) -> Vec<(u16, u64, u64)> {
        let mut out: Vec<(u16, u64, u64)> = Vec::new();
        for q in &self.queues {
            let pkts = q.sum_pkts.load(Ordering::Relaxed);
            let bytes = q.sum_bytes.load(Ordering::Relaxed);
            match out.iter_mut().find(|(p, _, _)| *p == q.port) {
                Some(entry) => {
                    entry.1 += pkts;
                    entry.2 += bytes;
                }
                None => out.push((q.port, pkts, bytes)),
            }
        }
        out
    }
}

/// Final throughput summary of one parser, aggregated over its ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserReport {
    pub core_id: u16,
    pub mpps: f64,
    pub gbps: f64,
}

/// Per-core receive worker: polls its queue bindings round-robin, decodes
/// each frame to a metadata record, and appends into its handoff buffer.
pub struct ParserWorker {
    core_id: u16,
    config: Arc<ParserSection>,
    queues: Vec<QueueBinding>,
    handoff: Arc<MetadataHandoff>,
    stats: Arc<ParserStats>,
    stop: Arc<AtomicBool>,
    burst: Vec<RawFrame>,
}

impl ParserWorker {
    pub fn new(
        core_id: u16,
        queues: Vec<QueueBinding>,
        handoff: Arc<MetadataHandoff>,
        config: Arc<ParserSection>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let counters = queues
            .iter()
            .map(|b| QueueCounter {
                port: b.port,
                pkts: AtomicU64::new(0),
                bytes: AtomicU64::new(0),
                sum_pkts: AtomicU64::new(0),
                sum_bytes: AtomicU64::new(0),
            })
            .collect();
        let burst = Vec::with_capacity(config.max_receive_burst);
        Self {
            core_id,
            config,
            queues,
            handoff,
            stats: Arc::new(ParserStats { queues: counters }),
            stop,
            burst,
        }
    }

    /// Read-only view of this parser's handoff, for wiring the consumer.
    pub fn handoff(&self) -> Arc<MetadataHandoff> {
        Arc::clone(&self.handoff)
    }

    /// One round-robin pass over all bound queues. Returns the number of
    /// metadata records produced.
    pub fn poll_once(&mut self) -> usize {
        let mut produced = 0;
        for (qi, binding) in self.queues.iter_mut().enumerate() {
            self.burst.clear();
            binding.source.burst_receive(&mut self.burst, self.config.max_receive_burst);

            for frame in &self.burst {
                let Some(rec) = decode_frame(&frame.data, frame.timestamp) else {
                    continue;
                };
                let counter = &self.stats.queues[qi];
                counter.pkts.fetch_add(1, Ordering::Relaxed);
                counter.bytes.fetch_add(u64::from(rec.pkt_len), Ordering::Relaxed);

                if self.handoff.push(rec) {
                    warn!(core = self.core_id, "parse queue reached max, metadata dropped");
                }
                produced += 1;
            }
        }
        produced
    }

    /// Blocking receive loop; returns the throughput summary once stopped.
    pub fn run(mut self) -> Result<ParserReport> {
        if self.queues.is_empty() {
            warn!(core = self.core_id, "no RX queue bound for parser");
            return Ok(ParserReport { core_id: self.core_id, ..ParserReport::default() });
        }

        if self.config.verbose.init {
            info!(core = self.core_id, "parser start");
        }

        let sampler = spawn_sampler(
            self.core_id,
            Arc::clone(&self.stats),
            self.config.verbose,
            self.config.verbose_interval,
            Arc::clone(&self.stop),
        )?;

        let start = Instant::now();
        while !self.stop.load(Ordering::Relaxed) {
            self.poll_once();
        }
        let runtime = start.elapsed().as_secs_f64().max(f64::EPSILON);

        if sampler.join().is_err() {
            warn!(core = self.core_id, "stats sampler panicked");
        }
        self.stats.roll();

        let mut report = ParserReport { core_id: self.core_id, ..ParserReport::default() };
        for (port, pkts, bytes) in self.stats.per_port_sums() {
            let mpps = pkts as f64 / 1e6 / runtime;
            let gbps = bytes as f64 * 8.0 / 1e9 / runtime;
            if self.config.verbose.summary {
                info!(core = self.core_id, port, runtime_s = runtime, mpps, gbps, "parser summary");
            }
            report.mpps += mpps;
            report.gbps += gbps;
        }
        Ok(report)
    }
}

/// Companion statistic thread: wakes every `interval` seconds, optionally
/// prints per-port rates, and rolls the window counters. Exits as soon as
/// the stop flag is observed.
fn spawn_sampler(
    core_id: u16,
    stats: Arc<ParserStats>,
    verbose: ParserVerbose,
    interval: f64,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("whisper-parser-stats-{core_id}"))
        .spawn(move || {
            let interval = interval.max(0.1);
            loop {
                let deadline = Instant::now() + Duration::from_secs_f64(interval);
                while Instant::now() < deadline {
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(Duration::from_millis(100));
                }

                if verbose.tracing {
                    let mut per_port: Vec<(u16, u64, u64)> = Vec::new();
                    for q in &stats.queues {
                        let pkts = q.pkts.load(Ordering::Relaxed);
                        let bytes = q.bytes.load(Ordering::Relaxed);
                        match per_port.iter_mut().find(|(p, _, _)| *p == q.port) {
                            Some(entry) => {
                                entry.1 += pkts;
                                entry.2 += bytes;
                            }
                            None => per_port.push((q.port, pkts, bytes)),
                        }
                    }
                    for (port, pkts, bytes) in per_port {
                        info!(
                            core = core_id,
                            port,
                            mpps = pkts as f64 / 1e6 / interval,
                            gbps = bytes as f64 * 8.0 / 1e9 / interval,
                            "parser rate"
                        );
                    }
                }
                stats.roll();
            }
        })?;
    Ok(handle)
}
