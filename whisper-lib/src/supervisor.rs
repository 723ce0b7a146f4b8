//! Topology planning and worker lifecycle.
//!
//! The supervisor validates the core budget, distributes RX queues over
//! parsers, binds parsers to analyzers, wires the shared learner, and runs
//! the pinned worker threads until a stop is requested.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::analyzer::{AnalyzerReport, AnalyzerWorker};
use crate::capture::SourceProvider;
use crate::config::Config;
use crate::error::{Result, WhisperError};
use crate::handoff::MetadataHandoff;
use crate::learner::Learner;
use crate::parser::{ParserReport, ParserWorker, QueueBinding};

/// The planned core and queue layout: one master core, then the parser
/// cores, then the analyzer cores, all from one contiguous budget.
#[derive(Debug, Clone)]
pub struct Topology {
    pub master_core: u16,
    pub parser_cores: Vec<u16>,
    pub analyzer_cores: Vec<u16>,
    /// Per parser: the (port, queue) pairs it polls.
    pub queue_assign: Vec<Vec<(u16, u16)>>,
    /// Per analyzer: indices into the parser list it owns.
    pub parsers_of_analyzer: Vec<Vec<usize>>,
}

/// Validates the topology invariants and lays out cores, queues, and the
/// parser/analyzer binding.
pub fn plan_topology(cfg: &Config) -> Result<Topology> {
    let rt = &cfg.runtime;
    let parsers = usize::from(rt.core_use_for_parser);
    let analyzers = usize::from(rt.core_use_for_analyze);

    if rt.core_num < 2 {
        return Err(WhisperError::Topology(
            "needed minimum of 2 cores to start the application".into(),
        ));
    }
    if parsers == 0 || analyzers == 0 {
        return Err(WhisperError::Topology(
            "at least one parser core and one analyzer core are required".into(),
        ));
    }
    if usize::from(rt.core_num) < parsers + analyzers + 1 {
        return Err(WhisperError::Topology(format!(
            "core budget {} cannot hold 1 master + {parsers} parsers + {analyzers} analyzers",
            rt.core_num
        )));
    }
    if rt.dpdk_port_vec.is_empty() {
        return Err(WhisperError::Topology("port list is empty".into()));
    }

    // Queue-index-major interleave across ports, so one parser serves the
    // same queue index on every port where the counts line up.
    let mut queues: Vec<(u16, u16)> = Vec::new();
    for q in 0..rt.number_rx_queue {
        for port in &rt.dpdk_port_vec {
            queues.push((*port, q));
        }
    }

    let per_parser = queues.len() / parsers;
    let mut remainder = queues.len() % parsers;
    let mut next = queues.into_iter();
    let mut queue_assign = Vec::with_capacity(parsers);
    for _ in 0..parsers {
        let mut assign: Vec<(u16, u16)> = next.by_ref().take(per_parser).collect();
        if remainder > 0 {
            if let Some(extra) = next.next() {
                assign.push(extra);
                remainder -= 1;
            }
        }
        queue_assign.push(assign);
    }

    // Each analyzer owns an even share of parsers; the remainder is handed
    // out from the tail of the parser list.
    let per_analyzer = parsers / analyzers;
    let remainder = parsers - analyzers * per_analyzer;
    let mut parsers_of_analyzer: Vec<Vec<usize>> = (0..analyzers)
        .map(|i| (i * per_analyzer..(i + 1) * per_analyzer).collect())
        .collect();
    for i in 0..remainder {
        parsers_of_analyzer[i].push(parsers - 1 - i);
    }

    let parser_cores: Vec<u16> = (1..=parsers as u16).collect();
    let analyzer_cores: Vec<u16> =
        (parsers as u16 + 1..=(parsers + analyzers) as u16).collect();

    Ok(Topology {
        master_core: 0,
        parser_cores,
        analyzer_cores,
        queue_assign,
        parsers_of_analyzer,
    })
}

pub struct Supervisor {
    config: Arc<Config>,
    topology: Topology,
}

impl Supervisor {
    pub fn new(config: Config) -> Result<Self> {
        let topology = plan_topology(&config)?;
        Ok(Self { config: Arc::new(config), topology })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Installs the SIGINT hook and runs the pipeline until interrupted.
    pub fn run(&self, provider: &mut dyn SourceProvider) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let hook = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            hook.store(true, Ordering::SeqCst);
        })
        .map_err(|e| WhisperError::Config(format!("cannot install signal handler: {e}")))?;
        self.run_until(provider, stop)
    }

    /// Builds and runs all workers; returns once `stop` is observed and
    /// every worker has been joined and its statistics aggregated.
    pub fn run_until(
        &self,
        provider: &mut dyn SourceProvider,
        stop: Arc<AtomicBool>,
    ) -> Result<()> {
        let cfg = &self.config;

        // Open every port's queues up front; a port that cannot supply the
        // configured queue count is a startup failure.
        let mut queue_map: HashMap<(u16, u16), Box<dyn crate::capture::RxQueue>> =
            HashMap::new();
        for port in &cfg.runtime.dpdk_port_vec {
            let queues = provider.open(*port, cfg.runtime.number_rx_queue)?;
            if queues.len() < usize::from(cfg.runtime.number_rx_queue) {
                return Err(WhisperError::Capture(format!(
                    "port {port} supplies {} RX queues, {} required",
                    queues.len(),
                    cfg.runtime.number_rx_queue
                )));
            }
            for (qid, q) in queues.into_iter().enumerate() {
                queue_map.insert((*port, qid as u16), q);
            }
        }

        let learner =
            Arc::new(Learner::new(cfg.learner.clone(), cfg.analyzer.n_fft / 2 + 1)?);
        let parser_cfg = Arc::new(cfg.parser.clone());
        let analyzer_cfg = Arc::new(cfg.analyzer.clone());

        let mut parsers = Vec::with_capacity(self.topology.parser_cores.len());
        let mut handoffs = Vec::with_capacity(self.topology.parser_cores.len());
        for (i, assign) in self.topology.queue_assign.iter().enumerate() {
            let handoff = Arc::new(MetadataHandoff::new(cfg.parser.meta_pkt_arr_size)?);
            handoffs.push(Arc::clone(&handoff));

            let mut bindings = Vec::with_capacity(assign.len());
            for (port, queue) in assign {
                let source = queue_map.remove(&(*port, *queue)).ok_or_else(|| {
                    WhisperError::Capture(format!("queue {queue} on port {port} not supplied"))
                })?;
                bindings.push(QueueBinding { port: *port, queue: *queue, source });
            }
            parsers.push(ParserWorker::new(
                self.topology.parser_cores[i],
                bindings,
                handoff,
                Arc::clone(&parser_cfg),
                Arc::clone(&stop),
            ));
        }

        let mut analyzers = Vec::with_capacity(self.topology.analyzer_cores.len());
        for (i, owned) in self.topology.parsers_of_analyzer.iter().enumerate() {
            let owned_handoffs = owned.iter().map(|&p| Arc::clone(&handoffs[p])).collect();
            analyzers.push(AnalyzerWorker::new(
                self.topology.analyzer_cores[i],
                owned_handoffs,
                Arc::clone(&learner),
                Arc::clone(&analyzer_cfg),
                Arc::clone(&stop),
            )?);
        }

        if cfg.runtime.verbose {
            info!(
                master = self.topology.master_core,
                parsers = self.topology.parser_cores.len(),
                analyzers = self.topology.analyzer_cores.len(),
                ports = cfg.runtime.dpdk_port_vec.len(),
                rx_queues = cfg.runtime.number_rx_queue,
                "topology planned"
            );
        }

        let mut parser_handles = Vec::with_capacity(parsers.len());
        for worker in parsers {
            let core = self.topology.parser_cores[parser_handles.len()];
            parser_handles.push(
                thread::Builder::new()
                    .name(format!("whisper-parser-{core}"))
                    .spawn(move || {
                        pin_to_core(core);
                        worker.run()
                    })?,
            );
        }
        let mut analyzer_handles = Vec::with_capacity(analyzers.len());
        for worker in analyzers {
            let core = self.topology.analyzer_cores[analyzer_handles.len()];
            analyzer_handles.push(
                thread::Builder::new()
                    .name(format!("whisper-analyzer-{core}"))
                    .spawn(move || {
                        pin_to_core(core);
                        worker.run()
                    })?,
            );
        }

        while !stop.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(200));
        }
        info!("whisper stopping");

        let mut first_error: Option<WhisperError> = None;
        let mut parser_total = ParserReport::default();
        for handle in parser_handles {
            match handle.join() {
                Ok(Ok(report)) => {
                    parser_total.mpps += report.mpps;
                    parser_total.gbps += report.gbps;
                }
                Ok(Err(e)) => {
                    error!(%e, "parser worker failed");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    error!("parser worker panicked");
                    first_error
                        .get_or_insert(WhisperError::Capture("parser worker panicked".into()));
                }
            }
        }
        let mut analyzer_total = AnalyzerReport::default();
        for handle in analyzer_handles {
            match handle.join() {
                Ok(Ok(report)) => {
                    analyzer_total.mpps += report.mpps;
                    analyzer_total.gbps += report.gbps;
                }
                Ok(Err(e)) => {
                    error!(%e, "analyzer worker failed");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    error!("analyzer worker panicked");
                    first_error
                        .get_or_insert(WhisperError::Learner("analyzer worker panicked".into()));
                }
            }
        }

        if cfg.parser.verbose.summary {
            info!(
                mpps = parser_total.mpps,
                gbps = parser_total.gbps,
                "parser overall performance"
            );
        }
        if cfg.analyzer.speed_verbose {
            info!(
                mpps = analyzer_total.mpps,
                gbps = analyzer_total.gbps,
                "analyzer overall performance"
            );
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn pin_to_core(core: u16) {
    if let Some(ids) = core_affinity::get_core_ids() {
        if let Some(id) = ids.into_iter().find(|c| c.id == usize::from(core)) {
            if !core_affinity::set_for_current(id) {
                warn!(core, "core pinning failed");
            }
            return;
        }
    }
    warn!(core, "core unavailable for pinning");
}
