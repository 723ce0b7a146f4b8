use serde::Deserialize;
use std::path::PathBuf;

/// Hard ceiling for a single receive burst.
pub const MAX_RECEIVE_BURST: usize = 1 << 16;
/// Hard ceiling for parser/analyzer metadata buffers.
pub const MAX_META_PKT_ARR_SIZE: usize = 1 << 25;
/// Hard ceiling for the per-analyzer result ring.
pub const MAX_RESULT_BUFFER_SIZE: usize = 1 << 24;

/// Top-level configuration document.
///
/// Section names mirror the on-disk JSON layout; the `DPDK` section is
/// required, the others fall back to their defaults when absent.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(rename = "DPDK")]
    pub runtime: RuntimeSection,
    #[serde(rename = "Parser", default)]
    pub parser: ParserSection,
    #[serde(rename = "Analyzer", default)]
    pub analyzer: AnalyzerSection,
    #[serde(rename = "Learner", default)]
    pub learner: LearnerSection,
}

/// Runtime topology: receive queues, core budget, port list.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeSection {
    /// RX queues opened per port.
    #[serde(default = "default_rx_queue")]
    pub number_rx_queue: u16,
    /// TX queues opened per port. The detector never transmits; the value is
    /// carried for NIC open compatibility.
    #[serde(default = "default_tx_queue")]
    pub number_tx_queue: u16,
    /// Total contiguous core budget: 1 master + parsers + analyzers.
    #[serde(default = "default_core_num")]
    pub core_num: u16,
    #[serde(default = "default_core_parser")]
    pub core_use_for_parser: u16,
    #[serde(default = "default_core_analyze")]
    pub core_use_for_analyze: u16,
    /// Ports to open. Must be non-empty.
    #[serde(default)]
    pub dpdk_port_vec: Vec<u16>,
    #[serde(default = "default_true")]
    pub verbose: bool,
    /// Optional pcap trace replayed through every configured port's RX
    /// queues, so the full pipeline runs offline. When absent the embedder
    /// supplies its own receive queues to the supervisor.
    #[serde(default)]
    pub replay_trace: Option<PathBuf>,
}

/// Which statistic lines a parser emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserVerbose {
    pub tracing: bool,
    pub summary: bool,
    pub init: bool,
}

impl ParserVerbose {
    /// Maps a config tag to a flag set. Unknown tags yield `None`; the
    /// loader warns and falls back to no verbose output.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "tracing" => Some(Self { tracing: true, ..Self::default() }),
            "summarizing" => Some(Self { summary: true, ..Self::default() }),
            "init" => Some(Self { init: true, ..Self::default() }),
            "complete" => Some(Self { tracing: true, summary: true, init: true }),
            _ => None,
        }
    }
}

/// Parser worker tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct ParserSection {
    /// Frames pulled from one queue per burst-receive call.
    #[serde(rename = "max_receive_burts", default = "default_receive_burst")]
    pub max_receive_burst: usize,
    /// Capacity of the per-parser metadata handoff buffer.
    #[serde(default = "default_parser_meta_arr")]
    pub meta_pkt_arr_size: usize,
    /// One of "tracing", "summarizing", "init", "complete".
    #[serde(default)]
    pub verbose_mode: Option<String>,
    #[serde(default = "default_verbose_interval")]
    pub verbose_interval: f64,
    /// Resolved from `verbose_mode` by the loader; not part of the document.
    #[serde(skip)]
    pub verbose: ParserVerbose,
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            max_receive_burst: default_receive_burst(),
            meta_pkt_arr_size: default_parser_meta_arr(),
            verbose_mode: None,
            verbose_interval: default_verbose_interval(),
            verbose: ParserVerbose::default(),
        }
    }
}

/// Analyzer worker tuning: spectral parameters, pacing, persistence, verbose.
#[derive(Debug, Deserialize, Clone)]
pub struct AnalyzerSection {
    /// STFT window size. The spectrogram carries `n_fft/2 + 1` bins.
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,
    /// Frame-window length for training sample means.
    #[serde(default = "default_mean_win_train")]
    pub mean_win_train: usize,
    /// Frame-window length for detection means.
    #[serde(default = "default_mean_win_test")]
    pub mean_win_test: usize,
    /// Random window means drawn per spectrogram while training.
    #[serde(default = "default_num_train_sample")]
    pub num_train_sample: usize,
    /// Microseconds slept between analysis ticks.
    #[serde(default = "default_pause_time")]
    pub pause_time: u64,
    /// Capacity of the analyzer's scratch buffer.
    #[serde(default = "default_analyzer_meta_arr")]
    pub meta_pkt_arr_size: usize,
    /// Capacity of the flow-record ring (overwrite on wrap).
    #[serde(default = "default_result_buffer")]
    pub result_buffer_size: usize,
    #[serde(default)]
    pub save_to_file: bool,
    #[serde(default)]
    pub save_dir: String,
    #[serde(default)]
    pub save_file_prefix: String,
    #[serde(default)]
    pub init_verbose: bool,
    #[serde(default)]
    pub mode_verbose: bool,
    #[serde(default)]
    pub center_verbose: bool,
    #[serde(default)]
    pub speed_verbose: bool,
    #[serde(default)]
    pub ip_verbose: bool,
    /// Dotted IPv4 address whose per-flow scores are traced in detection
    /// mode. An unparsable value disables `ip_verbose` with a warning.
    #[serde(default)]
    pub verbose_ip_target: String,
    /// Analyzer core that prints the learned centers on entering detection.
    #[serde(default = "default_center_core")]
    pub verbose_center_core: u16,
    #[serde(default = "default_verbose_interval")]
    pub verbose_interval: f64,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            n_fft: default_n_fft(),
            mean_win_train: default_mean_win_train(),
            mean_win_test: default_mean_win_test(),
            num_train_sample: default_num_train_sample(),
            pause_time: default_pause_time(),
            meta_pkt_arr_size: default_analyzer_meta_arr(),
            result_buffer_size: default_result_buffer(),
            save_to_file: false,
            save_dir: String::new(),
            save_file_prefix: String::new(),
            init_verbose: false,
            mode_verbose: false,
            center_verbose: false,
            speed_verbose: false,
            ip_verbose: false,
            verbose_ip_target: String::new(),
            verbose_center_core: default_center_core(),
            verbose_interval: default_verbose_interval(),
        }
    }
}

/// Learner tuning: quota, K, centers persistence.
#[derive(Debug, Deserialize, Clone)]
pub struct LearnerSection {
    /// Number of cluster centers.
    #[serde(rename = "val_K", default = "default_val_k")]
    pub val_k: usize,
    /// Training-sample quota before the fit may start.
    #[serde(default = "default_num_train_data")]
    pub num_train_data: usize,
    #[serde(default)]
    pub save_result: bool,
    #[serde(default)]
    pub save_result_file: String,
    /// Pre-load centers instead of training. Mutually exclusive with
    /// `save_result`.
    #[serde(default)]
    pub load_result: bool,
    #[serde(default)]
    pub load_result_file: String,
    #[serde(default = "default_true")]
    pub verbose: bool,
}

impl Default for LearnerSection {
    fn default() -> Self {
        Self {
            val_k: default_val_k(),
            num_train_data: default_num_train_data(),
            save_result: false,
            save_result_file: String::new(),
            load_result: false,
            load_result_file: String::new(),
            verbose: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rx_queue() -> u16 {
    8
}

fn default_tx_queue() -> u16 {
    8
}

fn default_core_num() -> u16 {
    17
}

fn default_core_parser() -> u16 {
    8
}

fn default_core_analyze() -> u16 {
    8
}

fn default_receive_burst() -> usize {
    64
}

fn default_parser_meta_arr() -> usize {
    1_000_000
}

fn default_analyzer_meta_arr() -> usize {
    2_000_000
}

fn default_result_buffer() -> usize {
    500_000
}

fn default_verbose_interval() -> f64 {
    5.0
}

fn default_n_fft() -> usize {
    50
}

fn default_mean_win_train() -> usize {
    50
}

fn default_mean_win_test() -> usize {
    100
}

fn default_num_train_sample() -> usize {
    50
}

fn default_pause_time() -> u64 {
    50_000
}

fn default_center_core() -> u16 {
    10
}

fn default_val_k() -> usize {
    10
}

fn default_num_train_data() -> usize {
    2000
}
