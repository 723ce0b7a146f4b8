use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use tracing::warn;

use crate::config::types::{
    Config, ParserVerbose, MAX_META_PKT_ARR_SIZE, MAX_RECEIVE_BURST, MAX_RESULT_BUFFER_SIZE,
};
use crate::error::{Result, WhisperError};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| WhisperError::Config(format!("Failed to read config file: {e}")))?;
    let mut cfg: Config = serde_json::from_str(&txt)
        .map_err(|e| WhisperError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&mut cfg)?;

    Ok(cfg)
}

/// Enforces the hard limits and topology invariants; normalizes the
/// recoverable fields (unknown verbose tags, unparsable trace targets) with
/// a warning instead of failing the load.
pub fn validate_config(cfg: &mut Config) -> Result<()> {
    let rt = &cfg.runtime;
    if rt.dpdk_port_vec.is_empty() {
        return Err(WhisperError::Config("port list is empty".into()));
    }
    if rt.core_num < 2 {
        return Err(WhisperError::Topology(
            "needed minimum of 2 cores to start the application".into(),
        ));
    }
    if rt.core_use_for_parser == 0 || rt.core_use_for_analyze == 0 {
        return Err(WhisperError::Topology(
            "at least one parser core and one analyzer core are required".into(),
        ));
    }
    if rt.core_num < rt.core_use_for_parser + rt.core_use_for_analyze + 1 {
        return Err(WhisperError::Topology(format!(
            "core budget {} cannot hold 1 master + {} parsers + {} analyzers",
            rt.core_num, rt.core_use_for_parser, rt.core_use_for_analyze
        )));
    }
    if rt.number_rx_queue == 0 {
        return Err(WhisperError::Config("number_rx_queue must be at least 1".into()));
    }

    if cfg.parser.max_receive_burst == 0 || cfg.parser.max_receive_burst > MAX_RECEIVE_BURST {
        return Err(WhisperError::Config(format!(
            "max receive burst {} exceeds the {} ceiling",
            cfg.parser.max_receive_burst, MAX_RECEIVE_BURST
        )));
    }
    if cfg.parser.meta_pkt_arr_size == 0 || cfg.parser.meta_pkt_arr_size > MAX_META_PKT_ARR_SIZE {
        return Err(WhisperError::Config(format!(
            "parser metadata buffer {} exceeds the {} ceiling",
            cfg.parser.meta_pkt_arr_size, MAX_META_PKT_ARR_SIZE
        )));
    }
    if cfg.analyzer.meta_pkt_arr_size == 0 || cfg.analyzer.meta_pkt_arr_size > MAX_META_PKT_ARR_SIZE
    {
        return Err(WhisperError::Config(format!(
            "analyzer metadata buffer {} exceeds the {} ceiling",
            cfg.analyzer.meta_pkt_arr_size, MAX_META_PKT_ARR_SIZE
        )));
    }
    if cfg.analyzer.result_buffer_size == 0
        || cfg.analyzer.result_buffer_size > MAX_RESULT_BUFFER_SIZE
    {
        return Err(WhisperError::Config(format!(
            "result buffer {} exceeds the {} ceiling",
            cfg.analyzer.result_buffer_size, MAX_RESULT_BUFFER_SIZE
        )));
    }

    // Hop length is n_fft/4; anything smaller cannot frame a signal.
    if cfg.analyzer.n_fft < 4 {
        return Err(WhisperError::Config(format!(
            "n_fft {} is too small for framing",
            cfg.analyzer.n_fft
        )));
    }
    if cfg.analyzer.mean_win_train == 0
        || cfg.analyzer.mean_win_test == 0
        || cfg.analyzer.num_train_sample == 0
    {
        return Err(WhisperError::Config(
            "mean windows and training sample count must be at least 1".into(),
        ));
    }
    if cfg.parser.verbose_interval < 0.0 || cfg.analyzer.verbose_interval < 0.0 {
        return Err(WhisperError::Config("verbose interval must be non-negative".into()));
    }

    if cfg.learner.val_k == 0 || cfg.learner.num_train_data == 0 {
        return Err(WhisperError::Config(
            "val_K and num_train_data must be at least 1".into(),
        ));
    }
    if cfg.learner.save_result && cfg.learner.load_result {
        return Err(WhisperError::Config(
            "cannot save the training result while loading the result".into(),
        ));
    }
    if cfg.learner.save_result && cfg.learner.save_result_file.is_empty() {
        return Err(WhisperError::Config("save_result set without save_result_file".into()));
    }
    if cfg.learner.load_result && cfg.learner.load_result_file.is_empty() {
        return Err(WhisperError::Config("load_result set without load_result_file".into()));
    }

    // Recoverable fields: reject the value, keep the default.
    cfg.parser.verbose = match cfg.parser.verbose_mode.as_deref() {
        None => ParserVerbose::default(),
        Some(tag) => ParserVerbose::from_tag(tag).unwrap_or_else(|| {
            warn!(tag, "unknown parser verbose mode, verbose output disabled");
            ParserVerbose::default()
        }),
    };
    if cfg.analyzer.ip_verbose {
        if cfg.analyzer.verbose_ip_target.is_empty()
            || cfg.analyzer.verbose_ip_target.parse::<Ipv4Addr>().is_err()
        {
            warn!(
                target = %cfg.analyzer.verbose_ip_target,
                "invalid verbose trace address, per-flow tracing disabled"
            );
            cfg.analyzer.ip_verbose = false;
        }
    }

    Ok(())
}

/// The verbose trace target as a host-order address, when enabled and valid.
pub fn verbose_ip_of(analyzer: &crate::config::AnalyzerSection) -> Option<u32> {
    if !analyzer.ip_verbose {
        return None;
    }
    analyzer.verbose_ip_target.parse::<Ipv4Addr>().ok().map(u32::from)
}
