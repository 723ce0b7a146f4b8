use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use whisper_lib::config::{load_from_path, ParserVerbose};

fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos();
    std::env::temp_dir().join(format!("whisper-{nanos}-{name}.json"))
}

#[test]
fn loads_minimal_config() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("minimal");
    let json = r#"
{
    "DPDK": { "dpdk_port_vec": [0] }
}
"#;
    fs::write(&path, json)?;

    let cfg = load_from_path(&path)?;
    assert_eq!(cfg.runtime.dpdk_port_vec, vec![0]);
    assert_eq!(cfg.runtime.core_num, 17);
    assert_eq!(cfg.parser.max_receive_burst, 64);
    assert_eq!(cfg.analyzer.n_fft, 50);
    assert_eq!(cfg.learner.val_k, 10);
    assert_eq!(cfg.learner.num_train_data, 2000);
    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn loads_all_sections() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("full");
    let json = r#"
{
    "DPDK": {
        "number_rx_queue": 4,
        "number_tx_queue": 1,
        "core_num": 6,
        "core_use_for_parser": 3,
        "core_use_for_analyze": 2,
        "dpdk_port_vec": [0, 1],
        "verbose": false
    },
    "Parser": {
        "max_receive_burts": 128,
        "meta_pkt_arr_size": 4096,
        "verbose_mode": "complete",
        "verbose_interval": 2.5
    },
    "Analyzer": {
        "n_fft": 32,
        "mean_win_train": 10,
        "mean_win_test": 20,
        "num_train_sample": 5,
        "ip_verbose": true,
        "verbose_ip_target": "192.168.1.1"
    },
    "Learner": {
        "val_K": 4,
        "num_train_data": 100
    }
}
"#;
    fs::write(&path, json)?;

    let cfg = load_from_path(&path)?;
    assert_eq!(cfg.runtime.number_rx_queue, 4);
    assert_eq!(cfg.parser.max_receive_burst, 128);
    assert_eq!(
        cfg.parser.verbose,
        ParserVerbose { tracing: true, summary: true, init: true }
    );
    assert_eq!(cfg.analyzer.n_fft, 32);
    assert!(cfg.analyzer.ip_verbose);
    assert_eq!(cfg.learner.val_k, 4);
    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn missing_runtime_section_is_rejected() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("no-dpdk");
    fs::write(&path, r#"{ "Parser": {} }"#)?;
    assert!(load_from_path(&path).is_err());
    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn invalid_core_topology_is_rejected() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("topology");
    let json = r#"
{
    "DPDK": {
        "core_num": 4,
        "core_use_for_parser": 3,
        "core_use_for_analyze": 2,
        "dpdk_port_vec": [0]
    }
}
"#;
    fs::write(&path, json)?;
    assert!(load_from_path(&path).is_err());
    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn burst_ceiling_is_enforced() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("burst");
    let json = r#"
{
    "DPDK": { "dpdk_port_vec": [0] },
    "Parser": { "max_receive_burts": 131072 }
}
"#;
    fs::write(&path, json)?;
    assert!(load_from_path(&path).is_err());
    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn save_and_load_are_mutually_exclusive() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("save-load");
    let json = r#"
{
    "DPDK": { "dpdk_port_vec": [0] },
    "Learner": {
        "save_result": true,
        "save_result_file": "a.json",
        "load_result": true,
        "load_result_file": "b.json"
    }
}
"#;
    fs::write(&path, json)?;
    assert!(load_from_path(&path).is_err());
    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn unknown_verbose_mode_falls_back_to_silent() -> Result<(), Box<dyn std::error::Error + Send + Sync>>
{
    let path = tmp_path("verbose-tag");
    let json = r#"
{
    "DPDK": { "dpdk_port_vec": [0] },
    "Parser": { "verbose_mode": "chatty" }
}
"#;
    fs::write(&path, json)?;

    let cfg = load_from_path(&path)?;
    assert_eq!(cfg.parser.verbose, ParserVerbose::default());
    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn invalid_trace_target_disables_flow_tracing(
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("trace-target");
    let json = r#"
{
    "DPDK": { "dpdk_port_vec": [0] },
    "Analyzer": { "ip_verbose": true, "verbose_ip_target": "not-an-address" }
}
"#;
    fs::write(&path, json)?;

    let cfg = load_from_path(&path)?;
    assert!(!cfg.analyzer.ip_verbose);
    fs::remove_file(&path)?;
    Ok(())
}
