#![forbid(unsafe_code)]

pub mod analyzer;
pub mod capture;
pub mod config;
pub mod error;
pub mod handoff;
pub mod learner;
pub mod metadata;
pub mod parser;
pub mod supervisor;

pub use analyzer::{AnalyzerReport, AnalyzerWorker, FlowRecord};
pub use capture::{RawFrame, ReplayProvider, RxQueue, SourceProvider};
pub use config::{load_from_path, Config};
pub use error::{Result, WhisperError};
pub use handoff::MetadataHandoff;
pub use learner::{Clusterer, Learner, LloydKmeans};
pub use metadata::{MetadataRecord, ProtoCode};
pub use parser::{ParserWorker, QueueBinding};
pub use supervisor::{plan_topology, Supervisor, Topology};
