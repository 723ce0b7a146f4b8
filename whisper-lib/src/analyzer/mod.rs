mod results;
mod worker;

pub mod spectral;

pub use results::{FlowRecord, ResultRing};
pub use worker::{AnalyzerReport, AnalyzerWorker};
