mod loader;
mod types;

pub use loader::{load_from_path, validate_config, verbose_ip_of};
pub use types::{
    AnalyzerSection, Config, LearnerSection, ParserSection, ParserVerbose, RuntimeSection,
    MAX_META_PKT_ARR_SIZE, MAX_RECEIVE_BURST, MAX_RESULT_BUFFER_SIZE,
};
