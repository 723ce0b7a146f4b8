mod decode;
mod worker;

pub use decode::decode_frame;
pub use worker::{ParserReport, ParserWorker, QueueBinding};
