pub mod config;
pub mod model;
pub mod naming;
pub mod status;
pub mod timefmt;

pub use config::Config;
pub use model::*;
pub use status::{RecordingStatusSink, StatusSink, TracingStatusSink};
