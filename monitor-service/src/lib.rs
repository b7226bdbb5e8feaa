pub mod monitor;

pub use monitor::{passes_country_filter, CycleReport, MonitorLoop, MonitorState, Resume};
