//! pitchscrape core: match records, statistic normalization, checkpoints and output sinks.

pub mod checkpoint;
pub mod format;
pub mod record;
pub mod sink;
pub mod stats;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use sink::{FileSink, OutputSink};
pub use stats::{normalize, parse_stat_value, validate, StatsValidation, CATALOG, CATALOG_SIZE};
pub use types::*;
