pub mod activity_log;
pub mod timeseries;

pub use activity_log::{ActivityLogger, ActivityTag, LoggingActivityLogger, QueueingActivityLogger};
pub use timeseries::{CsvTimeseriesSink, FuserStats, NoopTimeseriesSink, TimeseriesSink};
