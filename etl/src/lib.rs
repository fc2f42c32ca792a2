pub mod pipeline;
pub mod schema;
pub mod session;
pub mod storage;
pub mod tables;
pub mod udf;

pub use pipeline::{run_etl_pipeline, run_with_settings};
pub use tables::{OutputTable, PipelineReport, SongplayId};
